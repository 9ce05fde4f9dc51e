//! Template expansion into dated lessons.
//!
//! # Responsibility
//! - Walk a date range day by day and materialize lessons for every
//!   template whose weekday and parity match.
//!
//! # Invariants
//! - Never proposes a lesson whose identity already exists in the supplied
//!   snapshot or earlier in the same expansion.
//! - Performs no conflict checks and no persistence.

use crate::model::lesson::{Lesson, LessonIdentity};
use crate::model::template::WeeklyTemplate;
use crate::schedule::parity::ParityRule;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Expands weekly templates under a fixed parity rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExpander {
    rule: ParityRule,
}

impl TemplateExpander {
    pub fn new(rule: ParityRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> ParityRule {
        self.rule
    }

    /// Returns the lessons that should exist in `start..=end` and do not yet.
    ///
    /// Returns an empty list when `start > end`. Output is ordered by date,
    /// then by template order.
    pub fn expand(
        &self,
        templates: &[WeeklyTemplate],
        start: NaiveDate,
        end: NaiveDate,
        existing: &[Lesson],
    ) -> Vec<Lesson> {
        if start > end || templates.is_empty() {
            return Vec::new();
        }

        let mut taken: HashSet<LessonIdentity> =
            existing.iter().map(Lesson::identity).collect();
        let mut generated = Vec::new();

        for date in start.iter_days().take_while(|date| *date <= end) {
            let parity = self.rule.is_even_week(date);
            for template in templates
                .iter()
                .filter(|template| template.applies_to(date, parity))
            {
                let lesson = Lesson::new(
                    date,
                    template.lesson_number,
                    template.group_id,
                    template.subject_id,
                    template.teacher_id,
                    template.classroom_id,
                );
                if taken.insert(lesson.identity()) {
                    generated.push(lesson);
                }
            }
        }

        generated
    }
}

/// Expands with the default [`ParityRule::FirstMonday`] rule.
pub fn expand(
    templates: &[WeeklyTemplate],
    start: NaiveDate,
    end: NaiveDate,
    existing: &[Lesson],
) -> Vec<Lesson> {
    TemplateExpander::default().expand(templates, start, end, existing)
}

#[cfg(test)]
mod tests {
    use super::{expand, TemplateExpander};
    use crate::model::template::WeeklyTemplate;
    use crate::schedule::parity::{is_even_week, ParityRule};
    use chrono::{Datelike, NaiveDate, Weekday};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn template(day: Weekday, number: u8, even: bool, group: Uuid) -> WeeklyTemplate {
        WeeklyTemplate::new(
            day,
            number,
            even,
            group,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn single_even_monday_template_yields_one_lesson_then_none() {
        let monday = date(2025, 11, 17);
        assert!(is_even_week(monday));
        let templates = vec![template(Weekday::Mon, 1, true, Uuid::new_v4())];

        let first = expand(&templates, monday, date(2025, 11, 23), &[]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].date, monday);
        assert_eq!(first[0].lesson_number, 1);
        assert_eq!(first[0].teacher_id, templates[0].teacher_id);

        let second = expand(&templates, monday, date(2025, 11, 23), &first);
        assert!(second.is_empty());
    }

    #[test]
    fn odd_week_template_is_skipped_in_even_week() {
        let templates = vec![template(Weekday::Mon, 1, false, Uuid::new_v4())];
        let generated = expand(&templates, date(2025, 11, 17), date(2025, 11, 23), &[]);
        assert!(generated.is_empty());

        let generated = expand(&templates, date(2025, 11, 10), date(2025, 11, 16), &[]);
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].date, date(2025, 11, 10));
    }

    #[test]
    fn reversed_range_is_empty() {
        let templates = vec![template(Weekday::Mon, 1, true, Uuid::new_v4())];
        assert!(expand(&templates, date(2025, 11, 23), date(2025, 11, 17), &[]).is_empty());
    }

    #[test]
    fn sunday_templates_use_index_six() {
        let templates = vec![
            template(Weekday::Sun, 3, true, Uuid::new_v4()),
            template(Weekday::Sun, 3, false, Uuid::new_v4()),
        ];
        let generated = expand(&templates, date(2025, 11, 10), date(2025, 11, 23), &[]);
        assert_eq!(generated.len(), 2);
        assert!(generated.iter().all(|lesson| lesson.date.weekday() == Weekday::Sun));
    }

    #[test]
    fn colliding_templates_keep_first() {
        let group = Uuid::new_v4();
        let templates = vec![
            template(Weekday::Tue, 2, true, group),
            template(Weekday::Tue, 2, true, group),
        ];
        let generated = expand(&templates, date(2025, 11, 17), date(2025, 11, 23), &[]);
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].subject_id, templates[0].subject_id);
    }

    #[test]
    fn iso_rule_changes_selection_at_year_start() {
        // Week 0 (even) under FirstMonday, ISO week 1 (odd) under IsoWeek.
        let templates = vec![template(Weekday::Fri, 1, true, Uuid::new_v4())];
        let first_monday = expand(&templates, date(2026, 1, 1), date(2026, 1, 4), &[]);
        let iso = TemplateExpander::new(ParityRule::IsoWeek).expand(
            &templates,
            date(2026, 1, 1),
            date(2026, 1, 4),
            &[],
        );
        assert_eq!(first_monday.len(), 1);
        assert!(iso.is_empty());
    }

    proptest! {
        #[test]
        fn second_expansion_is_empty(
            start_ordinal in 1u32..300,
            span in 0i64..60,
            days in proptest::collection::vec((0u8..7, 1u8..=8, any::<bool>()), 1..12),
        ) {
            let groups = [Uuid::new_v4(), Uuid::new_v4()];
            let templates: Vec<_> = days
                .iter()
                .enumerate()
                .map(|(index, (day, number, even))| {
                    template(
                        crate::model::template::weekday_from_index(*day).unwrap(),
                        *number,
                        *even,
                        groups[index % 2],
                    )
                })
                .collect();
            let start = NaiveDate::from_yo_opt(2025, start_ordinal).unwrap();
            let end = start + chrono::Duration::days(span);

            let first = expand(&templates, start, end, &[]);
            let mut seen = std::collections::HashSet::new();
            for lesson in &first {
                prop_assert!(seen.insert(lesson.identity()));
            }
            let second = expand(&templates, start, end, &first);
            prop_assert!(second.is_empty());
        }
    }
}
