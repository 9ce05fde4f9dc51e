//! Schedule generation and weekly view use-cases.
//!
//! # Responsibility
//! - Expand stored weekly templates into persisted lessons for a date range.
//! - Assemble the seven-day view of stored lessons.
//!
//! # Invariants
//! - Generation never creates a second lesson for an occupied identity, even
//!   when another writer inserted it between the read and the batch write.
//! - Conflicts among lessons in the generated range are reported, never
//!   used to block persistence.

use crate::model::catalog::GroupId;
use crate::model::lesson::Lesson;
use crate::model::template::WeeklyTemplate;
use crate::repo::lesson_repo::{DateRange, LessonStore, RepoResult};
use crate::repo::template_repo::TemplateRepository;
use crate::schedule::conflict::{find_all_conflicts, ConflictPair};
use crate::schedule::expander::TemplateExpander;
use crate::schedule::parity::{week_start, ParityRule};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Outcome of [`ScheduleService::generate_week_schedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    /// Lessons written by this run.
    pub generated: usize,
    /// Template occurrences whose identity was already taken.
    pub skipped_existing: usize,
    /// Double bookings among all lessons of the range after the write.
    pub conflicts: Vec<ConflictPair>,
}

/// Lessons of one week keyed by date, then group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekSchedule {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub is_even_week: bool,
    /// Days without lessons are absent; lessons are ordered by number.
    pub days: BTreeMap<NaiveDate, BTreeMap<GroupId, Vec<Lesson>>>,
}

impl WeekSchedule {
    pub fn lesson_count(&self) -> usize {
        self.days
            .values()
            .flat_map(|groups| groups.values())
            .map(Vec::len)
            .sum()
    }
}

pub struct ScheduleService<T: TemplateRepository, S: LessonStore> {
    templates: T,
    store: S,
    expander: TemplateExpander,
}

impl<T: TemplateRepository, S: LessonStore> ScheduleService<T, S> {
    pub fn new(templates: T, store: S, rule: ParityRule) -> Self {
        Self {
            templates,
            store,
            expander: TemplateExpander::new(rule),
        }
    }

    pub fn parity_rule(&self) -> ParityRule {
        self.expander.rule()
    }

    pub fn is_even_week(&self, date: NaiveDate) -> bool {
        self.expander.rule().is_even_week(date)
    }

    /// Materializes templates for `start..=end` and persists the new lessons
    /// in one batch. An inverted range generates nothing.
    pub fn generate_week_schedule(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<GenerationReport> {
        let started_at = Instant::now();
        let range = DateRange::new(start, end);
        if range.is_empty() {
            return Ok(GenerationReport::default());
        }

        let templates = self.templates.list_templates()?;
        let existing = self.store.query(range, None)?;
        let proposed = self.expander.expand(&templates, start, end, &existing);
        let outcome = self.store.insert_batch(&proposed)?;

        let occurrences = self.template_occurrences(&templates, range);
        let lessons = self.store.query(range, None)?;
        let report = GenerationReport {
            generated: outcome.inserted,
            skipped_existing: occurrences.saturating_sub(outcome.inserted),
            conflicts: find_all_conflicts(&lessons),
        };

        info!(
            "event=schedule_generate module=service status=ok days={} templates={} generated={} skipped={} conflicts={} duration_ms={}",
            (end - start).num_days() + 1,
            templates.len(),
            report.generated,
            report.skipped_existing,
            report.conflicts.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Returns lessons from `start` through `start + 6`.
    pub fn get_week_schedule(&self, start: NaiveDate) -> RepoResult<WeekSchedule> {
        let range = DateRange::week_from(start);
        let mut days: BTreeMap<NaiveDate, BTreeMap<GroupId, Vec<Lesson>>> = BTreeMap::new();
        for lesson in self.store.query(range, None)? {
            days.entry(lesson.date)
                .or_default()
                .entry(lesson.group_id)
                .or_default()
                .push(lesson);
        }

        Ok(WeekSchedule {
            start: range.start,
            end: range.end,
            is_even_week: self.is_even_week(start),
            days,
        })
    }

    /// Week view for the week containing `date`.
    pub fn get_week_containing(&self, date: NaiveDate) -> RepoResult<WeekSchedule> {
        self.get_week_schedule(week_start(date))
    }

    /// Distinct identities the templates map onto in `range`.
    fn template_occurrences(
        &self,
        templates: &[WeeklyTemplate],
        range: DateRange,
    ) -> usize {
        let rule = self.expander.rule();
        range
            .start
            .iter_days()
            .take_while(|date| *date <= range.end)
            .map(|date| {
                let parity = rule.is_even_week(date);
                let mut slots: Vec<(GroupId, u8)> = templates
                    .iter()
                    .filter(|template| template.applies_to(date, parity))
                    .map(|template| (template.group_id, template.lesson_number))
                    .collect();
                slots.sort_unstable();
                slots.dedup();
                slots.len()
            })
            .sum()
    }
}
