//! Week parity (odd/even week) arithmetic.
//!
//! # Responsibility
//! - Number weeks from the year's Monday anchor and derive parity.
//! - Provide the Monday-of-week helper used to pick display weeks.
//!
//! # Invariants
//! - Results depend on the date (and selected rule) only.
//! - Under `FirstMonday`, parity strictly alternates between consecutive
//!   weeks inside one calendar year, including the partial week before the
//!   anchor, which is week 0.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Week numbering rule used to derive parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityRule {
    /// Weeks counted from the year's Monday anchor (see [`first_monday`]).
    #[default]
    FirstMonday,
    /// ISO-8601 week number.
    IsoWeek,
}

impl ParityRule {
    /// Returns the week number of `date` under this rule.
    pub fn week_number(self, date: NaiveDate) -> i64 {
        match self {
            Self::FirstMonday => first_monday_week_number(date),
            Self::IsoWeek => i64::from(date.iso_week().week()),
        }
    }

    pub fn is_even_week(self, date: NaiveDate) -> bool {
        self.week_number(date).rem_euclid(2) == 0
    }
}

/// Returns whether `date` falls in an even week under the default rule.
pub fn is_even_week(date: NaiveDate) -> bool {
    ParityRule::FirstMonday.is_even_week(date)
}

/// Returns the Monday anchor for `year`'s week numbering.
///
/// Jan 1 on a Sunday anchors on Jan 2; otherwise the anchor is
/// `Jan 1 + (8 - iso_weekday(Jan 1))`, so a year starting on Monday anchors
/// on Jan 8 and Jan 1..=7 form week 0.
pub fn first_monday(date: NaiveDate) -> NaiveDate {
    let jan1 = date - Duration::days(i64::from(date.ordinal0()));
    let weekday = i64::from(jan1.weekday().number_from_monday());
    let offset = if weekday == 7 { 1 } else { 8 - weekday };
    jan1 + Duration::days(offset)
}

/// Week number counted from [`first_monday`], starting at 1.
///
/// Days before the anchor floor into week 0.
pub fn first_monday_week_number(date: NaiveDate) -> i64 {
    let days = date.signed_duration_since(first_monday(date)).num_days();
    days.div_euclid(7) + 1
}

/// Returns the Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
