//! Pure recurring-schedule engine.
//!
//! # Responsibility
//! - Map calendar dates to week parity.
//! - Expand weekly templates into dated lessons for a date range.
//! - Detect teacher/classroom double-booking.
//!
//! # Invariants
//! - Nothing in this module reads the clock or touches storage; callers pass
//!   dates and lesson snapshots explicitly.

pub mod conflict;
pub mod expander;
pub mod parity;
