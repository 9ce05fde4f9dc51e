//! Timetable domain model.
//!
//! # Responsibility
//! - Define the records shared by generation, reconciliation and manual edits.
//! - Own record-level validation so repositories can enforce it on write.
//!
//! # Invariants
//! - Every record is identified by a stable UUID surrogate id.
//! - A dated lesson is unique by `(date, group_id, lesson_number)`.

pub mod catalog;
pub mod lesson;
pub mod template;
