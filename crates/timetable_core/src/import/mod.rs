//! Reconciliation of externally supplied schedule data.
//!
//! # Responsibility
//! - Read delimited text and spreadsheet sources into raw rows.
//! - Parse rows per record kind, resolve natural keys through the catalog,
//!   reject duplicates, and stage accepted records for batched commits.
//!
//! # Invariants
//! - Per-row failures are data in the report; reconciliation never returns
//!   `Err` to the caller.
//! - For a completed run, `accepted + rejected` equals the number of
//!   non-blank input rows.

pub mod reconciler;
pub mod record;
pub mod report;
pub mod row;
pub mod source;
