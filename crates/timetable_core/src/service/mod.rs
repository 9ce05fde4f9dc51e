//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into generation, editing, import and
//!   export use-cases.
//! - Keep the CLI decoupled from storage details.

pub mod export_service;
pub mod import_service;
pub mod lesson_service;
pub mod schedule_service;
