//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contracts the engine and services depend on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository writes validate records before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateIdentity`)
//!   in addition to DB transport errors.

pub mod catalog_repo;
pub mod lesson_repo;
pub mod template_repo;
