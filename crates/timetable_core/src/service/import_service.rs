//! Import use-case service.
//!
//! Owns the catalog and lesson store handles and runs one reconciliation per
//! call. Import never fails outward; see [`ImportReport`].

use crate::import::reconciler::{CancellationToken, ReconcileOptions, ScheduleReconciler};
use crate::import::record::RecordKind;
use crate::import::report::ImportReport;
use crate::import::row::SourceRow;
use crate::repo::catalog_repo::{Catalog, CatalogWriter};
use crate::repo::lesson_repo::LessonStore;
use std::path::Path;

pub struct ImportService<C, S> {
    catalog: C,
    store: S,
    options: ReconcileOptions,
}

impl<C, S> ImportService<C, S>
where
    C: Catalog + CatalogWriter,
    S: LessonStore,
{
    pub fn new(catalog: C, store: S, options: ReconcileOptions) -> Self {
        Self {
            catalog,
            store,
            options,
        }
    }

    /// Imports `path` as `kind`; `.xlsx` files are read as workbooks.
    pub fn import_file(
        &self,
        path: &Path,
        kind: RecordKind,
        cancel: Option<CancellationToken>,
    ) -> ImportReport {
        self.reconciler(cancel).reconcile_path(kind, path)
    }

    /// Imports rows that were already read by the caller.
    pub fn import_rows(
        &self,
        kind: RecordKind,
        rows: &[SourceRow],
        cancel: Option<CancellationToken>,
    ) -> ImportReport {
        self.reconciler(cancel).reconcile(kind, rows)
    }

    fn reconciler(&self, cancel: Option<CancellationToken>) -> ScheduleReconciler<'_, C, S> {
        let reconciler = ScheduleReconciler::new(&self.catalog, &self.store, self.options);
        match cancel {
            Some(token) => reconciler.with_cancellation(token),
            None => reconciler,
        }
    }
}
