//! Runtime event stream payloads.

use crate::{
    reconcile::{DeleteFailure, SyncReport},
    types::RowId,
};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A synchronization completed.
    Synced {
        /// Synchronized classroom.
        classroom_id: RowId,
        /// Outcome returned to the caller.
        report: SyncReport,
    },
    /// A synchronization aborted. Writes issued before the failure remain.
    SyncFailed {
        /// Target classroom.
        classroom_id: RowId,
        /// Stable error kind.
        kind: &'static str,
        /// Rendered error.
        message: String,
    },
    /// A delete failed during an otherwise successful synchronization.
    DeleteFailed {
        /// Owning classroom.
        classroom_id: RowId,
        /// The skipped delete.
        failure: DeleteFailure,
    },
}
