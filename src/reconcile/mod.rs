//! One synchronization pass over a classroom tree.

pub mod error;
pub mod plan;
pub mod reconciler;
pub mod report;

pub use error::ReconcileError;
pub use reconciler::Reconciler;
pub use report::{DeleteFailure, OpCounts, StoredAsset, SyncReport};
