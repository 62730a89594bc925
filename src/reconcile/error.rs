//! Fatal and non-fatal synchronization errors.

use crate::{
    assets::{ObjectStoreError, materialize::MaterializeError},
    core::resolver::Unresolved,
    persist::StoreError,
    record::Entity,
    types::{NodeId, RowId},
};

/// Failure of one synchronization.
///
/// Everything except [`ReconcileError::StoreDeleteFailed`] aborts the call;
/// delete failures are collected in the report instead.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A referenced row does not exist in this classroom, or an update
    /// matched nothing.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Table of the missing row.
        entity: Entity,
        /// Row id that was looked up.
        id: RowId,
    },
    /// A parent id was consulted before it was bound.
    #[error("unresolved reference to node {id}")]
    UnresolvedReference {
        /// The dangling client id.
        id: NodeId,
    },
    /// The snapshot failed validation; nothing was written.
    #[error("invalid tree: {0}")]
    InvalidTree(String),
    /// An inline payload could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// An inline payload could not be uploaded.
    #[error("asset upload to {path} failed: {source}")]
    AssetUploadFailed {
        /// Destination in the object store.
        path: String,
        /// Backend error.
        #[source]
        source: ObjectStoreError,
    },
    /// A placement or existence lookup failed.
    #[error("{entity} read failed: {source}")]
    StoreReadFailed {
        /// Table being read.
        entity: Entity,
        /// Backend error.
        #[source]
        source: StoreError,
    },
    /// An insert or update failed.
    #[error("{entity} write failed: {source}")]
    StoreWriteFailed {
        /// Table being written.
        entity: Entity,
        /// Backend error.
        #[source]
        source: StoreError,
    },
    /// Recorded in [`crate::reconcile::SyncReport::delete_failures`], never
    /// returned.
    #[error("{entity} {id} delete failed: {source}")]
    StoreDeleteFailed {
        /// Table of the row.
        entity: Entity,
        /// Row that could not be removed.
        id: RowId,
        /// Backend error.
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// Stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::UnresolvedReference { .. } => "UnresolvedReference",
            Self::InvalidTree(_) => "InvalidTree",
            Self::InvalidPayload(_) => "InvalidPayload",
            Self::AssetUploadFailed { .. } => "AssetUploadFailed",
            Self::StoreReadFailed { .. } => "StoreReadFailed",
            Self::StoreWriteFailed { .. } => "StoreWriteFailed",
            Self::StoreDeleteFailed { .. } => "StoreDeleteFailed",
        }
    }

    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidTree(_) | Self::InvalidPayload(_) => 422,
            Self::AssetUploadFailed { .. } => 502,
            Self::UnresolvedReference { .. }
            | Self::StoreReadFailed { .. }
            | Self::StoreWriteFailed { .. }
            | Self::StoreDeleteFailed { .. } => 500,
        }
    }

    pub(crate) fn read(entity: Entity) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreReadFailed { entity, source }
    }

    pub(crate) fn write(entity: Entity) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreWriteFailed { entity, source }
    }
}

impl From<Unresolved> for ReconcileError {
    fn from(value: Unresolved) -> Self {
        Self::UnresolvedReference { id: value.0 }
    }
}

impl From<MaterializeError> for ReconcileError {
    fn from(value: MaterializeError) -> Self {
        match value {
            MaterializeError::Decode(err) => Self::InvalidPayload(err.to_string()),
            MaterializeError::Upload { path, source } => Self::AssetUploadFailed { path, source },
        }
    }
}
