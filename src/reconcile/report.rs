//! What a synchronization changed.

use hashbrown::HashMap;
use serde::Serialize;

use crate::{
    op::Operation,
    record::Entity,
    types::{RowId, TempToken},
};

/// Per-entity operation tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OpCounts {
    /// Rows written for temporary ids.
    pub inserted: usize,
    /// Full rewrites.
    pub updated: usize,
    /// Parent or position rewrites only.
    pub reordered: usize,
    /// Rows removed, including rows that were already gone.
    pub deleted: usize,
    /// Nodes left untouched.
    pub skipped: usize,
}

impl OpCounts {
    pub(crate) fn record(&mut self, op: Operation) {
        match op {
            Operation::Insert => self.inserted += 1,
            Operation::Update => self.updated += 1,
            Operation::UpdateOrder => self.reordered += 1,
            Operation::Delete => self.deleted += 1,
            Operation::Skip => self.skipped += 1,
        }
    }

    /// Number of store mutations, not counting skips.
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.reordered + self.deleted
    }
}

/// A delete that failed and was skipped over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    /// Table of the row.
    pub entity: Entity,
    /// Row still present.
    pub id: RowId,
    /// Rendered store error.
    pub message: String,
}

/// Durable location written for a resource file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    /// Public URL now stored on the row.
    pub url: String,
    /// Decoded byte length.
    pub size: i64,
    /// Extension derived from the MIME type.
    pub extension: Option<String>,
}

/// Outcome of a successful synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Classroom that was synchronized.
    pub classroom_id: RowId,
    /// Row ids assigned to the temporary ids of inserted nodes.
    pub id_map: HashMap<TempToken, RowId>,
    /// Info or draft columns were rewritten.
    pub classroom_updated: bool,
    /// Cover URL written in this pass.
    pub cover_url: Option<String>,
    /// Module tallies.
    pub modules: OpCounts,
    /// Lesson tallies.
    pub lessons: OpCounts,
    /// Resource tallies.
    pub resources: OpCounts,
    /// Materialized resource files keyed by resource row id.
    pub resource_assets: HashMap<RowId, StoredAsset>,
    /// Deletes that failed without aborting the pass.
    pub delete_failures: Vec<DeleteFailure>,
}

impl SyncReport {
    /// Empty report for `classroom_id`.
    pub fn new(classroom_id: RowId) -> Self {
        Self {
            classroom_id,
            ..Self::default()
        }
    }

    /// Tallies for a tree level; the classroom row has none.
    pub fn counts(&self, entity: Entity) -> Option<&OpCounts> {
        match entity {
            Entity::Module => Some(&self.modules),
            Entity::Lesson => Some(&self.lessons),
            Entity::Resource => Some(&self.resources),
            Entity::Classroom => None,
        }
    }

    /// True when the delete of `id` failed during this synchronization.
    pub fn delete_failed(&self, entity: Entity, id: RowId) -> bool {
        self.delete_failures
            .iter()
            .any(|f| f.entity == entity && f.id == id)
    }

    /// True when nothing at all was written.
    pub fn is_noop(&self) -> bool {
        !self.classroom_updated
            && self.cover_url.is_none()
            && self.modules.writes() == 0
            && self.lessons.writes() == 0
            && self.resources.writes() == 0
            && self.delete_failures.is_empty()
    }
}
