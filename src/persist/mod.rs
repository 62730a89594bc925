pub mod sqlite;

use crate::{
    record::{
        ClassroomInfo, ClassroomRecord, LessonDraft, LessonFields, ModuleDraft, ModuleFields,
        Placement, ResourceDraft, StoredClassroom,
    },
    types::RowId,
};

/// Failure reported by a [`ContentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The SQLite driver rejected a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

/// Result alias for store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Row-level access to the relational store.
///
/// Every statement commits on its own; no transaction spans a whole
/// synchronization. Update methods report whether a row matched, delete
/// methods whether a row was removed.
pub trait ContentStore: Send {
    /// Point lookup of a classroom row.
    fn classroom(&self, id: RowId) -> StoreResult<Option<ClassroomRecord>>;
    /// Rewrites name, description, kind and pricing.
    fn update_classroom_info(&mut self, id: RowId, info: &ClassroomInfo) -> StoreResult<bool>;
    /// Sets the draft flag.
    fn set_classroom_draft(&mut self, id: RowId, draft: bool) -> StoreResult<bool>;
    /// Stores a durable cover URL.
    fn set_classroom_cover(&mut self, id: RowId, url: &str) -> StoreResult<bool>;

    /// Inserts a module and returns its row id.
    fn insert_module(&mut self, draft: &ModuleDraft) -> StoreResult<RowId>;
    /// `placement.parent` is the owning classroom; rows of other classrooms
    /// never match.
    fn update_module(
        &mut self,
        id: RowId,
        placement: Placement,
        fields: &ModuleFields,
    ) -> StoreResult<bool>;
    /// Rewrites the position only, scoped like [`ContentStore::update_module`].
    fn update_module_position(&mut self, id: RowId, placement: Placement) -> StoreResult<bool>;
    /// Parent is the owning classroom.
    fn module_placement(&self, id: RowId) -> StoreResult<Option<Placement>>;
    /// Removes a module and, by cascade, its lessons and resources.
    fn delete_module(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool>;

    /// Inserts a lesson and returns its row id.
    fn insert_lesson(&mut self, draft: &LessonDraft) -> StoreResult<RowId>;
    /// Rewrites a lesson of `classroom_id`, possibly under another module.
    fn update_lesson(
        &mut self,
        classroom_id: RowId,
        id: RowId,
        placement: Placement,
        fields: &LessonFields,
    ) -> StoreResult<bool>;
    /// Rewrites parent module and position only.
    fn move_lesson(&mut self, classroom_id: RowId, id: RowId, placement: Placement)
    -> StoreResult<bool>;
    /// Parent is the owning module.
    fn lesson_placement(&self, id: RowId) -> StoreResult<Option<Placement>>;
    /// Removes a lesson and its resources.
    fn delete_lesson(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool>;

    /// Inserts a resource and returns its row id.
    fn insert_resource(&mut self, draft: &ResourceDraft) -> StoreResult<RowId>;
    /// Rewrites the position of a resource of `classroom_id`. The owning
    /// lesson never changes.
    fn update_resource_position(
        &mut self,
        classroom_id: RowId,
        id: RowId,
        position: i64,
    ) -> StoreResult<bool>;
    /// Parent is the owning lesson.
    fn resource_placement(&self, id: RowId) -> StoreResult<Option<Placement>>;
    /// Removes a resource row. The uploaded object is left in place.
    fn delete_resource(&mut self, classroom_id: RowId, id: RowId) -> StoreResult<bool>;

    /// Loads the whole persisted tree, children ordered by position.
    fn load_classroom(&self, id: RowId) -> StoreResult<Option<StoredClassroom>>;
}
