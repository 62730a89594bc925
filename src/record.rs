//! Store-side rows, insert drafts, and editable field sets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// Entity tables touched by a synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    /// Classroom root row.
    Classroom,
    /// Module row.
    Module,
    /// Lesson row.
    Lesson,
    /// Resource row.
    Resource,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classroom => "classroom",
            Self::Module => "module",
            Self::Lesson => "lesson",
            Self::Resource => "resource",
        })
    }
}

/// Classroom visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassroomKind {
    /// Listed and joinable by anyone.
    #[default]
    Public,
    /// Invitation only.
    Private,
}

impl ClassroomKind {
    /// Column value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    /// Parses a column value, falling back to [`ClassroomKind::Public`].
    pub fn from_column(raw: &str) -> Self {
        match raw {
            "private" => Self::Private,
            _ => Self::Public,
        }
    }
}

/// Access price. Zero means free.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pricing {
    /// Price in minor currency units.
    pub amount_cents: i64,
    /// ISO currency code, absent for free classrooms.
    pub currency: Option<String>,
}

/// Scalar classroom fields rewritten together when the client marks them edited.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassroomInfo {
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: String,
    /// Visibility.
    #[serde(rename = "type")]
    pub kind: ClassroomKind,
    /// Price.
    pub pricing: Pricing,
}

/// Persisted classroom row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomRecord {
    /// Row id.
    pub id: RowId,
    /// Scalar fields.
    #[serde(flatten)]
    pub info: ClassroomInfo,
    /// Unpublished when true.
    pub draft: bool,
    /// Durable cover URL.
    pub cover_url: Option<String>,
}

/// Editable module fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFields {
    /// Module title.
    pub name: String,
    /// Module description.
    pub description: String,
}

/// Insert payload for a module row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDraft {
    /// Owning classroom.
    pub classroom_id: RowId,
    /// Dense sibling position.
    pub position: i64,
    /// Row fields.
    pub fields: ModuleFields,
}

/// Persisted module row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    /// Row id.
    pub id: RowId,
    /// Owning classroom.
    pub classroom_id: RowId,
    /// Sibling position.
    pub position: i64,
    /// Row fields.
    #[serde(flatten)]
    pub fields: ModuleFields,
}

/// Editable lesson fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonFields {
    /// Lesson title.
    pub name: String,
    /// Embedded video URL.
    pub video_url: Option<String>,
    /// Video provider tag.
    pub video_type: Option<String>,
    /// Rich text body.
    pub text_content: Option<String>,
}

/// Insert payload for a lesson row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonDraft {
    /// Parent module.
    pub module_id: RowId,
    /// Dense sibling position.
    pub position: i64,
    /// Row fields.
    pub fields: LessonFields,
}

/// Persisted lesson row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    /// Row id.
    pub id: RowId,
    /// Parent module.
    pub module_id: RowId,
    /// Sibling position.
    pub position: i64,
    /// Row fields.
    #[serde(flatten)]
    pub fields: LessonFields,
}

/// Resource flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// External hyperlink.
    Link,
    /// Uploaded file.
    File,
}

impl ResourceKind {
    /// Column value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::File => "file",
        }
    }

    /// Parses a column value, falling back to [`ResourceKind::Link`].
    pub fn from_column(raw: &str) -> Self {
        match raw {
            "file" => Self::File,
            _ => Self::Link,
        }
    }
}

/// Insert payload for a resource row. The URL is always durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDraft {
    /// Parent lesson.
    pub lesson_id: RowId,
    /// Dense sibling position.
    pub position: i64,
    /// Link or file.
    pub kind: ResourceKind,
    /// Durable URL.
    pub url: String,
    /// Label shown to students.
    pub display_name: String,
    /// File extension, for files.
    pub file_type: Option<String>,
    /// Size in bytes, for files.
    pub file_size: Option<i64>,
}

/// Persisted resource row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Row id.
    pub id: RowId,
    /// Parent lesson.
    pub lesson_id: RowId,
    /// Sibling position.
    pub position: i64,
    /// Link or file.
    pub kind: ResourceKind,
    /// Durable URL.
    pub url: String,
    /// Label shown to students.
    pub display_name: String,
    /// File extension.
    pub file_type: Option<String>,
    /// Size in bytes.
    pub file_size: Option<i64>,
}

/// Where a row currently sits: its parent key and sibling position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Parent row id.
    pub parent: RowId,
    /// Sibling position.
    pub position: i64,
}

/// A lesson with its resources, ordered by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLesson {
    /// Lesson row.
    #[serde(flatten)]
    pub record: LessonRecord,
    /// Child resources.
    pub resources: Vec<ResourceRecord>,
}

/// A module with its lessons, ordered by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredModule {
    /// Module row.
    #[serde(flatten)]
    pub record: ModuleRecord,
    /// Child lessons.
    pub lessons: Vec<StoredLesson>,
}

/// Full persisted tree for one classroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredClassroom {
    /// Classroom row.
    #[serde(flatten)]
    pub classroom: ClassroomRecord,
    /// Child modules.
    pub modules: Vec<StoredModule>,
}

impl StoredClassroom {
    /// Looks up a module by row id.
    pub fn module(&self, id: RowId) -> Option<&StoredModule> {
        self.modules.iter().find(|m| m.record.id == id)
    }

    /// Looks up a lesson by row id anywhere in the tree.
    pub fn lesson(&self, id: RowId) -> Option<&StoredLesson> {
        self.modules
            .iter()
            .flat_map(|m| m.lessons.iter())
            .find(|l| l.record.id == id)
    }

    /// Iterates every resource row in the tree.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.modules
            .iter()
            .flat_map(|m| m.lessons.iter())
            .flat_map(|l| l.resources.iter())
    }
}
