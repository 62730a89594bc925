//! Client-edited classroom tree as it arrives on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    record::{ClassroomInfo, Entity, LessonFields, ModuleFields, ResourceKind},
    reconcile::{plan::dense_ranks, report::SyncReport},
    types::{NodeId, RowId, deserialize_row_id},
};

/// Raw wire mutation flags. Only used to build a [`Mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationFlags {
    /// Created client-side. Implied by a temporary id.
    pub created: bool,
    /// Fields edited.
    pub edited: bool,
    /// Marked for deletion.
    pub deleted: bool,
    /// Position changed among siblings.
    pub reordered: bool,
    /// Parent changed.
    pub moved: bool,
}

/// Closed set of meaningful mutation states for one node.
///
/// Built from [`MutationFlags`] with priority `deleted > edited > moved >
/// reordered`. `Edited` rewrites every column including parent and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "MutationFlags", into = "MutationFlags")]
pub enum Mutation {
    /// No client-side change.
    #[default]
    Clean,
    /// Sibling order changed.
    Reordered,
    /// Parent changed, position possibly too.
    Moved,
    /// Content fields changed.
    Edited,
    /// Removed by the client.
    Deleted,
}

impl Mutation {
    /// True for [`Mutation::Deleted`].
    pub fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl From<MutationFlags> for Mutation {
    fn from(flags: MutationFlags) -> Self {
        if flags.deleted {
            Self::Deleted
        } else if flags.edited {
            Self::Edited
        } else if flags.moved {
            Self::Moved
        } else if flags.reordered {
            Self::Reordered
        } else {
            Self::Clean
        }
    }
}

impl From<Mutation> for MutationFlags {
    fn from(value: Mutation) -> Self {
        let mut flags = Self::default();
        match value {
            Mutation::Clean => {}
            Mutation::Reordered => flags.reordered = true,
            Mutation::Moved => flags.moved = true,
            Mutation::Edited => flags.edited = true,
            Mutation::Deleted => flags.deleted = true,
        }
        flags
    }
}

/// Returned when a `data:` URL is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid inline asset: {0}")]
pub struct InvalidDataUrl(String);

/// Binary payload carried inline as a base64 `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAsset {
    /// Lower-cased MIME type.
    pub mime: String,
    /// Base64 body, not yet decoded.
    pub data: String,
}

impl InlineAsset {
    /// Parses `data:<mime>[;param]*;base64,<payload>`.
    pub fn parse(raw: &str) -> Result<Self, InvalidDataUrl> {
        let rest = raw
            .get(..5)
            .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
            .map(|_| &raw[5..])
            .ok_or_else(|| InvalidDataUrl("missing data: scheme".to_string()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| InvalidDataUrl("missing payload separator".to_string()))?;
        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(InvalidDataUrl("only base64 payloads are supported".to_string()));
        }
        let mime = if mime.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime
        };
        Ok(Self {
            mime,
            data: data.to_string(),
        })
    }

    /// Re-encodes as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

/// A URL-valued field that is either durable or still inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetRef {
    /// Durable URL already in the object store or elsewhere.
    Url(String),
    /// Inline payload awaiting materialization.
    Inline(InlineAsset),
}

impl AssetRef {
    /// The inline payload, when present.
    pub fn inline(&self) -> Option<&InlineAsset> {
        match self {
            Self::Inline(asset) => Some(asset),
            Self::Url(_) => None,
        }
    }
}

impl TryFrom<String> for AssetRef {
    type Error = InvalidDataUrl;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:")) {
            InlineAsset::parse(&value).map(Self::Inline)
        } else {
            Ok(Self::Url(value))
        }
    }
}

impl From<AssetRef> for String {
    fn from(value: AssetRef) -> Self {
        match value {
            AssetRef::Url(url) => url,
            AssetRef::Inline(asset) => asset.to_data_url(),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Inline(asset) => write!(f, "data:{};base64,…", asset.mime),
        }
    }
}

/// Fields shared by every tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHeader {
    /// Temporary or persistent id.
    pub id: NodeId,
    /// Declared parent. Absent means the enclosing node in the tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Declared zero-based sibling order.
    #[serde(default)]
    pub position: i64,
    /// Client-side change state.
    #[serde(default)]
    pub mutation: Mutation,
}

impl NodeHeader {
    /// Header for an unchanged node.
    pub fn new(id: NodeId, position: i64) -> Self {
        Self {
            id,
            parent_id: None,
            position,
            mutation: Mutation::Clean,
        }
    }
}

/// Module node with its lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNode {
    /// Identity, placement, mutation.
    #[serde(flatten)]
    pub header: NodeHeader,
    /// Module title.
    pub name: String,
    /// Module description.
    #[serde(default)]
    pub description: String,
    /// Lessons listed under this module.
    #[serde(default)]
    pub lessons: Vec<LessonNode>,
}

impl ModuleNode {
    /// Editable columns.
    pub fn fields(&self) -> ModuleFields {
        ModuleFields {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Lesson node with its resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonNode {
    /// Identity, placement, mutation.
    #[serde(flatten)]
    pub header: NodeHeader,
    /// Lesson title.
    pub name: String,
    /// Embedded video URL.
    #[serde(default)]
    pub video_url: Option<String>,
    /// Video provider tag.
    #[serde(default)]
    pub video_type: Option<String>,
    /// Rich text body.
    #[serde(default)]
    pub text_content: Option<String>,
    /// Resources listed under this lesson.
    #[serde(default)]
    pub resources: Vec<ResourceNode>,
}

impl LessonNode {
    /// Editable columns.
    pub fn fields(&self) -> LessonFields {
        LessonFields {
            name: self.name.clone(),
            video_url: self.video_url.clone(),
            video_type: self.video_type.clone(),
            text_content: self.text_content.clone(),
        }
    }
}

/// Resource node. Once persisted, only its position is ever rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    /// Identity, placement, mutation.
    #[serde(flatten)]
    pub header: NodeHeader,
    /// Link or file.
    pub kind: ResourceKind,
    /// Durable URL or inline file payload.
    pub url: AssetRef,
    /// Label shown to students.
    #[serde(default)]
    pub display_name: String,
    /// Client-supplied file extension.
    #[serde(default)]
    pub file_type: Option<String>,
    /// Client-supplied size in bytes.
    #[serde(default)]
    pub file_size: Option<i64>,
}

/// Root of one synchronization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomTree {
    /// Persisted classroom id.
    #[serde(deserialize_with = "deserialize_row_id")]
    pub id: RowId,
    /// Scalar fields, applied only when `info_edited`.
    #[serde(flatten)]
    pub info: ClassroomInfo,
    /// Gates the scalar field rewrite.
    #[serde(default)]
    pub info_edited: bool,
    /// Publish state, applied whenever present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<bool>,
    /// Cover image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<AssetRef>,
    /// Ordered modules.
    #[serde(default)]
    pub modules: Vec<ModuleNode>,
}

impl ClassroomTree {
    /// Empty tree for an existing classroom.
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            info: ClassroomInfo::default(),
            info_edited: false,
            draft: None,
            cover: None,
            modules: Vec::new(),
        }
    }

    /// Applies a successful synchronization to this snapshot.
    ///
    /// Temporary ids become the ids assigned by the store, deleted nodes
    /// leave the tree (unless their delete failed, in which case they stay
    /// flagged for the next attempt), inline assets become durable URLs and
    /// every surviving node becomes [`Mutation::Clean`] at its dense
    /// position. Synchronizing the result again issues no writes.
    pub fn promote(&mut self, report: &SyncReport) {
        let promote_id = |id: &NodeId| match id {
            NodeId::Temp(token) => report
                .id_map
                .get(token)
                .map(|row| NodeId::Persistent(*row))
                .unwrap_or_else(|| id.clone()),
            NodeId::Persistent(_) => id.clone(),
        };
        let keep = |entity: Entity, header: &NodeHeader| match (&header.id, header.mutation) {
            (NodeId::Persistent(row), Mutation::Deleted) => report.delete_failed(entity, *row),
            (NodeId::Temp(_), Mutation::Deleted) => false,
            _ => true,
        };

        self.info_edited = false;
        self.draft = None;
        if let Some(url) = &report.cover_url {
            self.cover = Some(AssetRef::Url(url.clone()));
        }

        // Lessons are regrouped under their effective parent first.
        let mut lessons: Vec<(NodeId, LessonNode)> = Vec::new();
        for module in &mut self.modules {
            for lesson in module.lessons.drain(..) {
                let parent = lesson
                    .header
                    .parent_id
                    .clone()
                    .unwrap_or_else(|| module.header.id.clone());
                lessons.push((promote_id(&parent), lesson));
            }
        }

        self.modules.retain(|m| keep(Entity::Module, &m.header));
        for module in &mut self.modules {
            module.header.id = promote_id(&module.header.id);
            module.header.parent_id = None;
        }
        promote_siblings(self.modules.iter_mut().map(|m| &mut m.header));

        for (parent, mut lesson) in lessons {
            if !keep(Entity::Lesson, &lesson.header) {
                continue;
            }
            let Some(module) = self.modules.iter_mut().find(|m| m.header.id == parent) else {
                continue;
            };
            lesson.header.id = promote_id(&lesson.header.id);
            lesson.header.parent_id = Some(parent);
            let lesson_id = lesson.header.id.clone();
            lesson.resources.retain(|r| keep(Entity::Resource, &r.header));
            for resource in &mut lesson.resources {
                resource.header.id = promote_id(&resource.header.id);
                resource.header.parent_id = Some(lesson_id.clone());
                if let Some(asset) = resource
                    .header
                    .id
                    .persistent()
                    .and_then(|row| report.resource_assets.get(&row))
                {
                    resource.url = AssetRef::Url(asset.url.clone());
                    resource.file_size = Some(asset.size);
                    resource.file_type = asset.extension.clone().or(resource.file_type.take());
                }
            }
            promote_siblings(lesson.resources.iter_mut().map(|r| &mut r.header));
            module.lessons.push(lesson);
        }
        for module in &mut self.modules {
            promote_siblings(module.lessons.iter_mut().map(|l| &mut l.header));
        }
    }
}

fn promote_siblings<'a>(headers: impl Iterator<Item = &'a mut NodeHeader>) {
    let mut headers: Vec<&mut NodeHeader> = headers.collect();
    let live: Vec<(usize, i64)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.mutation.is_deleted())
        .map(|(idx, h)| (idx, h.position))
        .collect();
    for (idx, rank) in dense_ranks(&live) {
        headers[idx].position = rank;
        headers[idx].mutation = Mutation::Clean;
    }
}
