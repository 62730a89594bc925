//! Turns inline `data:` payloads into durable objects.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{node::InlineAsset, types::RowId};

use super::{ObjectStore, ObjectStoreError, UpsertPolicy};

const MAX_NAME_LEN: usize = 80;

/// Durable location and metadata of a materialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialized {
    /// Object path inside the store.
    pub path: String,
    /// Public URL.
    pub url: String,
    /// Decoded byte length.
    pub size: i64,
    /// File extension derived from the MIME type.
    pub extension: Option<String>,
    /// MIME type sent with the upload.
    pub content_type: String,
}

/// Why an inline payload could not be stored.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    /// The payload is not base64.
    #[error("inline payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The object store refused the bytes.
    #[error("upload to {path} failed: {source}")]
    Upload {
        /// Destination that was attempted.
        path: String,
        /// Backend error.
        #[source]
        source: ObjectStoreError,
    },
}

/// Deterministic cover path; re-uploading replaces the previous cover.
pub fn cover_path(classroom_id: RowId, asset: &InlineAsset) -> String {
    match extension_for(&asset.mime) {
        Some(ext) => format!("classrooms/{classroom_id}/cover.{ext}"),
        None => format!("classrooms/{classroom_id}/cover"),
    }
}

/// Fresh path for a resource file; never collides with a sibling file.
pub fn resource_path(lesson_id: RowId, display_name: &str, asset: &InlineAsset) -> String {
    let mut name = sanitize_name(display_name);
    if let Some(ext) = extension_for(&asset.mime) {
        if !name.to_ascii_lowercase().ends_with(&format!(".{ext}")) {
            name = format!("{name}.{ext}");
        }
    }
    format!("lessons/{lesson_id}/{}-{name}", Uuid::new_v4().simple())
}

/// Decodes `asset`, uploads it to `path`, and returns its durable URL.
pub fn materialize(
    objects: &mut dyn ObjectStore,
    asset: &InlineAsset,
    path: &str,
    policy: UpsertPolicy,
) -> Result<Materialized, MaterializeError> {
    let bytes = STANDARD.decode(asset.data.trim())?;
    objects
        .upload(path, &bytes, &asset.mime, policy)
        .map_err(|source| MaterializeError::Upload {
            path: path.to_string(),
            source,
        })?;
    let url = objects.public_url(path);
    debug!(path, size = bytes.len(), mime = %asset.mime, "materialized inline asset");
    Ok(Materialized {
        path: path.to_string(),
        url,
        size: bytes.len() as i64,
        extension: extension_for(&asset.mime),
        content_type: asset.mime.clone(),
    })
}

/// Maps a MIME type to a file extension.
pub fn extension_for(mime: &str) -> Option<String> {
    let known = match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/csv" => "csv",
        "video/mp4" => "mp4",
        "audio/mpeg" => "mp3",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/octet-stream" => return None,
        other => {
            let subtype = other.split_once('/')?.1;
            let subtype: String = subtype
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            return (!subtype.is_empty()).then_some(subtype);
        }
    };
    Some(known.to_string())
}

/// Reduces a display name to a safe single path segment.
pub fn sanitize_name(display_name: &str) -> String {
    let mut out = String::with_capacity(display_name.len());
    for c in display_name.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let out: String = out
        .trim_matches(|c| c == '-' || c == '.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    if out.is_empty() {
        "file".to_string()
    } else {
        out
    }
}
