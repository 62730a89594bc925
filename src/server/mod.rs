//! HTTP surface: one sync endpoint plus read-back and liveness.

use std::path::PathBuf;

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::debug;

use crate::{
    node::ClassroomTree,
    reconcile::SyncReport,
    runtime::handle::{RuntimeError, SyncHandle},
    types::{NodeId, RowId},
};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Writer task every request goes through.
    pub handle: SyncHandle,
}

/// Successful sync response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Always 200.
    pub status_code: u16,
    /// What the synchronization changed.
    pub report: SyncReport,
}

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: &'static str,
    message: String,
    status_code: u16,
}

/// Handler failure, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", message)
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "InvalidPayload",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: self.message,
            status_code: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// Create API routes. `asset_root` is served under `/assets` when given.
pub fn router(state: ApiState, asset_root: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/classrooms/{classroom_id}", get(get_classroom))
        .route("/classrooms/{classroom_id}/sync", post(sync_classroom))
        .with_state(state);
    if let Some(root) = asset_root {
        app = app.nest_service("/assets", ServeDir::new(root));
    }
    app.layer(TraceLayer::new_for_http())
}

fn classroom_id(raw: &str) -> Result<RowId, ApiError> {
    NodeId::parse(raw)
        .ok()
        .and_then(|id| id.persistent())
        .ok_or_else(|| ApiError::not_found(format!("classroom {raw} not found")))
}

/// POST /classrooms/{classroom_id}/sync - Reconcile a client tree
async fn sync_classroom(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
    body: Result<Json<ClassroomTree>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let id = classroom_id(&raw_id)?;
    let Json(tree) = body?;
    if tree.id != id {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "InvalidPayload",
            format!("body classroom {} does not match path classroom {id}", tree.id),
        ));
    }

    debug!(classroom_id = id, modules = tree.modules.len(), "sync request");
    let report = state.handle.sync(tree).await?;
    Ok(Json(SyncResponse {
        status_code: StatusCode::OK.as_u16(),
        report,
    }))
}

/// GET /classrooms/{classroom_id} - Current stored tree
async fn get_classroom(
    State(state): State<ApiState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = classroom_id(&raw_id)?;
    match state.handle.load(id).await? {
        Some(classroom) => Ok(Json(classroom).into_response()),
        None => Err(ApiError::not_found(format!("classroom {id} not found"))),
    }
}
