//! REST API handlers.
//!
//! Handlers translate HTTP into calls on [`MirrorServices`] and shape the
//! JSON the frontend reads.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::IntoResponse;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use appmirror_session::MirrorError;

use crate::ApiState;
use crate::error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

// ── Devices ────────────────────────────────────────────────────

/// Launch request body.
#[derive(Debug, Default, Deserialize)]
pub struct LaunchRequest {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub platform: Option<String>,
}

/// POST /api/v1/devices/launch
pub async fn launch_device(
    State(state): State<ApiState>,
    body: Result<Json<LaunchRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let launched = state
        .services
        .sessions
        .launch(&req.device_name, &req.os_version, req.platform.as_deref())
        .await?;

    Ok(Json(json!({
        "session_id": launched.session.id,
        "status": launched.session.status,
        "device_info": launched.session.device,
        "created_at": launched.session.created_at,
        "upload_options": launched.upload_options,
        "message": launched.message,
    })))
}

/// GET /api/v1/devices/status/:session_id
pub async fn device_status(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.sessions.session(&session_id)?))
}

// ── Builds ─────────────────────────────────────────────────────

/// POST /api/v1/builds/upload
///
/// Multipart fields: `build` (the artifact, sent as a file), `session_id`,
/// and an optional `platform` hint.
pub async fn upload_build(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|e| ApiError::new(e.status(), e.body_text()))?;
    let mut file: Option<(String, Bytes)> = None;
    let mut session_id = String::new();
    let mut platform_hint: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "build" => {
                // A plain form value is not a file.
                let Some(filename) = field.file_name().map(str::to_string) else {
                    debug!("build field without a filename");
                    continue;
                };
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, data));
            }
            "session_id" | "platform" => {
                let value = field.text().await.map_err(multipart_error)?;
                if name == "session_id" {
                    session_id = value;
                } else {
                    platform_hint = Some(value);
                }
            }
            other => debug!(field = %other, "ignoring multipart field"),
        }
    }

    let (filename, data) = file.ok_or(MirrorError::MissingFile)?;
    let build = state
        .services
        .builds
        .upload(&session_id, platform_hint.as_deref(), &filename, data)
        .await?;

    Ok(Json(json!({
        "build_id": build.id,
        "message": "Build uploaded successfully. Ready to install on device.",
        "status": "uploaded",
        "build_info": build,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct BuildQuery {
    pub platform: Option<String>,
}

/// GET /api/v1/builds?platform=
pub async fn list_builds(
    State(state): State<ApiState>,
    Query(query): Query<BuildQuery>,
) -> ApiResult<impl IntoResponse> {
    let builds = state.services.builds.list(query.platform.as_deref())?;
    Ok(Json(json!({
        "count": builds.len(),
        "builds": builds,
    })))
}

/// DELETE /api/v1/builds/:build_id
pub async fn delete_build(
    State(state): State<ApiState>,
    Path(build_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.services.builds.delete(&build_id).await?;
    Ok(Json(json!({ "message": "Build deleted successfully" })))
}

// ── Sessions ───────────────────────────────────────────────────

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.services.sessions.list()?;
    Ok(Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

/// GET /api/v1/sessions/:session_id
pub async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.sessions.status(&session_id)?))
}

/// DELETE /api/v1/sessions/:session_id
pub async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.services.sessions.end(&session_id).await?;
    Ok(Json(json!({ "message": "Session ended successfully" })))
}

/// Install request body.
#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub build_id: String,
}

/// POST /api/v1/sessions/:session_id/install
pub async fn install_build(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    body: Result<Json<InstallRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let receipt = state
        .services
        .installs
        .install(&session_id, &req.build_id)
        .await?;
    Ok(Json(receipt))
}

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::response::Response;

    use appmirror_session::{MirrorServices, Timings};
    use appmirror_state::{SessionStatus, StateStore};
    use appmirror_storage::MemoryBlobStore;

    use super::*;

    fn test_state() -> ApiState {
        let services = MirrorServices::new(
            StateStore::open_in_memory().unwrap(),
            Arc::new(MemoryBlobStore::new()),
            Timings::default(),
        );
        ApiState { services }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn launch_body(name: &str, os: &str) -> Result<Json<LaunchRequest>, JsonRejection> {
        Ok(Json(LaunchRequest {
            device_name: name.to_string(),
            os_version: os.to_string(),
            platform: None,
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn launch_returns_preparing_session() {
        let state = test_state();
        let resp = launch_device(State(state), launch_body("iPhone 14", "iOS 17"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["status"], "preparing");
        assert_eq!(body["device_info"]["platform"], "ios");
        assert_eq!(body["upload_options"], json!([".ipa", ".app"]));
        assert!(body["session_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_without_device_name_is_bad_request() {
        let state = test_state();
        let resp = launch_device(State(state), launch_body("", "iOS 17"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "device_name is required");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_session_is_not_found() {
        let state = test_state();

        let resp = device_status(State(state.clone()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Session not found");

        let resp = get_session(State(state.clone()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = end_session(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn list_builds_empty() {
        let state = test_state();
        let resp = list_builds(State(state), Query(BuildQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["builds"], json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_unknown_build() {
        let state = test_state();
        let resp = delete_build(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Build not found");
    }

    #[tokio::test(start_paused = true)]
    async fn install_while_preparing_is_bad_request() {
        let state = test_state();
        let launched = state
            .services
            .sessions
            .launch("Pixel 8", "Android 14", None)
            .await
            .unwrap();
        let session_id = launched.session.id;
        let build = state
            .services
            .builds
            .upload(&session_id, None, "app.apk", Bytes::from_static(b"apk"))
            .await
            .unwrap();

        let resp = install_build(
            State(state.clone()),
            Path(session_id.clone()),
            Ok(Json(InstallRequest { build_id: build.id })),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Device is not ready for installation");
        assert_eq!(
            state.services.sessions.session(&session_id).unwrap().status,
            SessionStatus::Preparing
        );
    }

    #[tokio::test(start_paused = true)]
    async fn list_sessions_counts() {
        let state = test_state();
        state
            .services
            .sessions
            .launch("Pixel 8", "Android 14", None)
            .await
            .unwrap();

        let resp = list_sessions(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["sessions"][0]["status"], "preparing");
    }

    #[tokio::test]
    async fn health_is_healthy() {
        let resp = health().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "status": "healthy" }));
    }
}
