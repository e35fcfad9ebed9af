//! appmirror-api: REST API for AppMirror.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/devices/launch` | Launch a simulated device |
//! | GET | `/api/v1/devices/status/:session_id` | Session snapshot |
//! | POST | `/api/v1/builds/upload` | Upload a build (multipart) |
//! | GET | `/api/v1/builds` | List builds, `?platform=` filter |
//! | DELETE | `/api/v1/builds/:build_id` | Delete a build and its artifact |
//! | GET | `/api/v1/sessions` | List sessions |
//! | GET | `/api/v1/sessions/:session_id` | Session with build summary |
//! | DELETE | `/api/v1/sessions/:session_id` | End a session |
//! | POST | `/api/v1/sessions/:session_id/install` | Install a build |
//! | GET | `/health` | Liveness |

pub mod cors;
pub mod error;
pub mod handlers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use appmirror_core::config::CorsConfig;
use appmirror_session::MirrorServices;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub services: MirrorServices,
}

/// Build the complete router: REST routes, health, CORS, tracing and the
/// upload body limit.
pub fn build_router(services: MirrorServices, cors: &CorsConfig, max_upload_bytes: usize) -> Router {
    let api_state = ApiState { services };

    let api_routes = Router::new()
        .route("/devices/launch", post(handlers::launch_device))
        .route("/devices/status/{session_id}", get(handlers::device_status))
        .route("/builds/upload", post(handlers::upload_build))
        .route("/builds", get(handlers::list_builds))
        .route("/builds/{build_id}", axum::routing::delete(handlers::delete_build))
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::end_session),
        )
        .route("/sessions/{session_id}/install", post(handlers::install_build))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors::cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}
