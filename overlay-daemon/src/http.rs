//! HTTP API and route table
//!
//! Endpoints:
//! - GET  /api/config
//! - POST /api/config
//! - GET  /api/server-info
//! - GET  /api/status
//! - GET  /ws and GET / (subscriber WebSocket upgrade)

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use overlay_config::{ConfigError, DisplayConfig};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::context::{AppContext, ServerInfo};
use crate::subscriber;
use crate::ws::ConnectionState;

/// Request bodies above this are rejected before parsing
pub const MAX_BODY_BYTES: usize = 100 * 1024;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/config", get(handle_get_config).post(handle_update_config))
        .route("/api/server-info", get(handle_server_info))
        .route("/api/status", get(handle_status))
        .route("/ws", get(subscriber::ws_handler))
        .route("/", get(subscriber::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn handle_get_config(State(ctx): State<AppContext>) -> Json<DisplayConfig> {
    Json(ctx.config_store.get().await)
}

async fn handle_server_info(State(ctx): State<AppContext>) -> Json<ServerInfo> {
    Json(ServerInfo::clone(&ctx.server_info))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    upstream: ConnectionState,
    control: ConnectionState,
    subscribers: usize,
}

async fn handle_status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        upstream: ctx.upstream.state(),
        control: ctx.control.state(),
        subscribers: ctx.hub.subscriber_count().await,
    })
}

async fn handle_update_config(State(ctx): State<AppContext>, body: Bytes) -> Response {
    let update: Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejected config update: invalid JSON ({})", e);
            return failure(
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": "Invalid JSON",
                    "details": [e.to_string()],
                }),
            );
        }
    };

    match ctx.config_store.update(&update).await {
        Ok(config) => {
            info!("Display config updated via API");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "config": config })),
            )
                .into_response()
        }
        Err(ConfigError::Validation(errors)) => {
            warn!("Rejected config update: {}", errors);
            failure(
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": "Invalid configuration",
                    "details": errors.into_details(),
                }),
            )
        }
        Err(e) => {
            error!("Failed to save display config: {}", e);
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "Failed to save configuration" }),
            )
        }
    }
}

fn failure(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}
