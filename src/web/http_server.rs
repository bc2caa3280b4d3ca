//! HTTP server for meeting pages and the signaling relay
//!
//! - `/` and `/meeting/{meeting_id}` serve the call page
//! - `/ws/{meeting_id}` is the relay WebSocket for that meeting
//! - `/health` reports uptime and room occupancy
//! - anything else is a static file from the web root

use crate::call::SessionId;
use crate::transport::handle_relay_connection;
use crate::web::shared::SharedState;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, get_service},
    Json, Router,
};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};

/// Routes for the given state
pub fn build_router(state: Arc<SharedState>) -> Router {
    let web_root = state.config.server.web_root.clone();
    let index_path = web_root.join("index.html");
    if !index_path.exists() {
        warn!("Call page not found at {:?}", index_path);
    }

    let static_service = ServeDir::new(&web_root).fallback(ServeFile::new(&index_path));

    Router::new()
        .route("/", get_service(ServeFile::new(&index_path)))
        .route("/meeting/{meeting_id}", get_service(ServeFile::new(&index_path)))
        .route("/ws/{meeting_id}", get(relay_handler))
        .route("/health", get(health_handler))
        .fallback_service(static_service)
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn run_http_server(state: Arc<SharedState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);
    info!("Serving call page from {:?}", state.config.server.web_root);

    serve(listener, state).await
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<SharedState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    axum::serve(listener, app)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)?;
    Ok(())
}

async fn relay_handler(
    ws: WebSocketUpgrade,
    Path(meeting_id): Path<String>,
    State(state): State<Arc<SharedState>>,
) -> Response {
    let meeting_id = match SessionId::new(meeting_id) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let rooms = state.rooms.clone();
    ws.on_upgrade(move |socket| handle_relay_connection(socket, meeting_id, rooms))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<SharedState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.uptime().as_secs_f64(),
        "rooms": state.room_count(),
        "participants": state.participant_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
