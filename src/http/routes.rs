//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_upgrade;
use crate::ws::protocol::MatchMode;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS - a bare "*" cannot carry credentials; explicit origins can
    // (comma-separated in CLIENT_ORIGIN)
    let cors = if state.config.client_origin.trim() == "*" {
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let allowed_origins: Vec<header::HeaderValue> = state
            .config
            .client_origin
            .split(',')
            .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
            .collect();
        cors::CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms", get(rooms_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/ws", get(ws_upgrade))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
    pvp_queue_size: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let pvp_queue_size = state.matchmaking.queue_len().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.registry().len(),
        active_players: state.registry().total_players(),
        pvp_queue_size,
    })
}

// ============================================================================
// Room listing (for viewers picking a room to spectate)
// ============================================================================

#[derive(Serialize)]
struct RoomSummary {
    room_id: Uuid,
    mode: MatchMode,
    players: usize,
    created_at: u64,
}

#[derive(Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomSummary>,
}

async fn rooms_handler(State(state): State<AppState>) -> Json<RoomsResponse> {
    let mut rooms: Vec<RoomSummary> = state
        .registry()
        .handles()
        .into_iter()
        .map(|handle| RoomSummary {
            room_id: handle.id,
            mode: handle.mode,
            players: handle.player_count.load(std::sync::atomic::Ordering::Relaxed),
            created_at: handle.created_at,
        })
        .collect();
    rooms.sort_by_key(|room| room.created_at);

    Json(RoomsResponse { rooms })
}

async fn room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSummary>, AppError> {
    let handle = state
        .registry()
        .get(&room_id)
        .ok_or_else(|| AppError::NotFound(format!("room {room_id}")))?;

    Ok(Json(RoomSummary {
        room_id: handle.id,
        mode: handle.mode,
        players: handle.player_count.load(std::sync::atomic::Ordering::Relaxed),
        created_at: handle.created_at,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
