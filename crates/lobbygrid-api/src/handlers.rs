//! REST API handlers.
//!
//! Each handler goes through the [`Lobby`](lobbygrid_scheduler::Lobby)
//! facade and returns the `{success, data, error}` JSON envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use lobbygrid_control::ControlError;
use lobbygrid_core::GameType;
use lobbygrid_scheduler::SchedulerError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Games ──────────────────────────────────────────────────────

/// GET /api/v1/games
pub async fn list_games(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.lobby.instances())
}

/// GET /api/v1/games/{id}
pub async fn get_game(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.lobby.instance(&id) {
        Some(instance) => ApiResponse::ok(instance).into_response(),
        None => error_response("game not found", StatusCode::NOT_FOUND).into_response(),
    }
}

/// Create request body.
#[derive(serde::Deserialize)]
pub struct CreateGameRequest {
    pub game: String,
    /// Player to notify; defaults to `"api"`.
    #[serde(default)]
    pub requester: Option<String>,
}

#[derive(serde::Serialize)]
struct CreateAccepted {
    game: GameType,
    requester: String,
}

/// POST /api/v1/games
///
/// Creation takes as long as the game server needs to start, so this only
/// accepts the request; the outcome reaches the requester as a notice.
pub async fn create_game(
    State(state): State<ApiState>,
    Json(req): Json<CreateGameRequest>,
) -> impl IntoResponse {
    let game: GameType = match req.game.parse() {
        Ok(game) => game,
        Err(e) => {
            let known: Vec<&str> = GameType::all().iter().map(GameType::as_str).collect();
            let msg = format!("{e} (expected one of: {})", known.join(", "));
            return error_response(&msg, StatusCode::BAD_REQUEST).into_response();
        }
    };
    let requester = req.requester.unwrap_or_else(|| "api".to_string());

    // Detached: the task reports through the notifier.
    let _ = state.lobby.request_create(game, &requester);

    (StatusCode::ACCEPTED, ApiResponse::ok(CreateAccepted { game, requester })).into_response()
}

/// DELETE /api/v1/games/{id}
pub async fn delete_game(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.lobby.delete(&id).await {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(SchedulerError::InstanceNotFound(_)) => {
            error_response("game not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(SchedulerError::Control(e @ ControlError::Unavailable(_))) => {
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Catalogue ──────────────────────────────────────────────────

#[derive(serde::Serialize)]
struct GameTypeInfo {
    name: &'static str,
    payload_url: &'static str,
}

/// GET /api/v1/game-types
pub async fn list_game_types() -> impl IntoResponse {
    let types: Vec<GameTypeInfo> = GameType::all()
        .iter()
        .map(|g| GameTypeInfo {
            name: g.as_str(),
            payload_url: g.payload_url(),
        })
        .collect();
    ApiResponse::ok(types)
}

// ── Pool ───────────────────────────────────────────────────────

/// GET /api/v1/pool
pub async fn pool_status(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.lobby.orchestrator().pool().snapshot().await)
}
