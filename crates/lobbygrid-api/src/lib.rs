//! lobbygrid-api — REST surface for the lobby front-end.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/games` | List joinable games |
//! | POST | `/api/v1/games` | Request a new game (202, completes asynchronously) |
//! | GET | `/api/v1/games/{id}` | Get one game and its endpoint |
//! | DELETE | `/api/v1/games/{id}` | Stop a game |
//! | GET | `/api/v1/game-types` | List game types |
//! | GET | `/api/v1/pool` | World pool status |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use lobbygrid_scheduler::Lobby;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub lobby: Lobby,
}

/// Build the API router.
pub fn build_router(lobby: Lobby) -> Router {
    let api_routes = Router::new()
        .route("/games", get(handlers::list_games).post(handlers::create_game))
        .route("/games/{id}", get(handlers::get_game).delete(handlers::delete_game))
        .route("/game-types", get(handlers::list_game_types))
        .route("/pool", get(handlers::pool_status))
        .with_state(ApiState { lobby });

    Router::new().nest("/api/v1", api_routes)
}
