//! HTTP API endpoints.
//!
//! Thin handlers: parse the path, call the coordinator, map the result. Player
//! identity comes from the request; authentication is left to the deployment.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::broadcast::BroadcastPublisher;
use crate::error::GameError;
use crate::protocol::*;
use crate::state::AppState;
use crate::types::*;
use crate::ws;

/// State shared by all HTTP and WebSocket handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AppState>,
    pub relay: BroadcastPublisher,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/games", post(create_game).get(list_games))
        .route("/api/games/{code}", get(get_game))
        .route("/api/games/{code}/options", put(update_options))
        .route("/api/games/{code}/players", post(join_game))
        .route("/api/games/{code}/players/{player_id}", delete(leave_game))
        .route("/api/games/{code}/players/{player_id}/ready", put(set_ready))
        .route("/api/games/{code}/start", post(start_game))
        .route("/api/games/{code}/rounds/{round}/submissions", post(submit_meme))
        .route("/api/games/{code}/rounds/{round}/ratings", post(rate_meme))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    active_sessions: usize,
}

async fn health(State(state): State<ApiState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        active_sessions: state.engine.active_sessions().await,
    })
}

pub(crate) fn parse_code(raw: &str) -> Result<GameCode, GameError> {
    GameCode::parse(raw).ok_or_else(|| GameError::Validation(format!("malformed game code `{raw}`")))
}

async fn details(state: &ApiState, code: &GameCode) -> Result<Json<GameDetails>, GameError> {
    Ok(Json(state.engine.get_game_details(code).await?))
}

/// POST /api/games
async fn create_game(
    State(state): State<ApiState>,
    Json(req): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameDetails>), GameError> {
    let outcome = state.engine.create_game(req).await?;
    let game = match outcome.game {
        Some(game) => GameDetails::from(game.as_ref()),
        None => state.engine.get_game_details(&outcome.value).await?,
    };
    Ok((StatusCode::CREATED, Json(game)))
}

/// GET /api/games
async fn list_games(State(state): State<ApiState>) -> Result<Json<Vec<OpenGameSummary>>, GameError> {
    Ok(Json(state.engine.list_open_games().await?))
}

/// GET /api/games/{code}
async fn get_game(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> Result<Json<GameDetails>, GameError> {
    let code = parse_code(&code)?;
    details(&state, &code).await
}

/// PUT /api/games/{code}/options
async fn update_options(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Json(req): Json<UpdateOptionsRequest>,
) -> Result<Json<GameDetails>, GameError> {
    let code = parse_code(&code)?;
    state
        .engine
        .update_options(&code, &req.player_id, req.options)
        .await?;
    details(&state, &code).await
}

/// POST /api/games/{code}/players
async fn join_game(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Json(req): Json<JoinGameRequest>,
) -> Result<(StatusCode, Json<GameDetails>), GameError> {
    let code = parse_code(&code)?;
    state.engine.join_game(&code, req).await?;
    Ok((StatusCode::CREATED, details(&state, &code).await?))
}

/// DELETE /api/games/{code}/players/{player_id}
async fn leave_game(
    State(state): State<ApiState>,
    Path((code, player_id)): Path<(String, PlayerId)>,
) -> Result<StatusCode, GameError> {
    let code = parse_code(&code)?;
    state.engine.leave_game(&code, &player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/games/{code}/players/{player_id}/ready
async fn set_ready(
    State(state): State<ApiState>,
    Path((code, player_id)): Path<(String, PlayerId)>,
    Json(req): Json<SetReadyRequest>,
) -> Result<Json<GameDetails>, GameError> {
    let code = parse_code(&code)?;
    state
        .engine
        .set_player_ready(&code, &player_id, req.is_ready)
        .await?;
    details(&state, &code).await
}

/// POST /api/games/{code}/start
async fn start_game(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Json(req): Json<StartGameRequest>,
) -> Result<Json<GameDetails>, GameError> {
    let code = parse_code(&code)?;
    state.engine.start_game(&code, &req.player_id).await?;
    details(&state, &code).await
}

/// POST /api/games/{code}/rounds/{round}/submissions
async fn submit_meme(
    State(state): State<ApiState>,
    Path((code, round)): Path<(String, RoundNumber)>,
    Json(req): Json<SubmitMemeRequest>,
) -> Result<(StatusCode, Json<MemeSubmission>), GameError> {
    let code = parse_code(&code)?;
    let outcome = state
        .engine
        .submit_meme(
            &code,
            round,
            &req.player_id,
            &req.meme_template_id,
            req.text_entries,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.value)))
}

/// POST /api/games/{code}/rounds/{round}/ratings
async fn rate_meme(
    State(state): State<ApiState>,
    Path((code, round)): Path<(String, RoundNumber)>,
    Json(req): Json<RateMemeRequest>,
) -> Result<Json<Rating>, GameError> {
    let code = parse_code(&code)?;
    let outcome = state
        .engine
        .rate_meme(&code, round, &req.rater_id, &req.target_player_id, req.score)
        .await?;
    Ok(Json(outcome.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code_normalizes() {
        assert_eq!(parse_code("abc234").unwrap().as_str(), "ABC234");
        assert!(matches!(parse_code("nope"), Err(GameError::Validation(_))));
    }
}
