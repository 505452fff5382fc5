use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::types::{GameCode, GameState, PlayerId, RoundNumber, RoundPhase};

/// Client-facing failure category; transports map each kind to one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Unauthorized,
    CapacityExceeded,
    Conflict,
    ValidationFailed,
    Unavailable,
}

/// Errors raised by the game aggregate and the session coordinator
#[derive(Debug, Error)]
pub enum GameError {
    #[error("game `{0}` not found")]
    GameNotFound(GameCode),

    #[error("player `{0}` not found")]
    PlayerNotFound(PlayerId),

    #[error("player `{0}` is not part of this game")]
    PlayerNotInGame(PlayerId),

    #[error("round {0} not found")]
    RoundNotFound(RoundNumber),

    #[error("no submission from `{target}` in round {round}")]
    SubmissionNotFound { round: RoundNumber, target: PlayerId },

    #[error("cannot {operation} while the game is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: GameState,
    },

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: GameState, to: GameState },

    #[error("creative phase of round {round} is closed")]
    PhaseClosed { round: RoundNumber },

    #[error("round {round} is {actual:?}, expected {expected:?}")]
    WrongPhase {
        round: RoundNumber,
        expected: RoundPhase,
        actual: RoundPhase,
    },

    #[error("only the admin may {0}")]
    NotAdmin(&'static str),

    #[error("wrong password")]
    WrongPassword,

    #[error("game is full ({max} players)")]
    GameFull { max: usize },

    #[error("player `{0}` already joined")]
    AlreadyJoined(PlayerId),

    #[error("not enough players: {have} joined, {min} required")]
    NotEnoughPlayers { have: usize, min: usize },

    #[error("not all players are ready")]
    NotAllReady,

    #[error("players cannot rate their own meme")]
    SelfRating,

    #[error("score {0} is outside 0..=5")]
    ScoreOutOfRange(i32),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("no free game code after {0} attempts")]
    CodeSpaceExhausted(u32),

    #[error("storage failure")]
    Storage(#[source] StoreError),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameNotFound(_)
            | GameError::PlayerNotFound(_)
            | GameError::RoundNotFound(_)
            | GameError::SubmissionNotFound { .. } => ErrorKind::NotFound,
            GameError::InvalidState { .. }
            | GameError::InvalidTransition { .. }
            | GameError::PhaseClosed { .. }
            | GameError::WrongPhase { .. }
            | GameError::NotEnoughPlayers { .. }
            | GameError::NotAllReady => ErrorKind::InvalidState,
            GameError::NotAdmin(_)
            | GameError::WrongPassword
            | GameError::PlayerNotInGame(_) => ErrorKind::Unauthorized,
            GameError::GameFull { .. } => ErrorKind::CapacityExceeded,
            GameError::AlreadyJoined(_) | GameError::Conflict(_) => ErrorKind::Conflict,
            GameError::SelfRating | GameError::ScoreOutOfRange(_) | GameError::Validation(_) => {
                ErrorKind::ValidationFailed
            }
            GameError::CodeSpaceExhausted(_) | GameError::Storage(_) => ErrorKind::Unavailable,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        GameError::Validation(message.into())
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(code) => GameError::GameNotFound(code),
            StoreError::AlreadyExists(_) | StoreError::VersionConflict { .. } => {
                GameError::Conflict(err.to_string())
            }
            other => GameError::Storage(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorKind,
    message: String,
}

impl IntoResponse for GameError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.kind();
        let status = match (kind, &self) {
            (_, GameError::WrongPassword) => StatusCode::UNAUTHORIZED,
            (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
            (ErrorKind::InvalidState | ErrorKind::ValidationFailed, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::Unauthorized, _) => StatusCode::FORBIDDEN,
            (ErrorKind::CapacityExceeded | ErrorKind::Conflict, _) => StatusCode::CONFLICT,
            (ErrorKind::Unavailable, _) => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            code: kind,
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
