//! Games repository: whole-aggregate read and replace with optimistic
//! concurrency on `Game::version`.

mod document;
mod file;
mod memory;

pub use document::{decode, encode, GameDocument, RoundDocument, DOCUMENT_SCHEMA_VERSION};
pub use file::JsonFileGameRepository;
pub use memory::InMemoryGameRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Game, GameCode};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("game `{0}` already exists")]
    AlreadyExists(GameCode),

    #[error("game `{0}` not found")]
    NotFound(GameCode),

    #[error("game `{code}` changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        code: GameCode,
        expected: u64,
        actual: u64,
    },

    #[error("stored game is corrupt: {0}")]
    Corrupt(String),

    #[error("storage I/O error")]
    Io(#[from] std::io::Error),

    #[error("serialization error")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn get_by_game_code(&self, code: &GameCode) -> StoreResult<Option<Game>>;

    /// Insert a new game; fails with `AlreadyExists` if the code is taken
    async fn create(&self, game: &Game) -> StoreResult<()>;

    /// Replace a stored game, provided its stored version still equals
    /// `expected_version`
    async fn update(&self, game: &Game, expected_version: u64) -> StoreResult<()>;

    /// Returns whether a game was removed
    async fn delete(&self, code: &GameCode) -> StoreResult<bool>;

    async fn list_games(&self) -> StoreResult<Vec<Game>>;
}
