use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{decode, encode, GameRepository, StoreError, StoreResult};
use crate::types::{Game, GameCode};

struct StoredGame {
    version: u64,
    json: String,
}

/// Keeps encoded documents in memory, so every load goes through the same
/// decode and validation path as the file backend
#[derive(Default)]
pub struct InMemoryGameRepository {
    games: RwLock<HashMap<GameCode, StoredGame>>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn get_by_game_code(&self, code: &GameCode) -> StoreResult<Option<Game>> {
        let games = self.games.read().await;
        games.get(code).map(|stored| decode(&stored.json)).transpose()
    }

    async fn create(&self, game: &Game) -> StoreResult<()> {
        let json = encode(game)?;
        let mut games = self.games.write().await;
        if games.contains_key(&game.game_code) {
            return Err(StoreError::AlreadyExists(game.game_code.clone()));
        }
        games.insert(
            game.game_code.clone(),
            StoredGame {
                version: game.version,
                json,
            },
        );
        Ok(())
    }

    async fn update(&self, game: &Game, expected_version: u64) -> StoreResult<()> {
        let json = encode(game)?;
        let mut games = self.games.write().await;
        let stored = games
            .get_mut(&game.game_code)
            .ok_or_else(|| StoreError::NotFound(game.game_code.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                code: game.game_code.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = StoredGame {
            version: game.version,
            json,
        };
        Ok(())
    }

    async fn delete(&self, code: &GameCode) -> StoreResult<bool> {
        Ok(self.games.write().await.remove(code).is_some())
    }

    async fn list_games(&self) -> StoreResult<Vec<Game>> {
        let games = self.games.read().await;
        games.values().map(|stored| decode(&stored.json)).collect()
    }
}
