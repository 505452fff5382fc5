use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::{decode, encode, GameRepository, StoreError, StoreResult};
use crate::types::{Game, GameCode};

/// One pretty-printed `<CODE>.json` document per game.
///
/// Writes go to a temporary file that is renamed over the target, so a crash
/// never leaves a half-written game behind.
pub struct JsonFileGameRepository {
    dir: PathBuf,
    /// Serializes check-then-write sequences across all games
    write_gate: Mutex<()>,
}

impl JsonFileGameRepository {
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "using JSON file game store");
        Ok(Self {
            dir,
            write_gate: Mutex::new(()),
        })
    }

    fn path_for(&self, code: &GameCode) -> PathBuf {
        self.dir.join(format!("{code}.json"))
    }

    async fn read(&self, code: &GameCode) -> StoreResult<Option<Game>> {
        match tokio::fs::read_to_string(self.path_for(code)).await {
            Ok(json) => decode(&json).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, game: &Game) -> StoreResult<()> {
        let json = encode(game)?;
        let target = self.path_for(&game.game_code);
        let tmp = self.dir.join(format!(".{}.json.tmp", game.game_code));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl GameRepository for JsonFileGameRepository {
    async fn get_by_game_code(&self, code: &GameCode) -> StoreResult<Option<Game>> {
        self.read(code).await
    }

    async fn create(&self, game: &Game) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        if tokio::fs::try_exists(self.path_for(&game.game_code)).await? {
            return Err(StoreError::AlreadyExists(game.game_code.clone()));
        }
        self.write(game).await
    }

    async fn update(&self, game: &Game, expected_version: u64) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        let stored = self
            .read(&game.game_code)
            .await?
            .ok_or_else(|| StoreError::NotFound(game.game_code.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                code: game.game_code.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        self.write(game).await
    }

    async fn delete(&self, code: &GameCode) -> StoreResult<bool> {
        let _gate = self.write_gate.lock().await;
        match tokio::fs::remove_file(self.path_for(code)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_games(&self) -> StoreResult<Vec<Game>> {
        let mut games = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_document {
                continue;
            }

            let json = match tokio::fs::read_to_string(&path).await {
                Ok(json) => json,
                // Deleted between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match decode(&json) {
                Ok(game) => games.push(game),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable game file");
                }
            }
        }

        games.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(games)
    }
}
