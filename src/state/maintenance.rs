use chrono::{DateTime, Utc};

use super::AppState;
use crate::error::GameError;
use crate::types::*;

impl AppState {
    /// Delete games idle for longer than the configured TTL, and completed
    /// games nobody is left in. Returns how many were deleted.
    pub async fn reap_idle(&self) -> Result<usize, GameError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.config.idle_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let reapable = move |game: &Game| is_reapable(game, now, ttl);

        let candidates: Vec<GameCode> = self
            .repository
            .list_games()
            .await?
            .into_iter()
            .filter(|g| reapable(g))
            .map(|g| g.game_code)
            .collect();

        let mut reaped = 0;
        for code in candidates {
            // Re-checked under the writer lock; activity may have happened since listing
            match self.delete_if(&code, reapable).await {
                Ok(true) => {
                    tracing::info!(code = %code, "reaped idle game");
                    reaped += 1;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(code = %code, error = %e, "failed to reap game"),
            }
        }
        Ok(reaped)
    }

    /// Load every running game into a session so its deadline timer is armed
    /// again after a restart. Returns how many sessions were restored.
    pub async fn restore_sessions(&self) -> Result<usize, GameError> {
        let running: Vec<GameCode> = self
            .repository
            .list_games()
            .await?
            .into_iter()
            .filter(|g| matches!(g.state, GameState::InProgress | GameState::Scoring))
            .map(|g| g.game_code)
            .collect();

        let mut restored = 0;
        for code in running {
            let session = self.session_for(&code).await;
            let mut slot = session.writer.lock().await;
            match self.load_locked(&session, &mut slot, &code, true).await {
                Ok(_) => restored += 1,
                Err(e) => tracing::warn!(code = %code, error = %e, "failed to restore game"),
            }
        }
        if restored > 0 {
            tracing::info!(count = restored, "restored running games");
        }
        Ok(restored)
    }
}

fn is_reapable(game: &Game, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
    let idle = now - game.updated_at > ttl;
    let finished_and_empty = game.state == GameState::Completed && game.players.is_empty();
    idle || finished_and_empty || game.marked_for_deletion
}
