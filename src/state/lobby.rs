use std::sync::Arc;

use super::session::Retry;
use super::{AppState, Outcome};
use crate::engine;
use crate::error::GameError;
use crate::events::IntegrationEvent;
use crate::protocol::{self, CreateGameRequest, GameDetails, JoinGameRequest, OpenGameSummary};
use crate::store::StoreError;
use crate::types::*;

/// Draws before giving up on finding a free code
pub const MAX_CODE_ATTEMPTS: u32 = 8;

impl AppState {
    /// Create a game with the caller as admin and first player
    pub async fn create_game(&self, req: CreateGameRequest) -> Result<Outcome<GameCode>, GameError> {
        let options = req
            .options
            .unwrap_or_else(|| self.config.default_options.clone());

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = self.codes.generate();
            if self.is_active(&code).await || self.repository.get_by_game_code(&code).await?.is_some() {
                tracing::debug!(code = %code, attempt, "game code taken, drawing another");
                continue;
            }

            let game = Game::new(
                code.clone(),
                req.player_id.clone(),
                &req.display_name,
                req.password.clone(),
                options.clone(),
                self.clock.now(),
            )?;

            match self.repository.create(&game).await {
                Ok(()) => {}
                // Lost a race for the same code
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }

            let game = Arc::new(game);
            self.register_session(game.clone()).await;
            tracing::info!(code = %code, admin = %game.admin_player_id, "game created");

            let events = vec![IntegrationEvent::GameCreated {
                admin_player_id: game.admin_player_id.clone(),
                is_private: game.options.is_private,
            }];
            self.publish(&code, &events).await;
            return Ok(Outcome {
                value: code,
                game: Some(game),
                events,
            });
        }

        tracing::error!(attempts = MAX_CODE_ATTEMPTS, "no free game code");
        Err(GameError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    pub async fn join_game(
        &self,
        code: &GameCode,
        req: JoinGameRequest,
    ) -> Result<Outcome<GamePlayer>, GameError> {
        let outcome = self
            .mutate(code, Retry::Never, |game, now, fx| {
                let player = game.add_player(
                    &req.player_id,
                    &req.display_name,
                    req.password.as_deref(),
                    now,
                )?;
                fx.emit(IntegrationEvent::PlayerJoined {
                    player_id: player.player_id.clone(),
                    display_name: player.display_name.clone(),
                });
                Ok(player)
            })
            .await?;
        tracing::info!(code = %code, player = %outcome.value.player_id, "player joined");
        Ok(outcome)
    }

    /// Leave a game. Deletes the game when the last player leaves.
    pub async fn leave_game(&self, code: &GameCode, player_id: &str) -> Result<Outcome<()>, GameError> {
        let outcome = self
            .mutate(code, Retry::Never, |game, now, fx| {
                let departure = game.remove_player(player_id, now)?;
                fx.emit(IntegrationEvent::PlayerLeft {
                    player_id: departure.player.player_id.clone(),
                });
                if let Some(admin) = &departure.new_admin {
                    fx.emit(IntegrationEvent::AdminChanged {
                        admin_player_id: admin.clone(),
                    });
                }
                if departure.abandoned {
                    if let Some(end) = &departure.tallied {
                        fx.emit(IntegrationEvent::RoundEnded {
                            round: end.round,
                            scores: end.scores.clone(),
                        });
                    }
                    fx.emit(IntegrationEvent::GameCompleted {
                        leaderboard: protocol::leaderboard(game),
                        abandoned: true,
                    });
                }
                // Otherwise the round engine settles after the command, in
                // case the leaver was the last one the round waited on
                Ok(())
            })
            .await?;
        tracing::info!(code = %code, player = %player_id, "player left");
        Ok(outcome)
    }

    pub async fn set_player_ready(
        &self,
        code: &GameCode,
        player_id: &str,
        is_ready: bool,
    ) -> Result<Outcome<()>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, _now, fx| {
            let was_ready = game.player(player_id).is_some_and(|p| p.is_ready);
            game.set_player_ready(player_id, is_ready)?;
            if was_ready != is_ready {
                fx.emit(IntegrationEvent::PlayerReady {
                    player_id: player_id.to_string(),
                    is_ready,
                });
            }
            Ok(())
        })
        .await
    }

    /// Start the game (admin only) and open round 1
    pub async fn start_game(&self, code: &GameCode, player_id: &str) -> Result<Outcome<()>, GameError> {
        let outcome = self
            .mutate(code, Retry::Never, |game, now, fx| {
                let round = game.start(player_id, now)?;
                fx.emit(IntegrationEvent::GameStarted {
                    player_ids: game.players.iter().map(|p| p.player_id.clone()).collect(),
                });
                fx.phase_changes(engine::round_started(game, round));
                Ok(())
            })
            .await?;
        tracing::info!(code = %code, "game started");
        Ok(outcome)
    }

    /// Change settings (admin only, lobby only)
    pub async fn update_options(
        &self,
        code: &GameCode,
        player_id: &str,
        options: GameOptions,
    ) -> Result<Outcome<()>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, _now, fx| {
            let changed = game.options != options;
            game.update_options(player_id, options.clone())?;
            if changed {
                fx.emit(IntegrationEvent::SettingsChanged {
                    options: options.clone(),
                });
            }
            Ok(())
        })
        .await
    }

    pub async fn get_game_details(&self, code: &GameCode) -> Result<GameDetails, GameError> {
        let game = self.get_game(code).await?;
        Ok(GameDetails::from(game.as_ref()))
    }

    /// Public lobbies that still have room, oldest first
    pub async fn list_open_games(&self) -> Result<Vec<OpenGameSummary>, GameError> {
        let mut games = self.repository.list_games().await?;
        games.retain(|g| {
            g.state == GameState::Lobby
                && !g.options.is_private
                && !g.is_full()
                && !g.marked_for_deletion
        });
        games.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(games.iter().map(OpenGameSummary::from).collect())
    }
}
