use chrono::{DateTime, Utc};

use super::round::RoundEnd;
use super::{validate_display_name, validate_player_id};
use crate::error::GameError;
use crate::types::*;

/// What happened when a player left
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub player: GamePlayer,
    /// Set when the admin left and someone else inherited the role
    pub new_admin: Option<PlayerId>,
    /// Too few players remained mid-game, so the game was completed early
    pub abandoned: bool,
    /// Round tallied as part of abandonment
    pub tallied: Option<RoundEnd>,
    /// No players remain; the game is marked for deletion
    pub emptied: bool,
}

impl Game {
    /// Join the lobby
    pub fn add_player(
        &mut self,
        player_id: &str,
        display_name: &str,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GamePlayer, GameError> {
        validate_player_id(player_id)?;
        let display_name = validate_display_name(display_name)?;

        // Rejoining a running game is not supported
        self.require_state(GameState::Lobby, "join")?;

        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(GameError::WrongPassword);
            }
        }
        if self.has_player(player_id) {
            return Err(GameError::AlreadyJoined(player_id.to_string()));
        }
        if self.is_full() {
            return Err(GameError::GameFull {
                max: self.options.max_players,
            });
        }

        let player = GamePlayer {
            player_id: player_id.to_string(),
            display_name,
            is_ready: false,
            joined_at: now,
        };
        self.players.push(player.clone());
        Ok(player)
    }

    /// Leave the game, in any state.
    ///
    /// The admin role passes to the earliest-joined remaining player. Leaving
    /// mid-game drops the leaver's submission and ratings from the open round,
    /// and completes the game early if fewer than `min_players` remain.
    pub fn remove_player(
        &mut self,
        player_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Departure, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.player_id == player_id)
            .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;

        let player = self.players.remove(index);

        if let Some(round) = self.rounds.last_mut() {
            if round.phase != RoundPhase::Finished {
                round.submissions.remove(player_id);
                round
                    .ratings
                    .retain(|r| r.rater_id != player_id && r.target_id != player_id);
            }
        }

        let mut departure = Departure {
            player,
            new_admin: None,
            abandoned: false,
            tallied: None,
            emptied: false,
        };

        let Some(first) = self.players.first() else {
            self.marked_for_deletion = true;
            departure.emptied = true;
            return Ok(departure);
        };

        if self.admin_player_id == player_id {
            self.admin_player_id = first.player_id.clone();
            departure.new_admin = Some(first.player_id.clone());
        }

        let running = matches!(self.state, GameState::InProgress | GameState::Scoring);
        if running && self.players.len() < self.options.min_players {
            departure.tallied = self.abandon(now)?;
            departure.abandoned = true;
        }

        Ok(departure)
    }

    /// Toggle the ready flag of a lobby player
    pub fn set_player_ready(&mut self, player_id: &str, is_ready: bool) -> Result<(), GameError> {
        if !self.has_player(player_id) {
            return Err(GameError::PlayerNotFound(player_id.to_string()));
        }
        self.require_state(GameState::Lobby, "change readiness")?;

        if let Some(player) = self.players.iter_mut().find(|p| p.player_id == player_id) {
            player.is_ready = is_ready;
        }
        Ok(())
    }

    /// Start the game and open round 1
    pub fn start(&mut self, admin_player_id: &str, now: DateTime<Utc>) -> Result<RoundNumber, GameError> {
        if !self.is_admin(admin_player_id) {
            return Err(GameError::NotAdmin("start the game"));
        }
        self.require_state(GameState::Lobby, "start")?;

        let count = self.players.len();
        if count < self.options.min_players {
            return Err(GameError::NotEnoughPlayers {
                have: count,
                min: self.options.min_players,
            });
        }
        if count > self.options.max_players {
            return Err(GameError::GameFull {
                max: self.options.max_players,
            });
        }
        if self.options.require_ready && self.players.iter().any(|p| !p.is_ready) {
            return Err(GameError::NotAllReady);
        }

        self.transition(GameState::InProgress)?;
        self.started_at = Some(now);
        Ok(self.open_round(1, now))
    }

    /// Tally the open round (if any) and complete the game
    fn abandon(&mut self, now: DateTime<Utc>) -> Result<Option<RoundEnd>, GameError> {
        let tallied = match self.rounds.last_mut() {
            Some(round) if round.phase != RoundPhase::Finished => {
                let scores = round.tally(&self.players);
                round.phase = RoundPhase::Finished;
                round.finished_at = Some(now);
                round.scores = scores.clone();
                Some(RoundEnd {
                    round: round.round_number,
                    scores,
                    game_completed: true,
                })
            }
            _ => None,
        };

        self.transition(GameState::Completed)?;
        self.finished_at = Some(now);
        Ok(tallied)
    }
}
