//! The game aggregate.
//!
//! Every operation here is synchronous and free of I/O. Operations validate
//! before they touch any field, so a returned error always leaves the game
//! exactly as it was.

mod lobby;
mod round;

pub use lobby::Departure;
pub use round::RoundEnd;

use chrono::{DateTime, Utc};

use crate::error::GameError;
use crate::scheduler::{MAX_DELAY_SECONDS, MIN_DELAY_SECONDS};
use crate::types::*;

pub const MAX_DISPLAY_NAME_CHARS: usize = 32;
pub const MAX_TEXT_ENTRY_CHARS: usize = 200;
pub const MAX_SCORE: i32 = 5;

impl GameState {
    /// Check if a state transition is legal
    pub fn can_transition_to(self, to: GameState) -> bool {
        use GameState::*;

        matches!(
            (self, to),
            (Lobby, InProgress)
                | (InProgress, Scoring)
                | (Scoring, InProgress)
                | (Scoring, Completed)
                // Abandonment
                | (InProgress, Completed)
        )
    }
}

impl Game {
    /// Build a fresh lobby with the creator already joined as admin
    pub fn new(
        game_code: GameCode,
        admin_player_id: PlayerId,
        admin_display_name: &str,
        password: Option<String>,
        options: GameOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, GameError> {
        validate_player_id(&admin_player_id)?;
        let display_name = validate_display_name(admin_display_name)?;
        validate_options(&options)?;
        let password = password.filter(|p| !p.is_empty());

        Ok(Self {
            game_code,
            version: 1,
            admin_player_id: admin_player_id.clone(),
            password,
            state: GameState::Lobby,
            options,
            players: vec![GamePlayer {
                player_id: admin_player_id,
                display_name,
                is_ready: false,
                joined_at: now,
            }],
            rounds: Vec::new(),
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
            marked_for_deletion: false,
        })
    }

    pub fn player(&self, player_id: &str) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    pub fn is_admin(&self, player_id: &str) -> bool {
        self.admin_player_id == player_id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.options.max_players
    }

    /// Cumulative score per player over all finished rounds, best first.
    /// Ties keep join order; players who left are dropped.
    pub fn leaderboard(&self) -> Vec<(PlayerId, f64)> {
        let mut totals: Vec<(PlayerId, f64)> = self
            .players
            .iter()
            .map(|p| {
                let total = self
                    .rounds
                    .iter()
                    .flat_map(|r| r.scores.iter())
                    .filter(|s| s.player_id == p.player_id)
                    .fold(0.0, |acc, s| acc + s.score);
                (p.player_id.clone(), total)
            })
            .collect();

        // Stable sort keeps join order for ties
        totals.sort_by(|a, b| b.1.total_cmp(&a.1));
        totals
    }

    /// Replace the game options (admin only, lobby only)
    pub fn update_options(
        &mut self,
        admin_player_id: &str,
        options: GameOptions,
    ) -> Result<(), GameError> {
        if !self.is_admin(admin_player_id) {
            return Err(GameError::NotAdmin("change settings"));
        }
        self.require_state(GameState::Lobby, "change settings")?;
        validate_options(&options)?;
        if options.max_players < self.players.len() {
            return Err(GameError::validation(format!(
                "max_players {} is below the current player count {}",
                options.max_players,
                self.players.len()
            )));
        }

        self.options = options;
        Ok(())
    }

    fn transition(&mut self, to: GameState) -> Result<(), GameError> {
        if !self.state.can_transition_to(to) {
            return Err(GameError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    fn require_state(&self, expected: GameState, operation: &'static str) -> Result<(), GameError> {
        if self.state != expected {
            return Err(GameError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_player_id(player_id: &str) -> Result<(), GameError> {
    if player_id.trim().is_empty() {
        return Err(GameError::validation("player id must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_display_name(display_name: &str) -> Result<String, GameError> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err(GameError::validation("display name must not be empty"));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(GameError::validation(format!(
            "display name must be at most {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_options(options: &GameOptions) -> Result<(), GameError> {
    if options.min_players == 0 {
        return Err(GameError::validation("min_players must be at least 1"));
    }
    if options.min_players > options.max_players {
        return Err(GameError::validation(format!(
            "min_players {} exceeds max_players {}",
            options.min_players, options.max_players
        )));
    }
    if options.number_of_rounds == 0 {
        return Err(GameError::validation("number_of_rounds must be at least 1"));
    }
    for (name, seconds) in [
        ("creative_seconds", options.creative_seconds),
        ("scoring_seconds", options.scoring_seconds),
        ("scoreboard_seconds", options.scoreboard_seconds),
    ] {
        if !(MIN_DELAY_SECONDS..=MAX_DELAY_SECONDS).contains(&seconds) {
            return Err(GameError::validation(format!(
                "{name} must be within {MIN_DELAY_SECONDS}..={MAX_DELAY_SECONDS}"
            )));
        }
    }
    if let Some(category) = &options.category {
        if !options.allowed_categories.is_empty() && !options.allowed_categories.contains(category)
        {
            return Err(GameError::validation(format!(
                "category `{category}` is not among the allowed categories"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn lobby(options: GameOptions) -> Game {
        Game::new(
            GameCode::parse("MEME42").unwrap(),
            "alice".to_string(),
            "Alice",
            None,
            options,
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_state_transitions() {
        use GameState::*;
        assert!(Lobby.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Scoring));
        assert!(Scoring.can_transition_to(InProgress));
        assert!(Scoring.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn test_invalid_state_transitions() {
        use GameState::*;
        assert!(!Lobby.can_transition_to(Scoring));
        assert!(!Lobby.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Lobby));
        assert!(!Completed.can_transition_to(Lobby));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Scoring.can_transition_to(Lobby));
    }

    #[test]
    fn test_new_game_has_admin_as_first_player() {
        let game = lobby(GameOptions::default());
        assert_eq!(game.state, GameState::Lobby);
        assert_eq!(game.admin_player_id, "alice");
        assert_eq!(game.players.len(), 1);
        assert_eq!(game.players[0].display_name, "Alice");
        assert!(game.rounds.is_empty());
        assert_eq!(game.version, 1);
    }

    #[test]
    fn test_new_game_rejects_bad_input() {
        let code = GameCode::parse("MEME42").unwrap();
        let result = Game::new(
            code.clone(),
            "alice".into(),
            "   ",
            None,
            GameOptions::default(),
            t0(),
        );
        assert!(matches!(result, Err(GameError::Validation(_))));

        let options = GameOptions {
            min_players: 5,
            max_players: 3,
            ..GameOptions::default()
        };
        let result = Game::new(code, "alice".into(), "Alice", None, options, t0());
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[test]
    fn test_empty_password_means_no_password() {
        let game = Game::new(
            GameCode::parse("MEME42").unwrap(),
            "alice".into(),
            "Alice",
            Some(String::new()),
            GameOptions::default(),
            t0(),
        )
        .unwrap();
        assert!(game.password.is_none());
    }

    #[test]
    fn test_options_validation() {
        let mut options = GameOptions {
            creative_seconds: 0,
            ..GameOptions::default()
        };
        assert!(validate_options(&options).is_err());

        options.creative_seconds = 121;
        assert!(validate_options(&options).is_err());

        options.creative_seconds = 120;
        assert!(validate_options(&options).is_ok());

        options.allowed_categories = vec!["cats".into(), "dogs".into()];
        options.category = Some("birds".into());
        assert!(validate_options(&options).is_err());

        options.category = Some("cats".into());
        assert!(validate_options(&options).is_ok());
    }

    #[test]
    fn test_update_options_admin_only_in_lobby() {
        let mut game = lobby(GameOptions::default());
        game.add_player("bob", "Bob", None, t0()).unwrap();

        let new_options = GameOptions {
            number_of_rounds: 5,
            ..GameOptions::default()
        };
        let err = game.update_options("bob", new_options.clone()).unwrap_err();
        assert!(matches!(err, GameError::NotAdmin(_)));

        let too_small = GameOptions {
            max_players: 1,
            min_players: 1,
            ..GameOptions::default()
        };
        assert!(game.update_options("alice", too_small).is_err());

        game.update_options("alice", new_options).unwrap();
        assert_eq!(game.options.number_of_rounds, 5);
    }

    #[test]
    fn test_leaderboard_without_rounds_is_positive_zero() {
        let game = lobby(GameOptions::default());
        let board = game.leaderboard();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].1, 0.0);
        assert!(board[0].1.is_sign_positive());
    }
}
