//! Request and response shapes shared by the HTTP and WebSocket surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::EventEnvelope;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub total_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_ready: bool,
    pub is_admin: bool,
}

/// Public view of a round. Meme contents stay hidden while players are
/// still creating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub round_number: RoundNumber,
    pub phase: RoundPhase,
    pub submitted_players: Vec<PlayerId>,
    pub memes: Vec<MemeSubmission>,
    pub ratings_count: usize,
    pub scores: Vec<RoundScore>,
    pub creative_deadline: DateTime<Utc>,
    pub scoring_deadline: Option<DateTime<Utc>>,
}

/// Everything a client needs to render a game; never includes the password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDetails {
    pub game_code: GameCode,
    pub version: u64,
    pub state: GameState,
    pub admin_player_id: PlayerId,
    pub has_password: bool,
    pub options: GameOptions,
    pub players: Vec<PlayerView>,
    pub current_round: Option<RoundView>,
    pub rounds_played: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&GameRound> for RoundView {
    fn from(round: &GameRound) -> Self {
        let memes = if round.phase == RoundPhase::Creative {
            Vec::new()
        } else {
            round.submissions.values().cloned().collect()
        };
        Self {
            round_number: round.round_number,
            phase: round.phase,
            submitted_players: round.submissions.keys().cloned().collect(),
            memes,
            ratings_count: round.ratings.len(),
            scores: round.scores.clone(),
            creative_deadline: round.creative_deadline,
            scoring_deadline: round.scoring_deadline,
        }
    }
}

impl From<&Game> for GameDetails {
    fn from(game: &Game) -> Self {
        Self {
            game_code: game.game_code.clone(),
            version: game.version,
            state: game.state,
            admin_player_id: game.admin_player_id.clone(),
            has_password: game.password.is_some(),
            options: game.options.clone(),
            players: game
                .players
                .iter()
                .map(|p| PlayerView {
                    player_id: p.player_id.clone(),
                    display_name: p.display_name.clone(),
                    is_ready: p.is_ready,
                    is_admin: game.is_admin(&p.player_id),
                })
                .collect(),
            current_round: game.current_round().map(RoundView::from),
            rounds_played: game
                .rounds
                .iter()
                .filter(|r| r.phase == RoundPhase::Finished)
                .count(),
            leaderboard: leaderboard(game),
            created_at: game.created_at,
            started_at: game.started_at,
            finished_at: game.finished_at,
        }
    }
}

/// Cumulative standings with display names attached
pub fn leaderboard(game: &Game) -> Vec<LeaderboardEntry> {
    game.leaderboard()
        .into_iter()
        .map(|(player_id, total_score)| LeaderboardEntry {
            display_name: game
                .player(&player_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            player_id,
            total_score,
        })
        .collect()
}

/// Row in the public lobby browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenGameSummary {
    pub game_code: GameCode,
    pub admin_display_name: String,
    pub player_count: usize,
    pub max_players: usize,
    pub has_password: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Game> for OpenGameSummary {
    fn from(game: &Game) -> Self {
        Self {
            game_code: game.game_code.clone(),
            admin_display_name: game
                .player(&game.admin_player_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default(),
            player_count: game.players.len(),
            max_players: game.options.max_players,
            has_password: game.password.is_some(),
            category: game.options.category.clone(),
            created_at: game.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub player_id: PlayerId,
    pub display_name: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Server defaults apply when omitted
    #[serde(default)]
    pub options: Option<GameOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameRequest {
    pub player_id: PlayerId,
    pub display_name: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReadyRequest {
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOptionsRequest {
    pub player_id: PlayerId,
    pub options: GameOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMemeRequest {
    pub player_id: PlayerId,
    pub meme_template_id: MemeTemplateId,
    pub text_entries: BTreeMap<TextFieldId, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateMemeRequest {
    pub rater_id: PlayerId,
    pub target_player_id: PlayerId,
    pub score: i32,
}

/// Frames pushed to WebSocket subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Sent once on connect
    Snapshot { game: GameDetails },
    Event { envelope: EventEnvelope },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::{lobby, t0};

    #[test]
    fn test_details_hide_password_and_creative_memes() {
        let mut game = lobby(GameOptions {
            require_ready: false,
            ..GameOptions::default()
        });
        game.password = Some("hunter2".into());
        game.add_player("bob", "Bob", Some("hunter2"), t0()).unwrap();
        game.start("alice", t0()).unwrap();
        game.add_submission(
            1,
            "bob",
            "doge",
            BTreeMap::from([("top".to_string(), "wow".to_string())]),
            t0(),
        )
        .unwrap();

        let details = GameDetails::from(&game);
        assert!(details.has_password);
        let json = serde_json::to_string(&details).unwrap();
        assert!(!json.contains("hunter2"));

        let round = details.current_round.unwrap();
        assert_eq!(round.submitted_players, vec!["bob".to_string()]);
        assert!(round.memes.is_empty());
        assert!(details.players[0].is_admin);
        assert!(!details.players[1].is_admin);
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateGameRequest =
            serde_json::from_str(r#"{"player_id":"p1","display_name":"Alice"}"#).unwrap();
        assert!(req.password.is_none());
        assert!(req.options.is_none());
    }
}
