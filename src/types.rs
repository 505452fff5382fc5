use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque ID types for readability
pub type PlayerId = String;
pub type MemeId = String;
pub type MemeTemplateId = String;
pub type TextFieldId = String;
pub type RoundNumber = u32;

/// Short, human-shareable identifier for a lobby.
///
/// Always upper-case alphanumeric; construct through [`crate::code`] so the
/// alphabet and length are enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameCode(String);

impl GameCode {
    /// Parse user input into a code (case-insensitive, surrounding whitespace ignored)
    pub fn parse(raw: &str) -> Option<Self> {
        crate::code::normalize(raw)
    }

    pub(crate) fn from_normalized(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Lobby,
    InProgress,
    Scoring,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    Creative,
    Scoring,
    Finished,
}

/// Per-game settings chosen by the admin while the game sits in the lobby
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOptions {
    pub max_players: usize,
    pub min_players: usize,
    pub number_of_rounds: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub allowed_categories: Vec<String>,
    #[serde(default)]
    pub is_private: bool,
    /// When true, every player must be ready before the admin can start
    #[serde(default = "default_require_ready")]
    pub require_ready: bool,
    pub creative_seconds: u64,
    pub scoring_seconds: u64,
    pub scoreboard_seconds: u64,
}

fn default_require_ready() -> bool {
    true
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            max_players: 8,
            min_players: 2,
            number_of_rounds: 3,
            category: None,
            allowed_categories: Vec::new(),
            is_private: false,
            require_ready: true,
            creative_seconds: 60,
            scoring_seconds: 30,
            scoreboard_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GamePlayer {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Only meaningful while the game is in the lobby
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemeSubmission {
    pub meme_id: MemeId,
    pub player_id: PlayerId,
    pub meme_template_id: MemeTemplateId,
    pub text_entries: BTreeMap<TextFieldId, String>,
    pub submitted_at: DateTime<Utc>,
}

impl MemeSubmission {
    /// A submission counts towards early advance only when every text field is filled in
    pub fn is_complete(&self) -> bool {
        !self.text_entries.is_empty() && self.text_entries.values().all(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    pub rater_id: PlayerId,
    pub target_id: PlayerId,
    pub score: u8,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundScore {
    pub player_id: PlayerId,
    pub meme_id: MemeId,
    /// Mean of received ratings, 0 when nobody rated the submission
    pub score: f64,
    pub ratings_received: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRound {
    pub round_number: RoundNumber,
    pub phase: RoundPhase,
    /// At most one submission per player
    pub submissions: BTreeMap<PlayerId, MemeSubmission>,
    /// Unique per (rater, target); the latest rating wins
    pub ratings: Vec<Rating>,
    /// Filled in when the round finishes
    pub scores: Vec<RoundScore>,
    pub started_at: DateTime<Utc>,
    pub creative_deadline: DateTime<Utc>,
    pub scoring_deadline: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate root: the full consistency boundary of one game session
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub game_code: GameCode,
    /// Bumped on every persisted mutation, used for optimistic concurrency
    pub version: u64,
    pub admin_player_id: PlayerId,
    pub password: Option<String>,
    pub state: GameState,
    pub options: GameOptions,
    /// Join order
    pub players: Vec<GamePlayer>,
    /// Round 1..=n, append-only
    pub rounds: Vec<GameRound>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Set once the last player leaves; the coordinator deletes the game
    pub marked_for_deletion: bool,
}
