//! Persistence representation of a game.
//!
//! The aggregate itself carries no serde derives; this document is the one
//! place where its shape on disk is defined. Loading validates the aggregate
//! invariants so a hand-edited or truncated file cannot produce an illegal game.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{StoreError, StoreResult};
use crate::types::*;

/// Schema version for stored documents
/// Version 1: initial layout
pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDocument {
    pub schema_version: u32,
    pub game_code: GameCode,
    pub version: u64,
    pub admin_player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub state: GameState,
    pub options: GameOptions,
    pub players: Vec<GamePlayer>,
    #[serde(default)]
    pub rounds: Vec<RoundDocument>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub marked_for_deletion: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundDocument {
    pub round_number: RoundNumber,
    pub phase: RoundPhase,
    pub submissions: Vec<MemeSubmission>,
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub scores: Vec<RoundScore>,
    pub started_at: DateTime<Utc>,
    pub creative_deadline: DateTime<Utc>,
    pub scoring_deadline: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&GameRound> for RoundDocument {
    fn from(round: &GameRound) -> Self {
        Self {
            round_number: round.round_number,
            phase: round.phase,
            submissions: round.submissions.values().cloned().collect(),
            ratings: round.ratings.clone(),
            scores: round.scores.clone(),
            started_at: round.started_at,
            creative_deadline: round.creative_deadline,
            scoring_deadline: round.scoring_deadline,
            finished_at: round.finished_at,
        }
    }
}

impl From<&Game> for GameDocument {
    fn from(game: &Game) -> Self {
        Self {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            game_code: game.game_code.clone(),
            version: game.version,
            admin_player_id: game.admin_player_id.clone(),
            password: game.password.clone(),
            state: game.state,
            options: game.options.clone(),
            players: game.players.clone(),
            rounds: game.rounds.iter().map(RoundDocument::from).collect(),
            created_at: game.created_at,
            started_at: game.started_at,
            finished_at: game.finished_at,
            updated_at: game.updated_at,
            marked_for_deletion: game.marked_for_deletion,
        }
    }
}

impl TryFrom<RoundDocument> for GameRound {
    type Error = StoreError;

    fn try_from(doc: RoundDocument) -> StoreResult<Self> {
        let round = doc.round_number;

        let mut submissions = BTreeMap::new();
        for submission in doc.submissions {
            let player_id = submission.player_id.clone();
            if submissions.insert(player_id.clone(), submission).is_some() {
                return Err(corrupt(format!(
                    "round {round} has two submissions from `{player_id}`"
                )));
            }
        }

        let mut pairs = HashSet::new();
        for rating in &doc.ratings {
            if rating.score > 5 || rating.rater_id == rating.target_id {
                return Err(corrupt(format!("round {round} has an invalid rating")));
            }
            if !pairs.insert((rating.rater_id.as_str(), rating.target_id.as_str())) {
                return Err(corrupt(format!(
                    "round {round} has duplicate ratings from `{}` for `{}`",
                    rating.rater_id, rating.target_id
                )));
            }
        }

        Ok(Self {
            round_number: round,
            phase: doc.phase,
            submissions,
            ratings: doc.ratings,
            scores: doc.scores,
            started_at: doc.started_at,
            creative_deadline: doc.creative_deadline,
            scoring_deadline: doc.scoring_deadline,
            finished_at: doc.finished_at,
        })
    }
}

impl TryFrom<GameDocument> for Game {
    type Error = StoreError;

    fn try_from(doc: GameDocument) -> StoreResult<Self> {
        if doc.schema_version != DOCUMENT_SCHEMA_VERSION {
            return Err(corrupt(format!(
                "unsupported schema version {} (expected {DOCUMENT_SCHEMA_VERSION})",
                doc.schema_version
            )));
        }
        if !crate::code::is_valid(doc.game_code.as_str()) {
            return Err(corrupt(format!("invalid game code `{}`", doc.game_code)));
        }

        let mut seen = HashSet::new();
        if !doc.players.iter().all(|p| seen.insert(p.player_id.as_str())) {
            return Err(corrupt("duplicate player".to_string()));
        }
        if doc.players.len() > doc.options.max_players {
            return Err(corrupt(format!(
                "{} players exceed max_players {}",
                doc.players.len(),
                doc.options.max_players
            )));
        }
        if !doc.players.is_empty() && !seen.contains(doc.admin_player_id.as_str()) {
            return Err(corrupt("admin is not a player".to_string()));
        }
        if doc.state == GameState::Lobby && !doc.rounds.is_empty() {
            return Err(corrupt("lobby game has rounds".to_string()));
        }
        for (index, round) in doc.rounds.iter().enumerate() {
            if round.round_number as usize != index + 1 {
                return Err(corrupt(format!(
                    "round numbers are not sequential at position {}",
                    index + 1
                )));
            }
        }

        let rounds = doc
            .rounds
            .into_iter()
            .map(GameRound::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self {
            game_code: doc.game_code,
            version: doc.version,
            admin_player_id: doc.admin_player_id,
            password: doc.password,
            state: doc.state,
            options: doc.options,
            players: doc.players,
            rounds,
            created_at: doc.created_at,
            started_at: doc.started_at,
            finished_at: doc.finished_at,
            updated_at: doc.updated_at,
            marked_for_deletion: doc.marked_for_deletion,
        })
    }
}

fn corrupt(message: String) -> StoreError {
    StoreError::Corrupt(message)
}

/// Serialize a game into its stored JSON form
pub fn encode(game: &Game) -> StoreResult<String> {
    Ok(serde_json::to_string_pretty(&GameDocument::from(game))?)
}

/// Parse and validate a stored game
pub fn decode(json: &str) -> StoreResult<Game> {
    let doc: GameDocument = serde_json::from_str(json)?;
    Game::try_from(doc)
}
