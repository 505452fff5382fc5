//! Integration events published after each successful mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::protocol::LeaderboardEntry;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IntegrationEvent {
    GameCreated {
        admin_player_id: PlayerId,
        is_private: bool,
    },
    PlayerJoined {
        player_id: PlayerId,
        display_name: String,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    AdminChanged {
        admin_player_id: PlayerId,
    },
    PlayerReady {
        player_id: PlayerId,
        is_ready: bool,
    },
    SettingsChanged {
        options: GameOptions,
    },
    GameStarted {
        player_ids: Vec<PlayerId>,
    },
    RoundStarted {
        round: RoundNumber,
        creative_deadline: DateTime<Utc>,
    },
    SubmissionReceived {
        round: RoundNumber,
        player_id: PlayerId,
    },
    RatingReceived {
        round: RoundNumber,
        rater_id: PlayerId,
        target_id: PlayerId,
    },
    CreativePhaseEnded {
        round: RoundNumber,
    },
    ScorePhaseStarted {
        round: RoundNumber,
        memes: Vec<MemeSubmission>,
        scoring_deadline: Option<DateTime<Utc>>,
    },
    RoundEnded {
        round: RoundNumber,
        scores: Vec<RoundScore>,
    },
    GameCompleted {
        leaderboard: Vec<LeaderboardEntry>,
        abandoned: bool,
    },
    GameDeleted,
}

impl IntegrationEvent {
    /// Stable event name, matching the serialized `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            IntegrationEvent::GameCreated { .. } => "game_created",
            IntegrationEvent::PlayerJoined { .. } => "player_joined",
            IntegrationEvent::PlayerLeft { .. } => "player_left",
            IntegrationEvent::AdminChanged { .. } => "admin_changed",
            IntegrationEvent::PlayerReady { .. } => "player_ready",
            IntegrationEvent::SettingsChanged { .. } => "settings_changed",
            IntegrationEvent::GameStarted { .. } => "game_started",
            IntegrationEvent::RoundStarted { .. } => "round_started",
            IntegrationEvent::SubmissionReceived { .. } => "submission_received",
            IntegrationEvent::RatingReceived { .. } => "rating_received",
            IntegrationEvent::CreativePhaseEnded { .. } => "creative_phase_ended",
            IntegrationEvent::ScorePhaseStarted { .. } => "score_phase_started",
            IntegrationEvent::RoundEnded { .. } => "round_ended",
            IntegrationEvent::GameCompleted { .. } => "game_completed",
            IntegrationEvent::GameDeleted => "game_deleted",
        }
    }
}

/// An event addressed to one game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    pub game_code: GameCode,
    #[serde(flatten)]
    pub event: IntegrationEvent,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Failed(String),
}

/// Outbound notification sink.
///
/// Delivery is best-effort; the coordinator logs failures and moves on.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), PublishError>;
}

/// Records every envelope; handy for tests and debugging
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<EventEnvelope>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<EventEnvelope> {
        self.published.lock().await.clone()
    }

    /// Event names published for one game, in order
    pub async fn names_for(&self, game_code: &GameCode) -> Vec<&'static str> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|e| &e.game_code == game_code)
            .map(|e| e.event.name())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), PublishError> {
        self.published.lock().await.push(envelope);
        Ok(())
    }
}
