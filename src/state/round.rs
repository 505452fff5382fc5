use std::collections::BTreeMap;

use super::session::Retry;
use super::{AppState, Outcome};
use crate::engine::{self, PhaseChange, Trigger};
use crate::error::GameError;
use crate::events::IntegrationEvent;
use crate::scheduler::{FiredTask, TaskKind};
use crate::types::*;

impl AppState {
    /// Submit or replace a meme; ends the creative phase early once everyone is in
    pub async fn submit_meme(
        &self,
        code: &GameCode,
        round: RoundNumber,
        player_id: &str,
        meme_template_id: &str,
        text_entries: BTreeMap<TextFieldId, String>,
    ) -> Result<Outcome<MemeSubmission>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, now, fx| {
            let submission =
                game.add_submission(round, player_id, meme_template_id, text_entries.clone(), now)?;
            fx.emit(IntegrationEvent::SubmissionReceived {
                round,
                player_id: player_id.to_string(),
            });
            Ok(submission)
        })
        .await
    }

    /// Rate another player's meme; the latest rating for a pair wins
    pub async fn rate_meme(
        &self,
        code: &GameCode,
        round: RoundNumber,
        rater_id: &str,
        target_id: &str,
        score: i32,
    ) -> Result<Outcome<Rating>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, now, fx| {
            let rating = game.add_rating(round, rater_id, target_id, score, now)?;
            fx.emit(IntegrationEvent::RatingReceived {
                round,
                rater_id: rater_id.to_string(),
                target_id: target_id.to_string(),
            });
            Ok(rating)
        })
        .await
    }

    /// Close the creative phase. `false` when it was already closed.
    pub async fn end_creative_phase(
        &self,
        code: &GameCode,
        round: RoundNumber,
    ) -> Result<Outcome<bool>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, now, fx| {
            let ended = game.end_creative_phase(round, now)?;
            if ended {
                fx.phase_changes([PhaseChange::CreativePhaseEnded {
                    round,
                    scoring_deadline: game.round(round).and_then(|r| r.scoring_deadline),
                }]);
            }
            Ok(ended)
        })
        .await
    }

    /// Tally and finish a round. `None` when it was already finished.
    pub async fn end_round(
        &self,
        code: &GameCode,
        round: RoundNumber,
    ) -> Result<Outcome<Option<Vec<RoundScore>>>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, now, fx| {
            let Some(end) = game.end_round(round, now)? else {
                return Ok(None);
            };
            fx.phase_changes([PhaseChange::RoundEnded {
                round: end.round,
                scores: end.scores.clone(),
                game_completed: end.game_completed,
            }]);
            Ok(Some(end.scores))
        })
        .await
    }

    /// Open the round following `after_round`. `None` when that already
    /// happened or the game has moved on.
    pub async fn start_new_round(
        &self,
        code: &GameCode,
        after_round: RoundNumber,
    ) -> Result<Outcome<Option<RoundNumber>>, GameError> {
        self.mutate(code, Retry::OnceOnConflict, |game, now, fx| {
            let changes = engine::advance(game, Trigger::ScoreboardElapsed(after_round), now)?;
            let started = changes.iter().find_map(|c| match c {
                PhaseChange::RoundStarted { round, .. } => Some(*round),
                _ => None,
            });
            fx.phase_changes(changes);
            Ok(started)
        })
        .await
    }

    /// Apply a deadline that fired. Stale deadlines are no-ops.
    pub async fn handle_fired_task(&self, task: FiredTask) -> Result<(), GameError> {
        let trigger = match &task.kind {
            TaskKind::CreativePhaseEnded { round } => Trigger::CreativeDeadline(*round),
            TaskKind::ScorePhaseEnded { round, .. } => Trigger::ScoringDeadline(*round),
            TaskKind::StartNewRound { round } => Trigger::ScoreboardElapsed(*round),
        };
        tracing::debug!(code = %task.game_code, ?trigger, "handling deadline");

        let result = self
            .mutate(&task.game_code, Retry::OnceOnConflict, |game, now, fx| {
                fx.phase_changes(engine::advance(game, trigger, now)?);
                Ok(())
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(GameError::GameNotFound(_)) => {
                tracing::debug!(code = %task.game_code, "deadline for a deleted game");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
