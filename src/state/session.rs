use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::AppState;
use crate::engine::{self, PhaseChange};
use crate::error::GameError;
use crate::events::{EventEnvelope, IntegrationEvent};
use crate::protocol;
use crate::scheduler::{TaskId, MAX_DELAY_SECONDS};
use crate::store::StoreError;
use crate::types::*;

/// Per-game single writer plus the last committed snapshot
pub(super) struct Session {
    pub(super) writer: Mutex<SessionSlot>,
    pub(super) snapshot: RwLock<Option<Arc<Game>>>,
}

impl Session {
    pub(super) fn new() -> Self {
        Self {
            writer: Mutex::new(SessionSlot::default()),
            snapshot: RwLock::new(None),
        }
    }

    pub(super) fn with_snapshot(game: Arc<Game>) -> Self {
        Self {
            writer: Mutex::new(SessionSlot::default()),
            snapshot: RwLock::new(Some(game)),
        }
    }
}

/// State only touched while holding the writer lock
#[derive(Default)]
pub(super) struct SessionSlot {
    /// The one deadline timer currently armed for this game
    pending_task: Option<TaskId>,
    /// Set once the game is deleted; waiters queued behind the deletion bail out
    retired: bool,
}

/// What a mutation produced, in addition to its return value
#[derive(Default)]
pub(super) struct Effects {
    events: Vec<IntegrationEvent>,
    changes: Vec<PhaseChange>,
}

impl Effects {
    pub(super) fn emit(&mut self, event: IntegrationEvent) {
        self.events.push(event);
    }

    pub(super) fn phase_changes(&mut self, changes: impl IntoIterator<Item = PhaseChange>) {
        self.changes.extend(changes);
    }
}

/// Result of a coordinator command
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    /// Snapshot after the command; `None` once the game was deleted
    pub game: Option<Arc<Game>>,
    /// Events published by this command, in order
    pub events: Vec<IntegrationEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Retry {
    Never,
    /// Re-run once against a fresh load when the store reports a lost race.
    /// Only for commands whose effect is the same when applied twice.
    OnceOnConflict,
}

impl AppState {
    pub(super) async fn session_for(&self, code: &GameCode) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(code) {
            return session.clone();
        }
        self.sessions
            .write()
            .await
            .entry(code.clone())
            .or_insert_with(|| Arc::new(Session::new()))
            .clone()
    }

    async fn forget_session(&self, code: &GameCode, session: &Arc<Session>) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(code).is_some_and(|s| Arc::ptr_eq(s, session)) {
            sessions.remove(code);
        }
    }

    /// Current snapshot of a game; does not take the writer lock
    pub async fn get_game(&self, code: &GameCode) -> Result<Arc<Game>, GameError> {
        let session = self.sessions.read().await.get(code).cloned();
        if let Some(session) = session {
            if let Some(game) = session.snapshot.read().await.clone() {
                return Ok(game);
            }
        }
        // Only writers populate the cache, so a slow read can never
        // overwrite a newer snapshot
        self.repository
            .get_by_game_code(code)
            .await?
            .map(Arc::new)
            .ok_or_else(|| GameError::GameNotFound(code.clone()))
    }

    /// Run one command against a game under its writer lock.
    ///
    /// The command mutates a private copy; the copy is persisted and swapped
    /// in only if the command and the round engine both succeed.
    pub(super) async fn mutate<T, F>(
        &self,
        code: &GameCode,
        retry: Retry,
        op: F,
    ) -> Result<Outcome<T>, GameError>
    where
        F: Fn(&mut Game, DateTime<Utc>, &mut Effects) -> Result<T, GameError>,
    {
        let session = self.session_for(code).await;
        let mut slot = session.writer.lock().await;
        if slot.retired {
            return Err(GameError::GameNotFound(code.clone()));
        }

        let mut fresh = false;
        loop {
            let current = match self.load_locked(&session, &mut slot, code, fresh).await {
                Ok(game) => game,
                Err(e) => {
                    if matches!(e, GameError::GameNotFound(_)) {
                        slot.retired = true;
                        self.forget_session(code, &session).await;
                    }
                    return Err(e);
                }
            };

            let now = self.clock.now();
            let mut game = (*current).clone();
            let mut effects = Effects::default();
            let value = op(&mut game, now, &mut effects)?;
            if !game.marked_for_deletion {
                effects.changes.extend(engine::settle(&mut game, now)?);
            }

            if game == *current {
                return Ok(Outcome {
                    value,
                    game: Some(current),
                    events: Vec::new(),
                });
            }

            if game.marked_for_deletion {
                let events = self
                    .delete_locked(&session, &mut slot, code, effects.events)
                    .await?;
                return Ok(Outcome {
                    value,
                    game: None,
                    events,
                });
            }

            game.version = current.version + 1;
            game.updated_at = now;

            match self.repository.update(&game, current.version).await {
                Ok(()) => {
                    let game = Arc::new(game);
                    *session.snapshot.write().await = Some(game.clone());

                    for change in &effects.changes {
                        tracing::info!(code = %code, ?change, "phase change");
                    }
                    let mut events = effects.events;
                    events.extend(phase_events(&game, &effects.changes));
                    self.rearm_timers(&mut slot, &game, &effects.changes).await;
                    self.publish(code, &events).await;

                    return Ok(Outcome {
                        value,
                        game: Some(game),
                        events,
                    });
                }
                Err(StoreError::VersionConflict {
                    expected, actual, ..
                }) if retry == Retry::OnceOnConflict && !fresh => {
                    tracing::warn!(code = %code, expected, actual, "version conflict, retrying once");
                    fresh = true;
                }
                Err(e) => {
                    if matches!(e, StoreError::VersionConflict { .. }) {
                        tracing::warn!(code = %code, error = %e, "version conflict");
                        // Next command reloads from the store
                        *session.snapshot.write().await = None;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Load the snapshot, from the store when `fresh` or not cached.
    /// A game loaded from the store gets its deadline timer re-armed.
    pub(super) async fn load_locked(
        &self,
        session: &Session,
        slot: &mut SessionSlot,
        code: &GameCode,
        fresh: bool,
    ) -> Result<Arc<Game>, GameError> {
        if !fresh {
            if let Some(game) = session.snapshot.read().await.clone() {
                return Ok(game);
            }
        }

        let game = self
            .repository
            .get_by_game_code(code)
            .await?
            .map(Arc::new)
            .ok_or_else(|| GameError::GameNotFound(code.clone()))?;
        *session.snapshot.write().await = Some(game.clone());

        if slot.pending_task.is_none() {
            self.resume_timer(slot, &game).await;
        }
        Ok(game)
    }

    /// Arm the timer for whatever phase a freshly loaded game is in
    async fn resume_timer(&self, slot: &mut SessionSlot, game: &Game) {
        let Some(round) = game.current_round() else {
            return;
        };
        let code = &game.game_code;
        let now = self.clock.now();
        let remaining = |deadline: DateTime<Utc>| (deadline - now).num_seconds().max(1) as u64;

        let id = match (game.state, round.phase) {
            (GameState::InProgress, RoundPhase::Creative) => {
                self.scheduler
                    .schedule_creative_phase_ended(
                        code,
                        round.round_number,
                        remaining(round.creative_deadline),
                    )
                    .await
            }
            (GameState::Scoring, RoundPhase::Scoring) => {
                let deadline = round.scoring_deadline.unwrap_or(now);
                self.scheduler
                    .schedule_score_phase_ended(code, round.round_number, None, remaining(deadline))
                    .await
            }
            (GameState::Scoring, RoundPhase::Finished)
                if round.round_number < game.options.number_of_rounds =>
            {
                let pause = chrono::Duration::seconds(
                    game.options.scoreboard_seconds.min(MAX_DELAY_SECONDS) as i64,
                );
                let deadline = round.finished_at.unwrap_or(now) + pause;
                self.scheduler
                    .schedule_start_new_round(code, round.round_number, remaining(deadline))
                    .await
            }
            _ => return,
        };
        tracing::info!(code = %code, round = round.round_number, "resumed deadline timer");
        slot.pending_task = Some(id);
    }

    async fn rearm_timers(&self, slot: &mut SessionSlot, game: &Game, changes: &[PhaseChange]) {
        let code = &game.game_code;
        if game.state == GameState::Completed {
            slot.pending_task = None;
            self.scheduler.cancel_all_tasks_for_game(code).await;
            return;
        }

        // Only the latest phase needs a deadline
        let Some(last) = changes.last() else {
            return;
        };
        if let Some(previous) = slot.pending_task.take() {
            self.scheduler.cancel_task(previous).await;
        }

        let options = &game.options;
        let id = match last {
            PhaseChange::RoundStarted { round, .. } => {
                self.scheduler
                    .schedule_creative_phase_ended(code, *round, options.creative_seconds)
                    .await
            }
            PhaseChange::CreativePhaseEnded { round, .. } => {
                self.scheduler
                    .schedule_score_phase_ended(code, *round, None, options.scoring_seconds)
                    .await
            }
            PhaseChange::RoundEnded { round, .. } => {
                self.scheduler
                    .schedule_start_new_round(code, *round, options.scoreboard_seconds)
                    .await
            }
        };
        slot.pending_task = Some(id);
    }

    /// Remove a game for good: store, timers, and session
    async fn delete_locked(
        &self,
        session: &Arc<Session>,
        slot: &mut SessionSlot,
        code: &GameCode,
        mut events: Vec<IntegrationEvent>,
    ) -> Result<Vec<IntegrationEvent>, GameError> {
        self.repository.delete(code).await?;

        slot.retired = true;
        slot.pending_task = None;
        *session.snapshot.write().await = None;
        let cancelled = self.scheduler.cancel_all_tasks_for_game(code).await;
        self.forget_session(code, session).await;
        tracing::info!(code = %code, cancelled_timers = cancelled, "game deleted");

        events.push(IntegrationEvent::GameDeleted);
        self.publish(code, &events).await;
        Ok(events)
    }

    /// Delete a game through its writer lock, provided `still_applies` holds
    /// for the current snapshot. Returns whether the game was deleted.
    pub(super) async fn delete_if<P>(&self, code: &GameCode, still_applies: P) -> Result<bool, GameError>
    where
        P: Fn(&Game) -> bool,
    {
        let session = self.session_for(code).await;
        let mut slot = session.writer.lock().await;
        if slot.retired {
            return Ok(false);
        }

        let current = match self.load_locked(&session, &mut slot, code, true).await {
            Ok(game) => game,
            Err(GameError::GameNotFound(_)) => {
                slot.retired = true;
                self.forget_session(code, &session).await;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if !still_applies(&current) {
            return Ok(false);
        }

        self.delete_locked(&session, &mut slot, code, Vec::new())
            .await?;
        Ok(true)
    }

    pub(super) async fn register_session(&self, game: Arc<Game>) {
        self.sessions
            .write()
            .await
            .insert(game.game_code.clone(), Arc::new(Session::with_snapshot(game)));
    }

    pub(super) async fn is_active(&self, code: &GameCode) -> bool {
        self.sessions.read().await.contains_key(code)
    }

    /// Fire-and-forget delivery; failures are logged, never surfaced
    pub(super) async fn publish(&self, code: &GameCode, events: &[IntegrationEvent]) {
        let published_at = self.clock.now();
        for event in events {
            let name = event.name();
            let envelope = EventEnvelope {
                game_code: code.clone(),
                event: event.clone(),
                published_at,
            };
            match self.publisher.publish(envelope).await {
                Ok(()) => tracing::debug!(code = %code, event = name, "event published"),
                Err(e) => tracing::warn!(code = %code, event = name, error = %e, "failed to publish event"),
            }
        }
    }
}

/// Integration events describing a sequence of phase changes
fn phase_events(game: &Game, changes: &[PhaseChange]) -> Vec<IntegrationEvent> {
    let mut events = Vec::new();
    for change in changes {
        match change {
            PhaseChange::RoundStarted {
                round,
                creative_deadline,
            } => events.push(IntegrationEvent::RoundStarted {
                round: *round,
                creative_deadline: *creative_deadline,
            }),
            PhaseChange::CreativePhaseEnded {
                round,
                scoring_deadline,
            } => {
                events.push(IntegrationEvent::CreativePhaseEnded { round: *round });
                events.push(IntegrationEvent::ScorePhaseStarted {
                    round: *round,
                    memes: game
                        .round(*round)
                        .map(|r| r.submissions.values().cloned().collect())
                        .unwrap_or_default(),
                    scoring_deadline: *scoring_deadline,
                });
            }
            PhaseChange::RoundEnded {
                round,
                scores,
                game_completed,
            } => {
                events.push(IntegrationEvent::RoundEnded {
                    round: *round,
                    scores: scores.clone(),
                });
                if *game_completed {
                    events.push(IntegrationEvent::GameCompleted {
                        leaderboard: protocol::leaderboard(game),
                        abandoned: false,
                    });
                }
            }
        }
    }
    events
}
