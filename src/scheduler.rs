//! Process-local timers that fire phase deadlines.
//!
//! A fired task is delivered over a channel instead of calling back into the
//! coordinator, so the scheduler has no dependency on the session layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::types::{GameCode, MemeId, RoundNumber};

pub const MIN_DELAY_SECONDS: u64 = 1;
pub const MAX_DELAY_SECONDS: u64 = 120;

pub type TaskId = Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    CreativePhaseEnded {
        round: RoundNumber,
    },
    /// `meme_id` narrows the deadline to one meme; scoring is a single phase
    /// per round here, so it is carried for logging only
    ScorePhaseEnded {
        round: RoundNumber,
        meme_id: Option<MemeId>,
    },
    StartNewRound {
        round: RoundNumber,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTask {
    pub id: TaskId,
    pub game_code: GameCode,
    pub kind: TaskKind,
}

struct PendingTask {
    game_code: GameCode,
    handle: JoinHandle<()>,
}

/// Arms and cancels deadline timers.
///
/// Each task fires at most once. Firing and cancelling race on the same map
/// entry: whoever removes it first wins, so a cancelled task never fires and a
/// fired task cannot be cancelled.
pub struct ScheduledTaskService {
    tasks: Arc<Mutex<HashMap<TaskId, PendingTask>>>,
    fired_tx: mpsc::UnboundedSender<FiredTask>,
}

impl ScheduledTaskService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTask>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let service = Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        };
        (service, fired_rx)
    }

    pub async fn schedule_creative_phase_ended(
        &self,
        game_code: &GameCode,
        round: RoundNumber,
        delay_seconds: u64,
    ) -> TaskId {
        self.schedule(game_code, TaskKind::CreativePhaseEnded { round }, delay_seconds)
            .await
    }

    pub async fn schedule_score_phase_ended(
        &self,
        game_code: &GameCode,
        round: RoundNumber,
        meme_id: Option<MemeId>,
        delay_seconds: u64,
    ) -> TaskId {
        self.schedule(
            game_code,
            TaskKind::ScorePhaseEnded { round, meme_id },
            delay_seconds,
        )
        .await
    }

    pub async fn schedule_start_new_round(
        &self,
        game_code: &GameCode,
        round: RoundNumber,
        delay_seconds: u64,
    ) -> TaskId {
        self.schedule(game_code, TaskKind::StartNewRound { round }, delay_seconds)
            .await
    }

    /// Cancel a pending task. Returns false if it already fired or never existed.
    pub async fn cancel_task(&self, id: TaskId) -> bool {
        match self.tasks.lock().await.remove(&id) {
            Some(task) => {
                task.handle.abort();
                tracing::debug!(code = %task.game_code, task = %id, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task for a game, returning how many were cancelled
    pub async fn cancel_all_tasks_for_game(&self, game_code: &GameCode) -> usize {
        let mut tasks = self.tasks.lock().await;
        let ids: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, task)| &task.game_code == game_code)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(task) = tasks.remove(id) {
                task.handle.abort();
            }
        }
        if !ids.is_empty() {
            tracing::debug!(code = %game_code, count = ids.len(), "timers cancelled");
        }
        ids.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn pending_for_game(&self, game_code: &GameCode) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|task| &task.game_code == game_code)
            .count()
    }

    async fn schedule(&self, game_code: &GameCode, kind: TaskKind, delay_seconds: u64) -> TaskId {
        let delay = Duration::from_secs(clamp_delay(delay_seconds));
        let id = Ulid::new();

        // Held across spawn + insert so the task cannot look itself up early
        let mut tasks = self.tasks.lock().await;

        let registry = self.tasks.clone();
        let fired_tx = self.fired_tx.clone();
        let fired = FiredTask {
            id,
            game_code: game_code.clone(),
            kind: kind.clone(),
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if registry.lock().await.remove(&id).is_none() {
                return;
            }
            tracing::debug!(code = %fired.game_code, task = %id, kind = ?fired.kind, "timer fired");
            // Receiver gone means the process is shutting down
            let _ = fired_tx.send(fired);
        });

        tasks.insert(
            id,
            PendingTask {
                game_code: game_code.clone(),
                handle,
            },
        );
        tracing::debug!(code = %game_code, task = %id, ?kind, delay_secs = delay.as_secs(), "timer armed");
        id
    }
}

fn clamp_delay(delay_seconds: u64) -> u64 {
    let clamped = delay_seconds.clamp(MIN_DELAY_SECONDS, MAX_DELAY_SECONDS);
    if clamped != delay_seconds {
        tracing::warn!(
            requested = delay_seconds,
            used = clamped,
            "timer delay outside {MIN_DELAY_SECONDS}..={MAX_DELAY_SECONDS}s, clamping"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> GameCode {
        GameCode::parse("TMR234").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_fires_once_after_delay() {
        let (scheduler, mut rx) = ScheduledTaskService::new();
        let id = scheduler
            .schedule_creative_phase_ended(&code(), 1, 5)
            .await;
        assert_eq!(scheduler.pending_count().await, 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, id);
        assert_eq!(fired.kind, TaskKind::CreativePhaseEnded { round: 1 });
        assert_eq!(scheduler.pending_count().await, 0);

        // Too late to cancel
        assert!(!scheduler.cancel_task(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_fires() {
        let (scheduler, mut rx) = ScheduledTaskService::new();
        let id = scheduler
            .schedule_score_phase_ended(&code(), 2, None, 3)
            .await;
        assert!(scheduler.cancel_task(id).await);
        assert!(!scheduler.cancel_task(id).await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_clamped() {
        let (scheduler, mut rx) = ScheduledTaskService::new();
        scheduler.schedule_start_new_round(&code(), 1, 0).await;
        scheduler.schedule_start_new_round(&code(), 2, 600).await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, TaskKind::StartNewRound { round: 1 });
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(MAX_DELAY_SECONDS)).await;
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, TaskKind::StartNewRound { round: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_is_scoped_to_game() {
        let (scheduler, mut rx) = ScheduledTaskService::new();
        let other = GameCode::parse("XYZ789").unwrap();
        scheduler.schedule_creative_phase_ended(&code(), 1, 5).await;
        scheduler.schedule_start_new_round(&code(), 1, 5).await;
        scheduler.schedule_creative_phase_ended(&other, 1, 5).await;

        assert_eq!(scheduler.cancel_all_tasks_for_game(&code()).await, 2);
        assert_eq!(scheduler.pending_for_game(&other).await, 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.game_code, other);
        assert!(rx.try_recv().is_err());
    }
}
