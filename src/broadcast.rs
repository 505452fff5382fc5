use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::events::{EventEnvelope, EventPublisher, PublishError};
use crate::state::AppState;

const RELAY_CAPACITY: usize = 256;

/// Fans integration events out to every connected WebSocket client
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(RELAY_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), PublishError> {
        // Ignore send errors (no receivers connected is fine)
        let _ = self.tx.send(envelope);
        Ok(())
    }
}

/// Spawn the loop that applies fired deadline timers to their games
pub fn spawn_task_dispatcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        let Some(mut fired) = state.take_fired_tasks().await else {
            tracing::warn!("Task dispatcher already running");
            return;
        };
        let weak = Arc::downgrade(&state);
        drop(state);

        while let Some(task) = fired.recv().await {
            let Some(state) = weak.upgrade() else {
                break;
            };
            // Games apply deadlines independently; each writer lock orders its own
            tokio::spawn(async move {
                let code = task.game_code.clone();
                if let Err(e) = state.handle_fired_task(task).await {
                    tracing::warn!(code = %code, error = %e, "Failed to apply deadline");
                }
            });
        }
        tracing::debug!("Task dispatcher stopped");
    });
}

/// Spawn a background task that periodically deletes idle games
pub fn spawn_idle_reaper(state: Arc<AppState>) {
    let period = state.config().reaper_interval;
    let weak = Arc::downgrade(&state);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            match state.reap_idle().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Reaped idle games"),
                Err(e) => tracing::warn!(error = %e, "Idle reaper failed"),
            }
        }
    });
}
