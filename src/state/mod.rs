//! Session coordinator.
//!
//! `AppState` owns one [`Session`] per active game code. Every mutation for a
//! code runs under that session's writer lock, so at most one mutation per
//! game is in flight while different games proceed independently. Readers
//! see the last committed `Arc<Game>` snapshot and never a half-applied one.

mod lobby;
mod maintenance;
mod round;
mod session;

pub use session::Outcome;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::code::{CodeGenerator, RandomCodeGenerator};
use crate::config::EngineConfig;
use crate::events::EventPublisher;
use crate::scheduler::{FiredTask, ScheduledTaskService};
use crate::store::GameRepository;
use crate::types::*;

use session::Session;

/// Shared application state
pub struct AppState {
    repository: Arc<dyn GameRepository>,
    publisher: Arc<dyn EventPublisher>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    scheduler: ScheduledTaskService,
    sessions: RwLock<HashMap<GameCode, Arc<Session>>>,
    config: EngineConfig,
    /// Taken once by the task dispatcher
    fired_rx: Mutex<Option<mpsc::UnboundedReceiver<FiredTask>>>,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        repository: Arc<dyn GameRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let (scheduler, fired_rx) = ScheduledTaskService::new();
        Self {
            repository,
            publisher,
            codes: Arc::new(RandomCodeGenerator),
            clock: Arc::new(SystemClock),
            scheduler,
            sessions: RwLock::new(HashMap::new()),
            config,
            fired_rx: Mutex::new(Some(fired_rx)),
        }
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &ScheduledTaskService {
        &self.scheduler
    }

    /// Hand out the fired-task receiver; `None` once a dispatcher owns it
    pub async fn take_fired_tasks(&self) -> Option<mpsc::UnboundedReceiver<FiredTask>> {
        self.fired_rx.lock().await.take()
    }

    /// Number of games with a live session in this process
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
