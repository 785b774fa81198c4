//! # Sync Agent
//!
//! Background task that runs sync passes on a timer and on demand, and
//! reports what happened.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │   Host / UI                          SyncAgent task                    │
//! │  ┌─────────────────┐  SyncCommand   ┌──────────────────────────────┐   │
//! │  │ SyncAgentHandle │ ─────────────► │  tokio::select! {            │   │
//! │  │                 │  START_SYNC    │    interval.tick()  → pass   │   │
//! │  │  start()        │  STOP_SYNC     │    force.notified() → pass   │   │
//! │  │  stop()         │  FORCE_SYNC    │    commands.recv()           │   │
//! │  │  force_sync()   │  SHUTDOWN      │  }                           │   │
//! │  │  status()       │                └──────────────┬───────────────┘   │
//! │  │  subscribe()    │ ◄─────────────────────────────┘                   │
//! │  └─────────────────┘   SyncEvent (broadcast + SyncEventEmitter)        │
//! │                                                                         │
//! │  EVENTS:                                                               │
//! │  ───────                                                               │
//! │  { "type": "SYNC_STARTED" }                                            │
//! │  { "type": "SYNC_STOPPED" }                                            │
//! │  { "type": "SYNC_COMPLETE", "timestamp": "..." }                       │
//! │  { "type": "SYNC_ERROR", "error": "...", "timestamp": "..." }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## States
//! `stopped` ──START_SYNC──► `running` (pass now, then every interval)
//! ──STOP_SYNC──► `stopped`. FORCE_SYNC runs one extra pass in either state;
//! requests that arrive during a pass collapse into one more pass.
//! `SessionExpired` stops the schedule.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::engine::{PassOutcome, SyncEngine};
use crate::error::{SyncError, SyncResult};

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Commands and Events
// =============================================================================

/// Inbound control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncCommand {
    #[serde(rename = "START_SYNC")]
    Start,
    #[serde(rename = "STOP_SYNC")]
    Stop,
    #[serde(rename = "FORCE_SYNC")]
    Force,
    #[serde(rename = "SHUTDOWN")]
    Shutdown,
}

/// Outbound notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    SyncStarted,
    SyncStopped,
    SyncComplete {
        timestamp: DateTime<Utc>,
    },
    SyncError {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

// =============================================================================
// Agent Status
// =============================================================================

/// Whether the periodic schedule is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Stopped,
    Running,
}

/// Snapshot for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub state: AgentState,

    /// Host-reported connectivity.
    pub online: bool,

    /// End of the last clean pass.
    pub last_sync: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,

    /// Records waiting to be pushed.
    pub pending_count: i64,

    /// Passes that reached the server.
    pub passes_run: u64,

    pub mode: SyncMode,
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus {
            state: AgentState::Stopped,
            online: true,
            last_sync: None,
            last_error: None,
            pending_count: 0,
            passes_run: 0,
            mode: SyncMode::Auto,
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Host hook for sync events, in addition to [`SyncAgentHandle::subscribe`].
pub trait SyncEventEmitter: Send + Sync {
    fn emit(&self, event: &SyncEvent);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit(&self, _event: &SyncEvent) {}
}

/// Logs every event through `tracing`.
pub struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit(&self, event: &SyncEvent) {
        match event {
            SyncEvent::SyncError { error, .. } => warn!(%error, "SYNC_ERROR"),
            other => info!(event = ?other, "Sync event"),
        }
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

/// The background task. Created and owned through [`SyncAgent::spawn`].
pub struct SyncAgent {
    engine: SyncEngine,
    interval: Duration,
    status: Arc<RwLock<AgentStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    events: broadcast::Sender<SyncEvent>,
    commands: mpsc::Receiver<SyncCommand>,
    force: Arc<Notify>,
    ticker: Option<Interval>,
}

impl SyncAgent {
    /// Spawns an agent with the no-op emitter.
    pub fn spawn(engine: SyncEngine, config: &SyncConfig) -> SyncAgentHandle {
        Self::spawn_with_emitter(engine, config, Arc::new(NoOpEmitter))
    }

    /// Spawns an agent. In `SyncMode::Auto` the schedule starts immediately.
    pub fn spawn_with_emitter(
        engine: SyncEngine,
        config: &SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> SyncAgentHandle {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let force = Arc::new(Notify::new());
        let status = Arc::new(RwLock::new(AgentStatus {
            mode: config.mode(),
            online: engine.is_online(),
            ..Default::default()
        }));

        let agent = SyncAgent {
            engine: engine.clone(),
            interval: config.interval(),
            status: status.clone(),
            emitter,
            events: events.clone(),
            commands: command_rx,
            force: force.clone(),
            ticker: None,
        };

        let autostart = config.mode().starts_automatically();
        let task = tokio::spawn(agent.run(autostart));

        SyncAgentHandle {
            commands: command_tx,
            force,
            status,
            events,
            engine,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(mut self, autostart: bool) {
        info!(interval_secs = self.interval.as_secs(), "Sync agent starting");

        if autostart {
            self.start().await;
        }

        loop {
            tokio::select! {
                _ = next_tick(&mut self.ticker) => {
                    self.run_pass().await;
                }

                _ = self.force.notified() => {
                    debug!("Forced sync pass");
                    self.run_pass().await;
                }

                command = self.commands.recv() => match command {
                    Some(SyncCommand::Start) => self.start().await,
                    Some(SyncCommand::Stop) => self.stop().await,
                    Some(SyncCommand::Force) => self.force.notify_one(),
                    Some(SyncCommand::Shutdown) | None => {
                        info!("Sync agent received shutdown");
                        break;
                    }
                },
            }
        }

        if self.ticker.take().is_some() {
            self.set_state(AgentState::Stopped).await;
            self.emit(SyncEvent::SyncStopped);
        }
        info!("Sync agent stopped");
    }

    async fn start(&mut self) {
        if self.ticker.is_some() {
            debug!("Sync schedule already running");
            return;
        }

        // The first tick completes immediately, so a pass runs right away.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        self.set_state(AgentState::Running).await;
        self.emit(SyncEvent::SyncStarted);
        info!("Sync schedule started");
    }

    async fn stop(&mut self) {
        if self.ticker.take().is_none() {
            debug!("Sync schedule already stopped");
            return;
        }

        self.set_state(AgentState::Stopped).await;
        self.emit(SyncEvent::SyncStopped);
        info!("Sync schedule stopped");
    }

    async fn run_pass(&mut self) {
        let outcome = self.engine.run_pass().await;

        match outcome {
            Ok(PassOutcome::Completed(report)) => {
                {
                    let mut status = self.status.write().await;
                    status.passes_run += 1;
                    if report.is_clean() {
                        status.last_sync = Some(report.finished_at);
                        status.last_error = None;
                    } else {
                        status.last_error = report.first_error();
                    }
                }
                self.emit(SyncEvent::SyncComplete {
                    timestamp: report.finished_at,
                });
            }
            Ok(PassOutcome::Offline) => {
                debug!("Pass skipped while offline");
            }
            Err(e) => {
                error!(error = %e, "Sync pass failed");
                self.status.write().await.last_error = Some(e.to_string());
                self.emit(SyncEvent::SyncError {
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });

                if matches!(e, SyncError::SessionExpired) {
                    warn!("Session expired, stopping sync schedule");
                    self.stop().await;
                }
            }
        }

        self.refresh_counters().await;
    }

    async fn refresh_counters(&self) {
        let pending = self.engine.pending_count().await;
        let mut status = self.status.write().await;
        status.online = self.engine.is_online();
        match pending {
            Ok(count) => status.pending_count = count,
            Err(e) => warn!(error = %e, "Could not count pending records"),
        }
    }

    async fn set_state(&self, state: AgentState) {
        self.status.write().await.state = state;
    }

    fn emit(&self, event: SyncEvent) {
        self.emitter.emit(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Waits for the next tick, or forever while the schedule is stopped.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running SyncAgent from outside. Cheap to clone.
#[derive(Clone)]
pub struct SyncAgentHandle {
    commands: mpsc::Sender<SyncCommand>,
    force: Arc<Notify>,
    status: Arc<RwLock<AgentStatus>>,
    events: broadcast::Sender<SyncEvent>,
    engine: SyncEngine,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncAgentHandle {
    /// Sends a command to the agent.
    pub async fn send(&self, command: SyncCommand) -> SyncResult<()> {
        if command == SyncCommand::Force {
            return self.force_sync();
        }

        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ChannelError("Sync agent is not running".into()))
    }

    /// START_SYNC.
    pub async fn start(&self) -> SyncResult<()> {
        self.send(SyncCommand::Start).await
    }

    /// STOP_SYNC. A pass already running finishes.
    pub async fn stop(&self) -> SyncResult<()> {
        self.send(SyncCommand::Stop).await
    }

    /// FORCE_SYNC: one extra pass, without touching the schedule.
    ///
    /// Requests made while a pass is running collapse into one more pass.
    /// Offline, the pass is a no-op.
    pub fn force_sync(&self) -> SyncResult<()> {
        if self.commands.is_closed() {
            return Err(SyncError::ShuttingDown);
        }
        self.force.notify_one();
        Ok(())
    }

    /// Stops the agent and waits for it, including any pass in flight.
    pub async fn shutdown(&self) -> SyncResult<()> {
        // Already gone is fine.
        let _ = self.commands.send(SyncCommand::Shutdown).await;

        if let Some(task) = self.task.lock().await.take() {
            task.await
                .map_err(|e| SyncError::ChannelError(format!("Sync agent task failed: {}", e)))?;
        }
        Ok(())
    }

    /// Current status, with fresh online flag and pending count.
    pub async fn status(&self) -> AgentStatus {
        let mut status = self.status.read().await.clone();
        status.online = self.engine.is_online();
        if let Ok(pending) = self.engine.pending_count().await {
            status.pending_count = pending;
        }
        if status.last_sync.is_none() {
            status.last_sync = self.engine.last_sync().await.ok().flatten();
        }
        status
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Updates connectivity. Coming back online while the schedule is
    /// running triggers a pass.
    pub async fn set_online(&self, online: bool) -> SyncResult<()> {
        let was_online = self.engine.gateway().connectivity().set_online(online);
        self.status.write().await.online = online;

        if online && !was_online && self.status.read().await.state == AgentState::Running {
            self.force_sync()?;
        }
        Ok(())
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Connectivity;
    use pdv_db::{Database, DbConfig};
    use tokio::time::timeout;

    async fn offline_agent(mode: SyncMode) -> SyncAgentHandle {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = SyncConfig::for_base_url("http://127.0.0.1:9/loja01/");
        config.sync.mode = mode;
        let engine = SyncEngine::from_config(db, &config, Connectivity::new(false)).unwrap();
        SyncAgent::spawn(engine, &config)
    }

    async fn next_event(rx: &mut broadcast::Receiver<SyncEvent>) -> SyncEvent {
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn test_event_wire_format() {
        let event = SyncEvent::SyncStarted;
        assert_eq!(serde_json::to_value(&event).unwrap(), serde_json::json!({ "type": "SYNC_STARTED" }));

        let event = SyncEvent::SyncError {
            error: "Device is offline".into(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "SYNC_ERROR");
        assert_eq!(value["error"], "Device is offline");
    }

    #[test]
    fn test_command_wire_format() {
        let command: SyncCommand = serde_json::from_str(r#"{"type":"FORCE_SYNC"}"#).unwrap();
        assert_eq!(command, SyncCommand::Force);
        assert_eq!(
            serde_json::to_string(&SyncCommand::Start).unwrap(),
            r#"{"type":"START_SYNC"}"#
        );
    }

    #[tokio::test]
    async fn test_start_and_stop_emit_events() {
        let handle = offline_agent(SyncMode::Manual).await;
        let mut events = handle.subscribe();
        assert_eq!(handle.status().await.state, AgentState::Stopped);

        handle.start().await.unwrap();
        assert_eq!(next_event(&mut events).await, SyncEvent::SyncStarted);
        assert_eq!(handle.status().await.state, AgentState::Running);

        handle.stop().await.unwrap();
        assert_eq!(next_event(&mut events).await, SyncEvent::SyncStopped);
        assert_eq!(handle.status().await.state, AgentState::Stopped);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_sync_offline_is_quiet() {
        let handle = offline_agent(SyncMode::Manual).await;

        handle.force_sync().unwrap();
        handle.force_sync().unwrap();
        handle.shutdown().await.unwrap();

        let status = handle.status().await;
        assert!(!status.online);
        assert_eq!(status.passes_run, 0);
        assert!(status.last_error.is_none());
        assert!(handle.force_sync().is_err());
    }
}
