//! # Sync Engine
//!
//! One sync pass: push then pull for every entity type, in dependency-safe
//! order, under a single pass lock.
//!
//! ## Pass Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine::run_pass                            │
//! │                                                                         │
//! │  lock pass ──► offline? ──yes──► PassOutcome::Offline (no-op)           │
//! │                   │ no                                                  │
//! │                   ▼                                                     │
//! │   categories → cashiers → checkouts → payment-forms → products → sales │
//! │        each: push::<E>()  then  pull::<E>()                             │
//! │                                                                         │
//! │   per-type failure ─────► logged, counted, next type                   │
//! │   Offline mid-pass ─────► PassOutcome::Offline                         │
//! │   SessionExpired ───────► Err(SessionExpired)                          │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │   no failures? ──yes──► sync_meta.last_sync = now                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Parents sync before children, so a product's category already carries
//! its server id by the time the product is pushed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use pdv_core::{Cashier, Category, Checkout, EntityKind, PaymentForm, Product, Sale};
use pdv_db::Database;

use crate::config::SyncConfig;
use crate::contracts::RemoteContract;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{Connectivity, RemoteGateway};
use crate::pull::{PullEngine, PullOptions, PullReport};
use crate::push::{PushEngine, PushReport};

// =============================================================================
// Pass Reports
// =============================================================================

/// Push and pull results for one entity type within a pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPassReport {
    pub entity: EntityKind,
    pub push: Option<PushReport>,
    pub pull: Option<PullReport>,
    /// Push or pull errors that were logged and skipped.
    pub errors: Vec<String>,
}

impl EntityPassReport {
    fn new(entity: EntityKind) -> Self {
        EntityPassReport {
            entity,
            push: None,
            pull: None,
            errors: Vec::new(),
        }
    }

    /// Failed push/pull calls plus individually failed records.
    pub fn failures(&self) -> usize {
        self.errors.len() + self.push.map_or(0, |push| push.failed)
    }
}

/// Result of a completed pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityPassReport>,
}

impl PassReport {
    pub fn failures(&self) -> usize {
        self.entities.iter().map(EntityPassReport::failures).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    /// First logged error, for status reporting.
    pub fn first_error(&self) -> Option<String> {
        self.entities
            .iter()
            .flat_map(|entity| entity.errors.iter())
            .next()
            .cloned()
    }
}

/// How a pass ended when it did not fail outright.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PassOutcome {
    /// Every entity type was visited.
    Completed(PassReport),
    /// The device was or went offline; nothing more was attempted.
    Offline,
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Runs sync passes. Cheap to clone; clones share the pass lock.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    db: Database,
    gateway: Arc<RemoteGateway>,
    push: PushEngine,
    pull: PullEngine,
    pass_lock: Arc<Mutex<()>>,
}

impl SyncEngine {
    /// Creates an engine over an existing gateway.
    pub fn new(db: Database, gateway: Arc<RemoteGateway>, page_limit: u32) -> Self {
        SyncEngine {
            push: PushEngine::new(db.clone(), gateway.clone()),
            pull: PullEngine::new(db.clone(), gateway.clone(), page_limit),
            db,
            gateway,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Builds the gateway from `config` and wraps it in an engine.
    ///
    /// `SyncMode::Offline` starts with `connectivity` marked offline.
    pub fn from_config(
        db: Database,
        config: &SyncConfig,
        connectivity: Connectivity,
    ) -> SyncResult<Self> {
        if !config.is_sync_enabled() {
            connectivity.set_online(false);
        }
        let gateway = RemoteGateway::new(&config.api, db.auth(), connectivity)?;
        Ok(Self::new(db, Arc::new(gateway), config.sync.page_limit))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn gateway(&self) -> &Arc<RemoteGateway> {
        &self.gateway
    }

    pub fn push_engine(&self) -> &PushEngine {
        &self.push
    }

    pub fn pull_engine(&self) -> &PullEngine {
        &self.pull
    }

    pub fn is_online(&self) -> bool {
        self.gateway.connectivity().is_online()
    }

    /// Takes the pass lock without waiting. `None` while a pass is running.
    pub fn try_lock_pass(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.pass_lock).try_lock_owned().ok()
    }

    /// Records still waiting to be pushed, across all tables.
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.db.count_pending().await?)
    }

    pub async fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self.db.sync_meta().last_sync().await?)
    }

    /// Runs one full pass, waiting for any pass already in flight.
    ///
    /// ## Returns
    /// * `Ok(Completed)` - every entity type was visited (some may have failed)
    /// * `Ok(Offline)` - nothing (more) was attempted
    /// * `Err(SessionExpired)` - the user must sign in again
    pub async fn run_pass(&self) -> SyncResult<PassOutcome> {
        let _pass = self.pass_lock.lock().await;

        if !self.is_online() {
            info!("Offline, skipping sync pass");
            return Ok(PassOutcome::Offline);
        }

        let started_at = Utc::now();
        info!("Sync pass started");

        let mut entities = Vec::with_capacity(EntityKind::SYNC_ORDER.len());
        for kind in EntityKind::SYNC_ORDER {
            let result = match kind {
                EntityKind::Category => self.sync_entity::<Category>().await,
                EntityKind::Cashier => self.sync_entity::<Cashier>().await,
                EntityKind::Checkout => self.sync_entity::<Checkout>().await,
                EntityKind::PaymentForm => self.sync_entity::<PaymentForm>().await,
                EntityKind::Product => self.sync_entity::<Product>().await,
                EntityKind::Sale => self.sync_entity::<Sale>().await,
            };

            match result {
                Ok(report) => entities.push(report),
                Err(SyncError::Offline) => {
                    info!(entity = %kind, "Went offline during pass, stopping");
                    return Ok(PassOutcome::Offline);
                }
                Err(e) => {
                    error!(entity = %kind, error = %e, "Sync pass aborted");
                    return Err(e);
                }
            }
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            entities,
        };

        if report.is_clean() {
            self.db.sync_meta().set_last_sync(report.finished_at).await?;
            info!(elapsed_ms = (report.finished_at - started_at).num_milliseconds(), "Sync pass complete");
        } else {
            warn!(failures = report.failures(), "Sync pass finished with failures, watermark kept");
        }

        Ok(PassOutcome::Completed(report))
    }

    /// Push then pull one entity type. Only pass-aborting errors are returned.
    async fn sync_entity<E: RemoteContract>(&self) -> SyncResult<EntityPassReport> {
        let mut report = EntityPassReport::new(E::KIND);

        match self.push.push::<E>().await {
            Ok(push) => report.push = Some(push),
            Err(e) if e.aborts_pass() => return Err(e),
            Err(e) => {
                warn!(entity = %E::KIND, error = %e, "Push failed");
                report.errors.push(format!("push {}: {}", E::KIND, e));
            }
        }

        match self.pull.pull::<E>(PullOptions::default()).await {
            Ok(pull) => report.pull = Some(pull),
            Err(e) if e.aborts_pass() => return Err(e),
            Err(e) => {
                warn!(entity = %E::KIND, error = %e, "Pull failed");
                report.errors.push(format!("pull {}: {}", E::KIND, e));
            }
        }

        debug!(entity = %E::KIND, failures = report.failures(), "Entity synced");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdv_db::DbConfig;

    async fn offline_engine() -> SyncEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = SyncConfig::for_base_url("http://127.0.0.1:9/loja01/");
        SyncEngine::from_config(db, &config, Connectivity::new(false)).unwrap()
    }

    #[tokio::test]
    async fn test_offline_pass_is_noop() {
        let engine = offline_engine().await;

        let outcome = engine.run_pass().await.unwrap();
        assert!(!outcome.is_completed());
        assert!(engine.last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pass_lock_is_exclusive() {
        let engine = offline_engine().await;

        let guard = engine.try_lock_pass().unwrap();
        assert!(engine.clone().try_lock_pass().is_none());
        drop(guard);
        assert!(engine.try_lock_pass().is_some());
    }

    #[test]
    fn test_report_failures_count_records_and_errors() {
        let mut entity = EntityPassReport::new(EntityKind::Product);
        entity.push = Some(PushReport {
            failed: 2,
            ..Default::default()
        });
        entity.errors.push("pull product: boom".into());

        let report = PassReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            entities: vec![entity, EntityPassReport::new(EntityKind::Sale)],
        };

        assert_eq!(report.failures(), 3);
        assert!(!report.is_clean());
        assert_eq!(report.first_error().as_deref(), Some("pull product: boom"));
    }
}
