//! # Push Engine
//!
//! Drains locally pending mutations to the server, one entity type at a
//! time.
//!
//! ## Per-Record Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          push::<E>()                                    │
//! │                                                                         │
//! │  pending-delete ──► DELETE {E}/{id} ──► 2xx or 404 ──► remove locally   │
//! │                                                                         │
//! │  parent still pending-create? ──► left pending (counted as deferred)    │
//! │                                                                         │
//! │  pending-create ──► POST {E} (no id, no syncStatus)                    │
//! │                        │                                               │
//! │                        ▼                                               │
//! │                 normalize response ──no id──► stays pending-create     │
//! │                        │                        (counted as failed)     │
//! │                        ▼                                               │
//! │                 re-read local row:                                     │
//! │                   unchanged ──► replace(client id → server id), synced │
//! │                   edited    ──► replace, keep local fields, pending-upd│
//! │                   deleted   ──► store server id as pending-delete      │
//! │                        │                                               │
//! │                        ▼                                               │
//! │                 id changed? ──► ReferencePropagator                    │
//! │                                                                         │
//! │  pending-update ──► PUT {E}/{id} ──► mark synced                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Store Lock
//! The network call runs unlocked. Reading back the local row and writing
//! the outcome happen under [`PushEngine::lock_store`], which foreground
//! mutations also hold for their read-modify-write.
//!
//! ## Failure Isolation
//! A failing record is logged, counted in [`PushReport::failed`], and left
//! pending for the next pass. `Offline` and `SessionExpired` stop the push
//! at once and are returned.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use pdv_core::SyncStatus;
use pdv_db::Database;

use crate::contracts::{normalize_created, RemoteContract};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::propagate::ReferencePropagator;

// =============================================================================
// Reports
// =============================================================================

/// What happened to one pushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Created on the server; `new_id` replaced `old_id` locally and
    /// `references_rewritten` dependents were re-pointed.
    Created {
        old_id: String,
        new_id: String,
        references_rewritten: usize,
    },
    Updated,
    Deleted,
    /// The record was already synced.
    Unchanged,
    /// Not sent: it references a parent that is still `pending-create`.
    Deferred,
}

/// Counts for one `push::<E>()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Left pending behind an unpushed parent.
    pub deferred: usize,
    /// Dependent records re-pointed at server-assigned ids.
    pub references_rewritten: usize,
}

impl PushReport {
    pub fn pushed(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.deferred == 0
    }

    fn record(&mut self, outcome: &PushOutcome) {
        match outcome {
            PushOutcome::Created {
                references_rewritten,
                ..
            } => {
                self.created += 1;
                self.references_rewritten += references_rewritten;
            }
            PushOutcome::Updated => self.updated += 1,
            PushOutcome::Deleted => self.deleted += 1,
            PushOutcome::Deferred => self.deferred += 1,
            PushOutcome::Unchanged => {}
        }
    }
}

// =============================================================================
// Push Engine
// =============================================================================

/// Sends pending local mutations to the server.
#[derive(Debug, Clone)]
pub struct PushEngine {
    db: Database,
    gateway: Arc<RemoteGateway>,
    propagator: ReferencePropagator,
    store_lock: Arc<Mutex<()>>,
}

impl PushEngine {
    pub fn new(db: Database, gateway: Arc<RemoteGateway>) -> Self {
        PushEngine {
            propagator: ReferencePropagator::new(db.clone()),
            db,
            gateway,
            store_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serializes read-modify-write sequences on the local store.
    ///
    /// Never held across a network call.
    pub async fn lock_store(&self) -> MutexGuard<'_, ()> {
        self.store_lock.lock().await
    }

    /// Pushes every pending record of type `E`.
    ///
    /// ## Returns
    /// * `Ok(PushReport)` - per-record failures are counted, not returned
    /// * `Err(Offline | SessionExpired)` - the push stopped early
    /// * `Err(Database)` - the pending set could not be read
    pub async fn push<E: RemoteContract>(&self) -> SyncResult<PushReport> {
        let pending = self.db.records::<E>().pending().await?;
        let mut report = PushReport::default();

        if pending.is_empty() {
            debug!(entity = %E::KIND, "Nothing to push");
            return Ok(report);
        }

        debug!(entity = %E::KIND, count = pending.len(), "Pushing pending records");

        for record in &pending {
            match self.push_record(record).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) if e.aborts_pass() => {
                    warn!(entity = %E::KIND, id = record.id(), error = %e, "Push aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        entity = %E::KIND,
                        id = record.id(),
                        status = %record.sync_status(),
                        error = %e,
                        "Push failed, record stays pending"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            entity = %E::KIND,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            failed = report.failed,
            deferred = report.deferred,
            "Push complete"
        );
        Ok(report)
    }

    /// Pushes one record according to its `syncStatus`.
    ///
    /// A create whose server id differs from the client id re-points the
    /// record's dependents before returning. A create or update that still
    /// points at a `pending-create` parent is not sent.
    pub async fn push_record<E: RemoteContract>(&self, record: &E) -> SyncResult<PushOutcome> {
        if matches!(
            record.sync_status(),
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate
        ) {
            if let Some((parent, parent_id)) = self.propagator.unpushed_parent(record).await? {
                debug!(
                    entity = %E::KIND,
                    id = record.id(),
                    %parent,
                    %parent_id,
                    "Parent not pushed yet, deferring"
                );
                return Ok(PushOutcome::Deferred);
            }
        }

        match record.sync_status() {
            SyncStatus::PendingDelete => self.push_delete(record).await,
            SyncStatus::PendingCreate => self.push_create(record).await,
            SyncStatus::PendingUpdate => self.push_update(record).await,
            SyncStatus::Synced => Ok(PushOutcome::Unchanged),
        }
    }

    async fn push_delete<E: RemoteContract>(&self, record: &E) -> SyncResult<PushOutcome> {
        let id = record.id();
        match self
            .gateway
            .request(&E::item_route(id), Method::DELETE, None)
            .await
        {
            Ok(_) => {}
            Err(SyncError::Http { status: 404, .. }) => {
                debug!(entity = %E::KIND, id, "Already gone on server");
            }
            Err(e) => return Err(e),
        }

        let _store = self.lock_store().await;
        self.db.records::<E>().delete(id).await?;
        debug!(entity = %E::KIND, id, "Deleted");
        Ok(PushOutcome::Deleted)
    }

    async fn push_create<E: RemoteContract>(&self, record: &E) -> SyncResult<PushOutcome> {
        let old_id = record.id();
        let payload = record.create_payload();

        let response = self
            .gateway
            .request(E::ENDPOINT, Method::POST, Some(&payload))
            .await?;

        let Some(mut created) = normalize_created(record, &response) else {
            return Err(SyncError::InvalidResponse(format!(
                "create response for {} {} carries no id",
                E::KIND,
                old_id
            )));
        };
        let new_id = created.id().to_string();

        let _store = self.lock_store().await;
        let repo = self.db.records::<E>();
        match repo.get(old_id).await? {
            None => {
                // Deleted locally while the POST was in flight.
                created.meta_mut().sync_status = SyncStatus::PendingDelete;
                repo.put(&created).await?;
                debug!(entity = %E::KIND, %old_id, %new_id, "Removed during push, queued for deletion");
            }
            Some(mut current) if current.meta().updated_at != record.meta().updated_at => {
                let meta = current.meta_mut();
                meta.id = new_id.clone();
                meta.sync_status = SyncStatus::PendingUpdate;
                repo.replace(old_id, &current).await?;
                debug!(entity = %E::KIND, %old_id, %new_id, "Edited during push, left pending");
            }
            Some(_) => {
                created.meta_mut().sync_status = SyncStatus::Synced;
                repo.replace(old_id, &created).await?;
                debug!(entity = %E::KIND, %old_id, %new_id, "Created");
            }
        }

        let references_rewritten = self.propagator.propagate(E::KIND, old_id, &new_id).await?;

        Ok(PushOutcome::Created {
            old_id: old_id.to_string(),
            new_id,
            references_rewritten,
        })
    }

    async fn push_update<E: RemoteContract>(&self, record: &E) -> SyncResult<PushOutcome> {
        let id = record.id();
        let payload = record.to_remote();

        self.gateway
            .request(&E::item_route(id), Method::PUT, Some(&payload))
            .await?;

        // An edit made while the PUT was in flight stays pending.
        let _store = self.lock_store().await;
        let repo = self.db.records::<E>();
        match repo.get(id).await? {
            Some(current)
                if current.sync_status() == SyncStatus::PendingUpdate
                    && current.meta().updated_at == record.meta().updated_at =>
            {
                repo.set_status(id, SyncStatus::Synced).await?;
            }
            Some(_) => debug!(entity = %E::KIND, id, "Edited during push, left pending"),
            None => debug!(entity = %E::KIND, id, "Removed during push"),
        }

        debug!(entity = %E::KIND, id, "Updated");
        Ok(PushOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = PushReport::default();
        report.record(&PushOutcome::Created {
            old_id: "uuid1".into(),
            new_id: "42".into(),
            references_rewritten: 3,
        });
        report.record(&PushOutcome::Updated);
        report.record(&PushOutcome::Deleted);
        report.record(&PushOutcome::Unchanged);

        assert_eq!(report.pushed(), 3);
        assert_eq!(report.references_rewritten, 3);
        assert!(report.is_clean());

        report.record(&PushOutcome::Deferred);
        assert_eq!(report.pushed(), 3);
        assert!(!report.is_clean());

        report.deferred = 0;
        report.failed += 1;
        assert!(!report.is_clean());
    }
}
