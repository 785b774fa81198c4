//! # Foreground Mutations
//!
//! The write path the UI uses. Every mutation lands in the local store
//! first, then gets one immediate push attempt when the device is online and
//! no pass is running. Whatever is not pushed right away stays pending for
//! the next pass.
//!
//! ```text
//! create / update / delete
//!        │
//!        ▼
//!   validate ──fail──► Err(Validation)
//!   (update: unknown id or pending-delete ──► Err(Validation))
//!        │
//!        ▼
//!   store locally as pending-*
//!        │
//!        ▼
//!   online and pass lock free? ──no──► SavedOffline / SavedAndSyncing
//!        │ yes
//!        ▼
//!   push_record ──Deferred─────────► SavedAndSyncing (parent not pushed)
//!               ──Offline──────────► SavedOffline
//!               ──SessionExpired───► Err(SessionExpired)
//!               ──other error──────► SavedAndSyncing (left pending)
//!               ──ok───────────────► SavedAndSyncing
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pdv_core::{SyncStatus, ValidationError};

use crate::contracts::RemoteContract;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::push::PushOutcome;

/// What the user should be told after a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitNotice {
    /// Reached the server, or queued behind a running pass.
    SavedAndSyncing,
    /// Stored locally; the server was unreachable.
    SavedOffline,
}

/// Result of a create or update.
#[derive(Debug, Clone)]
pub struct Submission<E> {
    /// The stored record, with its server id if the push already happened.
    pub record: E,
    pub notice: SubmitNotice,
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub id: String,
    /// Whether the record is already gone from the local store.
    pub removed: bool,
    pub notice: SubmitNotice,
}

/// Optimistic local writes with an immediate push attempt.
#[derive(Debug, Clone)]
pub struct MutationService {
    engine: SyncEngine,
}

impl MutationService {
    pub fn new(engine: SyncEngine) -> Self {
        MutationService { engine }
    }

    /// Stores a new record as `pending-create` and tries to push it.
    ///
    /// An empty id gets a fresh UUID. Timestamps are stamped here.
    pub async fn create<E: RemoteContract>(&self, mut record: E) -> SyncResult<Submission<E>> {
        record.normalize();
        record.validate()?;

        let meta = record.meta_mut();
        if meta.id.trim().is_empty() {
            meta.id = Uuid::new_v4().to_string();
        }
        meta.touch();
        meta.created_at = meta.updated_at;
        meta.sync_status = SyncStatus::PendingCreate;

        let repo = self.engine.db().records::<E>();
        repo.put(&record).await?;
        debug!(entity = %E::KIND, id = record.id(), "Created locally");

        self.submit(record).await
    }

    /// Stores an edit and tries to push it.
    ///
    /// A record the server has never seen stays `pending-create`.
    ///
    /// ## Errors
    /// * `Validation(NotFound)` - the id is blank or not in the local store
    /// * `Validation(BeingDeleted)` - the record is `pending-delete`
    pub async fn update<E: RemoteContract>(&self, mut record: E) -> SyncResult<Submission<E>> {
        record.normalize();
        record.validate()?;

        let repo = self.engine.db().records::<E>();
        {
            let _store = self.engine.push_engine().lock_store().await;

            let current = match record.id() {
                id if id.trim().is_empty() => None,
                id => repo.get(id).await?,
            };
            let status = match current.map(|current| current.sync_status()) {
                None => {
                    return Err(ValidationError::NotFound {
                        entity: E::KIND.to_string(),
                        id: record.id().to_string(),
                    }
                    .into())
                }
                Some(SyncStatus::PendingDelete) => {
                    return Err(ValidationError::BeingDeleted {
                        entity: E::KIND.to_string(),
                        id: record.id().to_string(),
                    }
                    .into())
                }
                Some(status) => status.after_edit(),
            };

            let meta = record.meta_mut();
            meta.touch();
            meta.sync_status = status;

            repo.put(&record).await?;
            debug!(entity = %E::KIND, id = record.id(), %status, "Updated locally");
        }

        self.submit(record).await
    }

    /// Deletes a record.
    ///
    /// Never-pushed records are removed at once. Others are tagged
    /// `pending-delete` and removed after the server confirms.
    pub async fn delete<E: RemoteContract>(&self, id: &str) -> SyncResult<Deletion> {
        let repo = self.engine.db().records::<E>();
        let store = self.engine.push_engine().lock_store().await;

        let Some(mut record) = repo.get(id).await? else {
            debug!(entity = %E::KIND, id, "Nothing to delete");
            return Ok(Deletion {
                id: id.to_string(),
                removed: true,
                notice: self.idle_notice(),
            });
        };

        if record.sync_status() == SyncStatus::PendingCreate {
            repo.delete(id).await?;
            debug!(entity = %E::KIND, id, "Never pushed, removed locally");
            return Ok(Deletion {
                id: id.to_string(),
                removed: true,
                notice: self.idle_notice(),
            });
        }

        let meta = record.meta_mut();
        meta.touch();
        meta.sync_status = SyncStatus::PendingDelete;
        repo.put(&record).await?;
        drop(store);

        let notice = self.push_now(&record).await?.1;
        let removed = repo.get(id).await?.is_none();

        Ok(Deletion {
            id: id.to_string(),
            removed,
            notice,
        })
    }

    async fn submit<E: RemoteContract>(&self, record: E) -> SyncResult<Submission<E>> {
        let (outcome, notice) = self.push_now(&record).await?;

        let record = match outcome {
            Some(PushOutcome::Created { new_id, .. }) => self
                .engine
                .db()
                .records::<E>()
                .get(&new_id)
                .await?
                .unwrap_or(record),
            _ => record,
        };

        Ok(Submission { record, notice })
    }

    /// One push attempt outside the scheduled passes.
    async fn push_now<E: RemoteContract>(
        &self,
        record: &E,
    ) -> SyncResult<(Option<PushOutcome>, SubmitNotice)> {
        if !self.engine.is_online() {
            return Ok((None, SubmitNotice::SavedOffline));
        }

        let Some(_pass) = self.engine.try_lock_pass() else {
            debug!(entity = %E::KIND, id = record.id(), "Pass in flight, left for it");
            return Ok((None, SubmitNotice::SavedAndSyncing));
        };

        match self.engine.push_engine().push_record(record).await {
            Ok(PushOutcome::Deferred) => Ok((None, SubmitNotice::SavedAndSyncing)),
            Ok(outcome) => {
                info!(entity = %E::KIND, id = record.id(), "Pushed immediately");
                Ok((Some(outcome), SubmitNotice::SavedAndSyncing))
            }
            Err(SyncError::Offline) => Ok((None, SubmitNotice::SavedOffline)),
            Err(SyncError::SessionExpired) => Err(SyncError::SessionExpired),
            Err(e) => {
                warn!(entity = %E::KIND, id = record.id(), error = %e, "Immediate push failed, left pending");
                Ok((None, SubmitNotice::SavedAndSyncing))
            }
        }
    }

    fn idle_notice(&self) -> SubmitNotice {
        if self.engine.is_online() {
            SubmitNotice::SavedAndSyncing
        } else {
            SubmitNotice::SavedOffline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::gateway::Connectivity;
    use pdv_core::{Category, Money, Product, RecordMeta, SyncEntity};
    use pdv_db::{Database, DbConfig};

    async fn offline_service() -> (MutationService, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = SyncConfig::for_base_url("http://127.0.0.1:9/loja01/");
        let engine = SyncEngine::from_config(db.clone(), &config, Connectivity::new(false)).unwrap();
        (MutationService::new(engine), db)
    }

    fn category(id: &str, description: &str) -> Category {
        Category {
            meta: RecordMeta::synced(id, None),
            description: description.into(),
        }
    }

    #[tokio::test]
    async fn test_create_offline_assigns_id_and_queues() {
        let (service, db) = offline_service().await;

        let submission = service.create(category("", "Bebidas")).await.unwrap();
        assert_eq!(submission.notice, SubmitNotice::SavedOffline);
        assert!(Uuid::parse_str(submission.record.id()).is_ok());
        assert!(submission.record.meta.created_at.is_some());

        let stored = db.categories().get(submission.record.id()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status(), SyncStatus::PendingCreate);
        assert_eq!(stored.description, "Bebidas");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_record() {
        let (service, db) = offline_service().await;

        let product = Product {
            meta: RecordMeta::default(),
            description: "   ".into(),
            cost: Money::from_cents(100),
            profit_margin: 0.0,
            price: Money::from_cents(100),
            quantity: 1.0,
            unit: "UN".into(),
            barcodes: vec![],
            category_id: None,
        };

        let err = service.create(product).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(db.products().all().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_pending_create() {
        let (service, db) = offline_service().await;

        let created = service.create(category("", "Bebidas")).await.unwrap().record;
        let mut edited = created.clone();
        edited.description = "Bebidas geladas".into();

        let submission = service.update(edited).await.unwrap();
        assert_eq!(submission.record.sync_status(), SyncStatus::PendingCreate);

        let stored = db.categories().get(created.id()).await.unwrap().unwrap();
        assert_eq!(stored.description, "Bebidas geladas");
        assert_eq!(stored.sync_status(), SyncStatus::PendingCreate);
    }

    #[tokio::test]
    async fn test_update_of_synced_record_is_pending_update() {
        let (service, db) = offline_service().await;
        db.categories().put(&category("42", "Bebidas")).await.unwrap();

        let submission = service.update(category("42", "Frios")).await.unwrap();
        assert_eq!(submission.notice, SubmitNotice::SavedOffline);

        let stored = db.categories().get("42").await.unwrap().unwrap();
        assert_eq!(stored.sync_status(), SyncStatus::PendingUpdate);
        assert!(stored.meta.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_never_pushed_removes_locally() {
        let (service, db) = offline_service().await;
        let created = service.create(category("", "Bebidas")).await.unwrap().record;

        let deletion = service.delete::<Category>(created.id()).await.unwrap();
        assert!(deletion.removed);
        assert!(db.categories().get(created.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_synced_offline_tags_pending_delete() {
        let (service, db) = offline_service().await;
        db.categories().put(&category("42", "Bebidas")).await.unwrap();

        let deletion = service.delete::<Category>("42").await.unwrap();
        assert!(!deletion.removed);
        assert_eq!(deletion.notice, SubmitNotice::SavedOffline);

        let stored = db.categories().get("42").await.unwrap().unwrap();
        assert_eq!(stored.sync_status(), SyncStatus::PendingDelete);
    }

    #[tokio::test]
    async fn test_update_requires_a_stored_record() {
        let (service, db) = offline_service().await;

        let err = service.update(category("", "Bebidas")).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::NotFound { .. })
        ));

        let err = service.update(category("uuid-gone", "Bebidas")).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::NotFound { .. })
        ));
        assert!(db.categories().all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_pending_delete_is_rejected() {
        let (service, db) = offline_service().await;
        db.categories().put(&category("42", "Bebidas")).await.unwrap();
        service.delete::<Category>("42").await.unwrap();

        let err = service.update(category("42", "Frios")).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::BeingDeleted { .. })
        ));

        let stored = db.categories().get("42").await.unwrap().unwrap();
        assert_eq!(stored.description, "Bebidas");
        assert_eq!(stored.sync_status(), SyncStatus::PendingDelete);
    }
}
