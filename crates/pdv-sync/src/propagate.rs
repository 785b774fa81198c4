//! # Reference Propagator
//!
//! When the server replaces a client-generated ID, every record that pointed
//! at the old ID is re-pointed at the new one.
//!
//! ```text
//! category  uuid1 ──► 42
//!     │
//!     └── products WHERE categoryId = 'uuid1'   →  categoryId = '42'
//!
//! product   uuid7 ──► 99
//!     │
//!     └── sales WHERE saleProducts[*].productId = 'uuid7'
//!                                               →  whole array rewritten
//! ```
//!
//! Dependents keep their own `syncStatus`: a synced sale re-pointed at a new
//! product ID is not pushed again, a pending one pushes with the new ID.
//!
//! The same reference table answers the reverse question for the push
//! engine: does a record still point at a parent the server has never seen?

use tracing::{debug, info};

use pdv_core::{
    Cashier, Category, Checkout, EntityKind, PaymentForm, Product, ReferencePath, Sale,
    SyncEntity, SyncStatus,
};
use pdv_db::Database;

use crate::error::SyncResult;

/// Rewrites weak references after an ID swap.
#[derive(Debug, Clone)]
pub struct ReferencePropagator {
    db: Database,
}

impl ReferencePropagator {
    pub fn new(db: Database) -> Self {
        ReferencePropagator { db }
    }

    /// Re-points every dependent of `kind` from `old_id` to `new_id`.
    ///
    /// ## Returns
    /// Number of dependent records rewritten.
    pub async fn propagate(&self, kind: EntityKind, old_id: &str, new_id: &str) -> SyncResult<usize> {
        if old_id == new_id {
            return Ok(0);
        }

        let mut rewritten = 0;
        for reference in kind.referenced_by() {
            rewritten += match reference.dependent {
                EntityKind::Category => self.rewrite::<Category>(&reference.path, old_id, new_id).await?,
                EntityKind::Cashier => self.rewrite::<Cashier>(&reference.path, old_id, new_id).await?,
                EntityKind::Checkout => self.rewrite::<Checkout>(&reference.path, old_id, new_id).await?,
                EntityKind::PaymentForm => {
                    self.rewrite::<PaymentForm>(&reference.path, old_id, new_id).await?
                }
                EntityKind::Product => self.rewrite::<Product>(&reference.path, old_id, new_id).await?,
                EntityKind::Sale => self.rewrite::<Sale>(&reference.path, old_id, new_id).await?,
            };
        }

        if rewritten > 0 {
            info!(entity = %kind, old_id, new_id, rewritten, "References re-pointed");
        }
        Ok(rewritten)
    }

    /// First parent of `record` that is still `pending-create` locally.
    ///
    /// ## Returns
    /// * `Some((kind, id))` - the parent's client id; pushing `record` now
    ///   would send an id the server does not know
    /// * `None` - every referenced parent is synced, pending an edit, or
    ///   unknown locally
    pub async fn unpushed_parent<E: SyncEntity>(
        &self,
        record: &E,
    ) -> SyncResult<Option<(EntityKind, String)>> {
        for parent in EntityKind::SYNC_ORDER {
            for reference in parent.referenced_by() {
                if reference.dependent != E::KIND {
                    continue;
                }
                for id in record.referenced_ids(&reference.path) {
                    if self.status_of(parent, id).await? == Some(SyncStatus::PendingCreate) {
                        return Ok(Some((parent, id.to_string())));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn status_of(&self, kind: EntityKind, id: &str) -> SyncResult<Option<SyncStatus>> {
        let status = match kind {
            EntityKind::Category => self.db.categories().get(id).await?.map(|r| r.sync_status()),
            EntityKind::Cashier => self.db.cashiers().get(id).await?.map(|r| r.sync_status()),
            EntityKind::Checkout => self.db.checkouts().get(id).await?.map(|r| r.sync_status()),
            EntityKind::PaymentForm => {
                self.db.payment_forms().get(id).await?.map(|r| r.sync_status())
            }
            EntityKind::Product => self.db.products().get(id).await?.map(|r| r.sync_status()),
            EntityKind::Sale => self.db.sales().get(id).await?.map(|r| r.sync_status()),
        };
        Ok(status)
    }

    async fn rewrite<E: SyncEntity>(
        &self,
        path: &ReferencePath,
        old_id: &str,
        new_id: &str,
    ) -> SyncResult<usize> {
        let repo = self.db.records::<E>();
        let mut rewritten = 0;

        for mut record in repo.referencing(path, old_id).await? {
            if record.repoint(path, old_id, new_id) {
                repo.put(&record).await?;
                rewritten += 1;
                debug!(entity = %E::KIND, id = record.id(), %path, "Reference rewritten");
            }
        }

        Ok(rewritten)
    }
}
