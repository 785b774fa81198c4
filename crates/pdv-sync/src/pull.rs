//! # Pull Engine
//!
//! Fetches server-side changes since a watermark and merges them into the
//! local store without clobbering local edits that have not been pushed.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET {E}/list{E}?UpdatedAt={since}&Limit={limit}&Offset={offset}       │
//! │        │                                                               │
//! │        ▼  for every item                                               │
//! │  no usable id ─────────────────────────────► dropped                   │
//! │  local copy pending-* ─────────────────────► skipped (local wins)      │
//! │  unique key taken by another record ───────► skipped (ConflictSkipped) │
//! │  otherwise ────────────────────────────────► bulk upsert as synced     │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  page full and totalCount says more? ──yes──► next Offset              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `since` is the explicit override, else the newest `updatedAt` among local
//! synced records, else `0001-01-01T00:00:00Z`. Re-pulling the same delta is
//! idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use pdv_core::{format_timestamp, SyncEntity, SyncStatus, DEFAULT_PAGE_LIMIT, EPOCH_WATERMARK};
use pdv_db::{Database, RecordRepository};

use crate::contracts::{list_items, total_count, RemoteContract, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;

/// Page size used when indexing local unique keys.
const KEY_INDEX_PAGE: u32 = 500;

// =============================================================================
// Options and Report
// =============================================================================

/// Overrides for one pull.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// List route; defaults to `{E}/list{E}`.
    pub list_endpoint: Option<String>,
    /// Watermark; defaults to the local synced maximum.
    pub since: Option<DateTime<Utc>>,
}

impl PullOptions {
    pub fn since(since: DateTime<Utc>) -> Self {
        PullOptions {
            since: Some(since),
            ..Default::default()
        }
    }
}

/// Counts for one `pull::<E>()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub pages: usize,
    pub received: usize,
    pub stored: usize,
    /// Items whose local copy is still pending.
    pub skipped_pending: usize,
    /// Items rejected by a unique-key conflict.
    pub skipped_conflict: usize,
    /// Items without a usable id.
    pub dropped: usize,
}

// =============================================================================
// Pull Engine
// =============================================================================

/// Brings server changes into the local store.
#[derive(Debug, Clone)]
pub struct PullEngine {
    db: Database,
    gateway: Arc<RemoteGateway>,
    page_limit: u32,
}

impl PullEngine {
    pub fn new(db: Database, gateway: Arc<RemoteGateway>, page_limit: u32) -> Self {
        PullEngine {
            db,
            gateway,
            page_limit: if page_limit == 0 { DEFAULT_PAGE_LIMIT } else { page_limit },
        }
    }

    /// Pulls and merges every changed record of type `E`.
    ///
    /// ## Returns
    /// * `Ok(PullReport)` - skipped and dropped items are counted, not returned
    /// * `Err(..)` - a page could not be fetched or stored; pages merged
    ///   before the failure stay merged
    pub async fn pull<E: RemoteContract>(&self, options: PullOptions) -> SyncResult<PullReport> {
        let repo = self.db.records::<E>();

        let since = match options.since {
            Some(since) => Some(since),
            None => repo.max_synced_updated_at().await?,
        };
        let since = since
            .map(|at| format_timestamp(&at))
            .unwrap_or_else(|| EPOCH_WATERMARK.to_string());
        let list_endpoint = options.list_endpoint.unwrap_or_else(E::list_endpoint);

        debug!(entity = %E::KIND, %since, "Pulling changes");

        let mut report = PullReport::default();
        let mut merge = MergeState::default();
        let mut offset: u64 = 0;

        loop {
            let route = page_route(&list_endpoint, &since, self.page_limit, offset);
            let body = self
                .gateway
                .request(&route, Method::GET, None)
                .await?
                .into_json()?;

            let items = list_items(&body);
            report.pages += 1;
            report.received += items.len();

            let mut incoming = Vec::with_capacity(items.len());
            for item in items {
                match RemoteRecord::new(item).and_then(|remote| E::from_remote(&remote)) {
                    Some(record) => incoming.push(record),
                    None => {
                        debug!(entity = %E::KIND, "Dropping pulled item without id");
                        report.dropped += 1;
                    }
                }
            }

            self.merge(&repo, incoming, &mut merge, &mut report).await?;

            let page_len = items.len() as u64;
            offset += page_len;
            let more_remain = total_count(&body).is_some_and(|total| offset < total);
            if page_len == 0 || page_len < u64::from(self.page_limit) || !more_remain {
                break;
            }
        }

        info!(
            entity = %E::KIND,
            received = report.received,
            stored = report.stored,
            skipped_pending = report.skipped_pending,
            skipped_conflict = report.skipped_conflict,
            "Pull complete"
        );
        Ok(report)
    }

    async fn merge<E: RemoteContract>(
        &self,
        repo: &RecordRepository<E>,
        incoming: Vec<E>,
        state: &mut MergeState,
        report: &mut PullReport,
    ) -> SyncResult<()> {
        let mut accepted = Vec::with_capacity(incoming.len());

        for mut record in incoming {
            if let Some(local) = repo.get(record.id()).await? {
                if local.sync_status().is_pending() {
                    debug!(
                        entity = %E::KIND,
                        id = record.id(),
                        status = %local.sync_status(),
                        "Local edit not pushed yet, keeping it"
                    );
                    report.skipped_pending += 1;
                    continue;
                }
            }

            let keys = record.unique_keys();
            if !keys.is_empty() {
                if let Some(conflict) = state.find_conflict(repo, &record, &keys).await? {
                    warn!(error = %conflict, "Pulled record rejected");
                    report.skipped_conflict += 1;
                    continue;
                }
                for key in keys {
                    state.accepted.insert(key, record.id().to_string());
                }
            }
            state.replaced.insert(record.id().to_string());

            record.meta_mut().sync_status = SyncStatus::Synced;
            accepted.push(record);
        }

        report.stored += repo.bulk_put(&accepted).await?;
        Ok(())
    }
}

fn page_route(list_endpoint: &str, since: &str, limit: u32, offset: u64) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("UpdatedAt", since)
        .append_pair("Limit", &limit.to_string())
        .append_pair("Offset", &offset.to_string())
        .finish();
    let separator = if list_endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}", list_endpoint, separator, query)
}

// =============================================================================
// Unique-Key Conflicts
// =============================================================================

/// Unique keys seen during one pull.
#[derive(Debug, Default)]
struct MergeState {
    /// Keys of local records, built on first use.
    local: Option<HashMap<String, Vec<String>>>,
    /// Keys of incoming records accepted so far, key → id.
    accepted: HashMap<String, String>,
    /// Ids accepted so far. Their local keys are stale and no longer
    /// count as conflicts.
    replaced: HashSet<String>,
}

impl MergeState {
    /// A conflict when one of `keys` belongs to an already accepted incoming
    /// record, or to a local record not replaced in this pull, with a
    /// different id.
    async fn find_conflict<E: SyncEntity>(
        &mut self,
        repo: &RecordRepository<E>,
        record: &E,
        keys: &[String],
    ) -> SyncResult<Option<SyncError>> {
        let id = record.id();

        for key in keys {
            if let Some(owner) = self.accepted.get(key).filter(|owner| *owner != id) {
                return Ok(Some(conflict::<E>(id, key, owner, "in the same pull")));
            }
        }

        let local = match self.local.take() {
            Some(index) => index,
            None => local_key_index(repo).await?,
        };
        let found = keys.iter().find_map(|key| {
            local
                .get(key)
                .and_then(|owners| {
                    owners
                        .iter()
                        .find(|owner| *owner != id && !self.replaced.contains(*owner))
                })
                .map(|owner| conflict::<E>(id, key, owner, "locally"))
        });
        self.local = Some(local);

        Ok(found)
    }
}

fn conflict<E: SyncEntity>(id: &str, key: &str, owner: &str, place: &str) -> SyncError {
    SyncError::ConflictSkipped {
        entity: E::KIND,
        id: id.to_string(),
        reason: format!("key '{}' already used by {} {}", key, owner, place),
    }
}

async fn local_key_index<E: SyncEntity>(
    repo: &RecordRepository<E>,
) -> SyncResult<HashMap<String, Vec<String>>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    let mut scan = repo.scan(KEY_INDEX_PAGE);

    while let Some(page) = scan.next_page().await? {
        for record in page {
            for key in record.unique_keys() {
                index.entry(key).or_default().push(record.id().to_string());
            }
        }
    }

    Ok(index)
}
