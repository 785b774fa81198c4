//! # Record Repository
//!
//! Generic per-entity persistence for every synced record type.
//!
//! ## Table Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products (same shape for categories, cashiers, checkouts, ...)        │
//! │                                                                         │
//! │  id       │ sync_status    │ updated_at                  │ data        │
//! │  ─────────┼────────────────┼─────────────────────────────┼──────────── │
//! │  42       │ synced         │ 2024-05-01T12:30:00.000000Z │ {...json}   │
//! │  9b1e..   │ pending-create │ 2024-05-02T08:00:00.000000Z │ {...json}   │
//! │  17       │ pending-delete │ 2024-04-30T18:10:00.000000Z │ {...json}   │
//! │                                                                         │
//! │  data           = canonical camelCase record (source of truth)          │
//! │  sync_status    = copy of data.syncStatus  ──► push scan                │
//! │  updated_at     = copy of data.updatedAt   ──► pull watermark           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lazy Scans
//! [`RecordScan`] walks a table in primary-key order one page at a time, so
//! predicates over large tables never load every row at once. A scan can be
//! rewound and walked again.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use pdv_core::{format_sortable, parse_timestamp, ReferencePath, SyncEntity, SyncStatus};

use crate::error::{DbError, DbResult};

/// Default page size for [`RecordScan`].
pub const DEFAULT_SCAN_PAGE: u32 = 200;

// =============================================================================
// Repository
// =============================================================================

/// Repository for one synced entity type `E`.
#[derive(Debug)]
pub struct RecordRepository<E> {
    pool: SqlitePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for RecordRepository<E> {
    fn clone(&self) -> Self {
        RecordRepository {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

/// Column values derived from a record.
struct Row {
    id: String,
    sync_status: SyncStatus,
    updated_at: Option<String>,
    data: String,
}

impl<E: SyncEntity> RecordRepository<E> {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository {
            pool,
            _entity: PhantomData,
        }
    }

    fn table() -> &'static str {
        E::KIND.table_name()
    }

    fn encode(record: &E) -> DbResult<Row> {
        let meta = record.meta();
        if meta.id.trim().is_empty() {
            return Err(DbError::QueryFailed(format!(
                "{} record without an id",
                Self::table()
            )));
        }

        Ok(Row {
            id: meta.id.clone(),
            sync_status: meta.sync_status,
            updated_at: meta.updated_at.as_ref().map(format_sortable),
            data: serde_json::to_string(record)?,
        })
    }

    fn decode(id: &str, data: &str) -> DbResult<E> {
        serde_json::from_str(data).map_err(|e| DbError::CorruptRecord {
            table: Self::table().to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode_all(rows: Vec<(String, String)>) -> DbResult<Vec<E>> {
        rows.iter().map(|(id, data)| Self::decode(id, data)).collect()
    }

    async fn upsert<'c, X>(executor: X, row: &Row) -> DbResult<()>
    where
        X: sqlx::Executor<'c, Database = sqlx::Sqlite>,
    {
        let sql = format!(
            r#"
            INSERT INTO {} (id, sync_status, updated_at, data)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                sync_status = excluded.sync_status,
                updated_at = excluded.updated_at,
                data = excluded.data
            "#,
            Self::table()
        );

        sqlx::query(&sql)
            .bind(&row.id)
            .bind(row.sync_status)
            .bind(&row.updated_at)
            .bind(&row.data)
            .execute(executor)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Key-value operations
    // =========================================================================

    /// Gets a record by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<E>> {
        let sql = format!("SELECT id, data FROM {} WHERE id = ?1", Self::table());
        let row: Option<(String, String)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, data)| Self::decode(&id, &data)).transpose()
    }

    /// Inserts or replaces a record under its own ID.
    pub async fn put(&self, record: &E) -> DbResult<()> {
        let row = Self::encode(record)?;
        debug!(
            table = Self::table(),
            id = %row.id,
            status = %row.sync_status,
            "Storing record"
        );
        Self::upsert(&self.pool, &row).await
    }

    /// Upserts many records in a single transaction.
    ///
    /// ## Returns
    /// Number of records written.
    pub async fn bulk_put(&self, records: &[E]) -> DbResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = records
            .iter()
            .map(Self::encode)
            .collect::<DbResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        for row in &rows {
            Self::upsert(&mut *tx, row).await?;
        }
        tx.commit().await?;

        debug!(table = Self::table(), count = rows.len(), "Bulk stored records");
        Ok(rows.len())
    }

    /// Deletes a record.
    ///
    /// ## Returns
    /// `true` if a row was removed.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", Self::table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        debug!(table = Self::table(), id = %id, "Deleted record");
        Ok(result.rows_affected() > 0)
    }

    /// Replaces the record stored under `old_id` with `record` (which
    /// usually carries a new, server-assigned ID) in one transaction.
    ///
    /// ## Returns
    /// `true` if a row existed under `old_id`.
    pub async fn replace(&self, old_id: &str, record: &E) -> DbResult<bool> {
        let row = Self::encode(record)?;
        let delete_sql = format!("DELETE FROM {} WHERE id = ?1", Self::table());

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(&delete_sql)
            .bind(old_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        Self::upsert(&mut *tx, &row).await?;
        tx.commit().await?;

        if removed == 0 {
            warn!(
                table = Self::table(),
                old_id = %old_id,
                new_id = %row.id,
                "Replaced record that was no longer stored"
            );
        } else {
            debug!(table = Self::table(), old_id = %old_id, new_id = %row.id, "Replaced record");
        }

        Ok(removed > 0)
    }

    /// Sets the sync status of a stored record in place.
    ///
    /// ## Returns
    /// `true` if the record exists.
    pub async fn set_status(&self, id: &str, status: SyncStatus) -> DbResult<bool> {
        let sql = format!(
            r#"
            UPDATE {} SET
                sync_status = ?2,
                data = json_set(data, '$.syncStatus', ?3)
            WHERE id = ?1
            "#,
            Self::table()
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(status)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every record of this type.
    pub async fn all(&self) -> DbResult<Vec<E>> {
        let sql = format!("SELECT id, data FROM {} ORDER BY id", Self::table());
        let rows: Vec<(String, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Self::decode_all(rows)
    }

    /// Records whose status is one of `statuses`.
    pub async fn with_status(&self, statuses: &[SyncStatus]) -> DbResult<Vec<E>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT id, data FROM {} WHERE sync_status IN ({}) ORDER BY id",
            Self::table(),
            placeholders
        );

        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for status in statuses {
            query = query.bind(*status);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Self::decode_all(rows)
    }

    /// Records with a local mutation the server has not confirmed yet.
    pub async fn pending(&self) -> DbResult<Vec<E>> {
        self.with_status(&SyncStatus::PENDING).await
    }

    /// Records the user should see (everything not awaiting deletion).
    pub async fn visible(&self) -> DbResult<Vec<E>> {
        self.with_status(&[
            SyncStatus::Synced,
            SyncStatus::PendingCreate,
            SyncStatus::PendingUpdate,
        ])
        .await
    }

    /// Number of records in `status`.
    pub async fn count_by_status(&self, status: SyncStatus) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE sync_status = ?1",
            Self::table()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Latest `updatedAt` among `synced` records; the pull watermark.
    pub async fn max_synced_updated_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        let sql = format!(
            "SELECT MAX(updated_at) FROM {} WHERE sync_status = 'synced'",
            Self::table()
        );
        let max: Option<String> = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;

        match max {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .map_err(|e| DbError::QueryFailed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Records whose foreign-key-like field at `path` equals `id`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// // Products in category "uuid1"
    /// db.products().referencing(&ReferencePath::Field("categoryId"), "uuid1").await?;
    ///
    /// // Sales with any line for product "p-7"
    /// let path = ReferencePath::Nested { array: "saleProducts", field: "productId" };
    /// db.sales().referencing(&path, "p-7").await?;
    /// ```
    pub async fn referencing(&self, path: &ReferencePath, id: &str) -> DbResult<Vec<E>> {
        let rows: Vec<(String, String)> = match path {
            ReferencePath::Field(field) => {
                let sql = format!(
                    "SELECT id, data FROM {} WHERE json_extract(data, ?1) = ?2 ORDER BY id",
                    Self::table()
                );
                sqlx::query_as(&sql)
                    .bind(format!("$.{}", field))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            ReferencePath::Nested { array, field } => {
                let sql = format!(
                    r#"
                    SELECT id, data FROM {} AS rec
                    WHERE EXISTS (
                        SELECT 1 FROM json_each(rec.data, ?1) AS line
                        WHERE json_extract(line.value, ?2) = ?3
                    )
                    ORDER BY id
                    "#,
                    Self::table()
                );
                sqlx::query_as(&sql)
                    .bind(format!("$.{}", array))
                    .bind(format!("$.{}", field))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Self::decode_all(rows)
    }

    /// Starts a lazy, restartable scan over the table.
    pub fn scan(&self, page_size: u32) -> RecordScan<E> {
        RecordScan {
            repo: self.clone(),
            page_size: page_size.max(1),
            cursor: None,
            exhausted: false,
        }
    }

    /// Records matching `predicate`, evaluated page by page.
    pub async fn filter<F>(&self, mut predicate: F) -> DbResult<Vec<E>>
    where
        F: FnMut(&E) -> bool,
    {
        let mut scan = self.scan(DEFAULT_SCAN_PAGE);
        let mut matched = Vec::new();
        while let Some(page) = scan.next_page().await? {
            matched.extend(page.into_iter().filter(|record| predicate(record)));
        }
        Ok(matched)
    }

    async fn page_after(&self, cursor: Option<&str>, limit: u32) -> DbResult<Vec<E>> {
        let sql = format!(
            "SELECT id, data FROM {} WHERE (?1 IS NULL OR id > ?1) ORDER BY id LIMIT ?2",
            Self::table()
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Self::decode_all(rows)
    }
}

// =============================================================================
// Scan Cursor
// =============================================================================

/// Keyset-paged cursor over one entity table.
///
/// Pages are ordered by ID. Rows inserted behind the cursor during a scan
/// are not revisited; `rewind` starts over from the first ID.
#[derive(Debug)]
pub struct RecordScan<E> {
    repo: RecordRepository<E>,
    page_size: u32,
    cursor: Option<String>,
    exhausted: bool,
}

impl<E: SyncEntity> RecordScan<E> {
    /// Fetches the next page, or `None` once the table is exhausted.
    pub async fn next_page(&mut self) -> DbResult<Option<Vec<E>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .repo
            .page_after(self.cursor.as_deref(), self.page_size)
            .await?;

        if (page.len() as u32) < self.page_size {
            self.exhausted = true;
        }

        match page.last() {
            Some(last) => {
                self.cursor = Some(last.id().to_string());
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// Restarts the scan from the beginning.
    pub fn rewind(&mut self) {
        self.cursor = None;
        self.exhausted = false;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
