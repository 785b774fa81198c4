//! # Sync Meta Repository
//!
//! The global watermark (`id = 'global'`): when the last clean full sync
//! pass finished. It never moves backwards.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use pdv_core::{format_sortable, parse_timestamp};

use crate::error::{DbError, DbResult};

/// Primary key of the only sync-meta row.
pub const SYNC_META_ID: &str = "global";

/// Repository for the sync-meta singleton.
#[derive(Debug, Clone)]
pub struct SyncMetaRepository {
    pool: SqlitePool,
}

impl SyncMetaRepository {
    /// Creates a new SyncMetaRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncMetaRepository { pool }
    }

    /// When the last clean sync pass finished, if ever.
    pub async fn last_sync(&self) -> DbResult<Option<DateTime<Utc>>> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT last_sync FROM sync_meta WHERE id = ?1")
                .bind(SYNC_META_ID)
                .fetch_optional(&self.pool)
                .await?;

        match raw.flatten() {
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .map_err(|e| DbError::QueryFailed(e.to_string())),
            None => Ok(None),
        }
    }

    /// Advances the watermark to `at`.
    ///
    /// ## Returns
    /// `false` (and no write) when `at` is not later than the stored value.
    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> DbResult<bool> {
        if let Some(current) = self.last_sync().await? {
            if at <= current {
                debug!(%current, requested = %at, "Watermark not advanced");
                return Ok(false);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO sync_meta (id, last_sync) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET last_sync = excluded.last_sync
            "#,
        )
        .bind(SYNC_META_ID)
        .bind(format_sortable(&at))
        .execute(&self.pool)
        .await?;

        debug!(last_sync = %at, "Watermark advanced");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_watermark_only_moves_forward() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_meta();
        assert!(repo.last_sync().await.unwrap().is_none());

        let first = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();

        assert!(repo.set_last_sync(first).await.unwrap());
        assert!(!repo.set_last_sync(earlier).await.unwrap());
        assert_eq!(repo.last_sync().await.unwrap(), Some(first));

        assert!(repo.set_last_sync(later).await.unwrap());
        assert_eq!(repo.last_sync().await.unwrap(), Some(later));
    }
}
