//! # Auth Session Repository
//!
//! Persists the single signed-in session (`id = 'current_auth'`) so the
//! gateway can attach a bearer token after a restart and refresh it on 401.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

/// Primary key of the only auth row.
pub const AUTH_RECORD_ID: &str = "current_auth";

/// The stored token pair and tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Tenant path segment the session belongs to, when known.
    pub tenant: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AuthSession {
    /// A fresh session stamped now.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        tenant: Option<String>,
    ) -> Self {
        AuthSession {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            tenant,
            updated_at: Utc::now(),
        }
    }
}

/// Repository for the auth singleton.
#[derive(Debug, Clone)]
pub struct AuthRepository {
    pool: SqlitePool,
}

impl AuthRepository {
    /// Creates a new AuthRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuthRepository { pool }
    }

    /// Returns the stored session, if any.
    pub async fn get(&self) -> DbResult<Option<AuthSession>> {
        let session = sqlx::query_as::<_, AuthSession>(
            r#"
            SELECT access_token, refresh_token, tenant, updated_at
            FROM auth_session
            WHERE id = ?1
            "#,
        )
        .bind(AUTH_RECORD_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Stores (or overwrites) the session.
    pub async fn save(&self, session: &AuthSession) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_session (id, access_token, refresh_token, tenant, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                tenant = excluded.tenant,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(AUTH_RECORD_ID)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(&session.tenant)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(tenant = ?session.tenant, "Stored auth session");
        Ok(())
    }

    /// Removes the stored session (logout or terminal expiry).
    pub async fn clear(&self) -> DbResult<()> {
        sqlx::query("DELETE FROM auth_session WHERE id = ?1")
            .bind(AUTH_RECORD_ID)
            .execute(&self.pool)
            .await?;

        info!("Cleared auth session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_save_get_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.auth();
        assert!(repo.get().await.unwrap().is_none());

        let session = AuthSession::new("access-1", "refresh-1", Some("loja01".into()));
        repo.save(&session).await.unwrap();
        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.access_token, "access-1");
        assert_eq!(stored.tenant.as_deref(), Some("loja01"));

        repo.save(&AuthSession::new("access-2", "refresh-2", None))
            .await
            .unwrap();
        assert_eq!(repo.get().await.unwrap().unwrap().access_token, "access-2");

        repo.clear().await.unwrap();
        assert!(repo.get().await.unwrap().is_none());
    }
}
