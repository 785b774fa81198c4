//! # Session Store
//!
//! Token bookkeeping for the remote gateway: the stored token pair, the
//! tenant it belongs to, and when it needs refreshing.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Session Lifecycle                               │
//! │                                                                         │
//! │  POST login/authenticate {email,password}                              │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  ┌──────────────┐   exp - now < margin   ┌─────────────────────────┐   │
//! │  │ auth_session │───────────────────────►│ POST login/refresh      │   │
//! │  │ (SQLite row) │◄───────────────────────│ {accessToken,           │   │
//! │  └──────┬───────┘   new pair persisted   │  refreshToken}          │   │
//! │         │                                └───────────┬─────────────┘   │
//! │         │ 401 on a request                           │ rejected        │
//! │         └────────────────────────────────────────────►▼                │
//! │                                               clear() → SessionExpired │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single-Flight Refresh
//! Many requests can hit 401 at once. [`SessionStore::refresh_guard`] hands
//! out one async mutex; whoever holds it re-reads the stored session and only
//! calls the server if the token is still the one that failed.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use pdv_db::{AuthRepository, AuthSession};

use crate::contracts::RemoteRecord;
use crate::error::{SyncError, SyncResult};

/// Default margin before `exp` at which a token is refreshed early (5 minutes).
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

// =============================================================================
// Token Pair
// =============================================================================

/// `{accessToken, refreshToken}` as returned by the login endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    /// Reads a token pair from a login response, tolerating case variance and
    /// envelopes. `accessToken` may also be called `token`.
    pub fn from_response(body: &Value) -> SyncResult<Self> {
        let remote = RemoteRecord::new(body)
            .ok_or_else(|| SyncError::InvalidResponse("login response is not an object".into()))?;

        let access_token = remote
            .string("accessToken")
            .or_else(|| remote.string("token"))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SyncError::InvalidResponse("login response has no accessToken".into()))?;
        let refresh_token = remote.string_or_default("refreshToken");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

// =============================================================================
// JWT Expiry
// =============================================================================

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Seconds until the token's `exp` claim, or `None` for tokens that are not
/// decodable JWTs (or carry no `exp`).
///
/// The signature is not checked; this only decides whether to refresh before
/// sending.
pub fn seconds_until_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    data.claims.exp.map(|exp| exp - Utc::now().timestamp())
}

// =============================================================================
// Session Store
// =============================================================================

/// The stored session plus the refresh lock around it.
#[derive(Debug)]
pub struct SessionStore {
    auth: AuthRepository,
    refresh_lock: Mutex<()>,
    refresh_margin: Duration,
}

impl SessionStore {
    pub fn new(auth: AuthRepository) -> Self {
        Self::with_margin(auth, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_margin(auth: AuthRepository, refresh_margin: Duration) -> Self {
        SessionStore {
            auth,
            refresh_lock: Mutex::new(()),
            refresh_margin,
        }
    }

    /// The stored session, if signed in.
    pub async fn current(&self) -> SyncResult<Option<AuthSession>> {
        Ok(self.auth.get().await?)
    }

    /// Persists a new token pair, keeping `tenant`.
    pub async fn store(&self, tokens: TokenPair, tenant: Option<String>) -> SyncResult<AuthSession> {
        let session = AuthSession::new(tokens.access_token, tokens.refresh_token, tenant);
        self.auth.save(&session).await?;
        debug!(tenant = ?session.tenant, "Session stored");
        Ok(session)
    }

    /// Forgets the session; the user has to sign in again.
    pub async fn clear(&self) -> SyncResult<()> {
        self.auth.clear().await?;
        info!("Session cleared");
        Ok(())
    }

    /// True when `session`'s access token is a JWT expiring within the margin.
    pub fn expires_soon(&self, session: &AuthSession) -> bool {
        match seconds_until_expiry(&session.access_token) {
            Some(remaining) => remaining < self.refresh_margin.as_secs() as i64,
            None => false,
        }
    }

    /// Serializes refreshes. Hold the guard across "re-read, refresh, store".
    pub async fn refresh_guard(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use pdv_db::{Database, DbConfig};
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn jwt_expiring_in(secs: i64) -> String {
        let claims = Claims {
            sub: "operador".into(),
            exp: Utc::now().timestamp() + secs,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-secret")).unwrap()
    }

    #[test]
    fn test_token_pair_from_response() {
        let pair = TokenPair::from_response(&json!({
            "data": { "AccessToken": "a1", "RefreshToken": "r1" }
        }))
        .unwrap();
        assert_eq!(pair.access_token, "a1");
        assert_eq!(pair.refresh_token, "r1");

        let pair = TokenPair::from_response(&json!({ "token": "a2" })).unwrap();
        assert_eq!(pair.access_token, "a2");
        assert!(pair.refresh_token.is_empty());

        assert!(TokenPair::from_response(&json!({ "refreshToken": "r" })).is_err());
        assert!(TokenPair::from_response(&json!("plain")).is_err());
    }

    #[test]
    fn test_seconds_until_expiry() {
        let remaining = seconds_until_expiry(&jwt_expiring_in(3600)).unwrap();
        assert!((3590..=3600).contains(&remaining));

        assert!(seconds_until_expiry(&jwt_expiring_in(-60)).unwrap() < 0);
        assert_eq!(seconds_until_expiry("opaque-token"), None);
    }

    #[tokio::test]
    async fn test_expires_soon_uses_margin() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = SessionStore::new(db.auth());

        let fresh = AuthSession::new(jwt_expiring_in(3600), "r", None);
        let stale = AuthSession::new(jwt_expiring_in(60), "r", None);
        let opaque = AuthSession::new("opaque", "r", None);

        assert!(!store.expires_soon(&fresh));
        assert!(store.expires_soon(&stale));
        assert!(!store.expires_soon(&opaque));
    }

    #[tokio::test]
    async fn test_store_and_clear() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = SessionStore::new(db.auth());

        let tokens = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        store.store(tokens, Some("loja01".into())).await.unwrap();

        let current = store.current().await.unwrap().unwrap();
        assert_eq!(current.access_token, "a");
        assert_eq!(current.tenant.as_deref(), Some("loja01"));

        store.clear().await.unwrap();
        assert!(store.current().await.unwrap().is_none());
    }
}
