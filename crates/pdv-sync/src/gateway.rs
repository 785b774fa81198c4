//! # Remote Gateway
//!
//! One authenticated HTTP call to the PDV backend, with tenant scoping and
//! 401 recovery. Every network request in the crate goes through here.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteGateway::request                           │
//! │                                                                         │
//! │  Connectivity offline? ──yes──► Err(Offline)  (nothing sent)           │
//! │        │ no                                                            │
//! │        ▼                                                               │
//! │  tenant = session.tenant │ config.tenant │ first segment of base_url   │
//! │  url    = {origin}/{tenant}/{route}                                    │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  token expiring within margin? ──yes──► refresh first                  │
//! │        │                                                               │
//! │        ▼                                                               │
//! │  send with "Authorization: Bearer <accessToken>"                       │
//! │        │                                                               │
//! │        ├── 2xx json ──► Json(value)   (Null for an empty body)         │
//! │        ├── 2xx other ─► Text(body)                                     │
//! │        ├── 4xx/5xx ───► Err(Http{status})                              │
//! │        └── 401 ───────► refresh once ─► retry once                     │
//! │                           │ rejected       │ 401 again                 │
//! │                           ▼                ▼                           │
//! │                     clear session, Err(SessionExpired)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transport Failures
//! Connection failures map to `Offline`, elapsed timeouts to `Timeout`, and
//! anything else in flight to `Network`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use pdv_db::{AuthRepository, AuthSession};

use crate::config::ApiSettings;
use crate::contracts::{RemoteContract, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use crate::session::{SessionStore, TokenPair};

/// Longest response body kept in an `Http` error message.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Connectivity
// =============================================================================

/// Host-controlled online flag shared by the gateway and the agent.
///
/// Cloning shares the flag. While it is `false` the gateway fails every call
/// with `Offline` without touching the network.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Connectivity {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Sets the flag, returning the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            info!(online, "Connectivity changed");
        }
        previous
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Connectivity::new(true)
    }
}

// =============================================================================
// Remote Response
// =============================================================================

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResponse {
    /// `application/json` body; `Null` when empty.
    Json(Value),
    /// Any other content type, raw.
    Text(String),
}

impl RemoteResponse {
    /// The JSON body, or `InvalidResponse` for a text body.
    pub fn into_json(self) -> SyncResult<Value> {
        match self {
            RemoteResponse::Json(value) => Ok(value),
            RemoteResponse::Text(text) => Err(SyncError::InvalidResponse(format!(
                "expected JSON, got text: {}",
                truncate(&text)
            ))),
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

// =============================================================================
// Remote Gateway
// =============================================================================

/// HTTP client for the PDV backend.
///
/// ## Usage
/// ```rust,ignore
/// let gateway = RemoteGateway::new(&config.api, db.auth(), Connectivity::default())?;
/// gateway.authenticate("caixa@loja.com", "senha").await?;
/// let body = gateway.request("Category", Method::POST, Some(&payload)).await?;
/// ```
#[derive(Debug)]
pub struct RemoteGateway {
    client: Client,
    base_url: Url,
    tenant: Option<String>,
    timeout_secs: u64,
    session: SessionStore,
    connectivity: Connectivity,
}

impl RemoteGateway {
    /// Creates a gateway for `api`, storing tokens through `auth`.
    pub fn new(
        api: &ApiSettings,
        auth: AuthRepository,
        connectivity: Connectivity,
    ) -> SyncResult<Self> {
        let base_url = Url::parse(&api.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(api.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(RemoteGateway {
            client,
            base_url,
            tenant: api.tenant.clone().filter(|t| !t.trim().is_empty()),
            timeout_secs: api.request_timeout_secs,
            session: SessionStore::with_margin(
                auth,
                Duration::from_secs(api.refresh_margin_secs),
            ),
            connectivity,
        })
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Performs one authenticated call to `{origin}/{tenant}/{route}`.
    ///
    /// ## Arguments
    /// * `route` - Path below the tenant, e.g. `"Product/42"`; may carry a
    ///   query string
    /// * `method` - HTTP method
    /// * `body` - JSON body, if any
    ///
    /// ## Returns
    /// * `Ok(RemoteResponse)` - 2xx response body
    /// * `Err(Offline | Network | Timeout)` - transport failure
    /// * `Err(Http{status})` - server answered with a failure status
    /// * `Err(SessionExpired)` - still 401 after one refresh; session cleared
    pub async fn request(
        &self,
        route: &str,
        method: Method,
        body: Option<&Value>,
    ) -> SyncResult<RemoteResponse> {
        self.ensure_online()?;

        let mut session = self.session.current().await?;
        if let Some(current) = session.as_ref() {
            if self.session.expires_soon(current) {
                debug!("Access token close to expiry, refreshing before request");
                session = Some(self.refresh(current).await?);
            }
        }

        let url = self.url_for(route, session.as_ref())?;
        let token = session.as_ref().map(|s| s.access_token.as_str());
        debug!(%method, %url, "Remote request");

        let response = self.send(&method, &url, token, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.read_response(response).await;
        }

        debug!(route, "Unauthorized, refreshing session");
        let Some(stale) = session else {
            self.session.clear().await?;
            return Err(SyncError::SessionExpired);
        };
        let fresh = self.refresh(&stale).await?;

        let url = self.url_for(route, Some(&fresh))?;
        let retry = self
            .send(&method, &url, Some(&fresh.access_token), body)
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(route, "Still unauthorized after refresh");
            self.session.clear().await?;
            return Err(SyncError::SessionExpired);
        }

        self.read_response(retry).await
    }

    /// `GET {E}/{id}`. A 404 is `Ok(None)`.
    pub async fn fetch_one<E: RemoteContract>(&self, id: &str) -> SyncResult<Option<E>> {
        match self.request(&E::item_route(id), Method::GET, None).await {
            Ok(response) => {
                let body = response.into_json()?;
                Ok(RemoteRecord::new(&body).and_then(|remote| E::from_remote(&remote)))
            }
            Err(SyncError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Signs in with `POST login/authenticate` and stores the token pair.
    pub async fn authenticate(&self, email: &str, password: &str) -> SyncResult<AuthSession> {
        self.ensure_online()?;

        let tenant = self.resolve_tenant(None);
        let url = self.url_for("login/authenticate", None)?;
        let body = json!({ "email": email, "password": password });

        let response = self.send(&Method::POST, &url, None, Some(&body)).await?;
        let tokens = TokenPair::from_response(&self.read_response(response).await?.into_json()?)?;
        let session = self.session.store(tokens, tenant).await?;

        info!(tenant = ?session.tenant, "Signed in");
        Ok(session)
    }

    /// Forgets the stored session.
    pub async fn logout(&self) -> SyncResult<()> {
        self.session.clear().await
    }

    pub async fn is_authenticated(&self) -> SyncResult<bool> {
        Ok(self.session.current().await?.is_some())
    }

    /// Exchanges `stale` for a new token pair, once for all concurrent callers.
    ///
    /// A rejected refresh clears the session and yields `SessionExpired`;
    /// transport failures are returned as they are.
    async fn refresh(&self, stale: &AuthSession) -> SyncResult<AuthSession> {
        let _guard = self.session.refresh_guard().await;

        let Some(stored) = self.session.current().await? else {
            return Err(SyncError::SessionExpired);
        };
        if stored.access_token != stale.access_token {
            debug!("Session already refreshed by a concurrent request");
            return Ok(stored);
        }

        match self.exchange_refresh_token(&stored).await {
            Ok(tokens) => {
                let fresh = self.session.store(tokens, stored.tenant.clone()).await?;
                info!("Access token refreshed");
                Ok(fresh)
            }
            Err(e @ (SyncError::Offline | SyncError::Network(_) | SyncError::Timeout(_))) => Err(e),
            Err(e) => {
                warn!(error = %e, "Token refresh rejected");
                self.session.clear().await?;
                Err(SyncError::SessionExpired)
            }
        }
    }

    async fn exchange_refresh_token(&self, session: &AuthSession) -> SyncResult<TokenPair> {
        let url = self.url_for("login/refresh", Some(session))?;
        let body = json!({
            "accessToken": session.access_token,
            "refreshToken": session.refresh_token,
        });

        let response = self.send(&Method::POST, &url, None, Some(&body)).await?;
        TokenPair::from_response(&self.read_response(response).await?.into_json()?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_online(&self) -> SyncResult<()> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }

    /// Session tenant, else configured tenant, else first path segment of the
    /// base URL.
    fn resolve_tenant(&self, session: Option<&AuthSession>) -> Option<String> {
        session
            .and_then(|s| s.tenant.clone())
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.tenant.clone())
            .or_else(|| {
                self.base_url
                    .path_segments()
                    .and_then(|mut segments| segments.next())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
    }

    fn url_for(&self, route: &str, session: Option<&AuthSession>) -> SyncResult<Url> {
        let origin = self.base_url.origin().ascii_serialization();
        let route = route.trim_start_matches('/');
        let raw = match self.resolve_tenant(session) {
            Some(tenant) => format!("{}/{}/{}", origin, tenant.trim_matches('/'), route),
            None => format!("{}/{}", origin, route),
        };
        Ok(Url::parse(&raw)?)
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> SyncResult<Response> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| self.transport_error(e))
    }

    async fn read_response(&self, response: Response) -> SyncResult<RemoteResponse> {
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains("json"));
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                truncate(&text).to_string()
            };
            return Err(SyncError::http(status.as_u16(), message));
        }

        if !is_json {
            return Ok(RemoteResponse::Text(text));
        }
        if text.trim().is_empty() {
            return Ok(RemoteResponse::Json(Value::Null));
        }
        serde_json::from_str(&text)
            .map(RemoteResponse::Json)
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_secs)
        } else {
            SyncError::from(err)
        }
    }
}
