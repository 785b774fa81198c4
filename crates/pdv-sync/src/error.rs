//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Connectivity   │  │     Remote      │  │     Session             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Offline        │  │  Http{status}   │  │  SessionExpired         │ │
//! │  │  Network        │  │  InvalidResponse│  │                         │ │
//! │  │  Timeout        │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Merge       │  │     Local       │  │   Configuration         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ ConflictSkipped │  │  Database       │  │  InvalidConfig          │ │
//! │  │                 │  │  Validation     │  │  ConfigLoad/SaveFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//! Push and pull failures are caught per entity type and logged; they never
//! abort the pass over the remaining types. `Offline` and `SessionExpired`
//! do abort it (see [`SyncError::aborts_pass`]). `SessionExpired` is the only
//! error that interrupts a user action.

use thiserror::Error;

use pdv_core::EntityKind;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// The device is offline; the request was not attempted or the host was
    /// unreachable.
    #[error("Device is offline")]
    Offline,

    /// The request failed in flight.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The server answered with a failure status.
    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The server answered 2xx with a body we cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Still unauthorized after a refresh attempt; the stored session has
    /// been cleared and the user must sign in again.
    #[error("Session expired, please sign in again")]
    SessionExpired,

    // =========================================================================
    // Merge Errors
    // =========================================================================
    /// An incoming record was rejected by a merge rule. Logged and counted,
    /// never returned from a pass.
    #[error("Skipped {entity} {id}: {reason}")]
    ConflictSkipped {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local store failure.
    #[error("Database error: {0}")]
    Database(#[from] pdv_db::DbError),

    /// Record rejected by validation before it was stored.
    #[error("Validation failed: {0}")]
    Validation(#[from] pdv_core::ValidationError),

    /// Domain model error.
    #[error("{0}")]
    Core(#[from] pdv_core::CoreError),

    /// JSON encoding/decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

/// Convert reqwest errors.
///
/// ## Error Mapping
/// ```text
/// is_connect()   → Offline   (DNS failure, connection refused, no route)
/// is_timeout()   → Timeout
/// is_decode()    → InvalidResponse
/// Other          → Network
/// ```
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            SyncError::Offline
        } else if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Builds an `Http` error from a status and response body.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        SyncError::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns true when the failure means "no connectivity".
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::Offline)
    }

    /// Returns true if the error must stop the whole pass rather than just
    /// the current record or entity type.
    pub fn aborts_pass(&self) -> bool {
        matches!(
            self,
            SyncError::Offline | SyncError::SessionExpired | SyncError::ShuttingDown
        )
    }

    /// Returns true if a later pass may succeed without user action.
    ///
    /// ## Retryable Errors
    /// - Connectivity (offline, network, timeout)
    /// - Server-side failures (5xx, 408, 429)
    ///
    /// ## Non-Retryable Errors
    /// - Session expiry (needs sign-in)
    /// - Other 4xx responses, validation and configuration errors
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Offline | SyncError::Network(_) | SyncError::Timeout(_) => true,
            SyncError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
