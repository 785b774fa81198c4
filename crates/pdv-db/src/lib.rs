//! # pdv-db: Local Store for the PDV Sync Layer
//!
//! Durable, queryable per-entity persistence that survives restarts. Uses
//! SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Sync Data Flow                               │
//! │                                                                         │
//! │  UI mutation / Push Engine / Pull Engine                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pdv-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐  ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories   │  │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                 │  │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo<E>   │  │              │  │   │
//! │  │   │ SqlitePool    │◄───│ AuthRepo        │  │ 001_local_   │  │   │
//! │  │   │ WAL mode      │    │ SyncMetaRepo    │  │  store.sql   │  │   │
//! │  │   └───────────────┘    └─────────────────┘  └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/pdv-sync/pdv.db                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Record, auth and sync-meta repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/pdv.db")).await?;
//! let pending = db.products().pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::auth::{AuthRepository, AuthSession, AUTH_RECORD_ID};
pub use repository::record::{RecordRepository, RecordScan};
pub use repository::sync_meta::{SyncMetaRepository, SYNC_META_ID};
