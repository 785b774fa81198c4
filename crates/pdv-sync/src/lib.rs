//! # pdv-sync: Offline-First Sync for the PDV Terminal
//!
//! Keeps the local store and the PDV backend converging. Every mutation is
//! written locally first and pushed later; server changes are pulled in
//! pages and merged without clobbering local edits.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────┐          ┌──────────────────────────────┐    │
//! │  │  MutationService     │          │  SyncAgent                   │    │
//! │  │                      │          │                              │    │
//! │  │  UI writes: create,  │          │  Owned background task:      │    │
//! │  │  update, delete +    │          │  START/STOP/FORCE commands,  │    │
//! │  │  one immediate push  │          │  timer, SYNC_* events        │    │
//! │  └──────────┬───────────┘          └──────────────┬───────────────┘    │
//! │             │                                     │                     │
//! │             └──────────────┬──────────────────────┘                     │
//! │                            ▼                                            │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  SyncEngine: one pass, pass lock, dependency-safe entity order   │  │
//! │  └──────────┬──────────────────────┬────────────────────────────────┘  │
//! │             ▼                      ▼                                    │
//! │  ┌────────────────┐      ┌────────────────┐   ┌────────────────────┐   │
//! │  │ PushEngine     │─────►│ Reference      │   │ PullEngine         │   │
//! │  │ pending-* →    │      │ Propagator     │   │ paged delta merge, │   │
//! │  │ POST/PUT/DELETE│      │ client id →    │   │ barcode conflicts  │   │
//! │  └───────┬────────┘      │ server id      │   └─────────┬──────────┘   │
//! │          │               └────────────────┘             │              │
//! │          └───────────────────────┬──────────────────────┘              │
//! │                                  ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  RemoteGateway: /{tenant}/{route}, bearer token, 401 → refresh   │  │
//! │  │  → retry once, offline short-circuit                             │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  EVENTS (to the host):                                                 │
//! │  • SYNC_STARTED / SYNC_STOPPED - schedule changes                      │
//! │  • SYNC_COMPLETE - a pass reached the server                           │
//! │  • SYNC_ERROR - a pass failed (session expired, store error)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `SyncAgent` background task and its handle
//! - [`config`] - Sync configuration (API, schedule, database path)
//! - [`contracts`] - Mapping between records and the REST wire format
//! - [`engine`] - One sync pass across all entity types
//! - [`error`] - Sync error types
//! - [`gateway`] - Authenticated, tenant-scoped HTTP access
//! - [`mutation`] - Foreground create/update/delete
//! - [`propagate`] - Foreign-key rewrite after server id assignment
//! - [`pull`] - Paged pull and merge
//! - [`push`] - Pending mutation push
//! - [`session`] - Token storage and refresh coordination
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_db::{Database, DbConfig};
//! use pdv_sync::{Connectivity, SyncAgent, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//!
//! let engine = SyncEngine::from_config(db, &config, Connectivity::default())?;
//! let agent = SyncAgent::spawn(engine, &config);
//!
//! agent.force_sync()?;
//! let status = agent.status().await;
//! println!("Pending: {}", status.pending_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod mutation;
pub mod propagate;
pub mod pull;
pub mod push;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{
    AgentState, AgentStatus, LogEmitter, NoOpEmitter, SyncAgent, SyncAgentHandle, SyncCommand,
    SyncEvent, SyncEventEmitter,
};
pub use config::{ApiSettings, DatabaseSettings, SyncConfig, SyncMode, SyncSettings};
pub use contracts::RemoteContract;
pub use engine::{EntityPassReport, PassOutcome, PassReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use gateway::{Connectivity, RemoteGateway, RemoteResponse};
pub use mutation::{Deletion, MutationService, SubmitNotice, Submission};
pub use propagate::ReferencePropagator;
pub use pull::{PullEngine, PullOptions, PullReport};
pub use push::{PushEngine, PushOutcome, PushReport};
pub use session::{SessionStore, TokenPair};
