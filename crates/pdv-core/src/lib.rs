//! # pdv-core: Domain Model for the PDV Sync Layer
//!
//! This crate holds the record types, sync bookkeeping and validation rules
//! shared by the local store and the sync engine. It has zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Sync Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI / host application                        │   │
//! │  │    product form, sale screen, sync indicator                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        pdv-sync (gateway, push, pull, agent, mutations)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pdv-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  record   │  │   types   │  │   money   │  │ validation│  │   │
//! │  │   │ Category  │  │SyncStatus │  │   Money   │  │   rules   │  │   │
//! │  │   │ Product.. │  │EntityKind │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pdv-db (Local Store)                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`record`] - The six synced entities and the [`SyncEntity`] trait
//! - [`types`] - `SyncStatus`, `EntityKind`, the reference map, timestamps
//! - [`money`] - Integer money with decimal conversion at the API boundary
//! - [`error`] - Domain error types
//! - [`validation`] - Record validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use pdv_core::{Category, RecordMeta, SyncEntity, SyncStatus};
//!
//! let category = Category {
//!     meta: RecordMeta::new_local(),
//!     description: "Bebidas".to_string(),
//! };
//! assert_eq!(category.sync_status(), SyncStatus::PendingCreate);
//! assert!(category.validate().is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod record;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use record::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Watermark used when nothing has been pulled yet.
pub const EPOCH_WATERMARK: &str = "0001-01-01T00:00:00Z";

/// Default `Limit` sent with list requests.
pub const DEFAULT_PAGE_LIMIT: u32 = 999;
