//! # Repository Module
//!
//! Local store repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Push / Pull engine, MutationService                                   │
//! │       │                                                                 │
//! │       │  db.products().pending()                                       │
//! │       │  db.sales().referencing(path, id)                              │
//! │       ▼                                                                 │
//! │  RecordRepository<E>  (one generic impl, six tables)                   │
//! │  ├── get / put / bulk_put / delete / replace                           │
//! │  ├── pending / visible / with_status / count_by_status                 │
//! │  ├── max_synced_updated_at          ◄─ pull watermark                  │
//! │  └── referencing / scan / filter    ◄─ reference propagation, queries  │
//! │                                                                         │
//! │  AuthRepository      ── auth_session singleton                         │
//! │  SyncMetaRepository  ── sync_meta singleton (lastSync)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`RecordRepository`](record::RecordRepository) - Per-entity records
//! - [`AuthRepository`](auth::AuthRepository) - Stored session
//! - [`SyncMetaRepository`](sync_meta::SyncMetaRepository) - Global watermark

pub mod auth;
pub mod record;
pub mod sync_meta;
