//! # Domain Types
//!
//! Sync bookkeeping types shared by every layer.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   SyncStatus    │   │   EntityKind    │   │     Reference       │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  synced         │   │  Category       │   │  dependent: kind    │   │
//! │  │  pending-create │   │  Cashier        │   │  path: categoryId   │   │
//! │  │  pending-update │   │  Checkout       │   │    or saleProducts  │   │
//! │  │  pending-delete │   │  PaymentForm    │   │       [*].productId │   │
//! │  └─────────────────┘   │  Product        │   └─────────────────────┘   │
//! │                        │  Sale           │                              │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sync Status Lifecycle
//! ```text
//!   create (local id) ──► pending-create ──push──► synced (server id)
//!                               │                     │
//!                            edit keeps            edit
//!                          pending-create             ▼
//!                                              pending-update ──push──► synced
//!
//!   delete (online)  ──► removed
//!   delete (offline) ──► pending-delete ──push──► removed
//! ```

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Sync Status
// =============================================================================

/// The sync state of a local record.
///
/// Every stored record carries exactly one of these. `Synced` means the
/// server confirmed the record as of its `updatedAt`; the `Pending*` states
/// describe a local mutation the server has not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

impl SyncStatus {
    /// The three states the Push Engine drains.
    pub const PENDING: [SyncStatus; 3] = [
        SyncStatus::PendingCreate,
        SyncStatus::PendingUpdate,
        SyncStatus::PendingDelete,
    ];

    /// Stable string form, identical to the serde representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::PendingCreate => "pending-create",
            SyncStatus::PendingUpdate => "pending-update",
            SyncStatus::PendingDelete => "pending-delete",
        }
    }

    /// True for any of the `pending-*` states.
    #[inline]
    pub const fn is_pending(&self) -> bool {
        !matches!(self, SyncStatus::Synced)
    }

    /// Status a record takes after a local edit.
    ///
    /// A record the server has never seen stays `pending-create`.
    pub const fn after_edit(&self) -> SyncStatus {
        match self {
            SyncStatus::PendingCreate => SyncStatus::PendingCreate,
            _ => SyncStatus::PendingUpdate,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Synced
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending-create" => Ok(SyncStatus::PendingCreate),
            "pending-update" => Ok(SyncStatus::PendingUpdate),
            "pending-delete" => Ok(SyncStatus::PendingDelete),
            other => Err(CoreError::InvalidSyncStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The six synced entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Category,
    Cashier,
    Checkout,
    PaymentForm,
    Product,
    Sale,
}

impl EntityKind {
    /// Dependency-safe sync order: referenced entities before the entities
    /// that point at them, so a pushed sale never carries a client-only
    /// product ID.
    pub const SYNC_ORDER: [EntityKind; 6] = [
        EntityKind::Category,
        EntityKind::Cashier,
        EntityKind::Checkout,
        EntityKind::PaymentForm,
        EntityKind::Product,
        EntityKind::Sale,
    ];

    /// Local store table name.
    pub const fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Category => "categories",
            EntityKind::Cashier => "cashiers",
            EntityKind::Checkout => "checkouts",
            EntityKind::PaymentForm => "payment_forms",
            EntityKind::Product => "products",
            EntityKind::Sale => "sales",
        }
    }

    /// Human/config label (kebab-case).
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Cashier => "cashier",
            EntityKind::Checkout => "checkout",
            EntityKind::PaymentForm => "payment-form",
            EntityKind::Product => "product",
            EntityKind::Sale => "sale",
        }
    }

    /// Every weak reference that points at this entity kind.
    ///
    /// ## Reference Map
    /// ```text
    /// category    ──► product.categoryId
    /// cashier     ──► sale.cashierId
    /// checkout    ──► sale.checkoutId
    /// paymentForm ──► sale.paymentFormId
    /// product     ──► sale.saleProducts[*].productId
    /// sale        ──► (nothing)
    /// ```
    pub fn referenced_by(&self) -> &'static [Reference] {
        match self {
            EntityKind::Category => &[Reference {
                dependent: EntityKind::Product,
                path: ReferencePath::Field("categoryId"),
            }],
            EntityKind::Cashier => &[Reference {
                dependent: EntityKind::Sale,
                path: ReferencePath::Field("cashierId"),
            }],
            EntityKind::Checkout => &[Reference {
                dependent: EntityKind::Sale,
                path: ReferencePath::Field("checkoutId"),
            }],
            EntityKind::PaymentForm => &[Reference {
                dependent: EntityKind::Sale,
                path: ReferencePath::Field("paymentFormId"),
            }],
            EntityKind::Product => &[Reference {
                dependent: EntityKind::Sale,
                path: ReferencePath::Nested {
                    array: "saleProducts",
                    field: "productId",
                },
            }],
            EntityKind::Sale => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "category" | "categories" => Ok(EntityKind::Category),
            "cashier" | "cashiers" => Ok(EntityKind::Cashier),
            "checkout" | "checkouts" => Ok(EntityKind::Checkout),
            "payment-form" | "payment-forms" | "paymentform" => Ok(EntityKind::PaymentForm),
            "product" | "products" => Ok(EntityKind::Product),
            "sale" | "sales" => Ok(EntityKind::Sale),
            _ => Err(CoreError::UnknownEntity(s.to_string())),
        }
    }
}

// =============================================================================
// References
// =============================================================================

/// A weak, ID-only reference from a dependent entity to a referenced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// The entity kind holding the reference.
    pub dependent: EntityKind,
    /// Where the referenced ID lives inside the dependent record's JSON.
    pub path: ReferencePath,
}

/// Location of a foreign-key-like field in a record's camelCase JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePath {
    /// A top-level field, e.g. `categoryId`.
    Field(&'static str),
    /// A field on every element of an array, e.g. `saleProducts[*].productId`.
    Nested {
        array: &'static str,
        field: &'static str,
    },
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferencePath::Field(field) => write!(f, "{}", field),
            ReferencePath::Nested { array, field } => write!(f, "{}[*].{}", array, field),
        }
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Formats a timestamp the way the remote API and the watermark expect
/// (`2024-05-01T12:30:00.250Z`, fractional part only when non-zero).
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Fixed-width form used for the local `updated_at` column, so lexicographic
/// order equals chronological order.
pub fn format_sortable(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a server timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less ISO 8601 (treated as
/// UTC), which is what many backends emit for `DateTime` columns.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(CoreError::InvalidTimestamp(raw.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_round_trips_through_str() {
        for status in [
            SyncStatus::Synced,
            SyncStatus::PendingCreate,
            SyncStatus::PendingUpdate,
            SyncStatus::PendingDelete,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("pending".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_after_edit_keeps_pending_create() {
        assert_eq!(SyncStatus::PendingCreate.after_edit(), SyncStatus::PendingCreate);
        assert_eq!(SyncStatus::Synced.after_edit(), SyncStatus::PendingUpdate);
        assert_eq!(SyncStatus::PendingUpdate.after_edit(), SyncStatus::PendingUpdate);
    }

    #[test]
    fn test_sync_order_puts_referenced_first() {
        let position = |kind| EntityKind::SYNC_ORDER.iter().position(|k| *k == kind).unwrap();
        for kind in EntityKind::SYNC_ORDER {
            for reference in kind.referenced_by() {
                assert!(position(kind) < position(reference.dependent));
            }
        }
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("payment_forms".parse::<EntityKind>().unwrap(), EntityKind::PaymentForm);
        assert_eq!("Product".parse::<EntityKind>().unwrap(), EntityKind::Product);
        assert!("supplier".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_product_reference_is_nested() {
        let refs = EntityKind::Product.referenced_by();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path.to_string(), "saleProducts[*].productId");
        assert!(EntityKind::Sale.referenced_by().is_empty());
    }

    #[test]
    fn test_timestamp_formats() {
        let epoch = parse_timestamp("0001-01-01T00:00:00Z").unwrap();
        assert_eq!(format_timestamp(&epoch), "0001-01-01T00:00:00Z");
        assert_eq!(format_sortable(&epoch), "0001-01-01T00:00:00.000000Z");

        let naive = parse_timestamp("2024-05-01T12:30:00.25").unwrap();
        assert_eq!(format_timestamp(&naive), "2024-05-01T12:30:00.250Z");

        let offset = parse_timestamp("2024-05-01T09:30:00-03:00").unwrap();
        assert_eq!(format_timestamp(&offset), "2024-05-01T12:30:00Z");

        assert!(parse_timestamp("yesterday").is_err());
    }
}
