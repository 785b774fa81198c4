//! # Synced Records
//!
//! The six entities kept in the local store and mirrored to the PDV backend.
//!
//! ## Record Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every record = RecordMeta (flattened) + entity fields, camelCase JSON │
//! │                                                                         │
//! │  {                                                                      │
//! │    "id": "42",                          ◄─ client UUID until pushed    │
//! │    "createdAt": "2024-05-01T12:00:00Z",                                 │
//! │    "updatedAt": "2024-05-01T12:30:00Z", ◄─ pull watermark source       │
//! │    "syncStatus": "synced",                                              │
//! │    "description": "Bebidas"             ◄─ entity fields               │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! References between records are plain string IDs. Nothing cascades; the
//! sync layer re-points them when a referenced ID changes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;
use crate::types::{EntityKind, ReferencePath, SyncStatus};
use crate::validation::{self, ValidationResult};

// =============================================================================
// Record Metadata
// =============================================================================

/// Fields shared by every synced record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Client-generated UUID until the first push, server ID afterwards.
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl RecordMeta {
    /// Metadata for a record created on this device.
    pub fn new_local() -> Self {
        let now = Utc::now();
        RecordMeta {
            id: Uuid::new_v4().to_string(),
            created_at: Some(now),
            updated_at: Some(now),
            sync_status: SyncStatus::PendingCreate,
        }
    }

    /// Metadata for a server-confirmed record.
    pub fn synced(id: impl Into<String>, updated_at: Option<DateTime<Utc>>) -> Self {
        RecordMeta {
            id: id.into(),
            created_at: None,
            updated_at,
            sync_status: SyncStatus::Synced,
        }
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

// =============================================================================
// SyncEntity Trait
// =============================================================================

/// Behaviour every synced entity provides to the store and the sync engine.
pub trait SyncEntity:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + Unpin + 'static
{
    const KIND: EntityKind;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn sync_status(&self) -> SyncStatus {
        self.meta().sync_status
    }

    /// Values that must be unique across all records of this kind.
    ///
    /// Compared case-insensitively by the pull merge. Only products have
    /// any (their barcodes).
    fn unique_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// IDs held at the reference `path`, empty when unset.
    fn referenced_ids(&self, _path: &ReferencePath) -> Vec<&str> {
        Vec::new()
    }

    /// Re-points the reference at `path` from `old_id` to `new_id`.
    ///
    /// Returns `true` if anything changed.
    fn repoint(&mut self, _path: &ReferencePath, _old_id: &str, _new_id: &str) -> bool {
        false
    }

    /// Canonicalizes user input before it is stored.
    fn normalize(&mut self) {}

    fn validate(&self) -> ValidationResult<()> {
        Ok(())
    }
}

fn swap_id(slot: &mut String, old_id: &str, new_id: &str) -> bool {
    if slot == old_id {
        *slot = new_id.to_string();
        true
    } else {
        false
    }
}

macro_rules! impl_meta {
    ($kind:expr) => {
        const KIND: EntityKind = $kind;

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }
    };
}

// =============================================================================
// Category / Cashier / Checkout / PaymentForm
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub description: String,
}

impl SyncEntity for Category {
    impl_meta!(EntityKind::Category);

    fn normalize(&mut self) {
        self.description = self.description.trim().to_string();
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("description", &self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cashier {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
}

impl SyncEntity for Cashier {
    impl_meta!(EntityKind::Cashier);

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
}

impl SyncEntity for Checkout {
    impl_meta!(EntityKind::Checkout);

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("name", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentForm {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub description: String,
}

impl SyncEntity for PaymentForm {
    impl_meta!(EntityKind::PaymentForm);

    fn normalize(&mut self) {
        self.description = self.description.trim().to_string();
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("description", &self.description)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product.
///
/// `barcodes` must be unique across products (case-insensitive); the pull
/// merge rejects incoming products that would break this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub description: String,
    #[serde(default)]
    pub cost: Money,
    /// Percentage over cost, e.g. `35.0` for 35%.
    #[serde(default)]
    pub profit_margin: f64,
    #[serde(default)]
    pub price: Money,
    /// Stock on hand; fractional for products sold by weight.
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub barcodes: Vec<String>,
    /// Weak reference to [`Category`].
    #[serde(default)]
    pub category_id: Option<String>,
}

impl SyncEntity for Product {
    impl_meta!(EntityKind::Product);

    fn unique_keys(&self) -> Vec<String> {
        self.barcodes.iter().map(|code| code.to_lowercase()).collect()
    }

    fn referenced_ids(&self, path: &ReferencePath) -> Vec<&str> {
        match (path, self.category_id.as_deref()) {
            (ReferencePath::Field("categoryId"), Some(id)) => vec![id],
            _ => Vec::new(),
        }
    }

    fn repoint(&mut self, path: &ReferencePath, old_id: &str, new_id: &str) -> bool {
        match (path, self.category_id.as_mut()) {
            (ReferencePath::Field("categoryId"), Some(slot)) => swap_id(slot, old_id, new_id),
            _ => false,
        }
    }

    fn normalize(&mut self) {
        self.description = self.description.trim().to_string();
        self.unit = self.unit.trim().to_string();
        self.barcodes = validation::normalize_barcodes(&self.barcodes);
        if self.category_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            self.category_id = None;
        }
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("description", &self.description)?;
        validation::validate_amount("cost", self.cost)?;
        validation::validate_amount("price", self.price)?;
        validation::validate_finite("profitMargin", self.profit_margin)?;
        validation::validate_finite("quantity", self.quantity)?;
        for code in &self.barcodes {
            validation::validate_barcode(code)?;
        }
        Ok(())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleProduct {
    /// Weak reference to [`Product`].
    pub product_id: String,
    pub quantity: f64,
    pub unit_price: Money,
}

impl SaleProduct {
    /// `unit_price × quantity`, rounded to centavos.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// A finalized sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub payment_form_id: String,
    pub cashier_id: String,
    pub checkout_id: String,
    #[serde(default)]
    pub total_value: Money,
    #[serde(default)]
    pub paid_value: Money,
    #[serde(default)]
    pub change_value: Money,
    #[serde(default)]
    pub sale_products: Vec<SaleProduct>,
}

impl SyncEntity for Sale {
    impl_meta!(EntityKind::Sale);

    fn referenced_ids(&self, path: &ReferencePath) -> Vec<&str> {
        match path {
            ReferencePath::Field("cashierId") => vec![self.cashier_id.as_str()],
            ReferencePath::Field("checkoutId") => vec![self.checkout_id.as_str()],
            ReferencePath::Field("paymentFormId") => vec![self.payment_form_id.as_str()],
            ReferencePath::Nested {
                array: "saleProducts",
                field: "productId",
            } => self.sale_products.iter().map(|line| line.product_id.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    fn repoint(&mut self, path: &ReferencePath, old_id: &str, new_id: &str) -> bool {
        match path {
            ReferencePath::Field("cashierId") => swap_id(&mut self.cashier_id, old_id, new_id),
            ReferencePath::Field("checkoutId") => swap_id(&mut self.checkout_id, old_id, new_id),
            ReferencePath::Field("paymentFormId") => {
                swap_id(&mut self.payment_form_id, old_id, new_id)
            }
            ReferencePath::Nested {
                array: "saleProducts",
                field: "productId",
            } => {
                let mut changed = false;
                for line in &mut self.sale_products {
                    changed |= swap_id(&mut line.product_id, old_id, new_id);
                }
                changed
            }
            _ => false,
        }
    }

    fn validate(&self) -> ValidationResult<()> {
        validation::validate_text("paymentFormId", &self.payment_form_id)?;
        validation::validate_text("cashierId", &self.cashier_id)?;
        validation::validate_text("checkoutId", &self.checkout_id)?;
        validation::validate_sale_totals(self)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sale_with_products(ids: &[&str]) -> Sale {
        Sale {
            meta: RecordMeta::new_local(),
            payment_form_id: "pf-1".into(),
            cashier_id: "c-1".into(),
            checkout_id: "k-1".into(),
            total_value: Money::from_cents(1000),
            paid_value: Money::from_cents(1000),
            change_value: Money::zero(),
            sale_products: ids
                .iter()
                .map(|id| SaleProduct {
                    product_id: id.to_string(),
                    quantity: 1.0,
                    unit_price: Money::from_cents(500),
                })
                .collect(),
        }
    }

    #[test]
    fn test_record_serializes_flat_camel_case() {
        let category = Category {
            meta: RecordMeta::synced("42", None),
            description: "Bebidas".into(),
        };
        let value = serde_json::to_value(&category).unwrap();
        assert_eq!(
            value,
            json!({ "id": "42", "syncStatus": "synced", "description": "Bebidas" })
        );
    }

    #[test]
    fn test_new_local_is_pending_create_with_uuid() {
        let meta = RecordMeta::new_local();
        assert_eq!(meta.sync_status, SyncStatus::PendingCreate);
        assert!(Uuid::parse_str(&meta.id).is_ok());
        assert_eq!(meta.created_at, meta.updated_at);
    }

    #[test]
    fn test_product_deserializes_with_missing_optionals() {
        let product: Product = serde_json::from_value(json!({
            "id": "p1",
            "syncStatus": "pending-update",
            "description": "Cafe",
            "barcodes": ["789ABC"]
        }))
        .unwrap();
        assert_eq!(product.sync_status(), SyncStatus::PendingUpdate);
        assert_eq!(product.unique_keys(), vec!["789abc".to_string()]);
        assert!(product.category_id.is_none());
    }

    #[test]
    fn test_product_repoint_category() {
        let mut product: Product = serde_json::from_value(json!({
            "id": "p1", "description": "Cafe", "categoryId": "uuid1"
        }))
        .unwrap();
        let path = ReferencePath::Field("categoryId");
        assert!(product.repoint(&path, "uuid1", "42"));
        assert_eq!(product.category_id.as_deref(), Some("42"));
        assert!(!product.repoint(&path, "uuid1", "43"));
    }

    #[test]
    fn test_sale_repoint_rewrites_every_matching_line() {
        let mut sale = sale_with_products(&["p-local", "p-other", "p-local"]);
        let path = ReferencePath::Nested {
            array: "saleProducts",
            field: "productId",
        };
        assert!(sale.repoint(&path, "p-local", "7"));
        let ids: Vec<_> = sale.sale_products.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ids, vec!["7", "p-other", "7"]);
    }

    #[test]
    fn test_sale_repoint_ignores_foreign_paths() {
        let mut sale = sale_with_products(&["p1"]);
        assert!(!sale.repoint(&ReferencePath::Field("categoryId"), "c-1", "9"));
        assert!(sale.repoint(&ReferencePath::Field("cashierId"), "c-1", "9"));
        assert_eq!(sale.cashier_id, "9");
    }

    #[test]
    fn test_referenced_ids_follow_reference_paths() {
        let sale = sale_with_products(&["p1", "p2"]);
        let lines = ReferencePath::Nested {
            array: "saleProducts",
            field: "productId",
        };
        assert_eq!(sale.referenced_ids(&lines), vec!["p1", "p2"]);
        assert_eq!(sale.referenced_ids(&ReferencePath::Field("checkoutId")), vec!["k-1"]);

        let product: Product = serde_json::from_value(json!({ "id": "p1", "description": "Cafe" }))
            .unwrap();
        assert!(product.referenced_ids(&ReferencePath::Field("categoryId")).is_empty());
    }
}
