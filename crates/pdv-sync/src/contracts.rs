//! # Remote Contracts
//!
//! Explicit mappings between the PDV backend's JSON and the canonical
//! records in `pdv-core`.
//!
//! ## Why a Tolerant Reader
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  What the backend may send for one Category                            │
//! │                                                                         │
//! │  { "id": 42, "description": "Bebidas" }            plain, numeric id   │
//! │  { "Id": "42", "Description": "Bebidas" }          PascalCase          │
//! │  { "data": { "id": 42, ... } }                     envelope            │
//! │  { "value": { "id": 42 } }                         partial envelope    │
//! │  42                                                bare id (create)    │
//! │                                                                         │
//! │  RemoteRecord::find("description") matches exact → PascalCase →        │
//! │  case-insensitive, and skips nulls.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity has one [`RemoteContract`] impl. Nothing else in the crate
//! reads raw server JSON.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use pdv_core::{
    parse_timestamp, format_timestamp, Cashier, Category, Checkout, Money, PaymentForm, Product,
    RecordMeta, Sale, SaleProduct, SyncEntity,
};

use crate::gateway::RemoteResponse;

/// Keys that wrap the actual payload in some responses.
const ENVELOPE_KEYS: [&str; 2] = ["data", "value"];

// =============================================================================
// Envelope Handling
// =============================================================================

/// Strips a `{ "data": ... }` or `{ "value": ... }` wrapper.
///
/// Only unwraps when the wrapper key holds an object or array, so a record
/// that happens to have a scalar `value` field is left alone.
pub fn unwrap_envelope(value: &Value) -> &Value {
    let Value::Object(map) = value else {
        return value;
    };

    for key in ENVELOPE_KEYS {
        if let Some(inner) = find_key(map, key) {
            if inner.is_object() || inner.is_array() {
                return inner;
            }
        }
    }
    value
}

/// Items of a list response: `{ data: [...] }`, `{ value: [...] }` or a bare
/// array.
pub fn list_items(value: &Value) -> &[Value] {
    match unwrap_envelope(value) {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    }
}

/// `totalCount` of a list response, when present.
pub fn total_count(value: &Value) -> Option<u64> {
    value
        .as_object()
        .and_then(|map| find_key(map, "totalCount"))
        .and_then(|count| match count {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Looks a key up exact, then PascalCase, then case-insensitively.
fn find_key<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let found = map
        .get(name)
        .or_else(|| map.get(&pascal_case(name)))
        .or_else(|| {
            map.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        });

    found.filter(|value| !value.is_null())
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Renders a scalar id. Strings are trimmed; integral numbers lose any `.0`.
fn id_from_value(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        _ => return None,
    };
    Some(id).filter(|id| !id.is_empty())
}

// =============================================================================
// RemoteRecord
// =============================================================================

/// Read-only, case-tolerant view over one JSON object from the server.
#[derive(Debug, Clone, Copy)]
pub struct RemoteRecord<'a> {
    fields: &'a Map<String, Value>,
}

impl<'a> RemoteRecord<'a> {
    /// Wraps `value` after unwrapping any envelope. `None` unless the result
    /// is an object.
    pub fn new(value: &'a Value) -> Option<Self> {
        unwrap_envelope(value)
            .as_object()
            .map(|fields| RemoteRecord { fields })
    }

    pub fn find(&self, name: &str) -> Option<&'a Value> {
        find_key(self.fields, name)
    }

    /// The record's id as a string; numeric ids are accepted.
    pub fn id(&self) -> Option<String> {
        self.find("id").and_then(id_from_value)
    }

    /// A string field. Numbers are rendered, which covers numeric foreign keys.
    pub fn string(&self, name: &str) -> Option<String> {
        self.find(name).and_then(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(_) => id_from_value(value),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn string_or_default(&self, name: &str) -> String {
        self.string(name).unwrap_or_default()
    }

    /// A number, also accepting numeric strings (`"10.5"`, `"10,5"`).
    pub fn number(&self, name: &str) -> Option<f64> {
        self.find(name).and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        })
    }

    /// A decimal currency amount.
    pub fn money(&self, name: &str) -> Money {
        self.number(name).map(Money::from_decimal).unwrap_or_default()
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.find(name)
            .and_then(Value::as_str)
            .and_then(|raw| parse_timestamp(raw).ok())
    }

    /// A list of strings; a single string is treated as a one-item list.
    pub fn strings(&self, name: &str) -> Vec<String> {
        match self.find(name) {
            Some(Value::Array(items)) => items.iter().filter_map(id_from_value).collect(),
            Some(value) => id_from_value(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Nested objects of an array field.
    pub fn records(&self, name: &str) -> Vec<RemoteRecord<'a>> {
        match self.find(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().map(|fields| RemoteRecord { fields }))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Synced metadata built from `id`, `createdAt` and `updatedAt`.
    fn meta(&self) -> Option<RecordMeta> {
        let mut meta = RecordMeta::synced(self.id()?, self.timestamp("updatedAt"));
        meta.created_at = self.timestamp("createdAt");
        Some(meta)
    }
}

// =============================================================================
// RemoteContract
// =============================================================================

/// How one entity type maps to the backend.
pub trait RemoteContract: SyncEntity {
    /// Route segment, e.g. `"Category"` → `POST Category`, `PUT Category/{id}`.
    const ENDPOINT: &'static str;

    /// `{E}/list{E}`.
    fn list_endpoint() -> String {
        format!("{0}/list{0}", Self::ENDPOINT)
    }

    /// `{E}/{id}`.
    fn item_route(id: &str) -> String {
        format!("{}/{}", Self::ENDPOINT, id)
    }

    /// Builds a canonical, `synced` record. `None` when there is no usable id.
    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self>;

    /// Entity fields as the backend expects them, without `id` or
    /// `syncStatus`.
    fn remote_fields(&self) -> Map<String, Value>;

    /// Body for `PUT {E}/{id}`.
    fn to_remote(&self) -> Value {
        let mut fields = self.remote_fields();
        fields.insert("id".into(), Value::String(self.id().to_string()));
        insert_timestamps(&mut fields, self.meta());
        Value::Object(fields)
    }

    /// Body for `POST {E}`: the client id is the server's to replace.
    fn create_payload(&self) -> Value {
        let mut fields = self.remote_fields();
        insert_timestamps(&mut fields, self.meta());
        Value::Object(fields)
    }
}

fn insert_timestamps(fields: &mut Map<String, Value>, meta: &RecordMeta) {
    if let Some(created_at) = &meta.created_at {
        fields.insert("createdAt".into(), Value::String(format_timestamp(created_at)));
    }
    if let Some(updated_at) = &meta.updated_at {
        fields.insert("updatedAt".into(), Value::String(format_timestamp(updated_at)));
    }
}

/// Turns a create response into the canonical record that replaces `local`.
///
/// ## Accepted Shapes
/// - bare id scalar (`42`, `"42"`, or a text body `42`) → `local` with that id
/// - object, possibly enveloped and partial → merged over `local`'s payload
///
/// Returns `None` when the response carries no usable id.
pub fn normalize_created<E: RemoteContract>(local: &E, response: &RemoteResponse) -> Option<E> {
    let body = match response {
        RemoteResponse::Json(value) => unwrap_envelope(value),
        RemoteResponse::Text(text) => {
            let id = text.trim().trim_matches('"');
            if id.is_empty() || id.contains(char::is_whitespace) || id.starts_with('<') {
                return None;
            }
            return Some(with_server_id(local, id));
        }
    };

    match body {
        Value::Object(remote) => {
            let mut merged = local.create_payload();
            if let Value::Object(fields) = &mut merged {
                merge_fields(fields, remote);
            }
            let mut record = RemoteRecord::new(&merged).and_then(|r| E::from_remote(&r))?;
            if record.meta().created_at.is_none() {
                record.meta_mut().created_at = local.meta().created_at;
            }
            if record.meta().updated_at.is_none() {
                record.meta_mut().updated_at = local.meta().updated_at;
            }
            Some(record)
        }
        scalar => id_from_value(scalar).map(|id| with_server_id(local, &id)),
    }
}

fn with_server_id<E: SyncEntity>(local: &E, id: &str) -> E {
    let mut record = local.clone();
    let meta = record.meta_mut();
    meta.id = id.to_string();
    meta.sync_status = pdv_core::SyncStatus::Synced;
    record
}

/// Overlays `remote` on `local`, replacing keys that match case-insensitively.
/// Nulls in `remote` do not erase local values.
fn merge_fields(local: &mut Map<String, Value>, remote: &Map<String, Value>) {
    for (key, value) in remote {
        if value.is_null() {
            continue;
        }
        let existing = local
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned();
        if let Some(existing) = existing {
            local.remove(&existing);
        }
        local.insert(key.clone(), value.clone());
    }
}

// =============================================================================
// Entity Contracts
// =============================================================================

impl RemoteContract for Category {
    const ENDPOINT: &'static str = "Category";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        Some(Category {
            meta: remote.meta()?,
            description: remote.string_or_default("description"),
        })
    }

    fn remote_fields(&self) -> Map<String, Value> {
        object(json!({ "description": self.description }))
    }
}

impl RemoteContract for Cashier {
    const ENDPOINT: &'static str = "Cashier";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        Some(Cashier {
            meta: remote.meta()?,
            name: remote.string_or_default("name"),
        })
    }

    fn remote_fields(&self) -> Map<String, Value> {
        object(json!({ "name": self.name }))
    }
}

impl RemoteContract for Checkout {
    const ENDPOINT: &'static str = "Checkout";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        Some(Checkout {
            meta: remote.meta()?,
            name: remote.string_or_default("name"),
        })
    }

    fn remote_fields(&self) -> Map<String, Value> {
        object(json!({ "name": self.name }))
    }
}

impl RemoteContract for PaymentForm {
    const ENDPOINT: &'static str = "PaymentForm";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        Some(PaymentForm {
            meta: remote.meta()?,
            description: remote.string_or_default("description"),
        })
    }

    fn remote_fields(&self) -> Map<String, Value> {
        object(json!({ "description": self.description }))
    }
}

impl RemoteContract for Product {
    const ENDPOINT: &'static str = "Product";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        let mut product = Product {
            meta: remote.meta()?,
            description: remote.string_or_default("description"),
            cost: remote.money("cost"),
            profit_margin: remote.number("profitMargin").unwrap_or_default(),
            price: remote.money("price"),
            quantity: remote.number("quantity").unwrap_or_default(),
            unit: remote.string_or_default("unit"),
            barcodes: remote.strings("barcodes"),
            category_id: remote.string("categoryId"),
        };
        product.normalize();
        Some(product)
    }

    fn remote_fields(&self) -> Map<String, Value> {
        object(json!({
            "description": self.description,
            "cost": self.cost.to_decimal(),
            "profitMargin": self.profit_margin,
            "price": self.price.to_decimal(),
            "quantity": self.quantity,
            "unit": self.unit,
            "barcodes": self.barcodes,
            "categoryId": self.category_id,
        }))
    }
}

impl RemoteContract for Sale {
    const ENDPOINT: &'static str = "Sale";

    fn from_remote(remote: &RemoteRecord<'_>) -> Option<Self> {
        let sale_products = remote
            .records("saleProducts")
            .iter()
            .map(|line| SaleProduct {
                product_id: line.string_or_default("productId"),
                quantity: line.number("quantity").unwrap_or_default(),
                unit_price: line.money("unitPrice"),
            })
            .collect();

        Some(Sale {
            meta: remote.meta()?,
            payment_form_id: remote.string_or_default("paymentFormId"),
            cashier_id: remote.string_or_default("cashierId"),
            checkout_id: remote.string_or_default("checkoutId"),
            total_value: remote.money("totalValue"),
            paid_value: remote.money("paidValue"),
            change_value: remote.money("changeValue"),
            sale_products,
        })
    }

    fn remote_fields(&self) -> Map<String, Value> {
        let lines: Vec<Value> = self
            .sale_products
            .iter()
            .map(|line| {
                json!({
                    "productId": line.product_id,
                    "quantity": line.quantity,
                    "unitPrice": line.unit_price.to_decimal(),
                })
            })
            .collect();

        object(json!({
            "paymentFormId": self.payment_form_id,
            "cashierId": self.cashier_id,
            "checkoutId": self.checkout_id,
            "totalValue": self.total_value.to_decimal(),
            "paidValue": self.paid_value.to_decimal(),
            "changeValue": self.change_value.to_decimal(),
            "saleProducts": lines,
        }))
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
