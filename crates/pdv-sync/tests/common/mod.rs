//! Shared fixtures: an in-memory store, a wiremock backend and an engine
//! pointed at it under the `loja01` tenant.

#![allow(dead_code)]

use pdv_core::{Category, Money, Product, RecordMeta, SyncStatus};
use pdv_db::{AuthSession, Database, DbConfig};
use pdv_sync::{Connectivity, SyncConfig, SyncEngine};
use serde_json::{json, Value};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "loja01";

pub struct Harness {
    pub server: MockServer,
    pub db: Database,
    pub config: SyncConfig,
    pub engine: SyncEngine,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_page_limit(999).await
    }

    pub async fn with_page_limit(page_limit: u32) -> Self {
        let server = MockServer::start().await;
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut config = SyncConfig::for_base_url(format!("{}/{}/", server.uri(), TENANT));
        config.sync.page_limit = page_limit;
        config.api.request_timeout_secs = 5;

        let engine = SyncEngine::from_config(db.clone(), &config, Connectivity::default()).unwrap();

        Harness {
            server,
            db,
            config,
            engine,
        }
    }

    /// Stores a session with the given tokens, as after a sign-in.
    pub async fn sign_in(&self, access_token: &str, refresh_token: &str) {
        self.db
            .auth()
            .save(&AuthSession::new(access_token, refresh_token, Some(TENANT.into())))
            .await
            .unwrap();
    }

    /// Answers every list route not mocked more specifically with an empty page.
    pub async fn empty_lists(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/loja01/\w+/list\w+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(list_body(vec![], 0)))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.map_or(0, |r| r.len())
    }
}

pub fn route(path: &str) -> String {
    format!("/{}/{}", TENANT, path)
}

pub fn list_body(items: Vec<Value>, total: usize) -> Value {
    json!({ "data": items, "totalCount": total })
}

pub fn category(id: &str, description: &str, status: SyncStatus) -> Category {
    let mut meta = RecordMeta::new_local();
    meta.id = id.into();
    meta.sync_status = status;
    Category {
        meta,
        description: description.into(),
    }
}

pub fn product(id: &str, category_id: Option<&str>, barcodes: &[&str], status: SyncStatus) -> Product {
    let mut meta = RecordMeta::new_local();
    meta.id = id.into();
    meta.sync_status = status;
    Product {
        meta,
        description: format!("Produto {}", id),
        cost: Money::from_cents(1000),
        profit_margin: 50.0,
        price: Money::from_cents(1500),
        quantity: 10.0,
        unit: "UN".into(),
        barcodes: barcodes.iter().map(|b| b.to_string()).collect(),
        category_id: category_id.map(str::to_string),
    }
}

/// A product as the backend lists it.
pub fn remote_product(id: &str, barcode: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "description": format!("Produto {}", id),
        "cost": 10.0,
        "profitMargin": 50.0,
        "price": 15.0,
        "quantity": 3,
        "unit": "UN",
        "barcodes": [barcode],
        "categoryId": null,
        "createdAt": updated_at,
        "updatedAt": updated_at,
    })
}
