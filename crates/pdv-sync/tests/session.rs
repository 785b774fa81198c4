mod common;

use pdv_core::{Category, SyncEntity, SyncStatus};
use pdv_sync::{PullOptions, SyncError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{list_body, route, Harness};

#[tokio::test]
async fn expired_token_is_refreshed_and_request_retried() {
    let h = Harness::new().await;
    h.sign_in("old-access", "old-refresh").await;

    Mock::given(method("GET"))
        .and(path(route("Category/listCategory")))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("login/refresh")))
        .and(body_json(json!({
            "accessToken": "old-access",
            "refreshToken": "old-refresh",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "new-access",
            "refreshToken": "new-refresh",
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(route("Category/listCategory")))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(
            vec![json!({ "id": "42", "description": "Bebidas" })],
            1,
        )))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h
        .engine
        .pull_engine()
        .pull::<Category>(PullOptions::default())
        .await
        .unwrap();
    assert_eq!(report.stored, 1);

    let session = h.db.auth().get().await.unwrap().unwrap();
    assert_eq!(session.access_token, "new-access");
    assert_eq!(session.refresh_token, "new-refresh");
    assert_eq!(session.tenant.as_deref(), Some("loja01"));
}

#[tokio::test]
async fn rejected_refresh_clears_session() {
    let h = Harness::new().await;
    h.sign_in("old-access", "old-refresh").await;

    Mock::given(method("GET"))
        .and(path(route("Category/listCategory")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("login/refresh")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .pull_engine()
        .pull::<Category>(PullOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SessionExpired));
    assert!(h.db.auth().get().await.unwrap().is_none());
}

#[tokio::test]
async fn session_expiry_aborts_the_pass() {
    let h = Harness::new().await;
    h.sign_in("old-access", "old-refresh").await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("login/refresh")))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid refresh token"))
        .mount(&h.server)
        .await;

    let err = h.engine.run_pass().await.unwrap_err();
    assert!(matches!(err, SyncError::SessionExpired));
    assert!(h.engine.last_sync().await.unwrap().is_none());
}

#[tokio::test]
async fn authenticate_stores_tokens_for_the_tenant() {
    let h = Harness::new().await;

    Mock::given(method("POST"))
        .and(path(route("login/authenticate")))
        .and(body_json(json!({ "email": "caixa@loja.com", "password": "segredo" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "a1",
            "refreshToken": "r1",
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let gateway = h.engine.gateway();
    assert!(!gateway.is_authenticated().await.unwrap());

    let session = gateway.authenticate("caixa@loja.com", "segredo").await.unwrap();
    assert_eq!(session.access_token, "a1");
    assert_eq!(session.tenant.as_deref(), Some("loja01"));
    assert!(gateway.is_authenticated().await.unwrap());

    gateway.logout().await.unwrap();
    assert!(!gateway.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn fetch_one_unwraps_envelope_and_maps_missing_to_none() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    Mock::given(method("GET"))
        .and(path(route("Category/42")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "Id": 42, "Description": "Bebidas" }
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(route("Category/7")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let gateway = h.engine.gateway();
    let found = gateway.fetch_one::<Category>("42").await.unwrap().unwrap();
    assert_eq!(found.id(), "42");
    assert_eq!(found.description, "Bebidas");
    assert_eq!(found.sync_status(), SyncStatus::Synced);

    assert!(gateway.fetch_one::<Category>("7").await.unwrap().is_none());
}

#[tokio::test]
async fn offline_gateway_never_reaches_the_network() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.engine.gateway().connectivity().set_online(false);

    let err = h.engine.gateway().fetch_one::<Category>("42").await.unwrap_err();
    assert!(err.is_offline());
    assert_eq!(h.request_count().await, 0);
}
