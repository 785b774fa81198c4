mod common;

use std::time::Duration;

use pdv_core::{Category, SyncEntity, SyncStatus};
use pdv_sync::{MutationService, PassOutcome, SubmitNotice};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{category, product, route, Harness};

#[tokio::test]
async fn created_category_takes_server_id_and_products_follow() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.empty_lists().await;

    h.db.categories()
        .put(&category("uuid1", "Bebidas", SyncStatus::PendingCreate))
        .await
        .unwrap();
    h.db.products()
        .put(&product("uuid-p", Some("uuid1"), &["789"], SyncStatus::PendingCreate))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .and(header("authorization", "Bearer access"))
        .and(body_partial_json(json!({ "description": "Bebidas" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "description": "Bebidas",
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path(route("Product")))
        .and(body_partial_json(json!({ "categoryId": "42" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "77" })))
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h.engine.run_pass().await.unwrap();
    let PassOutcome::Completed(report) = outcome else {
        panic!("pass did not complete");
    };
    assert!(report.is_clean(), "unexpected failures: {:?}", report.first_error());

    let categories = h.db.categories().all().await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].id(), "42");
    assert_eq!(categories[0].sync_status(), SyncStatus::Synced);
    assert!(h.db.categories().get("uuid1").await.unwrap().is_none());

    let products = h.db.products().all().await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id(), "77");
    assert_eq!(products[0].category_id.as_deref(), Some("42"));
    assert_eq!(products[0].sync_status(), SyncStatus::Synced);

    assert!(h.engine.last_sync().await.unwrap().is_some());
}

#[tokio::test]
async fn plain_text_id_response_is_accepted() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    h.db.categories()
        .put(&category("uuid1", "Frios", SyncStatus::PendingCreate))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .respond_with(ResponseTemplate::new(201).set_body_string("15"))
        .mount(&h.server)
        .await;

    let report = h.engine.push_engine().push::<Category>().await.unwrap();
    assert_eq!(report.created, 1);

    let stored = h.db.categories().get("15").await.unwrap().unwrap();
    assert_eq!(stored.description, "Frios");
    assert_eq!(stored.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn failing_record_stays_pending_and_keeps_watermark() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.empty_lists().await;

    h.db.categories()
        .put(&category("uuid-ok", "Bebidas", SyncStatus::PendingCreate))
        .await
        .unwrap();
    h.db.categories()
        .put(&category("uuid-bad", "Falha", SyncStatus::PendingCreate))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .and(body_partial_json(json!({ "description": "Falha" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("Category")))
        .and(body_partial_json(json!({ "description": "Bebidas" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1" })))
        .mount(&h.server)
        .await;

    let PassOutcome::Completed(report) = h.engine.run_pass().await.unwrap() else {
        panic!("pass did not complete");
    };
    assert_eq!(report.failures(), 1);
    assert!(!report.is_clean());

    let bad = h.db.categories().get("uuid-bad").await.unwrap().unwrap();
    assert_eq!(bad.sync_status(), SyncStatus::PendingCreate);
    assert!(h.db.categories().get("1").await.unwrap().is_some());
    assert!(h.engine.last_sync().await.unwrap().is_none());
}

#[tokio::test]
async fn update_is_put_and_marked_synced() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    h.db.categories()
        .put(&category("42", "Bebidas geladas", SyncStatus::PendingUpdate))
        .await
        .unwrap();

    Mock::given(method("PUT"))
        .and(path(route("Category/42")))
        .and(body_partial_json(json!({ "id": "42", "description": "Bebidas geladas" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.engine.push_engine().push::<Category>().await.unwrap();
    assert_eq!(report.updated, 1);

    let stored = h.db.categories().get("42").await.unwrap().unwrap();
    assert_eq!(stored.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn delete_already_gone_on_server_removes_locally() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    h.db.categories()
        .put(&category("42", "Bebidas", SyncStatus::PendingDelete))
        .await
        .unwrap();

    Mock::given(method("DELETE"))
        .and(path(route("Category/42")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.engine.push_engine().push::<Category>().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed, 0);
    assert!(h.db.categories().get("42").await.unwrap().is_none());
}

/// A pass whose category POST answers after half a second.
async fn slow_create_pass(h: &Harness) -> tokio::task::JoinHandle<()> {
    h.db.categories()
        .put(&category("uuid1", "Bebidas", SyncStatus::PendingCreate))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": 42, "description": "Bebidas" }))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let engine = h.engine.clone();
    let pass = tokio::spawn(async move {
        engine.run_pass().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    pass
}

#[tokio::test]
async fn edit_during_create_is_kept_under_server_id() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.empty_lists().await;

    let pass = slow_create_pass(&h).await;

    let service = MutationService::new(h.engine.clone());
    let mut edited = h.db.categories().get("uuid1").await.unwrap().unwrap();
    edited.description = "Bebidas geladas".into();
    let submission = service.update(edited).await.unwrap();
    assert_eq!(submission.notice, SubmitNotice::SavedAndSyncing);

    pass.await.unwrap();

    assert!(h.db.categories().get("uuid1").await.unwrap().is_none());
    let stored = h.db.categories().get("42").await.unwrap().unwrap();
    assert_eq!(stored.description, "Bebidas geladas");
    assert_eq!(stored.sync_status(), SyncStatus::PendingUpdate);

    Mock::given(method("PUT"))
        .and(path(route("Category/42")))
        .and(body_partial_json(json!({ "description": "Bebidas geladas" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.engine.run_pass().await.unwrap();
    let stored = h.db.categories().get("42").await.unwrap().unwrap();
    assert_eq!(stored.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn delete_during_create_is_not_undone() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.empty_lists().await;

    let pass = slow_create_pass(&h).await;

    let service = MutationService::new(h.engine.clone());
    let deletion = service.delete::<Category>("uuid1").await.unwrap();
    assert!(deletion.removed);

    pass.await.unwrap();

    assert!(h.db.categories().visible().await.unwrap().is_empty());
    let stored = h.db.categories().all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), "42");
    assert_eq!(stored[0].sync_status(), SyncStatus::PendingDelete);

    Mock::given(method("DELETE"))
        .and(path(route("Category/42")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    h.engine.run_pass().await.unwrap();
    assert!(h.db.categories().all().await.unwrap().is_empty());
}
