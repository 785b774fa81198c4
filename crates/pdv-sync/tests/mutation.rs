mod common;

use pdv_core::{Category, SyncEntity, SyncStatus};
use pdv_sync::{MutationService, SubmitNotice, SyncError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{category, product, route, Harness};

#[tokio::test]
async fn online_create_is_pushed_at_once() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&h.server)
        .await;

    let service = MutationService::new(h.engine.clone());
    let submission = service
        .create(category("", "Bebidas", SyncStatus::Synced))
        .await
        .unwrap();

    assert_eq!(submission.notice, SubmitNotice::SavedAndSyncing);
    assert_eq!(submission.record.id(), "42");
    assert_eq!(submission.record.sync_status(), SyncStatus::Synced);
    assert_eq!(h.db.categories().all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_during_a_pass_is_left_for_it() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    let service = MutationService::new(h.engine.clone());
    let pass = h.engine.try_lock_pass().unwrap();

    let submission = service
        .create(category("", "Bebidas", SyncStatus::Synced))
        .await
        .unwrap();
    drop(pass);

    assert_eq!(submission.notice, SubmitNotice::SavedAndSyncing);
    assert_eq!(submission.record.sync_status(), SyncStatus::PendingCreate);
    assert_eq!(h.request_count().await, 0);
}

#[tokio::test]
async fn server_error_keeps_the_edit_pending() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.db.categories()
        .put(&category("42", "Bebidas", SyncStatus::Synced))
        .await
        .unwrap();

    Mock::given(method("PUT"))
        .and(path(route("Category/42")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let service = MutationService::new(h.engine.clone());
    let submission = service
        .update(category("42", "Frios", SyncStatus::Synced))
        .await
        .unwrap();
    assert_eq!(submission.notice, SubmitNotice::SavedAndSyncing);

    let stored: Category = h.db.categories().get("42").await.unwrap().unwrap();
    assert_eq!(stored.description, "Frios");
    assert_eq!(stored.sync_status(), SyncStatus::PendingUpdate);
}

#[tokio::test]
async fn online_delete_removes_after_server_confirms() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.db.categories()
        .put(&category("42", "Bebidas", SyncStatus::Synced))
        .await
        .unwrap();

    Mock::given(method("DELETE"))
        .and(path(route("Category/42")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.server)
        .await;

    let service = MutationService::new(h.engine.clone());
    let deletion = service.delete::<Category>("42").await.unwrap();

    assert!(deletion.removed);
    assert_eq!(deletion.notice, SubmitNotice::SavedAndSyncing);
    assert!(h.db.categories().get("42").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_session_interrupts_the_user() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(route("login/refresh")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let service = MutationService::new(h.engine.clone());
    let err = service
        .create(category("", "Bebidas", SyncStatus::Synced))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SessionExpired));

    let stored = h.db.categories().all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sync_status(), SyncStatus::PendingCreate);
}

#[tokio::test]
async fn product_waits_for_its_unpushed_category() {
    let h = Harness::new().await;
    h.sign_in("access", "refresh").await;
    h.empty_lists().await;

    h.db.categories()
        .put(&category("uuid1", "Bebidas", SyncStatus::PendingCreate))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path(route("Category")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42 })))
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

    let service = MutationService::new(h.engine.clone());
    let submission = service
        .create(product("", Some("uuid1"), &["789"], SyncStatus::Synced))
        .await
        .unwrap();

    assert_eq!(submission.notice, SubmitNotice::SavedAndSyncing);
    assert_eq!(submission.record.sync_status(), SyncStatus::PendingCreate);
    assert_eq!(h.request_count().await, 0);

    h.engine.run_pass().await.unwrap();

    let products = h.db.products().all().await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id(), "77");
    assert_eq!(products[0].category_id.as_deref(), Some("42"));
    assert_eq!(products[0].sync_status(), SyncStatus::Synced);
}
