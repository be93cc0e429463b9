//! PostgreSQL integration tests for the log stores, notice state and catalog.
//!
//! Run with: `cargo test -p datalayer-db --test log_store_test -- --ignored`

use datalayer_db::test_fixtures::TestDatabase;
use datalayer_db::{
    ErrorLogRepository, EventLogRepository, NewEventLogEntry, NoticeStateRepository, Product,
    ProductCatalog,
};
use serde_json::json;

fn entry(name: &str, user_id: Option<i64>) -> NewEventLogEntry {
    NewEventLogEntry {
        event_name: name.to_string(),
        user_id,
        user_role: user_id.map(|_| "customer".to_string()),
        event_data: json!({"event": name, "eventModel": {"items": []}}),
    }
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a PostgreSQL instance
async fn test_event_log_append_and_paginate() {
    let test_db = TestDatabase::new().await;
    let log = &test_db.db.event_log;

    for i in 0..15 {
        log.append(entry(&format!("event_{}", i), None)).await.unwrap();
    }

    let page2 = log.paginate(2, 10).await.unwrap();
    assert_eq!(page2.logs.len(), 5);
    assert_eq!(page2.total, 15);

    let recent = log.recent(3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].event_name, "event_14");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a PostgreSQL instance
async fn test_event_log_preserves_payload_and_actor() {
    let test_db = TestDatabase::new().await;
    let log = &test_db.db.event_log;

    log.append(entry("add_to_cart", Some(12))).await.unwrap();
    let rows = log.recent(1).await.unwrap();
    assert_eq!(rows[0].user_id, Some(12));
    assert_eq!(rows[0].user_role.as_deref(), Some("customer"));
    assert_eq!(rows[0].event_data["event"], json!("add_to_cart"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a PostgreSQL instance
async fn test_clear_removes_all_rows() {
    let test_db = TestDatabase::new().await;

    test_db.db.event_log.append(entry("view_item", None)).await.unwrap();
    test_db.db.error_log.append("Product not found: 3").await.unwrap();

    assert_eq!(test_db.db.event_log.clear().await.unwrap(), 1);
    assert_eq!(test_db.db.error_log.clear().await.unwrap(), 1);
    assert_eq!(test_db.db.event_log.count().await.unwrap(), 0);
    assert_eq!(test_db.db.error_log.count().await.unwrap(), 0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a PostgreSQL instance
async fn test_error_append_resets_notice() {
    let test_db = TestDatabase::new().await;
    let notices = &test_db.db.notice_state;

    notices.dismiss("admin-1").await.unwrap();
    notices.dismiss("admin-1").await.unwrap();
    assert!(notices.is_dismissed("admin-1").await.unwrap());

    test_db.db.error_log.append("Order not found: 55").await.unwrap();
    assert!(!notices.is_dismissed("admin-1").await.unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a PostgreSQL instance
async fn test_catalog_round_trip() {
    let test_db = TestDatabase::new().await;
    let catalog = &test_db.db.catalog;

    let mut product = Product::new(42, "Linen Shirt", "19.99".parse().unwrap());
    product.categories = vec!["Clothing".into(), "Shirts".into()];
    catalog.upsert(&product).await.unwrap();

    let loaded = catalog.get(42).await.unwrap().unwrap();
    assert_eq!(loaded, product);
    assert!(catalog.get(43).await.unwrap().is_none());

    test_db.cleanup().await;
}
