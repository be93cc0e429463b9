//! End-to-end requests through the router with in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use datalayer_api::app::{build_router, AppState, Stores};
use datalayer_api::config::ApiConfig;
use datalayer_api::services::dispatcher::{MARKUP_END, MARKUP_START};
use datalayer_api::services::list_cache::MemoryCacheStore;
use datalayer_api::services::ListCache;
use datalayer_core::{ErrorLogRepository, EventLogRepository, Product};
use datalayer_db::memory::{MemoryCatalog, MemoryErrorLog, MemoryEventLog, MemoryNoticeState};

const STOREFRONT_KEY: &str = "storefront-key";
const ADMIN_KEY: &str = "admin-key";

struct Harness {
    app: Router,
    events: Arc<MemoryEventLog>,
    errors: Arc<MemoryErrorLog>,
}

fn harness() -> Harness {
    let config = ApiConfig {
        bridge_token_secret: Some("router-test-secret-0123".to_string()),
        storefront_api_key: Some(STOREFRONT_KEY.to_string()),
        admin_keys: HashMap::from([(ADMIN_KEY.to_string(), "alice".to_string())]),
        maintenance_secret: Some("wipe-it".to_string()),
        currency: "EUR".to_string(),
        rate_limit_enabled: false,
        ..ApiConfig::default()
    };

    let events = Arc::new(MemoryEventLog::new());
    let notices = Arc::new(MemoryNoticeState::new());
    let errors = Arc::new(MemoryErrorLog::new(notices.clone()));
    let catalog = Arc::new(MemoryCatalog::with_products([Product::new(
        42,
        "Green Tea",
        "19.99".parse().unwrap(),
    )]));
    let stores = Stores {
        event_log: events.clone(),
        error_log: errors.clone(),
        notices,
        catalog,
    };
    let cache = ListCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(600));
    let state = AppState::new(config, stores, cache).unwrap();

    Harness {
        app: build_router(state),
        events,
        errors,
    }
}

async fn send(app: &Router, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn bridge_token(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/bridge/token",
        Some(STOREFRONT_KEY),
        Some(json!({"actor": {"user_id": 7, "roles": ["customer"]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn test_token_issue_requires_storefront_key() {
    let h = harness();
    let (status, _) = send(&h.app, "POST", "/api/v1/bridge/token", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&h.app, "POST", "/api/v1/bridge/token", Some("wrong"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bridge_round_trip_over_http() {
    let h = harness();
    let token = bridge_token(&h.app).await;

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/bridge",
        None,
        Some(json!({
            "action": "add_to_cart",
            "authorizationToken": token,
            "payload": {"productId": 42, "quantity": 3}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["eventModel"]["value"].as_f64(), Some(59.97));
    assert_eq!(body["data"]["customer"]["user_role"], json!("customer"));
    assert_eq!(h.events.count().await.unwrap(), 1);

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/bridge",
        None,
        Some(json!({"action": "add_to_cart", "token": "nope", "payload": {"productId": 42}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("invalid_token"));
    assert_eq!(h.events.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bridge_dismiss_with_admin_header() {
    let h = harness();
    let token = bridge_token(&h.app).await;
    let request = json!({"action": "dismiss_errors", "token": token});

    let (status, _) = send(&h.app, "POST", "/api/v1/bridge", None, Some(request.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&h.app, "POST", "/api/v1/bridge", Some(ADMIN_KEY), Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_lifecycle_returns_markup_in_order() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/lifecycle",
        Some(STOREFRONT_KEY),
        Some(json!({
            "events": [
                {"kind": "search", "term": "tea"},
                {"kind": "apply_coupon", "code": "WELCOME10"}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let markup = body["markup"].as_str().unwrap();
    assert_eq!(markup.matches(MARKUP_START).count(), 2);
    assert_eq!(markup.matches(MARKUP_END).count(), 2);
    assert!(markup.find("search_term").unwrap() < markup.find("WELCOME10").unwrap());
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
    assert_eq!(h.events.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_product_update_invalidates_listing_cache() {
    let h = harness();
    let listing = |name: &str| {
        json!({
            "events": [{
                "kind": "view_item_list",
                "listing": {"kind": "category", "slug": "tea", "page": 1},
                "products": [{"id": 42, "name": name, "price": "19.99"}]
            }]
        })
    };

    let (_, first) = send(&h.app, "POST", "/api/v1/lifecycle", Some(STOREFRONT_KEY), Some(listing("Green Tea"))).await;
    let (_, cached) = send(&h.app, "POST", "/api/v1/lifecycle", Some(STOREFRONT_KEY), Some(listing("Renamed"))).await;
    assert_eq!(
        first["events"][0]["eventModel"]["items"],
        cached["events"][0]["eventModel"]["items"]
    );

    let (status, body) = send(
        &h.app,
        "PUT",
        "/api/v1/products/42",
        Some(STOREFRONT_KEY),
        Some(json!({"id": 42, "name": "Renamed", "price": "19.99"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheInvalidated"], json!(true));

    let (_, fresh) = send(&h.app, "POST", "/api/v1/lifecycle", Some(STOREFRONT_KEY), Some(listing("Renamed"))).await;
    assert_eq!(fresh["events"][0]["eventModel"]["items"][0]["name"], json!("Renamed"));
}

#[tokio::test]
async fn test_admin_routes_require_admin_key() {
    let h = harness();
    let (status, _) = send(&h.app, "GET", "/api/v1/admin/logs/events", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&h.app, "GET", "/api/v1/admin/logs/events", Some(STOREFRONT_KEY), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&h.app, "GET", "/api/v1/admin/logs/events?page=1", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(0));
}

#[tokio::test]
async fn test_log_page_beyond_range_over_http() {
    let h = harness();
    h.errors.append("only one").await.unwrap();
    let (status, body) = send(
        &h.app,
        "GET",
        "/api/v1/admin/logs/errors?page=9223372036854775807",
        Some(ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"], json!([]));
    assert_eq!(body["total"], json!(1));
}

#[tokio::test]
async fn test_clear_with_wrong_secret_keeps_logs() {
    let h = harness();
    h.errors.append("kept").await.unwrap();

    let (status, _) = send(&h.app, "POST", "/api/v1/admin/logs/clear?secret=guess", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.errors.count().await.unwrap(), 1);

    let (status, body) = send(&h.app, "POST", "/api/v1/admin/logs/clear?secret=wipe-it", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["errors"], json!(1));
    assert_eq!(h.errors.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_notice_and_dismiss() {
    let h = harness();
    h.errors.append("first failure").await.unwrap();

    let (_, notice) = send(&h.app, "GET", "/api/v1/admin/notice", Some(ADMIN_KEY), None).await;
    assert_eq!(notice["show"], json!(true));
    assert_eq!(notice["total"], json!(1));

    let (status, _) = send(&h.app, "POST", "/api/v1/admin/notice/dismiss", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, notice) = send(&h.app, "GET", "/api/v1/admin/notice", Some(ADMIN_KEY), None).await;
    assert_eq!(notice["show"], json!(false));
}
