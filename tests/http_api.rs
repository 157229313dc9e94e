mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use bazaar_shop::domain::aggregates::OrderStatus;
use bazaar_shop::http::extract::{USER_ID_HEADER, USER_STAFF_HEADER};
use bazaar_shop::services::{EventPublisher, HttpPaymentGateway, NoopPublisher};
use bazaar_shop::store::OrderStore;
use bazaar_shop::{build_state, router, AppState, Config};
use common::{RecordingPublisher, Shop};

fn app(shop: &Shop) -> Router {
    app_with_events(shop, Arc::new(NoopPublisher))
}

fn app_with_events(shop: &Shop, events: Arc<dyn EventPublisher>) -> Router {
    let config = Config::from_lookup(|_| None).unwrap();
    let gateway = Arc::new(HttpPaymentGateway::new(config.payment).unwrap());
    router(AppState::new(shop.store.clone(), gateway, events))
}

/// Fills cart `session` with one A and checks it out; returns the order id.
async fn checked_out(app: &Router, shop: &Shop, user: Uuid, session: &str) -> String {
    let address = shop.address(user, "تهران").await;
    let uri = format!("/api/v1/cart/{session}/items");
    send(app, "POST", &uri, None, Some(json!({"variation_id": shop.a.id, "quantity": 1}))).await;
    let (status, body) = send(app, "POST", &format!("/api/v1/checkout/{session}"), Some((user, false)), Some(json!({"address_id": address.id}))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["order"]["id"].as_str().unwrap().to_string()
}

async fn send(app: &Router, method: &str, uri: &str, user: Option<(Uuid, bool)>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some((id, staff)) = user {
        req = req.header(USER_ID_HEADER, id.to_string()).header(USER_STAFF_HEADER, staff.to_string());
    }
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

fn decimal(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let shop = Shop::seed().await;
    let (status, body) = send(&app(&shop), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_starts_without_database_or_nats() {
    let config = Config::from_lookup(|_| None).unwrap();
    let app = router(build_state(&config).await.unwrap());
    let (status, body) = send(&app, "GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_identity_required() {
    let shop = Shop::seed().await;
    let (status, body) = send(&app(&shop), "GET", "/api/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_catalog_writes_are_staff_only() {
    let shop = Shop::seed().await;
    let app = app(&shop);
    let (status, _) = send(&app, "POST", "/api/v1/brands", Some((Uuid::now_v7(), false)), Some(json!({"name": "Nova"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", "/api/v1/brands", Some((Uuid::now_v7(), true)), Some(json!({"name": "Nova Wear"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["slug"], "nova-wear");
}

#[tokio::test]
async fn test_cart_rejects_more_than_stock() {
    let shop = Shop::seed().await;
    let app = app(&shop);
    let uri = "/api/v1/cart/s1/items";

    let (status, body) = send(&app, "POST", uri, None, Some(json!({"variation_id": shop.a.id, "quantity": 6}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["details"]["available"], 5);

    let (status, body) = send(&app, "POST", uri, None, Some(json!({"variation_id": shop.a.id, "quantity": 4}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_quantity"], 4);

    // 4 already in the cart, so 2 more is over.
    let (status, _) = send(&app, "POST", uri, None, Some(json!({"variation_id": shop.a.id, "quantity": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "GET", "/api/v1/cart/s1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&body["total_price"]), dec!(400000));
}

#[tokio::test]
async fn test_cart_validation_and_removal() {
    let shop = Shop::seed().await;
    let app = app(&shop);

    let (status, body) = send(&app, "POST", "/api/v1/cart/s1/items", None, Some(json!({"variation_id": shop.a.id, "quantity": 0}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["details"]["quantity"].is_array());

    let (status, _) = send(&app, "POST", "/api/v1/cart/s1/items", None, Some(json!({"variation_id": Uuid::now_v7(), "quantity": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/api/v1/cart/s1/items", None, Some(json!({"variation_id": shop.b.id, "quantity": 1}))).await;
    let uri = format!("/api/v1/cart/s1/items/{}", shop.b.id);
    let (status, body) = send(&app, "PUT", &uri, None, Some(json!({"quantity": 0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_quantity"], 0);

    let (status, _) = send(&app, "DELETE", "/api/v1/cart/s1", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_checkout_over_http() {
    let shop = Shop::seed().await;
    let app = app(&shop);
    let user = Uuid::now_v7();
    let address = shop.address(user, "تهران").await;

    for (id, qty) in [(shop.a.id, 2), (shop.b.id, 1)] {
        let (status, _) = send(&app, "POST", "/api/v1/cart/s1/items", None, Some(json!({"variation_id": id, "quantity": qty}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, "GET", "/api/v1/checkout/s1", Some((user, false)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"], "review");

    let (status, body) = send(&app, "POST", "/api/v1/checkout/s1", Some((user, false)), Some(json!({"address_id": address.id}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["order"]["total"]), dec!(295000));
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (_, cart) = send(&app, "GET", "/api/v1/cart/s1", None, None).await;
    assert_eq!(cart["total_quantity"], 0);

    let (status, _) = send(&app, "GET", &format!("/api/v1/orders/{order_id}"), Some((Uuid::now_v7(), false)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, "GET", &format!("/api/v1/orders/{order_id}"), Some((Uuid::now_v7(), true)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = send(&app, "POST", "/api/v1/checkout/s1", Some((user, false)), Some(json!({"address_id": address.id}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_listing_returns_product_cards() {
    let shop = Shop::seed().await;
    let (status, body) = send(&app(&shop), "GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let cotton = body["data"].as_array().unwrap().iter().find(|c| c["name"] == "Cotton Shirt").unwrap();
    assert_eq!(decimal(&cotton["from_price"]), dec!(50000));
    assert_eq!(cotton["variation_count"], 1);
    assert_eq!(cotton["in_stock"], true);
    assert!(cotton["main_image"].is_null());
}

#[tokio::test]
async fn test_huge_page_number_returns_empty_page() {
    let shop = Shop::seed().await;
    let app = app(&shop);
    let (status, body) = send(&app, "GET", "/api/v1/products?page=4294967295", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));

    let (status, body) = send(&app, "GET", "/api/v1/categories/shirts?page=4294967295", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"]["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_staff_cancels_pending_order() {
    let shop = Shop::seed().await;
    let events = Arc::new(RecordingPublisher::default());
    let app = app_with_events(&shop, events.clone());
    let user = Uuid::now_v7();
    let order_id = checked_out(&app, &shop, user, "s1").await;
    let uri = format!("/api/v1/orders/{order_id}/status");

    let (status, _) = send(&app, "PUT", &uri, Some((user, false)), Some(json!({"status": "canceled"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let staff = Some((Uuid::now_v7(), true));
    let (status, body) = send(&app, "PUT", &uri, staff, Some(json!({"status": "shipped"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = send(&app, "PUT", &uri, staff, Some(json!({"status": "paid"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "PUT", &uri, staff, Some(json!({"status": "canceled"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");
    assert!(events.subjects().contains(&"shop.orders.canceled"));

    let (_, body) = send(&app, "GET", &format!("/api/v1/orders/{order_id}"), Some((user, false)), None).await;
    assert_eq!(body["status"], "canceled");

    let missing = format!("/api/v1/orders/{}/status", Uuid::now_v7());
    let (status, _) = send(&app, "PUT", &missing, staff, Some(json!({"status": "canceled"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_staff_ships_paid_order() {
    let shop = Shop::seed().await;
    let app = app(&shop);
    let user = Uuid::now_v7();
    let order_id = checked_out(&app, &shop, user, "s1").await;

    let mut order = shop.store.order(order_id.parse().unwrap()).await.unwrap().unwrap();
    order.mark_paid("778899").unwrap();
    shop.store.update_order_status(&order, OrderStatus::Pending).await.unwrap();
    // A stale writer still expecting `pending` loses.
    assert!(shop.store.update_order_status(&order, OrderStatus::Pending).await.is_err());

    let uri = format!("/api/v1/orders/{order_id}/status");
    let (status, body) = send(&app, "PUT", &uri, Some((Uuid::now_v7(), true)), Some(json!({"status": "shipped"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "shipped");
    assert_eq!(shop.store.order(order.id).await.unwrap().unwrap().status, OrderStatus::Shipped);
}
