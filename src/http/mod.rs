//! HTTP surface (axum).

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::services::{CatalogService, CheckoutService, EventPublisher, PaymentGateway, PaymentService};
use crate::session::Session;
use crate::store::{SessionStore, Store};

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod extract;
pub mod orders;

pub use error::ApiError;
pub use extract::CurrentUser;

pub const SESSION_KEY_MAX_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub payments: PaymentService,
    pub events: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), events.clone()),
            payments: PaymentService::new(store.clone(), gateway, events.clone()),
            events,
            store,
        }
    }

    pub(crate) async fn open_session(&self, key: &str) -> Result<Session, ApiError> {
        let key = key.trim();
        if key.is_empty() || key.len() > SESSION_KEY_MAX_LEN {
            return Err(ApiError::bad_request("Invalid session key"));
        }
        Ok(self.store.load_session(key).await?)
    }

    /// Writes the session back only when something changed it.
    pub(crate) async fn save_session(&self, session: &mut Session) -> Result<(), ApiError> {
        if session.is_modified() {
            self.store.save_session(session).await?;
            session.mark_saved();
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams { pub page: Option<u32> }

pub(crate) fn validated<T: Validate>(input: T) -> Result<T, ApiError> {
    input.validate()?;
    Ok(input)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "bazaar-shop"})) }))
        .route("/api/v1/home", get(catalog::home))
        .route("/api/v1/products", get(catalog::list_products).post(catalog::create_product))
        .route("/api/v1/products/:product", get(catalog::product_detail))
        .route("/api/v1/products/:product/variations", post(catalog::add_variation))
        .route("/api/v1/products/:product/images", post(catalog::add_image))
        .route("/api/v1/categories", get(catalog::category_tree).post(catalog::create_category))
        .route("/api/v1/categories/:slug", get(catalog::category_page))
        .route("/api/v1/brands", get(catalog::list_brands).post(catalog::create_brand))
        .route("/api/v1/brands/:slug", get(catalog::brand_page))
        .route("/api/v1/colors", post(catalog::create_color))
        .route("/api/v1/sizes", post(catalog::create_size))
        .route("/api/v1/coupons", post(catalog::create_coupon))
        .route("/api/v1/provinces", get(accounts::list_provinces).post(accounts::create_province))
        .route("/api/v1/provinces/:id/cities", get(accounts::list_cities).post(accounts::create_city))
        .route("/api/v1/addresses", get(accounts::list_addresses).post(accounts::create_address))
        .route("/api/v1/cart/:session", get(cart::show).delete(cart::clear))
        .route("/api/v1/cart/:session/items", post(cart::add_item))
        .route("/api/v1/cart/:session/items/:variation_id", put(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/checkout/:session", get(checkout::show).post(checkout::place_order))
        .route("/api/v1/checkout/:session/address", post(checkout::save_address))
        .route("/api/v1/orders", get(orders::list_orders))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_status))
        .route("/api/v1/orders/:id/payment", post(orders::start_payment))
        .route("/api/v1/payments/callback", get(orders::payment_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
