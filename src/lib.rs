//! Bazaar storefront service
//!
//! Single-shop storefront backend.
//!
//! ## Features
//! - Product catalog with categories, brands and color/size variations
//! - Session cart priced against live catalog data
//! - Checkout with coupons and province-based shipping
//! - Order history and gateway payments
//! - Domain events published to NATS

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use thiserror::Error;

pub mod config;
pub mod domain;
pub mod http;
pub mod services;
pub mod session;
pub mod store;

pub use config::{Config, ConfigError};
pub use http::{router, ApiError, AppState};
pub use store::{MemoryStore, PgStore, Store, StoreError};

use services::payment::GatewayError;
use services::{EventPublisher, HttpPaymentGateway, NatsPublisher, NoopPublisher};

// =============================================================================
// Error Types
// =============================================================================

/// Failures that stop the service from starting. Request-scoped errors use
/// [`ApiError`] and the per-service error types instead.
#[derive(Error, Debug)]
pub enum ShopError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, ShopError>;

// =============================================================================
// Startup
// =============================================================================

/// Postgres when `DATABASE_URL` is set (migrations applied), otherwise the in-memory store.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(config.max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!(max_connections = config.max_connections, "connected to postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// An unreachable NATS server only disables event publishing.
pub async fn connect_events(config: &Config) -> Arc<dyn EventPublisher> {
    let Some(url) = &config.nats_url else { return Arc::new(NoopPublisher) };
    match async_nats::connect(url.as_str()).await {
        Ok(client) => {
            tracing::info!(%url, "connected to NATS");
            Arc::new(NatsPublisher::new(client))
        }
        Err(e) => {
            tracing::warn!(%url, error = %e, "NATS unavailable, domain events will not be published");
            Arc::new(NoopPublisher)
        }
    }
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    let store = connect_store(config).await?;
    let events = connect_events(config).await;
    let gateway = Arc::new(HttpPaymentGateway::new(config.payment.clone())?);
    Ok(AppState::new(store, gateway, events))
}
