//! Persistence seams.
//!
//! Each concern gets its own trait; [`Store`] bundles them so the HTTP layer
//! and services can hold a single `Arc<dyn Store>`. [`PgStore`] is the
//! production backend, [`MemoryStore`] backs tests and database-less runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    Address, Brand, Category, City, Color, Coupon, NewAddress, Order, OrderStatus, Payment, Product, ProductDetail, ProductImage,
    ProductVariation, Province, Size, VariationDetail,
};
use crate::domain::value_objects::{HexColor, Sku, Slug, MAX_PRICE};
use crate::session::Session;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Not enough stock for {product}: {available} available, {requested} requested")]
    InsufficientStock { product: String, variation_id: Uuid, available: u32, requested: u32 },
    #[error("Coupon {0} has reached its usage limit")]
    CouponExhausted(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Inputs
// =============================================================================

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewBrand {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewColor {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub code: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewSize {
    #[validate(length(min = 1, max = 20))]
    pub name: String,
    #[serde(default)]
    pub sort_order: u32,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    pub category_id: Uuid,
    pub brand_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewVariation {
    pub color_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
    #[validate(length(min = 1, max = 40))]
    pub sku: String,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub barcode: String,
    pub price_override: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewImage {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub is_main: bool,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCoupon {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    #[validate(range(max = 100))]
    pub percent_off: Option<u32>,
    pub amount_off: Option<Decimal>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub min_subtotal: Option<Decimal>,
}

fn default_true() -> bool { true }

#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub brand_id: Option<Uuid>,
    pub category_ids: Option<Vec<Uuid>>,
    pub page: u32,
    pub per_page: u32,
}

impl ProductQuery {
    pub fn page(&self) -> u32 { self.page.max(1) }
    pub fn per_page(&self) -> u32 { if self.per_page == 0 { DEFAULT_PAGE_SIZE } else { self.per_page.min(MAX_PAGE_SIZE) } }
    /// Widened so any `?page=` value stays in range.
    pub fn offset(&self) -> i64 { i64::from(self.page() - 1) * i64::from(self.per_page()) }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> { pub data: Vec<T>, pub total: i64, pub page: u32, pub per_page: u32 }

// =============================================================================
// Traits
// =============================================================================

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_category(&self, input: NewCategory) -> StoreResult<Category>;
    async fn categories(&self) -> StoreResult<Vec<Category>>;
    async fn create_brand(&self, input: NewBrand) -> StoreResult<Brand>;
    async fn brands(&self) -> StoreResult<Vec<Brand>>;
    async fn brand_by_slug(&self, slug: &str) -> StoreResult<Option<Brand>>;
    async fn create_color(&self, input: NewColor) -> StoreResult<Color>;
    async fn create_size(&self, input: NewSize) -> StoreResult<Size>;
    async fn create_product(&self, input: NewProduct) -> StoreResult<Product>;
    async fn add_variation(&self, product_id: Uuid, input: NewVariation) -> StoreResult<ProductVariation>;
    async fn add_image(&self, product_id: Uuid, input: NewImage) -> StoreResult<ProductImage>;
    /// Active products only, newest first.
    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>>;
    async fn product_detail(&self, slug: &str) -> StoreResult<Option<ProductDetail>>;
    /// Bulk fetch used to price a cart. Unknown ids are absent from the result.
    async fn variations(&self, ids: &[Uuid]) -> StoreResult<Vec<VariationDetail>>;
    /// At most one image per product: the main one, else the first added.
    async fn main_images(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductImage>>;
    async fn active_variations(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>>;
    async fn newest_products(&self, limit: u32) -> StoreResult<Vec<Product>>;
    async fn discounted_products(&self, limit: u32) -> StoreResult<Vec<Product>>;
    /// Active products ranked by units sold in paid or shipped orders since `since`.
    async fn bestsellers(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Product>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_province(&self, name: &str) -> StoreResult<Province>;
    async fn provinces(&self) -> StoreResult<Vec<Province>>;
    async fn create_city(&self, province_id: Uuid, name: &str) -> StoreResult<City>;
    async fn cities(&self, province_id: Uuid) -> StoreResult<Vec<City>>;
    /// Default first, then most recently updated.
    async fn addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>>;
    async fn address(&self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<Address>>;
    /// A user's first address, or one submitted with `is_default`, becomes the only default.
    async fn create_address(&self, user_id: Uuid, input: NewAddress) -> StoreResult<Address>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn create_coupon(&self, input: NewCoupon) -> StoreResult<Coupon>;
    /// Case-insensitive lookup.
    async fn coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and its items, takes the stock and, when `coupon_id` is
    /// given, consumes one use of the coupon. `session` (the buyer's session with
    /// the cart already emptied) is saved alongside. All of it commits or none of it does.
    async fn place_order(&self, order: &Order, coupon_id: Option<Uuid>, session: Option<&Session>) -> StoreResult<()>;
    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;
    /// Persists `order.status` if the stored status is still `from`; `Conflict` otherwise.
    async fn update_order_status(&self, order: &Order, from: OrderStatus) -> StoreResult<()>;
    async fn orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>>;
    async fn payment_by_authority(&self, user_id: Uuid, authority: &str) -> StoreResult<Option<Payment>>;
    /// Insert or update, keyed by order.
    async fn save_payment(&self, payment: &Payment) -> StoreResult<()>;
    /// Stores a successful payment together with the order's new status.
    async fn settle_payment(&self, payment: &Payment, order: &Order) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Unknown keys yield an empty session.
    async fn load_session(&self, key: &str) -> StoreResult<Session>;
    async fn save_session(&self, session: &Session) -> StoreResult<()>;
}

pub trait Store: CatalogStore + AccountStore + CouponStore + OrderStore + PaymentStore + SessionStore {}

impl<T> Store for T where T: CatalogStore + AccountStore + CouponStore + OrderStore + PaymentStore + SessionStore {}

// =============================================================================
// Builders shared by the backends
// =============================================================================

fn invalid(e: impl std::fmt::Display) -> StoreError { StoreError::Invalid(e.to_string()) }

fn check_amount(field: &str, amount: Option<Decimal>) -> StoreResult<()> {
    match amount {
        Some(a) if a < Decimal::ZERO => Err(invalid(format!("{field} cannot be negative"))),
        Some(a) if a > MAX_PRICE => Err(invalid(format!("{field} cannot exceed {MAX_PRICE}"))),
        _ => Ok(()),
    }
}

pub(crate) fn build_category(input: NewCategory, slug: Slug) -> Category {
    Category { id: Uuid::now_v7(), name: input.name.trim().to_string(), slug, parent_id: input.parent_id, is_active: true }
}

pub(crate) fn build_color(input: NewColor) -> StoreResult<Color> {
    let code = match input.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => Some(HexColor::new(raw).ok_or_else(|| invalid(format!("{raw:?} is not a #RRGGBB color")))?),
        None => None,
    };
    Ok(Color { id: Uuid::now_v7(), name: input.name.trim().to_string(), code })
}

pub(crate) fn build_product(input: NewProduct, slug: Slug) -> StoreResult<Product> {
    check_amount("price", Some(input.price))?;
    let mut product = Product::create(input.category_id, input.brand_id, input.name.trim(), slug, input.price).map_err(invalid)?;
    product.description = input.description;
    product.set_discount(input.discount_price).map_err(invalid)?;
    Ok(product)
}

pub(crate) fn build_variation(product_id: Uuid, input: NewVariation) -> StoreResult<ProductVariation> {
    let sku = Sku::new(input.sku).map_err(invalid)?;
    check_amount("price override", input.price_override)?;
    let mut variation = ProductVariation::create(product_id, input.color_id, input.size_id, sku, input.stock);
    variation.barcode = input.barcode;
    variation.price_override = input.price_override;
    Ok(variation)
}

pub(crate) fn build_coupon(input: NewCoupon) -> StoreResult<Coupon> {
    let mut coupon = Coupon::new(input.code).map_err(invalid)?;
    coupon.set_percent_off(input.percent_off).map_err(invalid)?;
    check_amount("amount off", input.amount_off)?;
    check_amount("minimum subtotal", input.min_subtotal)?;
    if let (Some(s), Some(e)) = (input.starts_at, input.ends_at) {
        if e < s { return Err(invalid("coupon ends before it starts")); }
    }
    coupon.amount_off = input.amount_off;
    coupon.is_active = input.is_active;
    coupon.starts_at = input.starts_at;
    coupon.ends_at = input.ends_at;
    coupon.usage_limit = input.usage_limit;
    coupon.min_subtotal = input.min_subtotal;
    Ok(coupon)
}

pub(crate) fn ranked_by_sales(mut sold: Vec<(Product, u64)>, limit: u32) -> Vec<Product> {
    sold.sort_by(|(pa, qa), (pb, qb)| qb.cmp(qa).then(pb.created_at.cmp(&pa.created_at)));
    sold.into_iter().take(limit as usize).map(|(p, _)| p).collect()
}
