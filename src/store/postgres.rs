//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::{OrderItem, OrderStatus, OrderTotals, PaymentStatus, ShippingSnapshot};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    /// `table` is always a literal from this module.
    async fn unique_slug(&self, table: &'static str, name: &str) -> StoreResult<Slug> {
        let base = Slug::from_name(name).map_err(invalid)?;
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(&format!("SELECT slug FROM {table} WHERE slug = $1 OR slug LIKE $2"))
            .bind(base.as_str()).bind(format!("{}-%", like_escape(base.as_str())))
            .fetch_all(&self.pool).await?
            .into_iter().collect();
        Slug::unique(name, |s| taken.contains(s)).map_err(invalid)
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> StoreResult<Vec<OrderItemRow>> {
        Ok(sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(order_ids).fetch_all(&self.pool).await?)
    }

    async fn assemble_orders(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = self.load_items(&ids).await?;
        rows.into_iter().map(|row| {
            let mine = items.iter().filter(|i| i.order_id == row.id).cloned().map(OrderItem::try_from).collect::<StoreResult<Vec<_>>>()?;
            row.into_order(mine)
        }).collect()
    }
}

fn like_escape(s: &str) -> String { s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_") }

fn conflict_on_unique(e: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(message()),
        _ => StoreError::Database(e),
    }
}

fn to_u32(v: i32, what: &str) -> StoreResult<u32> { u32::try_from(v).map_err(|_| invalid(format!("negative {what} in storage"))) }
fn to_i32(v: u32, what: &str) -> StoreResult<i32> { i32::try_from(v).map_err(|_| invalid(format!("{what} too large"))) }

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, parent_id: Option<Uuid>, is_active: bool }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self { Category { id: r.id, name: r.name, slug: Slug::from_stored(r.slug), parent_id: r.parent_id, is_active: r.is_active } }
}

#[derive(sqlx::FromRow)]
struct BrandRow { id: Uuid, name: String, slug: String }

impl From<BrandRow> for Brand {
    fn from(r: BrandRow) -> Self { Brand { id: r.id, name: r.name, slug: Slug::from_stored(r.slug) } }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, category_id: Uuid, brand_id: Uuid, name: String, slug: String, description: String,
    price: Decimal, discount_price: Option<Decimal>, is_active: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id, category_id: r.category_id, brand_id: r.brand_id, name: r.name, slug: Slug::from_stored(r.slug),
            description: r.description, price: r.price, discount_price: r.discount_price, is_active: r.is_active,
            created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow { id: Uuid, product_id: Uuid, url: String, alt_text: String, is_main: bool }

impl From<ImageRow> for ProductImage {
    fn from(r: ImageRow) -> Self { ProductImage { id: r.id, product_id: r.product_id, url: r.url, alt_text: r.alt_text, is_main: r.is_main } }
}

const VARIATION_DETAIL_SELECT: &str = r#"
    SELECT v.id, v.product_id, v.color_id, v.size_id, v.sku, v.barcode, v.price_override, v.stock, v.is_active,
           p.category_id, p.brand_id, p.name AS product_name, p.slug AS product_slug, p.description AS product_description,
           p.price AS product_price, p.discount_price AS product_discount_price, p.is_active AS product_is_active,
           p.created_at AS product_created_at, p.updated_at AS product_updated_at,
           c.name AS color_name, c.code AS color_code, s.name AS size_name, s.sort_order AS size_sort_order
    FROM product_variations v
    JOIN products p ON p.id = v.product_id
    LEFT JOIN colors c ON c.id = v.color_id
    LEFT JOIN sizes s ON s.id = v.size_id
"#;

#[derive(sqlx::FromRow)]
struct VariationDetailRow {
    id: Uuid, product_id: Uuid, color_id: Option<Uuid>, size_id: Option<Uuid>, sku: String, barcode: String,
    price_override: Option<Decimal>, stock: i32, is_active: bool,
    category_id: Uuid, brand_id: Uuid, product_name: String, product_slug: String, product_description: String,
    product_price: Decimal, product_discount_price: Option<Decimal>, product_is_active: bool,
    product_created_at: DateTime<Utc>, product_updated_at: DateTime<Utc>,
    color_name: Option<String>, color_code: Option<String>, size_name: Option<String>, size_sort_order: Option<i32>,
}

impl TryFrom<VariationDetailRow> for VariationDetail {
    type Error = StoreError;
    fn try_from(r: VariationDetailRow) -> StoreResult<Self> {
        let color = match (r.color_id, r.color_name) {
            (Some(id), Some(name)) => Some(Color { id, name, code: r.color_code.as_deref().and_then(HexColor::new) }),
            _ => None,
        };
        let size = match (r.size_id, r.size_name) {
            (Some(id), Some(name)) => Some(Size { id, name, sort_order: to_u32(r.size_sort_order.unwrap_or(0), "sort order")? }),
            _ => None,
        };
        Ok(VariationDetail {
            variation: ProductVariation {
                id: r.id, product_id: r.product_id, color_id: r.color_id, size_id: r.size_id,
                sku: Sku::new(r.sku).map_err(invalid)?, barcode: r.barcode, price_override: r.price_override,
                stock: to_u32(r.stock, "stock")?, is_active: r.is_active,
            },
            product: Product {
                id: r.product_id, category_id: r.category_id, brand_id: r.brand_id, name: r.product_name,
                slug: Slug::from_stored(r.product_slug), description: r.product_description, price: r.product_price,
                discount_price: r.product_discount_price, is_active: r.product_is_active,
                created_at: r.product_created_at, updated_at: r.product_updated_at,
            },
            color,
            size,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: Uuid, product_id: Uuid, color_id: Option<Uuid>, size_id: Option<Uuid>, sku: String, barcode: String,
    price_override: Option<Decimal>, stock: i32, is_active: bool,
}

impl TryFrom<VariationRow> for ProductVariation {
    type Error = StoreError;
    fn try_from(r: VariationRow) -> StoreResult<Self> {
        Ok(ProductVariation {
            id: r.id, product_id: r.product_id, color_id: r.color_id, size_id: r.size_id,
            sku: Sku::new(r.sku).map_err(invalid)?, barcode: r.barcode, price_override: r.price_override,
            stock: to_u32(r.stock, "stock")?, is_active: r.is_active,
        })
    }
}

const ADDRESS_SELECT: &str = r#"
    SELECT a.id, a.user_id, a.full_name, a.phone, a.address_exact, a.description, a.postal_code, a.is_default,
           a.created_at, a.updated_at, p.id AS province_id, p.name AS province_name, c.id AS city_id, c.name AS city_name
    FROM addresses a
    JOIN provinces p ON p.id = a.province_id
    JOIN cities c ON c.id = a.city_id
"#;

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid, user_id: Uuid, full_name: String, phone: String, address_exact: String, description: String,
    postal_code: String, is_default: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    province_id: Uuid, province_name: String, city_id: Uuid, city_name: String,
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Address {
            id: r.id, user_id: r.user_id, full_name: r.full_name, phone: r.phone, address_exact: r.address_exact,
            description: r.description, province: Province { id: r.province_id, name: r.province_name },
            city: City { id: r.city_id, province_id: r.province_id, name: r.city_name },
            postal_code: r.postal_code, is_default: r.is_default, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, percent_off: Option<i32>, amount_off: Option<Decimal>, is_active: bool,
    starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>, usage_limit: Option<i32>, used_count: i32,
    min_subtotal: Option<Decimal>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;
    fn try_from(r: CouponRow) -> StoreResult<Self> {
        Ok(Coupon {
            id: r.id, code: r.code, percent_off: r.percent_off.map(|p| to_u32(p, "percent")).transpose()?,
            amount_off: r.amount_off, is_active: r.is_active, starts_at: r.starts_at, ends_at: r.ends_at,
            usage_limit: r.usage_limit.map(|l| to_u32(l, "usage limit")).transpose()?,
            used_count: to_u32(r.used_count, "used count")?, min_subtotal: r.min_subtotal,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, user_id: Uuid, status: String, full_name: String, phone: String, province: String, city: String,
    address_exact: String, postal_code: String, note: String, subtotal: Decimal, discount_amount: Decimal,
    shipping_cost: Decimal, total: Decimal, coupon_code: Option<String>, created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StoreResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(invalid)?;
        let shipping = ShippingSnapshot {
            full_name: self.full_name, phone: self.phone, province: self.province, city: self.city,
            address_exact: self.address_exact, postal_code: self.postal_code,
        };
        let totals = OrderTotals { subtotal: self.subtotal, discount: self.discount_amount, shipping: self.shipping_cost, total: self.total };
        Ok(Order::restore(self.id, self.user_id, status, shipping, self.note, totals, self.coupon_code, items, self.created_at))
    }
}

#[derive(Clone, sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, variation_id: Uuid, product_name: String, sku: String, price: Decimal, quantity: i32, line_total: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> StoreResult<Self> {
        Ok(OrderItem {
            id: r.id, order_id: r.order_id, variation_id: r.variation_id, product_name: r.product_name, sku: r.sku,
            price: r.price, quantity: to_u32(r.quantity, "quantity")?, line_total: r.line_total,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid, order_id: Uuid, user_id: Uuid, amount: Decimal, status: String, authority: String, ref_id: String,
    created_at: DateTime<Utc>, paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;
    fn try_from(r: PaymentRow) -> StoreResult<Self> {
        let status: PaymentStatus = r.status.parse().map_err(invalid)?;
        Ok(Payment {
            id: r.id, order_id: r.order_id, user_id: r.user_id, amount: r.amount, status, authority: r.authority,
            ref_id: r.ref_id, created_at: r.created_at, paid_at: r.paid_at,
        })
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogStore for PgStore {
    async fn create_category(&self, input: NewCategory) -> StoreResult<Category> {
        let slug = self.unique_slug("categories", &input.name).await?;
        let c = build_category(input, slug);
        sqlx::query("INSERT INTO categories (id, name, slug, parent_id, is_active) VALUES ($1, $2, $3, $4, $5)")
            .bind(c.id).bind(&c.name).bind(c.slug.as_str()).bind(c.parent_id).bind(c.is_active)
            .execute(&self.pool).await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => StoreError::NotFound("parent category"),
                _ => conflict_on_unique(e, || format!("Category slug {} already exists", c.slug)),
            })?;
        Ok(c)
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn create_brand(&self, input: NewBrand) -> StoreResult<Brand> {
        let name = input.name.trim().to_string();
        let slug = self.unique_slug("brands", &name).await?;
        let brand = Brand { id: Uuid::now_v7(), name, slug };
        sqlx::query("INSERT INTO brands (id, name, slug) VALUES ($1, $2, $3)")
            .bind(brand.id).bind(&brand.name).bind(brand.slug.as_str())
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || format!("Brand {} already exists", brand.name)))?;
        Ok(brand)
    }

    async fn brands(&self) -> StoreResult<Vec<Brand>> {
        let rows = sqlx::query_as::<_, BrandRow>("SELECT * FROM brands ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Brand::from).collect())
    }

    async fn brand_by_slug(&self, slug: &str) -> StoreResult<Option<Brand>> {
        let row = sqlx::query_as::<_, BrandRow>("SELECT * FROM brands WHERE slug = $1").bind(slug).fetch_optional(&self.pool).await?;
        Ok(row.map(Brand::from))
    }

    async fn create_color(&self, input: NewColor) -> StoreResult<Color> {
        let color = build_color(input)?;
        sqlx::query("INSERT INTO colors (id, name, code) VALUES ($1, $2, $3)")
            .bind(color.id).bind(&color.name).bind(color.code.as_ref().map(|c| c.as_str()))
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || format!("Color {} already exists", color.name)))?;
        Ok(color)
    }

    async fn create_size(&self, input: NewSize) -> StoreResult<Size> {
        let size = Size { id: Uuid::now_v7(), name: input.name.trim().to_string(), sort_order: input.sort_order };
        sqlx::query("INSERT INTO sizes (id, name, sort_order) VALUES ($1, $2, $3)")
            .bind(size.id).bind(&size.name).bind(to_i32(size.sort_order, "sort order")?)
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || format!("Size {} already exists", size.name)))?;
        Ok(size)
    }

    async fn create_product(&self, input: NewProduct) -> StoreResult<Product> {
        let slug = self.unique_slug("products", &input.name).await?;
        let p = build_product(input, slug)?;
        sqlx::query(
            "INSERT INTO products (id, category_id, brand_id, name, slug, description, price, discount_price, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(p.id).bind(p.category_id).bind(p.brand_id).bind(&p.name).bind(p.slug.as_str()).bind(&p.description)
            .bind(p.price).bind(p.discount_price).bind(p.is_active).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => StoreError::NotFound("category or brand"),
                _ => conflict_on_unique(e, || format!("Product slug {} already exists", p.slug)),
            })?;
        Ok(p)
    }

    async fn add_variation(&self, product_id: Uuid, input: NewVariation) -> StoreResult<ProductVariation> {
        let v = build_variation(product_id, input)?;
        sqlx::query(
            "INSERT INTO product_variations (id, product_id, color_id, size_id, sku, barcode, price_override, stock, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(v.id).bind(v.product_id).bind(v.color_id).bind(v.size_id).bind(v.sku.as_str()).bind(&v.barcode)
            .bind(v.price_override).bind(to_i32(v.stock, "stock")?).bind(v.is_active)
            .execute(&self.pool).await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => StoreError::NotFound("product, color or size"),
                _ => conflict_on_unique(e, || format!("SKU {} or its color and size combination already exists", v.sku)),
            })?;
        Ok(v)
    }

    async fn add_image(&self, product_id: Uuid, input: NewImage) -> StoreResult<ProductImage> {
        let image = ProductImage { id: Uuid::now_v7(), product_id, url: input.url, alt_text: input.alt_text, is_main: input.is_main };
        sqlx::query("INSERT INTO product_images (id, product_id, url, alt_text, is_main) VALUES ($1, $2, $3, $4, $5)")
            .bind(image.id).bind(product_id).bind(&image.url).bind(&image.alt_text).bind(image.is_main)
            .execute(&self.pool).await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => StoreError::NotFound("product"),
                _ => StoreError::Database(e),
            })?;
        Ok(image)
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>> {
        const FILTER: &str = r#"
            FROM products p JOIN brands b ON b.id = p.brand_id
            WHERE p.is_active
              AND ($1::uuid IS NULL OR p.brand_id = $1)
              AND ($2::uuid[] IS NULL OR p.category_id = ANY($2))
              AND ($3::text IS NULL OR p.name ILIKE $3 OR p.description ILIKE $3 OR b.name ILIKE $3)
        "#;
        let pattern = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(|s| format!("%{}%", like_escape(s)));
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT p.* {FILTER} ORDER BY p.created_at DESC LIMIT $4 OFFSET $5"))
            .bind(query.brand_id).bind(query.category_ids.as_deref()).bind(pattern.as_deref())
            .bind(i64::from(query.per_page())).bind(query.offset())
            .fetch_all(&self.pool).await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {FILTER}"))
            .bind(query.brand_id).bind(query.category_ids.as_deref()).bind(pattern.as_deref())
            .fetch_one(&self.pool).await?;
        Ok(Page { data: rows.into_iter().map(Product::from).collect(), total, page: query.page(), per_page: query.per_page() })
    }

    async fn product_detail(&self, slug: &str) -> StoreResult<Option<ProductDetail>> {
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1 AND is_active")
            .bind(slug).fetch_optional(&self.pool).await? else { return Ok(None) };
        let product = Product::from(row);
        let brand = sqlx::query_as::<_, BrandRow>("SELECT * FROM brands WHERE id = $1")
            .bind(product.brand_id).fetch_optional(&self.pool).await?.map(Brand::from);
        let variations = sqlx::query_as::<_, VariationDetailRow>(&format!(
            "{VARIATION_DETAIL_SELECT} WHERE v.product_id = $1 AND v.is_active ORDER BY c.name NULLS FIRST, s.sort_order NULLS FIRST, s.name"))
            .bind(product.id).fetch_all(&self.pool).await?
            .into_iter().map(VariationDetail::try_from).collect::<StoreResult<Vec<_>>>()?;
        let images = sqlx::query_as::<_, ImageRow>("SELECT * FROM product_images WHERE product_id = $1 ORDER BY is_main DESC, id")
            .bind(product.id).fetch_all(&self.pool).await?
            .into_iter().map(ProductImage::from).collect();
        Ok(Some(ProductDetail { product, brand, variations, images }))
    }

    async fn variations(&self, ids: &[Uuid]) -> StoreResult<Vec<VariationDetail>> {
        if ids.is_empty() { return Ok(vec![]); }
        sqlx::query_as::<_, VariationDetailRow>(&format!("{VARIATION_DETAIL_SELECT} WHERE v.id = ANY($1)"))
            .bind(ids).fetch_all(&self.pool).await?
            .into_iter().map(VariationDetail::try_from).collect()
    }

    async fn main_images(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductImage>> {
        if product_ids.is_empty() { return Ok(vec![]); }
        let rows = sqlx::query_as::<_, ImageRow>(
            "SELECT DISTINCT ON (product_id) * FROM product_images WHERE product_id = ANY($1) ORDER BY product_id, is_main DESC, id")
            .bind(product_ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ProductImage::from).collect())
    }

    async fn active_variations(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>> {
        if product_ids.is_empty() { return Ok(vec![]); }
        sqlx::query_as::<_, VariationRow>(
            "SELECT id, product_id, color_id, size_id, sku, barcode, price_override, stock, is_active \
             FROM product_variations WHERE product_id = ANY($1) AND is_active")
            .bind(product_ids).fetch_all(&self.pool).await?
            .into_iter().map(ProductVariation::try_from).collect()
    }

    async fn newest_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE is_active ORDER BY created_at DESC LIMIT $1")
            .bind(i64::from(limit)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn discounted_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE is_active AND discount_price IS NOT NULL ORDER BY updated_at DESC, created_at DESC LIMIT $1")
            .bind(i64::from(limit)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn bestsellers(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(r#"
            SELECT p.*
            FROM products p
            JOIN product_variations v ON v.product_id = p.id
            JOIN order_items oi ON oi.variation_id = v.id
            JOIN orders o ON o.id = oi.order_id
            WHERE p.is_active AND o.created_at >= $1 AND o.status IN ('paid', 'shipped')
            GROUP BY p.id
            ORDER BY SUM(oi.quantity) DESC, p.created_at DESC
            LIMIT $2
        "#).bind(since).bind(i64::from(limit)).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[async_trait]
impl AccountStore for PgStore {
    async fn create_province(&self, name: &str) -> StoreResult<Province> {
        let province = Province { id: Uuid::now_v7(), name: name.trim().to_string() };
        sqlx::query("INSERT INTO provinces (id, name) VALUES ($1, $2)")
            .bind(province.id).bind(&province.name).execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || format!("Province {} already exists", province.name)))?;
        Ok(province)
    }

    async fn provinces(&self) -> StoreResult<Vec<Province>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM provinces ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, name)| Province { id, name }).collect())
    }

    async fn create_city(&self, province_id: Uuid, name: &str) -> StoreResult<City> {
        let city = City { id: Uuid::now_v7(), province_id, name: name.trim().to_string() };
        sqlx::query("INSERT INTO cities (id, province_id, name) VALUES ($1, $2, $3)")
            .bind(city.id).bind(province_id).bind(&city.name).execute(&self.pool).await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_foreign_key_violation() => StoreError::NotFound("province"),
                _ => conflict_on_unique(e, || format!("City {} already exists in this province", city.name)),
            })?;
        Ok(city)
    }

    async fn cities(&self, province_id: Uuid) -> StoreResult<Vec<City>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM cities WHERE province_id = $1 ORDER BY name")
            .bind(province_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, name)| City { id, province_id, name }).collect())
    }

    async fn addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, AddressRow>(&format!("{ADDRESS_SELECT} WHERE a.user_id = $1 ORDER BY a.is_default DESC, a.updated_at DESC"))
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn address(&self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>(&format!("{ADDRESS_SELECT} WHERE a.user_id = $1 AND a.id = $2"))
            .bind(user_id).bind(address_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Address::from))
    }

    async fn create_address(&self, user_id: Uuid, input: NewAddress) -> StoreResult<Address> {
        let mut tx = self.pool.begin().await?;
        let province: Option<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM provinces WHERE id = $1")
            .bind(input.province_id).fetch_optional(&mut *tx).await?;
        let (province_id, province_name) = province.ok_or(StoreError::NotFound("province"))?;
        let city: Option<(Uuid, Uuid, String)> = sqlx::query_as("SELECT id, province_id, name FROM cities WHERE id = $1")
            .bind(input.city_id).fetch_optional(&mut *tx).await?;
        let (city_id, city_province, city_name) = city.ok_or(StoreError::NotFound("city"))?;
        if city_province != province_id { return Err(invalid("city does not belong to the selected province")); }

        // Serializes concurrent first-address inserts for the same user.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))").bind(user_id.to_string()).execute(&mut *tx).await?;
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE user_id = $1").bind(user_id).fetch_one(&mut *tx).await?;
        let is_default = existing == 0 || input.is_default;
        if is_default {
            sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND is_default").bind(user_id).execute(&mut *tx).await?;
        }
        let now = Utc::now();
        let address = Address {
            id: Uuid::now_v7(), user_id, full_name: input.full_name.trim().to_string(), phone: input.phone,
            address_exact: input.address_exact, description: input.description,
            province: Province { id: province_id, name: province_name },
            city: City { id: city_id, province_id, name: city_name },
            postal_code: input.postal_code, is_default, created_at: now, updated_at: now,
        };
        sqlx::query(
            "INSERT INTO addresses (id, user_id, full_name, phone, address_exact, description, province_id, city_id, postal_code, is_default, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(address.id).bind(user_id).bind(&address.full_name).bind(&address.phone).bind(&address.address_exact)
            .bind(&address.description).bind(province_id).bind(city_id).bind(&address.postal_code).bind(is_default)
            .bind(now).bind(now)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(address)
    }
}

// =============================================================================
// Coupons
// =============================================================================

#[async_trait]
impl CouponStore for PgStore {
    async fn create_coupon(&self, input: NewCoupon) -> StoreResult<Coupon> {
        let c = build_coupon(input)?;
        sqlx::query(
            "INSERT INTO coupons (id, code, percent_off, amount_off, is_active, starts_at, ends_at, usage_limit, used_count, min_subtotal) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(c.id).bind(&c.code)
            .bind(c.percent_off.map(|p| to_i32(p, "percent")).transpose()?)
            .bind(c.amount_off).bind(c.is_active).bind(c.starts_at).bind(c.ends_at)
            .bind(c.usage_limit.map(|l| to_i32(l, "usage limit")).transpose()?)
            .bind(to_i32(c.used_count, "used count")?).bind(c.min_subtotal)
            .execute(&self.pool).await
            .map_err(|e| conflict_on_unique(e, || format!("Coupon {} already exists", c.code)))?;
        Ok(c)
    }

    async fn coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE LOWER(code) = LOWER($1)")
            .bind(code.trim()).fetch_optional(&self.pool).await?
            .map(Coupon::try_from).transpose()
    }
}

// =============================================================================
// Orders
// =============================================================================

async fn insert_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> StoreResult<()> {
    let a = &order.shipping_address;
    sqlx::query(
        "INSERT INTO orders (id, user_id, status, full_name, phone, province, city, address_exact, postal_code, note, \
                             subtotal, discount_amount, shipping_cost, total, coupon_code, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
        .bind(order.id).bind(order.user_id).bind(order.status.as_str()).bind(&a.full_name).bind(&a.phone)
        .bind(&a.province).bind(&a.city).bind(&a.address_exact).bind(&a.postal_code).bind(&order.note)
        .bind(order.subtotal).bind(order.discount_amount).bind(order.shipping_cost).bind(order.total)
        .bind(order.coupon_code.as_deref()).bind(order.created_at)
        .execute(&mut **tx).await?;
    Ok(())
}

#[async_trait]
impl OrderStore for PgStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn place_order(&self, order: &Order, coupon_id: Option<Uuid>, session: Option<&Session>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_order(&mut tx, order).await?;

        // Lock every variation row in id order so concurrent checkouts cannot deadlock.
        let mut ids: Vec<Uuid> = order.items.iter().map(|i| i.variation_id).collect();
        ids.sort();
        ids.dedup();
        let locked: Vec<(Uuid, i32)> = sqlx::query_as("SELECT id, stock FROM product_variations WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&ids).fetch_all(&mut *tx).await?;

        for item in &order.items {
            let available = match locked.iter().find(|(id, _)| *id == item.variation_id) {
                Some((_, stock)) => to_u32(*stock, "stock")?,
                None => {
                    let _ = tx.rollback().await;
                    return Err(StoreError::NotFound("variation"));
                }
            };
            if available < item.quantity {
                let _ = tx.rollback().await;
                return Err(StoreError::InsufficientStock {
                    product: item.product_name.clone(), variation_id: item.variation_id, available, requested: item.quantity,
                });
            }
            sqlx::query(
                "INSERT INTO order_items (id, order_id, variation_id, product_name, sku, price, quantity, line_total) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
                .bind(item.id).bind(order.id).bind(item.variation_id).bind(&item.product_name).bind(&item.sku)
                .bind(item.price).bind(to_i32(item.quantity, "quantity")?).bind(item.line_total)
                .execute(&mut *tx).await?;
            sqlx::query("UPDATE product_variations SET stock = stock - $2 WHERE id = $1")
                .bind(item.variation_id).bind(to_i32(item.quantity, "quantity")?)
                .execute(&mut *tx).await?;
        }

        if let Some(cid) = coupon_id {
            let updated = sqlx::query(
                "UPDATE coupons SET used_count = used_count + 1 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)")
                .bind(cid).execute(&mut *tx).await?;
            if updated.rows_affected() == 0 {
                let _ = tx.rollback().await;
                return Err(StoreError::CouponExhausted(order.coupon_code.clone().unwrap_or_default()));
            }
        }

        if let Some(session) = session {
            upsert_session(&mut *tx, session).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.assemble_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        self.assemble_orders(rows).await
    }

    async fn update_order_status(&self, order: &Order, from: OrderStatus) -> StoreResult<()> {
        let updated = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(order.id).bind(order.status.as_str()).bind(from.as_str())
            .execute(&self.pool).await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("Order {} is no longer {from}", order.id)));
        }
        Ok(())
    }
}

// =============================================================================
// Payments
// =============================================================================

#[async_trait]
impl PaymentStore for PgStore {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE order_id = $1")
            .bind(order_id).fetch_optional(&self.pool).await?
            .map(Payment::try_from).transpose()
    }

    async fn payment_by_authority(&self, user_id: Uuid, authority: &str) -> StoreResult<Option<Payment>> {
        if authority.is_empty() { return Ok(None); }
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE authority = $1 AND user_id = $2")
            .bind(authority).bind(user_id).fetch_optional(&self.pool).await?
            .map(Payment::try_from).transpose()
    }

    async fn save_payment(&self, p: &Payment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, order_id, user_id, amount, status, authority, ref_id, created_at, paid_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (order_id) DO UPDATE SET amount = EXCLUDED.amount, status = EXCLUDED.status, \
                 authority = EXCLUDED.authority, ref_id = EXCLUDED.ref_id, paid_at = EXCLUDED.paid_at")
            .bind(p.id).bind(p.order_id).bind(p.user_id).bind(p.amount).bind(p.status.as_str())
            .bind(&p.authority).bind(&p.ref_id).bind(p.created_at).bind(p.paid_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn settle_payment(&self, p: &Payment, order: &Order) -> StoreResult<()> {
        if p.status != PaymentStatus::Success { return Err(invalid("only successful payments can be settled")); }
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE payments SET status = $2, ref_id = $3, paid_at = $4 WHERE id = $1")
            .bind(p.id).bind(p.status.as_str()).bind(&p.ref_id).bind(p.paid_at)
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(StoreError::NotFound("payment"));
        }
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order.id).bind(order.status.as_str())
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionStore for PgStore {
    async fn load_session(&self, key: &str) -> StoreResult<Session> {
        let data: Option<serde_json::Value> = sqlx::query_scalar("SELECT data FROM sessions WHERE key = $1")
            .bind(key).fetch_optional(&self.pool).await?;
        Ok(match data {
            Some(serde_json::Value::Object(map)) => Session::from_parts(key, map),
            _ => Session::new(key),
        })
    }

    async fn save_session(&self, session: &Session) -> StoreResult<()> {
        upsert_session(&self.pool, session).await
    }
}

async fn upsert_session<'e>(exec: impl sqlx::PgExecutor<'e>, session: &Session) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO sessions (key, data, updated_at) VALUES ($1, $2, NOW()) \
         ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()")
        .bind(session.key()).bind(serde_json::Value::Object(session.data().clone()))
        .execute(exec).await?;
    Ok(())
}
