//! In-process store.
//!
//! All state sits behind one async mutex, so every operation (order placement
//! included) runs serialized against the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::{OrderStatus, PaymentStatus};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    brands: Vec<Brand>,
    colors: Vec<Color>,
    sizes: Vec<Size>,
    products: Vec<Product>,
    variations: Vec<ProductVariation>,
    images: Vec<ProductImage>,
    provinces: Vec<Province>,
    cities: Vec<City>,
    addresses: Vec<Address>,
    coupons: Vec<Coupon>,
    orders: Vec<Order>,
    payments: Vec<Payment>,
    sessions: HashMap<String, serde_json::Map<String, serde_json::Value>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Current stock of a variation, for assertions and diagnostics.
    pub async fn stock_of(&self, variation_id: Uuid) -> Option<u32> {
        self.state.lock().await.variations.iter().find(|v| v.id == variation_id).map(|v| v.stock)
    }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }
}

impl State {
    fn detail(&self, v: &ProductVariation) -> Option<VariationDetail> {
        let product = self.products.iter().find(|p| p.id == v.product_id)?.clone();
        Some(VariationDetail {
            variation: v.clone(),
            product,
            color: v.color_id.and_then(|id| self.colors.iter().find(|c| c.id == id).cloned()),
            size: v.size_id.and_then(|id| self.sizes.iter().find(|s| s.id == id).cloned()),
        })
    }

    fn active_products_newest_first(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = self.products.iter().filter(|p| p.is_active).collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products
    }

    fn brand_name(&self, id: Uuid) -> &str {
        self.brands.iter().find(|b| b.id == id).map(|b| b.name.as_str()).unwrap_or("")
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_category(&self, input: NewCategory) -> StoreResult<Category> {
        let mut s = self.state.lock().await;
        if let Some(parent) = input.parent_id {
            if !s.categories.iter().any(|c| c.id == parent) { return Err(StoreError::NotFound("parent category")); }
        }
        let slug = Slug::unique(&input.name, |c| s.categories.iter().any(|x| x.slug.as_str() == c)).map_err(invalid)?;
        let category = build_category(input, slug);
        s.categories.push(category.clone());
        Ok(category)
    }

    async fn categories(&self) -> StoreResult<Vec<Category>> {
        let mut out = self.state.lock().await.categories.clone();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_brand(&self, input: NewBrand) -> StoreResult<Brand> {
        let mut s = self.state.lock().await;
        let name = input.name.trim().to_string();
        if s.brands.iter().any(|b| b.name == name) { return Err(StoreError::Conflict(format!("Brand {name} already exists"))); }
        let slug = Slug::unique(&name, |c| s.brands.iter().any(|x| x.slug.as_str() == c)).map_err(invalid)?;
        let brand = Brand { id: Uuid::now_v7(), name, slug };
        s.brands.push(brand.clone());
        Ok(brand)
    }

    async fn brands(&self) -> StoreResult<Vec<Brand>> {
        let mut out = self.state.lock().await.brands.clone();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn brand_by_slug(&self, slug: &str) -> StoreResult<Option<Brand>> {
        Ok(self.state.lock().await.brands.iter().find(|b| b.slug.as_str() == slug).cloned())
    }

    async fn create_color(&self, input: NewColor) -> StoreResult<Color> {
        let color = build_color(input)?;
        let mut s = self.state.lock().await;
        if s.colors.iter().any(|c| c.name == color.name) { return Err(StoreError::Conflict(format!("Color {} already exists", color.name))); }
        s.colors.push(color.clone());
        Ok(color)
    }

    async fn create_size(&self, input: NewSize) -> StoreResult<Size> {
        let mut s = self.state.lock().await;
        let name = input.name.trim().to_string();
        if s.sizes.iter().any(|x| x.name == name) { return Err(StoreError::Conflict(format!("Size {name} already exists"))); }
        let size = Size { id: Uuid::now_v7(), name, sort_order: input.sort_order };
        s.sizes.push(size.clone());
        Ok(size)
    }

    async fn create_product(&self, input: NewProduct) -> StoreResult<Product> {
        let mut s = self.state.lock().await;
        if !s.categories.iter().any(|c| c.id == input.category_id) { return Err(StoreError::NotFound("category")); }
        if !s.brands.iter().any(|b| b.id == input.brand_id) { return Err(StoreError::NotFound("brand")); }
        let slug = Slug::unique(&input.name, |c| s.products.iter().any(|x| x.slug.as_str() == c)).map_err(invalid)?;
        let product = build_product(input, slug)?;
        s.products.push(product.clone());
        Ok(product)
    }

    async fn add_variation(&self, product_id: Uuid, input: NewVariation) -> StoreResult<ProductVariation> {
        let variation = build_variation(product_id, input)?;
        let mut s = self.state.lock().await;
        if !s.products.iter().any(|p| p.id == product_id) { return Err(StoreError::NotFound("product")); }
        if variation.color_id.is_some_and(|id| !s.colors.iter().any(|c| c.id == id)) { return Err(StoreError::NotFound("color")); }
        if variation.size_id.is_some_and(|id| !s.sizes.iter().any(|x| x.id == id)) { return Err(StoreError::NotFound("size")); }
        if s.variations.iter().any(|v| v.sku == variation.sku) {
            return Err(StoreError::Conflict(format!("SKU {} already exists", variation.sku)));
        }
        if s.variations.iter().any(|v| v.combination() == variation.combination()) {
            return Err(StoreError::Conflict("This color and size combination already exists for the product".into()));
        }
        s.variations.push(variation.clone());
        Ok(variation)
    }

    async fn add_image(&self, product_id: Uuid, input: NewImage) -> StoreResult<ProductImage> {
        let mut s = self.state.lock().await;
        if !s.products.iter().any(|p| p.id == product_id) { return Err(StoreError::NotFound("product")); }
        let image = ProductImage { id: Uuid::now_v7(), product_id, url: input.url, alt_text: input.alt_text, is_main: input.is_main };
        s.images.push(image.clone());
        Ok(image)
    }

    async fn list_products(&self, query: &ProductQuery) -> StoreResult<Page<Product>> {
        let s = self.state.lock().await;
        let needle = query.search.as_deref().map(str::to_lowercase).filter(|n| !n.is_empty());
        let matching: Vec<&Product> = s.active_products_newest_first().into_iter()
            .filter(|p| query.brand_id.map_or(true, |b| p.brand_id == b))
            .filter(|p| query.category_ids.as_ref().map_or(true, |ids| ids.contains(&p.category_id)))
            .filter(|p| needle.as_ref().map_or(true, |n| {
                p.name.to_lowercase().contains(n) || p.description.to_lowercase().contains(n) || s.brand_name(p.brand_id).to_lowercase().contains(n)
            }))
            .collect();
        let total = matching.len() as i64;
        let data = matching.into_iter().skip(usize::try_from(query.offset()).unwrap_or(usize::MAX)).take(query.per_page() as usize).cloned().collect();
        Ok(Page { data, total, page: query.page(), per_page: query.per_page() })
    }

    async fn product_detail(&self, slug: &str) -> StoreResult<Option<ProductDetail>> {
        let s = self.state.lock().await;
        let Some(product) = s.products.iter().find(|p| p.slug.as_str() == slug && p.is_active).cloned() else { return Ok(None) };
        let mut variations: Vec<VariationDetail> = s.variations.iter()
            .filter(|v| v.product_id == product.id && v.is_active)
            .filter_map(|v| s.detail(v))
            .collect();
        variations.sort_by(|a, b| {
            let key = |d: &VariationDetail| (d.color.as_ref().map(|c| c.name.clone()), d.size.as_ref().map(|x| (x.sort_order, x.name.clone())));
            key(a).cmp(&key(b))
        });
        let mut images: Vec<ProductImage> = s.images.iter().filter(|i| i.product_id == product.id).cloned().collect();
        images.sort_by(|a, b| b.is_main.cmp(&a.is_main));
        let brand = s.brands.iter().find(|b| b.id == product.brand_id).cloned();
        Ok(Some(ProductDetail { product, brand, variations, images }))
    }

    async fn variations(&self, ids: &[Uuid]) -> StoreResult<Vec<VariationDetail>> {
        let s = self.state.lock().await;
        Ok(s.variations.iter().filter(|v| ids.contains(&v.id)).filter_map(|v| s.detail(v)).collect())
    }

    async fn main_images(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductImage>> {
        let s = self.state.lock().await;
        Ok(product_ids.iter().filter_map(|id| {
            let mut own = s.images.iter().filter(|i| i.product_id == *id);
            own.clone().find(|i| i.is_main).or_else(|| own.next()).cloned()
        }).collect())
    }

    async fn active_variations(&self, product_ids: &[Uuid]) -> StoreResult<Vec<ProductVariation>> {
        let s = self.state.lock().await;
        Ok(s.variations.iter().filter(|v| v.is_active && product_ids.contains(&v.product_id)).cloned().collect())
    }

    async fn newest_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let s = self.state.lock().await;
        Ok(s.active_products_newest_first().into_iter().take(limit as usize).cloned().collect())
    }

    async fn discounted_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let s = self.state.lock().await;
        let mut out: Vec<Product> = s.products.iter().filter(|p| p.is_active && p.discount_price.is_some()).cloned().collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.created_at.cmp(&a.created_at)));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn bestsellers(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Product>> {
        let s = self.state.lock().await;
        let mut sold: HashMap<Uuid, u64> = HashMap::new();
        for order in s.orders.iter().filter(|o| o.created_at >= since && matches!(o.status, OrderStatus::Paid | OrderStatus::Shipped)) {
            for item in &order.items {
                if let Some(v) = s.variations.iter().find(|v| v.id == item.variation_id) {
                    *sold.entry(v.product_id).or_default() += u64::from(item.quantity);
                }
            }
        }
        let ranked = sold.into_iter()
            .filter_map(|(pid, qty)| s.products.iter().find(|p| p.id == pid && p.is_active).map(|p| (p.clone(), qty)))
            .collect();
        Ok(ranked_by_sales(ranked, limit))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_province(&self, name: &str) -> StoreResult<Province> {
        let mut s = self.state.lock().await;
        let name = name.trim().to_string();
        if s.provinces.iter().any(|p| p.name == name) { return Err(StoreError::Conflict(format!("Province {name} already exists"))); }
        let province = Province { id: Uuid::now_v7(), name };
        s.provinces.push(province.clone());
        Ok(province)
    }

    async fn provinces(&self) -> StoreResult<Vec<Province>> {
        let mut out = self.state.lock().await.provinces.clone();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_city(&self, province_id: Uuid, name: &str) -> StoreResult<City> {
        let mut s = self.state.lock().await;
        if !s.provinces.iter().any(|p| p.id == province_id) { return Err(StoreError::NotFound("province")); }
        let name = name.trim().to_string();
        if s.cities.iter().any(|c| c.province_id == province_id && c.name == name) {
            return Err(StoreError::Conflict(format!("City {name} already exists in this province")));
        }
        let city = City { id: Uuid::now_v7(), province_id, name };
        s.cities.push(city.clone());
        Ok(city)
    }

    async fn cities(&self, province_id: Uuid) -> StoreResult<Vec<City>> {
        let s = self.state.lock().await;
        let mut out: Vec<City> = s.cities.iter().filter(|c| c.province_id == province_id).cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn addresses(&self, user_id: Uuid) -> StoreResult<Vec<Address>> {
        let s = self.state.lock().await;
        let mut out: Vec<Address> = s.addresses.iter().filter(|a| a.user_id == user_id).cloned().collect();
        out.sort_by(Address::display_order);
        Ok(out)
    }

    async fn address(&self, user_id: Uuid, address_id: Uuid) -> StoreResult<Option<Address>> {
        Ok(self.state.lock().await.addresses.iter().find(|a| a.id == address_id && a.user_id == user_id).cloned())
    }

    async fn create_address(&self, user_id: Uuid, input: NewAddress) -> StoreResult<Address> {
        let mut s = self.state.lock().await;
        let province = s.provinces.iter().find(|p| p.id == input.province_id).cloned().ok_or(StoreError::NotFound("province"))?;
        let city = s.cities.iter().find(|c| c.id == input.city_id).cloned().ok_or(StoreError::NotFound("city"))?;
        if city.province_id != province.id { return Err(invalid("city does not belong to the selected province")); }
        let first = !s.addresses.iter().any(|a| a.user_id == user_id);
        let is_default = first || input.is_default;
        if is_default {
            for a in s.addresses.iter_mut().filter(|a| a.user_id == user_id) { a.is_default = false; }
        }
        let now = Utc::now();
        let address = Address {
            id: Uuid::now_v7(), user_id, full_name: input.full_name.trim().to_string(), phone: input.phone,
            address_exact: input.address_exact, description: input.description, province, city,
            postal_code: input.postal_code, is_default, created_at: now, updated_at: now,
        };
        s.addresses.push(address.clone());
        Ok(address)
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn create_coupon(&self, input: NewCoupon) -> StoreResult<Coupon> {
        let coupon = build_coupon(input)?;
        let mut s = self.state.lock().await;
        if s.coupons.iter().any(|c| c.matches_code(&coupon.code)) {
            return Err(StoreError::Conflict(format!("Coupon {} already exists", coupon.code)));
        }
        s.coupons.push(coupon.clone());
        Ok(coupon)
    }

    async fn coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.iter().find(|c| c.matches_code(code)).cloned())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, order: &Order, coupon_id: Option<Uuid>, session: Option<&Session>) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        // Check everything before touching anything.
        for item in &order.items {
            let v = s.variations.iter().find(|v| v.id == item.variation_id).ok_or(StoreError::NotFound("variation"))?;
            if v.stock < item.quantity {
                return Err(StoreError::InsufficientStock {
                    product: item.product_name.clone(), variation_id: v.id, available: v.stock, requested: item.quantity,
                });
            }
        }
        if let Some(cid) = coupon_id {
            let c = s.coupons.iter().find(|c| c.id == cid).ok_or(StoreError::NotFound("coupon"))?;
            if c.usage_limit.is_some_and(|limit| c.used_count >= limit) { return Err(StoreError::CouponExhausted(c.code.clone())); }
        }
        for item in &order.items {
            if let Some(v) = s.variations.iter_mut().find(|v| v.id == item.variation_id) { v.stock -= item.quantity; }
        }
        if let Some(c) = coupon_id.and_then(|cid| s.coupons.iter_mut().find(|c| c.id == cid)) {
            c.used_count += 1;
        }
        let mut stored = order.clone();
        stored.take_events();
        s.orders.push(stored);
        if let Some(session) = session {
            s.sessions.insert(session.key().to_string(), session.data().clone());
        }
        Ok(())
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn orders_for(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let s = self.state.lock().await;
        let mut out: Vec<Order> = s.orders.iter().filter(|o| o.user_id == user_id).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_order_status(&self, order: &Order, from: OrderStatus) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        let stored = s.orders.iter_mut().find(|o| o.id == order.id).ok_or(StoreError::NotFound("order"))?;
        if stored.status != from {
            return Err(StoreError::Conflict(format!("Order {} is no longer {from}", order.id)));
        }
        stored.status = order.status;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn payment_for_order(&self, order_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.state.lock().await.payments.iter().find(|p| p.order_id == order_id).cloned())
    }

    async fn payment_by_authority(&self, user_id: Uuid, authority: &str) -> StoreResult<Option<Payment>> {
        if authority.is_empty() { return Ok(None); }
        Ok(self.state.lock().await.payments.iter().find(|p| p.authority == authority && p.user_id == user_id).cloned())
    }

    async fn save_payment(&self, payment: &Payment) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        match s.payments.iter_mut().find(|p| p.order_id == payment.order_id) {
            Some(existing) => *existing = Payment { id: existing.id, created_at: existing.created_at, ..payment.clone() },
            None => s.payments.push(payment.clone()),
        }
        Ok(())
    }

    async fn settle_payment(&self, payment: &Payment, order: &Order) -> StoreResult<()> {
        if payment.status != PaymentStatus::Success { return Err(invalid("only successful payments can be settled")); }
        let mut s = self.state.lock().await;
        let idx = s.payments.iter().position(|p| p.id == payment.id).ok_or(StoreError::NotFound("payment"))?;
        let stored_order = s.orders.iter_mut().find(|o| o.id == order.id).ok_or(StoreError::NotFound("order"))?;
        stored_order.status = order.status;
        s.payments[idx] = payment.clone();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(&self, key: &str) -> StoreResult<Session> {
        let s = self.state.lock().await;
        Ok(s.sessions.get(key).cloned().map(|data| Session::from_parts(key, data)).unwrap_or_else(|| Session::new(key)))
    }

    async fn save_session(&self, session: &Session) -> StoreResult<()> {
        self.state.lock().await.sessions.insert(session.key().to_string(), session.data().clone());
        Ok(())
    }
}
