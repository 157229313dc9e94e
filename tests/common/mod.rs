#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bazaar_shop::domain::aggregates::{Address, Cart, NewAddress, ProductVariation};
use bazaar_shop::domain::events::DomainEvent;
use bazaar_shop::services::EventPublisher;
use bazaar_shop::session::Session;
use bazaar_shop::store::{AccountStore, CatalogStore, CouponStore, MemoryStore, NewBrand, NewCategory, NewCoupon, NewProduct, NewVariation};

/// Collects published events for assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn subjects(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(DomainEvent::subject).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Catalog with product A (100,000, 5 in stock) and product B (50,000, 1 in stock).
pub struct Shop {
    pub store: Arc<MemoryStore>,
    pub a: ProductVariation,
    pub b: ProductVariation,
}

impl Shop {
    pub async fn seed() -> Self {
        let store = Arc::new(MemoryStore::new());
        let category = store.create_category(NewCategory { name: "Shirts".into(), parent_id: None }).await.unwrap();
        let brand = store.create_brand(NewBrand { name: "Acme".into() }).await.unwrap();
        let a = Self::product(&store, category.id, brand.id, "Linen Shirt", dec!(100000), "A-1", 5).await;
        let b = Self::product(&store, category.id, brand.id, "Cotton Shirt", dec!(50000), "B-1", 1).await;
        Self { store, a, b }
    }

    async fn product(store: &MemoryStore, category_id: Uuid, brand_id: Uuid, name: &str, price: Decimal, sku: &str, stock: u32) -> ProductVariation {
        let product = store.create_product(NewProduct {
            category_id, brand_id, name: name.into(), description: String::new(), price, discount_price: None,
        }).await.unwrap();
        store.add_variation(product.id, NewVariation {
            color_id: None, size_id: None, sku: sku.into(), barcode: String::new(), price_override: None, stock,
        }).await.unwrap()
    }

    pub async fn address(&self, user_id: Uuid, province: &str) -> Address {
        let p = match self.store.provinces().await.unwrap().into_iter().find(|p| p.name == province) {
            Some(p) => p,
            None => self.store.create_province(province).await.unwrap(),
        };
        let c = self.store.create_city(p.id, &format!("{province} city {}", Uuid::now_v7().simple())).await.unwrap();
        self.store.create_address(user_id, NewAddress {
            full_name: "Sara Ahmadi".into(), phone: "09120000000".into(), address_exact: "Valiasr St. 12".into(),
            description: String::new(), province_id: p.id, city_id: c.id, postal_code: "1234567890".into(), is_default: false,
        }).await.unwrap()
    }

    pub async fn coupon(&self, code: &str, percent_off: u32, min_subtotal: Option<Decimal>, usage_limit: Option<u32>) {
        self.store.create_coupon(NewCoupon {
            code: code.into(), percent_off: Some(percent_off), amount_off: None, is_active: true,
            starts_at: None, ends_at: None, usage_limit, min_subtotal,
        }).await.unwrap();
    }

    pub async fn stock(&self, v: &ProductVariation) -> u32 {
        self.store.stock_of(v.id).await.unwrap()
    }
}

pub fn session_with(key: &str, lines: &[(&ProductVariation, i64)]) -> Session {
    let mut session = Session::new(key);
    let mut cart = Cart::new(&mut session);
    for (v, qty) in lines {
        cart.add(v.id, *qty, false).unwrap();
    }
    session
}
