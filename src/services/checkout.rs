//! Checkout: the address/review steps and order placement.
//!
//! Pricing is a pure function of the live cart, the coupon and the address
//! province. Placement hands the priced order to the store, which takes the
//! stock and the coupon use in one transaction; the cart is only cleared once
//! that has committed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    Address, Cart, CartError, CartSummary, Coupon, NewAddress, Order, OrderError, OrderLine, OrderTotals,
    ShippingSnapshot, VariationIndex,
};
use crate::services::events::EventPublisher;
use crate::services::shipping::calc_shipping;
use crate::session::Session;
use crate::store::{AccountStore, CatalogStore, CouponStore, OrderStore, Store, StoreError};

pub const INVALID_COUPON_WARNING: &str = "Coupon code is not valid";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep { Address, Review }

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutView {
    pub step: CheckoutStep,
    pub has_addresses: bool,
    pub addresses: Vec<Address>,
    pub cart: CartSummary,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct CheckoutForm {
    pub address_id: Option<Uuid>,
    #[validate(length(max = 40))]
    pub coupon_code: Option<String>,
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub note: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// Set when a submitted coupon was ignored.
    pub coupon_warning: Option<String>,
}

/// Priced order before it is written.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote {
    pub totals: OrderTotals,
    pub coupon: Option<Coupon>,
    pub coupon_warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Select an address or add one in the previous step")]
    NoAddressSelected,
    #[error("Address not found")]
    AddressNotFound,
    #[error("Not enough stock for {product}")]
    InsufficientStock { product: String, variation_id: Uuid, available: u32, requested: u32 },
    #[error("Coupon {0} has reached its usage limit")]
    CouponExhausted(String),
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientStock { product, variation_id, available, requested } =>
                Self::InsufficientStock { product, variation_id, available, requested },
            StoreError::CouponExhausted(code) => Self::CouponExhausted(code),
            other => Self::Store(other),
        }
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Discount comes off the subtotal before shipping is priced.
pub fn quote(subtotal: Decimal, coupon: Option<Coupon>, province: &str, now: DateTime<Utc>) -> Quote {
    let (discount, coupon, coupon_warning) = match coupon {
        Some(c) if c.is_valid_at(now) => (c.compute_discount(subtotal), Some(c), None),
        Some(_) => (Decimal::ZERO, None, Some(INVALID_COUPON_WARNING.to_string())),
        None => (Decimal::ZERO, None, None),
    };
    let shipping = calc_shipping(subtotal - discount, province);
    Quote { totals: OrderTotals::new(subtotal, discount, shipping), coupon, coupon_warning }
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>) -> Self { Self { store, events } }

    /// Without saved addresses the address step is forced unless review is asked for explicitly.
    pub async fn view(&self, user_id: Uuid, session: &mut Session, step: Option<CheckoutStep>) -> CheckoutResult<CheckoutView> {
        let cart = self.priced_cart(session).await?;
        let addresses = self.store.addresses(user_id).await?;
        let has_addresses = !addresses.is_empty();
        let step = step.unwrap_or(if has_addresses { CheckoutStep::Review } else { CheckoutStep::Address });
        Ok(CheckoutView { step, has_addresses, addresses, cart })
    }

    #[tracing::instrument(skip(self, session, input), fields(session = session.key()))]
    pub async fn save_address(&self, user_id: Uuid, session: &mut Session, input: NewAddress) -> CheckoutResult<Address> {
        self.priced_cart(session).await?;
        let address = self.store.create_address(user_id, input).await?;
        tracing::info!(address_id = %address.id, is_default = address.is_default, "address saved");
        Ok(address)
    }

    #[tracing::instrument(skip(self, session, form), fields(session = session.key()))]
    pub async fn place_order(&self, user_id: Uuid, session: &mut Session, form: CheckoutForm) -> CheckoutResult<CheckoutOutcome> {
        // The store saves this copy with the order; the caller's session only
        // changes once both are committed.
        let mut after = session.clone();
        let mut cart = Cart::new(&mut after);
        let index = VariationIndex::new(self.store.variations(&cart.variation_ids()).await?);
        if cart.total_quantity(&index) == 0 { return Err(CheckoutError::EmptyCart); }

        let address_id = form.address_id.ok_or(CheckoutError::NoAddressSelected)?;
        let address = self.store.address(user_id, address_id).await?.ok_or(CheckoutError::AddressNotFound)?;

        let lines: Vec<OrderLine> = cart.lines(&index).map(|l| OrderLine {
            variation_id: l.variation().id,
            product_name: l.product().name.clone(),
            sku: l.variation().sku.to_string(),
            price: l.unit_price,
            quantity: l.quantity,
        }).collect();
        let subtotal = cart.total_price(&index);
        cart.clear()?;

        let code = form.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let coupon = match code {
            Some(code) => self.store.coupon_by_code(code).await?,
            None => None,
        };
        let mut priced = quote(subtotal, coupon, &address.province.name, Utc::now());
        if code.is_some() && priced.coupon.is_none() {
            tracing::info!(code, "coupon ignored");
            priced.coupon_warning = Some(INVALID_COUPON_WARNING.to_string());
        }

        let coupon_code = priced.coupon.as_ref().map(|c| c.code.clone());
        let mut order = Order::place(user_id, ShippingSnapshot::from(&address), form.note.trim(), priced.totals, coupon_code, &lines)?;
        self.store.place_order(&order, priced.coupon.as_ref().map(|c| c.id), Some(&after)).await.map_err(|e| {
            tracing::warn!(order_id = %order.id, error = %e, "order placement rolled back");
            CheckoutError::from(e)
        })?;
        after.mark_saved();
        *session = after;

        tracing::info!(order_id = %order.id, total = %order.total, items = order.items.len(), "order placed");
        self.events.publish_all(order.take_events()).await;
        Ok(CheckoutOutcome { order, coupon_warning: priced.coupon_warning })
    }

    async fn priced_cart(&self, session: &mut Session) -> CheckoutResult<CartSummary> {
        let cart = Cart::new(session);
        let index = VariationIndex::new(self.store.variations(&cart.variation_ids()).await?);
        let summary = cart.summary(&index);
        if summary.total_quantity == 0 { return Err(CheckoutError::EmptyCart); }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon(pct: u32, min: Decimal) -> Coupon {
        let mut c = Coupon::new("OFF").unwrap();
        c.percent_off = Some(pct);
        c.min_subtotal = Some(min);
        c
    }

    #[test]
    fn test_quote_without_coupon() {
        let q = quote(dec!(250000), None, "تهران", Utc::now());
        assert_eq!(q.totals, OrderTotals { subtotal: dec!(250000), discount: dec!(0), shipping: dec!(45000), total: dec!(295000) });
        assert!(q.coupon_warning.is_none());
    }

    #[test]
    fn test_quote_discount_applies_before_shipping_threshold() {
        let q = quote(dec!(1300000), Some(coupon(10, dec!(0))), "تهران", Utc::now());
        assert_eq!(q.totals.discount, dec!(130000));
        assert_eq!(q.totals.shipping, dec!(45000));
        assert_eq!(q.totals.total, dec!(1215000));
    }

    #[test]
    fn test_quote_remote_province() {
        let q = quote(dec!(100000), None, "ایلام", Utc::now());
        assert_eq!(q.totals.shipping, dec!(54000));
    }

    #[test]
    fn test_quote_invalid_coupon_warns() {
        let mut c = coupon(10, dec!(0));
        c.is_active = false;
        let q = quote(dec!(250000), Some(c), "تهران", Utc::now());
        assert_eq!(q.totals.discount, Decimal::ZERO);
        assert!(q.coupon.is_none());
        assert_eq!(q.coupon_warning.as_deref(), Some(INVALID_COUPON_WARNING));
    }

    #[test]
    fn test_store_errors_map_to_checkout_errors() {
        let e = CheckoutError::from(StoreError::CouponExhausted("X".into()));
        assert!(matches!(e, CheckoutError::CouponExhausted(code) if code == "X"));
        assert!(matches!(CheckoutError::from(StoreError::NotFound("order")), CheckoutError::Store(_)));
    }
}
