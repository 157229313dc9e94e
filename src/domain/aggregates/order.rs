//! Order Aggregate
//!
//! Orders snapshot everything they need from the address and the catalog, so
//! later edits to either never change a placed order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::address::Address;
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub shipping_address: ShippingSnapshot,
    pub note: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem { pub id: Uuid, pub order_id: Uuid, pub variation_id: Uuid, pub product_name: String, pub sku: String, pub price: Decimal, pub quantity: u32, pub line_total: Decimal }

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingSnapshot { pub full_name: String, pub phone: String, pub province: String, pub city: String, pub address_exact: String, pub postal_code: String }

/// Pricing breakdown computed before the order is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderTotals { pub subtotal: Decimal, pub discount: Decimal, pub shipping: Decimal, pub total: Decimal }

/// One cart line as it will be frozen into an [`OrderItem`].
#[derive(Clone, Debug, PartialEq)]
pub struct OrderLine { pub variation_id: Uuid, pub product_name: String, pub sku: String, pub price: Decimal, pub quantity: u32 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Paid, Canceled, Shipped }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Canceled => "canceled", Self::Shipped => "shipped" }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!((self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Canceled) | (Self::Paid, Self::Shipped) | (Self::Paid, Self::Canceled))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "canceled" => Ok(Self::Canceled),
            "shipped" => Ok(Self::Shipped),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

impl From<&Address> for ShippingSnapshot {
    fn from(a: &Address) -> Self {
        Self {
            full_name: a.full_name.clone(), phone: a.phone.clone(), province: a.province.name.clone(),
            city: a.city.name.clone(), address_exact: a.address_exact.clone(), postal_code: a.postal_code.clone(),
        }
    }
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal { self.price * Decimal::from(self.quantity) }
}

impl OrderTotals {
    /// `total` is clamped at zero.
    pub fn new(subtotal: Decimal, discount: Decimal, shipping: Decimal) -> Self {
        let total = (subtotal - discount + shipping).max(Decimal::ZERO);
        Self { subtotal, discount, shipping, total }
    }
}

impl Order {
    pub fn place(
        user_id: Uuid, shipping_address: ShippingSnapshot, note: impl Into<String>,
        totals: OrderTotals, coupon_code: Option<String>, lines: &[OrderLine],
    ) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let items: Vec<OrderItem> = lines.iter().map(|l| OrderItem {
            id: Uuid::now_v7(), order_id: id, variation_id: l.variation_id, product_name: l.product_name.clone(),
            sku: l.sku.clone(), price: l.price, quantity: l.quantity, line_total: l.line_total(),
        }).collect();
        let items_total: Decimal = items.iter().map(|i| i.line_total).sum();
        if items_total != totals.subtotal { return Err(OrderError::SubtotalMismatch { items: items_total, subtotal: totals.subtotal }); }
        let mut order = Self {
            id, user_id, status: OrderStatus::Pending, shipping_address, note: note.into(),
            subtotal: totals.subtotal, discount_amount: totals.discount, shipping_cost: totals.shipping, total: totals.total,
            coupon_code, items, created_at: Utc::now(), events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id, total: totals.total }));
        Ok(order)
    }

    /// Rebuilds a stored order; no events are raised.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, user_id: Uuid, status: OrderStatus, shipping_address: ShippingSnapshot, note: String,
        totals: OrderTotals, coupon_code: Option<String>, items: Vec<OrderItem>, created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, user_id, status, shipping_address, note, subtotal: totals.subtotal, discount_amount: totals.discount,
            shipping_cost: totals.shipping, total: totals.total, coupon_code, items, created_at, events: vec![],
        }
    }

    pub fn is_paid(&self) -> bool { matches!(self.status, OrderStatus::Paid | OrderStatus::Shipped) }
    pub fn requires_payment(&self) -> bool { self.total > Decimal::ZERO && !self.is_paid() }

    pub fn mark_paid(&mut self, ref_id: &str) -> Result<(), OrderError> {
        self.transition(OrderStatus::Paid)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, ref_id: ref_id.to_string() }));
        Ok(())
    }

    pub fn ship(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Shipped) }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Canceled)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Canceled { order_id: self.id }));
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) { return Err(OrderError::InvalidTransition { from: self.status, to: next }); }
        self.status = next;
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Item totals {items} do not add up to subtotal {subtotal}")]
    SubtotalMismatch { items: Decimal, subtotal: Decimal },
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unknown order status {0:?}")]
    UnknownStatus(String),
}
