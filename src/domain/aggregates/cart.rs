//! Cart Aggregate
//!
//! The cart lives in the visitor's session as `{"<variation id>": {"quantity": n}}`.
//! Only quantities are stored; prices and stock come from a fresh
//! [`VariationIndex`] every time the cart is read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::product::{Product, ProductVariation, VariationDetail};
use crate::session::Session;

pub const CART_SESSION_KEY: &str = "cart";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry { pub quantity: i64 }

pub struct Cart<'s> {
    session: &'s mut Session,
    entries: BTreeMap<Uuid, CartEntry>,
}

/// Live variation rows keyed by id, fetched in one query for the whole cart.
#[derive(Clone, Debug, Default)]
pub struct VariationIndex(HashMap<Uuid, VariationDetail>);

impl VariationIndex {
    pub fn new(details: impl IntoIterator<Item = VariationDetail>) -> Self {
        Self(details.into_iter().map(|d| (d.variation.id, d)).collect())
    }
    pub fn get(&self, id: &Uuid) -> Option<&VariationDetail> { self.0.get(id) }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[derive(Clone, Debug)]
pub struct CartLine<'a> {
    pub detail: &'a VariationDetail,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

impl<'a> CartLine<'a> {
    pub fn variation(&self) -> &'a ProductVariation { &self.detail.variation }
    pub fn product(&self) -> &'a Product { &self.detail.product }
}

#[derive(Clone, Debug, Serialize)]
pub struct CartLineView {
    pub variation_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_slug: String,
    pub label: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
    pub stock: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartLineView>,
    pub total_quantity: u64,
    pub total_price: Decimal,
}

impl<'s> Cart<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        let entries = match session.get::<BTreeMap<Uuid, CartEntry>>(CART_SESSION_KEY) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(session = session.key(), error = %e, "discarding unreadable cart");
                BTreeMap::new()
            }
        };
        Self { session, entries }
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn variation_ids(&self) -> Vec<Uuid> { self.entries.keys().copied().collect() }
    pub fn quantity_of(&self, variation_id: &Uuid) -> Option<i64> { self.entries.get(variation_id).map(|e| e.quantity) }

    /// Adds `quantity` to the stored amount, or overwrites it when `replace` is set.
    /// A resulting quantity of zero or less drops the entry.
    pub fn add(&mut self, variation_id: Uuid, quantity: i64, replace: bool) -> Result<(), CartError> {
        let entry = self.entries.entry(variation_id).or_insert(CartEntry { quantity: 0 });
        entry.quantity = if replace { quantity } else { entry.quantity.saturating_add(quantity) };
        if entry.quantity <= 0 { self.entries.remove(&variation_id); }
        self.save()
    }

    pub fn remove(&mut self, variation_id: &Uuid) -> Result<(), CartError> {
        if self.entries.remove(variation_id).is_some() { self.save()?; }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), CartError> {
        self.entries.clear();
        self.save()
    }

    /// Joins stored quantities against `index`. Entries whose variation is gone are skipped.
    pub fn lines<'a>(&'a self, index: &'a VariationIndex) -> impl Iterator<Item = CartLine<'a>> + 'a {
        self.entries.iter().filter_map(move |(id, entry)| {
            let detail = index.get(id)?;
            let quantity = u32::try_from(entry.quantity).ok()?;
            let unit_price = detail.final_price();
            Some(CartLine { detail, unit_price, quantity, line_total: unit_price * Decimal::from(quantity) })
        })
    }

    pub fn total_quantity(&self, index: &VariationIndex) -> u64 {
        self.lines(index).map(|l| u64::from(l.quantity)).sum()
    }

    pub fn total_price(&self, index: &VariationIndex) -> Decimal {
        self.lines(index).fold(Decimal::ZERO, |acc, l| acc + l.line_total)
    }

    pub fn summary(&self, index: &VariationIndex) -> CartSummary {
        let lines: Vec<CartLineView> = self.lines(index).map(|l| CartLineView {
            variation_id: l.variation().id,
            product_id: l.product().id,
            product_name: l.product().name.clone(),
            product_slug: l.product().slug.to_string(),
            label: l.detail.label(),
            sku: l.variation().sku.to_string(),
            unit_price: l.unit_price,
            quantity: l.quantity,
            line_total: l.line_total,
            stock: l.variation().stock,
        }).collect();
        let total_quantity = lines.iter().map(|l| u64::from(l.quantity)).sum();
        let total_price = lines.iter().fold(Decimal::ZERO, |acc, l| acc + l.line_total);
        CartSummary { lines, total_quantity, total_price }
    }

    fn save(&mut self) -> Result<(), CartError> {
        self.session.insert(CART_SESSION_KEY, &self.entries)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("could not store cart in session: {0}")]
    Session(#[from] serde_json::Error),
}
