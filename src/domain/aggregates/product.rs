//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{HexColor, Sku, Slug};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Uuid,
    pub brand_id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub color_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
    pub sku: Sku,
    pub barcode: String,
    pub price_override: Option<Decimal>,
    pub stock: u32,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)] pub struct ProductImage { pub id: Uuid, pub product_id: Uuid, pub url: String, pub alt_text: String, pub is_main: bool }
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)] pub struct Brand { pub id: Uuid, pub name: String, pub slug: Slug }
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)] pub struct Color { pub id: Uuid, pub name: String, pub code: Option<HexColor> }
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)] pub struct Size { pub id: Uuid, pub name: String, pub sort_order: u32 }

impl Product {
    pub fn create(category_id: Uuid, brand_id: Uuid, name: impl Into<String>, slug: Slug, price: Decimal) -> Result<Self, ProductError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        if price < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), category_id, brand_id, name, slug, description: String::new(),
            price, discount_price: None, is_active: true, created_at: now, updated_at: now,
        })
    }

    /// Price before any per-variation override.
    pub fn base_final_price(&self) -> Decimal { self.discount_price.unwrap_or(self.price) }

    pub fn set_discount(&mut self, discount: Option<Decimal>) -> Result<(), ProductError> {
        if let Some(d) = discount {
            if d < Decimal::ZERO || d >= self.price { return Err(ProductError::DiscountNotBelowPrice); }
        }
        self.discount_price = discount;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

impl ProductVariation {
    pub fn create(product_id: Uuid, color_id: Option<Uuid>, size_id: Option<Uuid>, sku: Sku, stock: u32) -> Self {
        Self { id: Uuid::now_v7(), product_id, color_id, size_id, sku, barcode: String::new(), price_override: None, stock, is_active: true }
    }

    /// Override, else the product's discount price, else its base price.
    pub fn final_price(&self, product: &Product) -> Decimal {
        self.price_override.unwrap_or_else(|| product.base_final_price())
    }

    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    /// Key of the (product, color, size) uniqueness constraint.
    pub fn combination(&self) -> (Uuid, Option<Uuid>, Option<Uuid>) { (self.product_id, self.color_id, self.size_id) }
}

/// Variation joined with the rows a storefront needs to display and price it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariationDetail {
    pub variation: ProductVariation,
    pub product: Product,
    pub color: Option<Color>,
    pub size: Option<Size>,
}

impl VariationDetail {
    pub fn final_price(&self) -> Decimal { self.variation.final_price(&self.product) }

    pub fn label(&self) -> String {
        let parts: Vec<&str> = [self.color.as_ref().map(|c| c.name.as_str()), self.size.as_ref().map(|s| s.name.as_str())]
            .into_iter().flatten().collect();
        if parts.is_empty() { self.product.name.clone() } else { format!("{} ({})", self.product.name, parts.join(" / ")) }
    }
}

/// Listing tile. Serializes as the product's own fields plus the summary.
#[derive(Clone, Debug, Serialize)]
pub struct ProductCard {
    #[serde(flatten)]
    pub product: Product,
    pub main_image: Option<ProductImage>,
    /// Cheapest active variation, or the product's own price when it has none.
    pub from_price: Decimal,
    pub variation_count: usize,
    pub in_stock: bool,
}

impl ProductCard {
    /// `variations` are the product's active ones.
    pub fn new(product: Product, main_image: Option<ProductImage>, variations: &[ProductVariation]) -> Self {
        let from_price = variations.iter().map(|v| v.final_price(&product)).min().unwrap_or_else(|| product.base_final_price());
        Self {
            in_stock: variations.iter().any(ProductVariation::is_in_stock),
            variation_count: variations.len(),
            from_price,
            main_image,
            product,
        }
    }
}

/// Product page payload: active variations and images, main image first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product: Product,
    pub brand: Option<Brand>,
    pub variations: Vec<VariationDetail>,
    pub images: Vec<ProductImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Price cannot be negative")]
    NegativePrice,
    #[error("Discount price must be below the base price")]
    DiscountNotBelowPrice,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(price: Decimal) -> Product {
        Product::create(Uuid::now_v7(), Uuid::now_v7(), "Tee", Slug::from_name("Tee").unwrap(), price).unwrap()
    }

    #[test]
    fn test_final_price_precedence() {
        let mut p = product(dec!(100000));
        let mut v = ProductVariation::create(p.id, None, None, Sku::new("TEE-1").unwrap(), 3);
        assert_eq!(v.final_price(&p), dec!(100000));
        p.set_discount(Some(dec!(80000))).unwrap();
        assert_eq!(v.final_price(&p), dec!(80000));
        v.price_override = Some(dec!(90000));
        assert_eq!(v.final_price(&p), dec!(90000));
    }

    #[test]
    fn test_discount_must_be_below_price() {
        let mut p = product(dec!(100));
        assert_eq!(p.set_discount(Some(dec!(100))), Err(ProductError::DiscountNotBelowPrice));
        assert!(p.discount_price.is_none());
    }

    #[test]
    fn test_card_summarizes_variations() {
        let mut p = product(dec!(100000));
        p.set_discount(Some(dec!(80000))).unwrap();
        let bare = ProductCard::new(p.clone(), None, &[]);
        assert_eq!(bare.from_price, dec!(80000));
        assert!(!bare.in_stock);

        let mut cheap = ProductVariation::create(p.id, None, None, Sku::new("TEE-S").unwrap(), 0);
        cheap.price_override = Some(dec!(70000));
        let stocked = ProductVariation::create(p.id, None, None, Sku::new("TEE-M").unwrap(), 2);
        let card = ProductCard::new(p, None, &[cheap, stocked]);
        assert_eq!(card.from_price, dec!(70000));
        assert_eq!(card.variation_count, 2);
        assert!(card.in_stock);
    }
}
