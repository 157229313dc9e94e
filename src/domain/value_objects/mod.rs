//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

pub const SKU_MAX_LEN: usize = 40;

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.chars().count() > SKU_MAX_LEN { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU longer than 40 characters")]
    TooLong,
}

/// URL slug derived from a display name.
///
/// Letters keep their script, so Persian names produce Persian slugs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(name.len());
        let mut pending_dash = false;
        for c in name.to_lowercase().chars() {
            if c.is_alphanumeric() || c == '_' {
                if pending_dash && !out.is_empty() { out.push('-'); }
                pending_dash = false;
                out.push(c);
            } else if c == '-' || c.is_whitespace() {
                pending_dash = true;
            }
        }
        let trimmed = out.trim_matches(|c| c == '-' || c == '_');
        if trimmed.is_empty() { return Err(SlugError::Empty); }
        Ok(Self(trimmed.to_string()))
    }

    /// Picks the first of `base`, `base-2`, `base-3`, ... that `taken` rejects.
    pub fn unique(name: &str, taken: impl Fn(&str) -> bool) -> Result<Self, SlugError> {
        let base = Self::from_name(name)?;
        if !taken(base.as_str()) { return Ok(base); }
        let mut n = 2u32;
        loop {
            let candidate = format!("{}-{}", base.0, n);
            if !taken(&candidate) { return Ok(Self(candidate)); }
            n += 1;
        }
    }

    /// Wraps a slug read back from storage, where it was validated on the way in.
    pub fn from_stored(value: String) -> Self { Self(value) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("name yields an empty slug")]
    Empty,
}

/// Hex color code such as `#1A2B3C`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexColor(String);

impl HexColor {
    pub fn new(value: &str) -> Option<Self> {
        let v = value.trim();
        let ok = v.len() == 7 && v.starts_with('#') && v[1..].chars().all(|c| c.is_ascii_hexdigit());
        ok.then(|| Self(v.to_uppercase()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

/// Gateway amounts are integers in the minor unit (one tenth of a display unit).
pub const MINOR_UNITS_PER_UNIT: i64 = 10;

/// Largest amount a `NUMERIC(12, 2)` column holds; catalog prices are capped here.
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount.checked_mul(Decimal::from(MINOR_UNITS_PER_UNIT))?.trunc().to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sku() { let sku = Sku::new(" tee-red-m ").unwrap(); assert_eq!(sku.as_str(), "TEE-RED-M"); }

    #[test]
    fn test_sku_limits() {
        assert_eq!(Sku::new("   "), Err(SkuError::Empty));
        assert_eq!(Sku::new("X".repeat(41)), Err(SkuError::TooLong));
    }

    #[test]
    fn test_slug_from_name() {
        assert_eq!(Slug::from_name("  Summer T-Shirt!! 2024 ").unwrap().as_str(), "summer-t-shirt-2024");
        assert_eq!(Slug::from_name("کفش  ورزشی").unwrap().as_str(), "کفش-ورزشی");
        assert_eq!(Slug::from_name("!!!"), Err(SlugError::Empty));
    }

    #[test]
    fn test_slug_suffix_on_collision() {
        let taken = ["shoe", "shoe-2"];
        let slug = Slug::unique("Shoe", |s| taken.contains(&s)).unwrap();
        assert_eq!(slug.as_str(), "shoe-3");
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(HexColor::new("#00ff00").unwrap().as_str(), "#00FF00");
        assert!(HexColor::new("00ff00").is_none());
        assert!(HexColor::new("#00ff0g").is_none());
    }

    #[test]
    fn test_minor_units_truncate() {
        assert_eq!(to_minor_units(dec!(295000)), Some(2_950_000));
        assert_eq!(to_minor_units(dec!(10.59)), Some(105));
        assert_eq!(to_minor_units(Decimal::MAX), None);
    }

    #[test]
    fn test_max_price_matches_column() {
        assert_eq!(MAX_PRICE, dec!(9999999999.99));
    }
}
