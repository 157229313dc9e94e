//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub percent_off: Option<u32>,
    pub amount_off: Option<Decimal>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub min_subtotal: Option<Decimal>,
}

impl Coupon {
    pub fn new(code: impl Into<String>) -> Result<Self, CouponError> {
        let code = code.into().trim().to_string();
        if code.is_empty() { return Err(CouponError::EmptyCode); }
        Ok(Self {
            id: Uuid::now_v7(), code, percent_off: None, amount_off: None, is_active: true,
            starts_at: None, ends_at: None, usage_limit: None, used_count: 0, min_subtotal: None,
        })
    }

    pub fn set_percent_off(&mut self, pct: Option<u32>) -> Result<(), CouponError> {
        if pct.is_some_and(|p| p > 100) { return Err(CouponError::PercentOutOfRange); }
        self.percent_off = pct;
        Ok(())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active { return false; }
        if self.starts_at.is_some_and(|s| now < s) { return false; }
        if self.ends_at.is_some_and(|e| now > e) { return false; }
        if self.usage_limit.is_some_and(|limit| self.used_count >= limit) { return false; }
        true
    }

    /// Percent and flat parts are summed, then clamped to `[0, subtotal]`.
    pub fn compute_discount(&self, subtotal: Decimal) -> Decimal {
        if self.min_subtotal.is_some_and(|min| subtotal < min) { return Decimal::ZERO; }
        let mut discount = Decimal::ZERO;
        if let Some(pct) = self.percent_off {
            discount += subtotal * Decimal::from(pct) / Decimal::ONE_HUNDRED;
        }
        if let Some(flat) = self.amount_off {
            discount += flat;
        }
        discount.max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO))
    }

    pub fn matches_code(&self, code: &str) -> bool { self.code.to_lowercase() == code.trim().to_lowercase() }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon code is empty")]
    EmptyCode,
    #[error("percent off must be between 0 and 100")]
    PercentOutOfRange,
}
