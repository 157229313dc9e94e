//! Payment Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub authority: String,
    pub ref_id: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Init, Started, Success, Failed }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Init => "init", Self::Started => "started", Self::Success => "success", Self::Failed => "failed" }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentStatus {
    type Err = PaymentStateError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "started" => Ok(Self::Started),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(PaymentStateError::UnknownStatus(other.to_string())),
        }
    }
}

impl Payment {
    pub fn create(order_id: Uuid, user_id: Uuid, amount: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, user_id, amount, status: PaymentStatus::Init,
            authority: String::new(), ref_id: String::new(), created_at: Utc::now(), paid_at: None,
        }
    }

    /// Re-arms the payment for a new gateway round trip.
    pub fn start(&mut self, amount: Decimal) -> Result<(), PaymentStateError> {
        if self.status == PaymentStatus::Success { return Err(PaymentStateError::AlreadySettled); }
        self.amount = amount;
        self.status = PaymentStatus::Started;
        Ok(())
    }

    pub fn fail(&mut self) { if self.status != PaymentStatus::Success { self.status = PaymentStatus::Failed; } }

    pub fn succeed(&mut self, ref_id: impl Into<String>, at: DateTime<Utc>) -> Result<(), PaymentStateError> {
        if self.status == PaymentStatus::Success { return Err(PaymentStateError::AlreadySettled); }
        self.status = PaymentStatus::Success;
        self.ref_id = ref_id.into();
        self.paid_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentStateError {
    #[error("payment already settled")]
    AlreadySettled,
    #[error("Unknown payment status {0:?}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_lifecycle() {
        let mut p = Payment::create(Uuid::now_v7(), Uuid::now_v7(), dec!(100));
        p.start(dec!(120)).unwrap();
        assert_eq!((p.status, p.amount), (PaymentStatus::Started, dec!(120)));
        p.fail();
        p.start(dec!(120)).unwrap();
        p.succeed("778899", Utc::now()).unwrap();
        assert_eq!(p.status, PaymentStatus::Success);
        p.fail();
        assert_eq!(p.status, PaymentStatus::Success);
        assert_eq!(p.start(dec!(1)), Err(PaymentStateError::AlreadySettled));
    }
}
