//! Payment gateway adapter.
//!
//! `start` registers the order total with the gateway and hands back the URL
//! the customer is sent to; `callback` handles the customer's return and
//! verifies the payment server-to-server before the order is marked paid.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{OrderError, Payment, PaymentStateError, PaymentStatus};
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::to_minor_units;
use crate::services::events::EventPublisher;
use crate::store::{OrderStore, PaymentStore, Store, StoreError};

/// Gateway status code for an accepted request or a verified payment.
pub const GATEWAY_OK: i64 = 100;
/// `Status` query value the gateway sends back when the customer completed the payment.
pub const CALLBACK_OK: &str = "OK";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub merchant_id: String,
    pub request_url: String,
    pub verify_url: String,
    /// Redirect prefix; the authority is appended.
    pub gateway_url: String,
    pub callback_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct PaymentRequestBody<'a> {
    #[serde(rename = "MerchantID")]
    merchant_id: &'a str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "CallbackURL")]
    callback_url: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequestBody<'a> {
    #[serde(rename = "MerchantID")]
    merchant_id: &'a str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "Authority")]
    authority: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RequestReply {
    #[serde(rename = "Status")]
    pub status: i64,
    #[serde(rename = "Authority", default)]
    pub authority: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct VerifyReply {
    #[serde(rename = "Status")]
    pub status: i64,
    /// Numeric or string depending on the gateway version.
    #[serde(rename = "RefID", default)]
    pub ref_id: Option<serde_json::Value>,
}

impl VerifyReply {
    pub fn ref_id(&self) -> String {
        match &self.ref_id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("gateway returned HTTP {0}")]
    Http(u16),
    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `amount` is in minor units.
    async fn request(&self, amount: i64, description: &str, email: &str) -> Result<RequestReply, GatewayError>;
    async fn verify(&self, amount: i64, authority: &str) -> Result<VerifyReply, GatewayError>;
    fn redirect_url(&self, authority: &str) -> String;
}

pub struct HttpPaymentGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R, GatewayError> {
        let response = self.client.post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| GatewayError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() { GatewayError::Parse(e.to_string()) } else { GatewayError::Http(status.as_u16()) }
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn request(&self, amount: i64, description: &str, email: &str) -> Result<RequestReply, GatewayError> {
        let body = PaymentRequestBody {
            merchant_id: &self.config.merchant_id, amount, description, callback_url: &self.config.callback_url, email,
        };
        self.post(&self.config.request_url, &body).await
    }

    async fn verify(&self, amount: i64, authority: &str) -> Result<VerifyReply, GatewayError> {
        let body = VerifyRequestBody { merchant_id: &self.config.merchant_id, amount, authority };
        self.post(&self.config.verify_url, &body).await
    }

    fn redirect_url(&self, authority: &str) -> String { format!("{}{}", self.config.gateway_url, authority) }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Zero total; nothing to collect.
    NoPaymentRequired { order_id: Uuid },
    AlreadyPaid { order_id: Uuid },
    Redirect { order_id: Uuid, url: String, authority: String },
    /// The gateway refused to open a payment.
    Rejected { order_id: Uuid, status: i64, message: String },
    Paid { order_id: Uuid, ref_id: String },
    Failed { order_id: Uuid, reason: String },
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Order not found")]
    OrderNotFound,
    #[error("Payment not found")]
    PaymentNotFound,
    #[error("Payment gateway unavailable: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Amount cannot be sent to the gateway")]
    AmountOutOfRange,
    #[error(transparent)]
    State(#[from] PaymentStateError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, gateway, events }
    }

    #[tracing::instrument(skip(self, email))]
    pub async fn start(&self, user_id: Uuid, email: &str, order_id: Uuid) -> PaymentResult<PaymentOutcome> {
        let order = self.store.order(order_id).await?
            .filter(|o| o.user_id == user_id)
            .ok_or(PaymentError::OrderNotFound)?;
        if !order.requires_payment() {
            return Ok(if order.is_paid() { PaymentOutcome::AlreadyPaid { order_id } } else { PaymentOutcome::NoPaymentRequired { order_id } });
        }

        let existing = self.store.payment_for_order(order_id).await?;
        if existing.as_ref().is_some_and(|p| p.status == PaymentStatus::Success) {
            return Ok(PaymentOutcome::AlreadyPaid { order_id });
        }
        let mut payment = existing.unwrap_or_else(|| Payment::create(order_id, user_id, order.total));
        let amount = to_minor_units(order.total).ok_or(PaymentError::AmountOutOfRange)?;
        payment.start(order.total)?;
        self.store.save_payment(&payment).await?;

        let description = format!("Order #{order_id}");
        let reply = self.gateway.request(amount, &description, email).await.map_err(|e| {
            tracing::warn!(error = %e, "payment request failed");
            e
        })?;

        match reply.authority.filter(|a| reply.status == GATEWAY_OK && !a.is_empty()) {
            Some(authority) => {
                payment.authority = authority.clone();
                self.store.save_payment(&payment).await?;
                self.events.publish(&DomainEvent::Payment(PaymentEvent::Started { order_id, amount: payment.amount })).await;
                tracing::info!(%authority, "redirecting to gateway");
                Ok(PaymentOutcome::Redirect { order_id, url: self.gateway.redirect_url(&authority), authority })
            }
            None => {
                tracing::warn!(status = reply.status, "gateway rejected payment request");
                Ok(PaymentOutcome::Rejected {
                    order_id, status: reply.status, message: format!("Gateway rejected the payment request (status {})", reply.status),
                })
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn callback(&self, user_id: Uuid, authority: &str, status: &str) -> PaymentResult<PaymentOutcome> {
        let mut payment = self.store.payment_by_authority(user_id, authority).await?.ok_or(PaymentError::PaymentNotFound)?;
        let order_id = payment.order_id;
        if payment.status == PaymentStatus::Success {
            return Ok(PaymentOutcome::Paid { order_id, ref_id: payment.ref_id });
        }
        if status != CALLBACK_OK {
            return self.fail(payment, "Payment was canceled or did not complete".to_string()).await;
        }

        let amount = to_minor_units(payment.amount).ok_or(PaymentError::AmountOutOfRange)?;
        let reply = self.gateway.verify(amount, authority).await.map_err(|e| {
            tracing::warn!(error = %e, "payment verification failed");
            e
        })?;
        if reply.status != GATEWAY_OK {
            return self.fail(payment, format!("Payment verification failed (status {})", reply.status)).await;
        }

        let mut order = self.store.order(order_id).await?.ok_or(PaymentError::OrderNotFound)?;
        let ref_id = reply.ref_id();
        payment.succeed(ref_id.clone(), Utc::now())?;
        order.mark_paid(&ref_id).map_err(|e| {
            tracing::error!(%order_id, error = %e, "verified payment for an order that cannot be paid");
            e
        })?;
        self.store.settle_payment(&payment, &order).await?;
        tracing::info!(%order_id, %ref_id, "payment verified");
        self.events.publish_all(order.take_events()).await;
        Ok(PaymentOutcome::Paid { order_id, ref_id })
    }

    async fn fail(&self, mut payment: Payment, reason: String) -> PaymentResult<PaymentOutcome> {
        payment.fail();
        self.store.save_payment(&payment).await?;
        tracing::info!(order_id = %payment.order_id, %reason, "payment failed");
        self.events.publish(&DomainEvent::Payment(PaymentEvent::Failed { order_id: payment.order_id, reason: reason.clone() })).await;
        Ok(PaymentOutcome::Failed { order_id: payment.order_id, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_field_names() {
        let body = PaymentRequestBody { merchant_id: "m", amount: 2_950_000, description: "Order #1", callback_url: "http://cb", email: "" };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["MerchantID"], "m");
        assert_eq!(json["Amount"], 2_950_000);
        assert_eq!(json["CallbackURL"], "http://cb");
    }

    #[test]
    fn test_ref_id_accepts_numbers_and_strings() {
        let numeric: VerifyReply = serde_json::from_str(r#"{"Status":100,"RefID":12345}"#).unwrap();
        assert_eq!(numeric.ref_id(), "12345");
        let text: VerifyReply = serde_json::from_str(r#"{"Status":100,"RefID":"A1"}"#).unwrap();
        assert_eq!(text.ref_id(), "A1");
        let rejected: VerifyReply = serde_json::from_str(r#"{"Status":-21}"#).unwrap();
        assert_eq!((rejected.status, rejected.ref_id()), (-21, String::new()));
    }

    #[test]
    fn test_redirect_url_appends_authority() {
        let gateway = HttpPaymentGateway::new(GatewayConfig {
            merchant_id: "m".into(), request_url: String::new(), verify_url: String::new(),
            gateway_url: "https://pay.example/StartPay/".into(), callback_url: String::new(), timeout: Duration::from_secs(1),
        }).unwrap();
        assert_eq!(gateway.redirect_url("A00042"), "https://pay.example/StartPay/A00042");
    }
}
