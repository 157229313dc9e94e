//! HTTP error responses.
//!
//! Every handler returns `Result<_, ApiError>`; service and store errors
//! convert into it with `?`. Server-side failures are logged here and reach
//! the client only as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use validator::ValidationErrors;

use crate::domain::aggregates::CartError;
use crate::services::checkout::CheckoutError;
use crate::services::payment::PaymentError;
use crate::store::StoreError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message) }
    pub fn unauthorized(message: impl Into<String>) -> Self { Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message) }
    pub fn forbidden(message: impl Into<String>) -> Self { Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message) }
    pub fn not_found(what: impl fmt::Display) -> Self { Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found")) }
    pub fn conflict(message: impl Into<String>) -> Self { Self::new(StatusCode::CONFLICT, "CONFLICT", message) }
    pub fn bad_gateway(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_GATEWAY, "GATEWAY_ERROR", message) }

    /// Logs `source` and hides it from the client.
    pub fn internal(source: impl fmt::Display) -> Self {
        tracing::error!(error = %source, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn code(&self) -> &'static str { self.code }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "[{}] {}", self.code, self.message) }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { code: self.code, message: self.message, details: self.details };
        (self.status, Json(body)).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields: serde_json::Map<String, Value> = errors.field_errors().into_iter()
            .map(|(field, errs)| {
                let messages: Vec<String> = errs.iter()
                    .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                    .collect();
                (field.to_string(), json!(messages))
            })
            .collect();
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", "Please check the submitted fields")
            .with_details(Value::Object(fields))
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::not_found(what),
            StoreError::Conflict(m) => Self::conflict(m),
            StoreError::Invalid(m) => Self::bad_request(m),
            StoreError::InsufficientStock { product, variation_id, available, requested } =>
                Self::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK", format!("Not enough stock for {product}"))
                    .with_details(json!({ "variation_id": variation_id, "available": available, "requested": requested })),
            e @ StoreError::CouponExhausted(_) => Self::new(StatusCode::CONFLICT, "COUPON_EXHAUSTED", e.to_string()),
            StoreError::Database(e) => Self::internal(e),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self { Self::internal(e) }
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::EmptyCart => Self::new(StatusCode::BAD_REQUEST, "EMPTY_CART", e.to_string()),
            CheckoutError::NoAddressSelected => Self::new(StatusCode::BAD_REQUEST, "NO_ADDRESS", e.to_string())
                .with_details(json!({ "address_id": [e.to_string()] })),
            CheckoutError::AddressNotFound => Self::not_found("Address"),
            CheckoutError::InsufficientStock { ref product, variation_id, available, requested } =>
                Self::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK", format!("Not enough stock for {product}"))
                    .with_details(json!({ "variation_id": variation_id, "available": available, "requested": requested })),
            CheckoutError::CouponExhausted(_) => Self::new(StatusCode::CONFLICT, "COUPON_EXHAUSTED", e.to_string()),
            CheckoutError::Cart(e) => Self::internal(e),
            CheckoutError::Order(e) => Self::internal(e),
            CheckoutError::Store(e) => e.into(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::OrderNotFound => Self::not_found("Order"),
            PaymentError::PaymentNotFound => Self::not_found("Payment"),
            PaymentError::Gateway(e) => Self::bad_gateway(format!("Payment gateway unavailable: {e}")),
            PaymentError::AmountOutOfRange => Self::bad_request(e.to_string()),
            PaymentError::State(e) => Self::conflict(e.to_string()),
            PaymentError::Order(e) => Self::conflict(e.to_string()),
            PaymentError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_store_error_statuses() {
        assert_eq!(ApiError::from(StoreError::NotFound("product")).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(StoreError::Conflict("dup".into())).status(), StatusCode::CONFLICT);
        let e = ApiError::from(StoreError::InsufficientStock { product: "Tee".into(), variation_id: Uuid::nil(), available: 1, requested: 2 });
        assert_eq!((e.status(), e.code()), (StatusCode::CONFLICT, "INSUFFICIENT_STOCK"));
    }

    #[test]
    fn test_checkout_error_statuses() {
        assert_eq!(ApiError::from(CheckoutError::EmptyCart).code(), "EMPTY_CART");
        assert_eq!(ApiError::from(CheckoutError::AddressNotFound).status(), StatusCode::NOT_FOUND);
        let gateway = PaymentError::Gateway(crate::services::payment::GatewayError::Network("timeout".into()));
        assert_eq!(ApiError::from(gateway).status(), StatusCode::BAD_GATEWAY);
    }
}
