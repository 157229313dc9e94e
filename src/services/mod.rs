//! Application services: orchestration on top of the store and the domain.
pub mod catalog;
pub mod checkout;
pub mod events;
pub mod payment;
pub mod shipping;

pub use catalog::{CatalogService, HomeFeed};
pub use checkout::{CheckoutError, CheckoutForm, CheckoutOutcome, CheckoutService, CheckoutStep, CheckoutView};
pub use events::{EventPublisher, NatsPublisher, NoopPublisher};
pub use payment::{
    GatewayConfig, HttpPaymentGateway, PaymentError, PaymentGateway, PaymentOutcome, PaymentService, GATEWAY_OK,
};
pub use shipping::calc_shipping;
