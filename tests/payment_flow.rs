mod common;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bazaar_shop::domain::aggregates::{Order, OrderLine, OrderStatus, OrderTotals, PaymentStatus, ShippingSnapshot};
use bazaar_shop::http::ApiError;
use bazaar_shop::services::payment::{GatewayError, RequestReply, VerifyReply};
use bazaar_shop::services::{CheckoutForm, CheckoutService, PaymentError, PaymentGateway, PaymentOutcome, PaymentService, GATEWAY_OK};
use bazaar_shop::store::{OrderStore, PaymentStore};
use common::{session_with, RecordingPublisher, Shop};

/// Replies come from the queues; calls are recorded as `(kind, amount)`.
#[derive(Default)]
struct ScriptedGateway {
    requests: Mutex<Vec<Result<RequestReply, GatewayError>>>,
    verifications: Mutex<Vec<Result<VerifyReply, GatewayError>>>,
    calls: Mutex<Vec<(&'static str, i64)>>,
}

impl ScriptedGateway {
    fn accepting(authority: &str) -> Self {
        let gw = Self::default();
        gw.requests.lock().unwrap().push(Ok(RequestReply { status: GATEWAY_OK, authority: Some(authority.into()) }));
        gw
    }

    fn then_verify(self, reply: Result<VerifyReply, GatewayError>) -> Self {
        self.verifications.lock().unwrap().push(reply);
        self
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn request(&self, amount: i64, _description: &str, _email: &str) -> Result<RequestReply, GatewayError> {
        self.calls.lock().unwrap().push(("request", amount));
        self.requests.lock().unwrap().pop().unwrap_or(Err(GatewayError::Network("no scripted reply".into())))
    }

    async fn verify(&self, amount: i64, _authority: &str) -> Result<VerifyReply, GatewayError> {
        self.calls.lock().unwrap().push(("verify", amount));
        self.verifications.lock().unwrap().pop().unwrap_or(Err(GatewayError::Network("no scripted reply".into())))
    }

    fn redirect_url(&self, authority: &str) -> String { format!("https://pay.test/StartPay/{authority}") }
}

fn verified(ref_id: i64) -> Result<VerifyReply, GatewayError> {
    Ok(VerifyReply { status: GATEWAY_OK, ref_id: Some(serde_json::json!(ref_id)) })
}

struct Fixture {
    shop: Shop,
    gateway: Arc<ScriptedGateway>,
    events: Arc<RecordingPublisher>,
    payments: PaymentService,
    user: Uuid,
    order: Order,
}

/// Places the 295,000 order (2 x A, 1 x B shipped to Tehran).
async fn fixture(gateway: ScriptedGateway) -> Fixture {
    let shop = Shop::seed().await;
    let user = Uuid::now_v7();
    let address = shop.address(user, "تهران").await;
    let mut session = session_with("s1", &[(&shop.a, 2), (&shop.b, 1)]);
    let events = Arc::new(RecordingPublisher::default());
    let checkout = CheckoutService::new(shop.store.clone(), events.clone());
    let form = CheckoutForm { address_id: Some(address.id), ..CheckoutForm::default() };
    let order = checkout.place_order(user, &mut session, form).await.unwrap().order;
    events.events.lock().unwrap().clear();

    let gateway = Arc::new(gateway);
    let payments = PaymentService::new(shop.store.clone(), gateway.clone(), events.clone());
    Fixture { shop, gateway, events, payments, user, order }
}

#[tokio::test]
async fn test_start_redirects_with_minor_unit_amount() {
    let f = fixture(ScriptedGateway::accepting("A0001")).await;

    let outcome = f.payments.start(f.user, "sara@example.com", f.order.id).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Redirect {
        order_id: f.order.id, url: "https://pay.test/StartPay/A0001".into(), authority: "A0001".into(),
    });
    assert_eq!(*f.gateway.calls.lock().unwrap(), vec![("request", 2_950_000)]);

    let payment = f.shop.store.payment_for_order(f.order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Started);
    assert_eq!(payment.amount, dec!(295000));
    assert_eq!(payment.authority, "A0001");
    assert_eq!(f.events.subjects(), vec!["shop.payments.started"]);
}

#[tokio::test]
async fn test_start_for_someone_elses_order_is_not_found() {
    let f = fixture(ScriptedGateway::accepting("A0001")).await;
    let err = f.payments.start(Uuid::now_v7(), "", f.order.id).await.unwrap_err();
    assert!(matches!(err, PaymentError::OrderNotFound));
    assert!(f.gateway.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_rejection_is_reported() {
    let gateway = ScriptedGateway::default();
    gateway.requests.lock().unwrap().push(Ok(RequestReply { status: -11, authority: None }));
    let f = fixture(gateway).await;

    let outcome = f.payments.start(f.user, "", f.order.id).await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Rejected { status: -11, .. }));
    assert_eq!(f.shop.store.order(f.order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_verified_callback_marks_order_paid() {
    let f = fixture(ScriptedGateway::accepting("A0001").then_verify(verified(778899))).await;
    f.payments.start(f.user, "", f.order.id).await.unwrap();

    let outcome = f.payments.callback(f.user, "A0001", "OK").await.unwrap();
    assert_eq!(outcome, PaymentOutcome::Paid { order_id: f.order.id, ref_id: "778899".into() });
    assert_eq!(f.gateway.calls.lock().unwrap().last(), Some(&("verify", 2_950_000)));

    let order = f.shop.store.order(f.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let payment = f.shop.store.payment_for_order(f.order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.ref_id, "778899");
    assert!(payment.paid_at.is_some());
    assert!(f.events.subjects().contains(&"shop.orders.paid"));

    // Replayed callbacks are answered from the stored payment.
    let replay = f.payments.callback(f.user, "A0001", "OK").await.unwrap();
    assert_eq!(replay, outcome);
    assert_eq!(f.gateway.calls.lock().unwrap().len(), 2);
    let again = f.payments.start(f.user, "", f.order.id).await.unwrap();
    assert_eq!(again, PaymentOutcome::AlreadyPaid { order_id: f.order.id });
}

#[tokio::test]
async fn test_canceled_callback_fails_without_verifying() {
    let f = fixture(ScriptedGateway::accepting("A0001")).await;
    f.payments.start(f.user, "", f.order.id).await.unwrap();

    let outcome = f.payments.callback(f.user, "A0001", "NOK").await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Failed { order_id, .. } if order_id == f.order.id));
    assert_eq!(f.gateway.calls.lock().unwrap().len(), 1);
    assert_eq!(f.shop.store.payment_for_order(f.order.id).await.unwrap().unwrap().status, PaymentStatus::Failed);
    assert_eq!(f.shop.store.order(f.order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    assert!(f.events.subjects().contains(&"shop.payments.failed"));
}

#[tokio::test]
async fn test_failed_verification_leaves_order_pending() {
    let f = fixture(ScriptedGateway::accepting("A0001").then_verify(Ok(VerifyReply { status: -51, ref_id: None }))).await;
    f.payments.start(f.user, "", f.order.id).await.unwrap();

    let outcome = f.payments.callback(f.user, "A0001", "OK").await.unwrap();
    assert!(matches!(outcome, PaymentOutcome::Failed { .. }));
    assert_eq!(f.shop.store.order(f.order.id).await.unwrap().unwrap().status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_unknown_authority_is_not_found() {
    let f = fixture(ScriptedGateway::accepting("A0001")).await;
    f.payments.start(f.user, "", f.order.id).await.unwrap();

    assert!(matches!(f.payments.callback(f.user, "ZZZ", "OK").await, Err(PaymentError::PaymentNotFound)));
    assert!(matches!(f.payments.callback(Uuid::now_v7(), "A0001", "OK").await, Err(PaymentError::PaymentNotFound)));
}

#[tokio::test]
async fn test_transport_error_maps_to_bad_gateway() {
    let gateway = ScriptedGateway::default();
    gateway.requests.lock().unwrap().push(Err(GatewayError::Http(503)));
    let f = fixture(gateway).await;

    let err = f.payments.start(f.user, "", f.order.id).await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(GatewayError::Http(503))));
    assert_eq!(ApiError::from(err).status(), axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_zero_total_needs_no_payment() {
    let f = fixture(ScriptedGateway::default()).await;
    let address = f.shop.address(f.user, "تهران").await;
    let line = OrderLine { variation_id: f.shop.a.id, product_name: "Linen Shirt".into(), sku: "A-1".into(), price: dec!(100000), quantity: 1 };
    let free = Order::place(
        f.user, ShippingSnapshot::from(&address), "", OrderTotals::new(dec!(100000), dec!(100000), dec!(0)), None, &[line],
    ).unwrap();
    f.shop.store.place_order(&free, None, None).await.unwrap();

    let outcome = f.payments.start(f.user, "", free.id).await.unwrap();
    assert_eq!(outcome, PaymentOutcome::NoPaymentRequired { order_id: free.id });
    assert!(f.gateway.calls.lock().unwrap().is_empty());
}
