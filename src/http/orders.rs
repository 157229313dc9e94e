//! Order history, staff status changes and the payment round trip.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, AppState, CurrentUser};
use crate::domain::aggregates::{Order, OrderStatus};
use crate::services::{EventPublisher, PaymentOutcome};
use crate::store::OrderStore;

/// Query string the gateway appends when it sends the customer back.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(rename = "Authority")]
    pub authority: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

pub async fn list_orders(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(s.store.orders_for(user.id).await?))
}

/// Other users' orders answer 404 so ids can't be probed.
pub async fn get_order(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Order>, ApiError> {
    let order = s.store.order(id).await?
        .filter(|o| user.can_see(o.user_id))
        .ok_or_else(|| ApiError::not_found("Order"))?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Staff only. Orders can be shipped or canceled here; payment is the only way to `paid`.
pub async fn update_status(
    State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, Json(body): Json<StatusChange>,
) -> Result<Json<Order>, ApiError> {
    user.require_staff()?;
    let mut order = s.store.order(id).await?.ok_or_else(|| ApiError::not_found("Order"))?;
    let from = order.status;
    let moved = match body.status {
        OrderStatus::Shipped => order.ship(),
        OrderStatus::Canceled => order.cancel(),
        other => return Err(ApiError::bad_request(format!("Status {other} cannot be set by hand"))),
    };
    moved.map_err(|e| ApiError::conflict(e.to_string()))?;
    s.store.update_order_status(&order, from).await?;

    tracing::info!(order_id = %id, %from, to = %order.status, staff = %user.id, "order status changed");
    s.events.publish_all(order.take_events()).await;
    Ok(Json(order))
}

pub async fn start_payment(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<PaymentOutcome>, ApiError> {
    let email = user.email.as_deref().unwrap_or("");
    Ok(Json(s.payments.start(user.id, email, id).await?))
}

pub async fn payment_callback(
    State(s): State<AppState>, user: CurrentUser, Query(p): Query<CallbackParams>,
) -> Result<Json<PaymentOutcome>, ApiError> {
    if p.authority.trim().is_empty() {
        return Err(ApiError::bad_request("Missing payment authority"));
    }
    Ok(Json(s.payments.callback(user.id, p.authority.trim(), &p.status).await?))
}
