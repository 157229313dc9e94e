use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{validated, ApiError, AppState, CurrentUser};
use crate::domain::aggregates::{Address, NewAddress};
use crate::services::{CheckoutForm, CheckoutOutcome, CheckoutStep, CheckoutView};

#[derive(Debug, Default, Deserialize)]
pub struct StepParams { pub step: Option<CheckoutStep> }

#[derive(Debug, Serialize)]
pub struct AddressSaved {
    pub address: Address,
    pub next_step: CheckoutStep,
}

pub async fn show(
    State(s): State<AppState>, user: CurrentUser, Path(key): Path<String>, Query(p): Query<StepParams>,
) -> Result<Json<CheckoutView>, ApiError> {
    let mut session = s.open_session(&key).await?;
    let view = s.checkout.view(user.id, &mut session, p.step).await?;
    Ok(Json(view))
}

pub async fn save_address(
    State(s): State<AppState>, user: CurrentUser, Path(key): Path<String>, Json(r): Json<NewAddress>,
) -> Result<(StatusCode, Json<AddressSaved>), ApiError> {
    let input = validated(r)?;
    let mut session = s.open_session(&key).await?;
    let address = s.checkout.save_address(user.id, &mut session, input).await?;
    Ok((StatusCode::CREATED, Json(AddressSaved { address, next_step: CheckoutStep::Review })))
}

pub async fn place_order(
    State(s): State<AppState>, user: CurrentUser, Path(key): Path<String>, Json(form): Json<CheckoutForm>,
) -> Result<(StatusCode, Json<CheckoutOutcome>), ApiError> {
    let form = validated(form)?;
    let mut session = s.open_session(&key).await?;
    let outcome = s.checkout.place_order(user.id, &mut session, form).await?;
    s.save_session(&mut session).await?;
    tracing::info!(order_id = %outcome.order.id, user_id = %user.id, total = %outcome.order.total, "order placed");
    Ok((StatusCode::CREATED, Json(outcome)))
}
