//! Session cart endpoints.
//!
//! Quantities are checked against live stock on the way in; the cart itself
//! only stores them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{validated, ApiError, AppState};
use crate::domain::aggregates::{Cart, CartSummary, VariationDetail, VariationIndex};
use crate::store::CatalogStore;

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub variation_id: Uuid,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest {
    /// Zero removes the line.
    #[validate(range(max = 1000))]
    pub quantity: u32,
}

async fn summary(s: &AppState, cart: &Cart<'_>) -> Result<CartSummary, ApiError> {
    let index = VariationIndex::new(s.store.variations(&cart.variation_ids()).await?);
    Ok(cart.summary(&index))
}

/// Only active variations of active products can be put in a cart.
async fn purchasable(s: &AppState, variation_id: Uuid) -> Result<VariationDetail, ApiError> {
    s.store.variations(&[variation_id]).await?
        .into_iter()
        .find(|d| d.variation.is_active && d.product.is_active)
        .ok_or_else(|| ApiError::not_found("Variation"))
}

fn check_stock(detail: &VariationDetail, wanted: i64) -> Result<(), ApiError> {
    let available = detail.variation.stock;
    if wanted > i64::from(available) {
        return Err(ApiError::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK", format!("Only {available} of {} left", detail.label()))
            .with_details(json!({ "variation_id": detail.variation.id, "available": available, "wanted": wanted })));
    }
    Ok(())
}

pub async fn show(State(s): State<AppState>, Path(key): Path<String>) -> Result<Json<CartSummary>, ApiError> {
    let mut session = s.open_session(&key).await?;
    let cart = Cart::new(&mut session);
    Ok(Json(summary(&s, &cart).await?))
}

pub async fn add_item(
    State(s): State<AppState>, Path(key): Path<String>, Json(r): Json<AddItemRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let r = validated(r)?;
    let detail = purchasable(&s, r.variation_id).await?;
    let mut session = s.open_session(&key).await?;
    let mut cart = Cart::new(&mut session);
    let quantity = i64::from(r.quantity);
    let wanted = if r.replace { quantity } else { cart.quantity_of(&r.variation_id).unwrap_or(0) + quantity };
    check_stock(&detail, wanted)?;
    cart.add(r.variation_id, quantity, r.replace)?;
    let view = summary(&s, &cart).await?;
    s.save_session(&mut session).await?;
    tracing::debug!(session = %key, variation_id = %r.variation_id, wanted, "cart updated");
    Ok(Json(view))
}

pub async fn update_item(
    State(s): State<AppState>, Path((key, variation_id)): Path<(String, Uuid)>, Json(r): Json<UpdateItemRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let r = validated(r)?;
    let mut session = s.open_session(&key).await?;
    let mut cart = Cart::new(&mut session);
    if r.quantity == 0 {
        cart.remove(&variation_id)?;
    } else {
        let detail = purchasable(&s, variation_id).await?;
        check_stock(&detail, i64::from(r.quantity))?;
        cart.add(variation_id, i64::from(r.quantity), true)?;
    }
    let view = summary(&s, &cart).await?;
    s.save_session(&mut session).await?;
    Ok(Json(view))
}

pub async fn remove_item(
    State(s): State<AppState>, Path((key, variation_id)): Path<(String, Uuid)>,
) -> Result<Json<CartSummary>, ApiError> {
    let mut session = s.open_session(&key).await?;
    let mut cart = Cart::new(&mut session);
    cart.remove(&variation_id)?;
    let view = summary(&s, &cart).await?;
    s.save_session(&mut session).await?;
    Ok(Json(view))
}

pub async fn clear(State(s): State<AppState>, Path(key): Path<String>) -> Result<StatusCode, ApiError> {
    let mut session = s.open_session(&key).await?;
    Cart::new(&mut session).clear()?;
    s.save_session(&mut session).await?;
    Ok(StatusCode::NO_CONTENT)
}
