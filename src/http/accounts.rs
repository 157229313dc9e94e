//! Province/city reference data and customer addresses.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{validated, ApiError, AppState, CurrentUser};
use crate::domain::aggregates::{Address, City, NewAddress, Province};
use crate::store::AccountStore;

#[derive(Debug, Deserialize, Validate)]
pub struct NamedInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

pub async fn list_provinces(State(s): State<AppState>) -> Result<Json<Vec<Province>>, ApiError> {
    Ok(Json(s.store.provinces().await?))
}

pub async fn create_province(
    State(s): State<AppState>, user: CurrentUser, Json(r): Json<NamedInput>,
) -> Result<(StatusCode, Json<Province>), ApiError> {
    user.require_staff()?;
    let r = validated(r)?;
    Ok((StatusCode::CREATED, Json(s.store.create_province(&r.name).await?)))
}

pub async fn list_cities(State(s): State<AppState>, Path(province_id): Path<Uuid>) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(s.store.cities(province_id).await?))
}

pub async fn create_city(
    State(s): State<AppState>, user: CurrentUser, Path(province_id): Path<Uuid>, Json(r): Json<NamedInput>,
) -> Result<(StatusCode, Json<City>), ApiError> {
    user.require_staff()?;
    let r = validated(r)?;
    Ok((StatusCode::CREATED, Json(s.store.create_city(province_id, &r.name).await?)))
}

pub async fn list_addresses(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(s.store.addresses(user.id).await?))
}

pub async fn create_address(
    State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewAddress>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let address = s.store.create_address(user.id, validated(r)?).await?;
    tracing::info!(address_id = %address.id, user_id = %user.id, "address created");
    Ok((StatusCode::CREATED, Json(address)))
}
