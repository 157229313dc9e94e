//! Catalog endpoints. Reads are public; writes need a staff identity.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{validated, ApiError, AppState, CurrentUser, PageParams};
use crate::domain::aggregates::category::CategoryBranch;
use crate::domain::aggregates::{Brand, Category, Color, Coupon, Product, ProductCard, ProductDetail, ProductImage, ProductVariation, Size};
use crate::services::catalog::{BrandPage, CategoryPage, HomeFeed, ProductFilter};
use crate::store::{CatalogStore, CouponStore, NewBrand, NewCategory, NewColor, NewCoupon, NewImage, NewProduct, NewSize, NewVariation, Page};

type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

pub async fn home(State(s): State<AppState>) -> Result<Json<HomeFeed>, ApiError> {
    Ok(Json(s.catalog.home().await?))
}

pub async fn list_products(State(s): State<AppState>, Query(filter): Query<ProductFilter>) -> Result<Json<Page<ProductCard>>, ApiError> {
    Ok(Json(s.catalog.list_products(&filter).await?))
}

pub async fn product_detail(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<ProductDetail>, ApiError> {
    Ok(Json(s.catalog.product(&slug).await?))
}

pub async fn create_product(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewProduct>) -> Created<Product> {
    user.require_staff()?;
    let product = s.store.create_product(validated(r)?).await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn add_variation(
    State(s): State<AppState>, user: CurrentUser, Path(product_id): Path<Uuid>, Json(r): Json<NewVariation>,
) -> Created<ProductVariation> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.add_variation(product_id, validated(r)?).await?)))
}

pub async fn add_image(
    State(s): State<AppState>, user: CurrentUser, Path(product_id): Path<Uuid>, Json(r): Json<NewImage>,
) -> Created<ProductImage> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.add_image(product_id, validated(r)?).await?)))
}

pub async fn category_tree(State(s): State<AppState>) -> Result<Json<Vec<CategoryBranch>>, ApiError> {
    Ok(Json(s.catalog.category_tree().await?))
}

pub async fn category_page(
    State(s): State<AppState>, Path(slug): Path<String>, Query(p): Query<PageParams>,
) -> Result<Json<CategoryPage>, ApiError> {
    Ok(Json(s.catalog.category_page(&slug, p.page.unwrap_or(1)).await?))
}

pub async fn create_category(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewCategory>) -> Created<Category> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.create_category(validated(r)?).await?)))
}

pub async fn list_brands(State(s): State<AppState>) -> Result<Json<Vec<Brand>>, ApiError> {
    Ok(Json(s.store.brands().await?))
}

pub async fn brand_page(
    State(s): State<AppState>, Path(slug): Path<String>, Query(p): Query<PageParams>,
) -> Result<Json<BrandPage>, ApiError> {
    Ok(Json(s.catalog.brand_page(&slug, p.page.unwrap_or(1)).await?))
}

pub async fn create_brand(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewBrand>) -> Created<Brand> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.create_brand(validated(r)?).await?)))
}

pub async fn create_color(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewColor>) -> Created<Color> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.create_color(validated(r)?).await?)))
}

pub async fn create_size(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewSize>) -> Created<Size> {
    user.require_staff()?;
    Ok((StatusCode::CREATED, Json(s.store.create_size(validated(r)?).await?)))
}

pub async fn create_coupon(State(s): State<AppState>, user: CurrentUser, Json(r): Json<NewCoupon>) -> Created<Coupon> {
    user.require_staff()?;
    let coupon = s.store.create_coupon(validated(r)?).await?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}
