use axum::{
    Extension, Json, Router,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use catalog_core::ProductId;
use catalog_products::Product;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product))
}

/// Create (or, when the body carries a known `id`, replace) a product.
pub async fn create_product(
    Extension(services): Extension<AppServices>,
    body: Result<Json<Product>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(product) = body?;
    let stored = services.catalog().save(product).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_product(
    Extension(services): Extension<AppServices>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = id.parse().map_err(|_| ApiError::invalid_id())?;
    match services.catalog().find_by_id(id).await? {
        Some(product) => Ok(Json(product)),
        None => Err(ApiError::NotFound),
    }
}

pub async fn list_products(
    Extension(services): Extension<AppServices>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = services.catalog().find_all().await?;
    Ok(Json(products))
}
