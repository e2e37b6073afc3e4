use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::auth::require_admin;
use super::error::ApiError;
use super::validation::validate_product;
use crate::auth::Claims;
use crate::db::{
    list_products as query_products, CreateProductRequest, DeleteProductRequest, Product,
    ProductPage, ProductQuery, UpdateProductRequest,
};
use crate::AppState;

/// GET /products
///
/// Query parameters:
/// - id, category: exact-match filters
/// - sortBy: name | price | category; order: desc (anything else ascending)
/// - page (defaults to 1), pageSize (defaults to 10, at most 100); a value
///   that is not a positive integer falls back to its default
///
/// An empty result is a 404.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>, ApiError> {
    let page = query_products(&state.db, &query).await?;

    if page.products.is_empty() {
        return Err(ApiError::not_found("No products match the filter"));
    }

    Ok(Json(page))
}

/// POST /products (admin)
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    require_admin(&claims)?;
    validate_product(&req.name, req.price, &req.category)?;

    let product: Product = sqlx::query_as(
        "INSERT INTO products (id, name, price, category) VALUES (?, ?, ?, ?) RETURNING id, name, price, category",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(req.name.trim())
    .bind(req.price)
    .bind(req.category.trim())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(product_id = %product.id, by = %claims.username, "Product added");

    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products (admin)
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&claims)?;
    validate_product(&req.name, req.price, &req.category)?;

    let result = sqlx::query("UPDATE products SET name = ?, price = ?, category = ? WHERE id = ?")
        .bind(req.name.trim())
        .bind(req.price)
        .bind(req.category.trim())
        .bind(&req.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    tracing::info!(product_id = %req.id, by = %claims.username, "Product updated");

    Ok(Json(json!({ "message": "Product updated successfully!" })))
}

/// DELETE /products (admin)
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(req): Json<DeleteProductRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&claims)?;

    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&req.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }

    tracing::info!(product_id = %req.id, by = %claims.username, "Product deleted");

    Ok(Json(json!({ "message": "Product deleted successfully!" })))
}
