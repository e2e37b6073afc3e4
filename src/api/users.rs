use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::auth::require_admin;
use super::error::ApiError;
use crate::auth::Claims;
use crate::db::{Role, UpdateRoleRequest, User, UserResponse};
use crate::AppState;

/// GET /users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_admin(&claims)?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at, rowid")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// PUT /api/users/:id/role (admin)
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&claims)?;

    let role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::validation_field("role", "Role must be 'admin' or 'user'"))?;

    let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role.to_string())
        .bind(&user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(user_id = %user_id, role = %role, by = %claims.username, "User role updated");

    Ok(Json(json!({ "message": "User role updated" })))
}
