use axum::{extract::State, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::metrics::record_order;
use crate::auth::Claims;
use crate::db::{CartLine, CheckoutResponse};
use crate::payments::Customer;
use crate::AppState;

/// POST /cart (verified users)
///
/// Forwards the cart to the payment service and records an order only when
/// the payment succeeded. A declined payment is still a 200 with the status
/// the payment service reported.
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(cart): Json<Vec<CartLine>>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    if cart.iter().any(|line| line.quantity == 0) {
        return Err(ApiError::validation_field("quantity", "Quantity must be at least 1"));
    }

    let customer = Customer {
        name: &claims.username,
        email: &claims.email,
    };

    let payment = state.payments.charge(&cart, &customer).await.inspect_err(|_| {
        record_order("error");
    })?;

    if !payment.is_success() {
        tracing::warn!(
            username = %claims.username,
            status = %payment.status,
            "Payment was not successful"
        );
        record_order("declined");
        return Ok(Json(CheckoutResponse {
            message: "Payment processing failed".to_string(),
            payment_status: payment.status,
            total_amount: payment.total_amount,
            currency: payment.currency,
            order_id: None,
        }));
    }

    let items = serde_json::to_string(&cart)
        .map_err(|e| ApiError::internal(format!("Failed to encode order items: {}", e)))?;
    let order_id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        "INSERT INTO orders (id, items, total_amount, currency, payment_status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&order_id)
    .bind(&items)
    .bind(payment.total_amount)
    .bind(&payment.currency)
    .bind(&payment.status)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Payment succeeded but the order could not be saved");
        ApiError::internal("Failed to save order")
    })?;

    record_order("paid");
    tracing::info!(
        order_id = %order_id,
        username = %claims.username,
        total = payment.total_amount,
        currency = %payment.currency,
        "Order recorded"
    );

    Ok(Json(CheckoutResponse {
        message: "Order successfully processed!".to_string(),
        payment_status: payment.status,
        total_amount: payment.total_amount,
        currency: payment.currency,
        order_id: Some(order_id),
    }))
}
