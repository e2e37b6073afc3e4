use axum::{extract::State, Json};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::auth::require_admin;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::validate_subject;
use crate::auth::{validate_email, Claims};
use crate::notifications::EmailAttachment;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EmailFile {
    pub filename: String,
    /// Base64 (standard alphabet, padded)
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub file: Option<EmailFile>,
}

fn decode_attachment(file: Option<EmailFile>) -> Result<Option<EmailAttachment>, ApiError> {
    let Some(file) = file else {
        return Ok(None);
    };
    if file.content.is_empty() {
        return Ok(None);
    }

    let content = BASE64
        .decode(file.content.trim())
        .map_err(|_| ApiError::bad_request("Failed to decode file content"))?;

    let filename = if file.filename.trim().is_empty() {
        "attachment".to_string()
    } else {
        file.filename
    };

    Ok(Some(EmailAttachment { filename, content }))
}

/// POST /send_email (admin)
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Json(req): Json<SendEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&claims)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(req.to.trim()) {
        errors.add("to", e);
    }
    if let Err(e) = validate_subject(&req.subject) {
        errors.add("subject", e);
    }
    errors.finish()?;

    let attachment = decode_attachment(req.file)?;

    if !state.email.is_enabled() {
        return Err(ApiError::service_unavailable("Email delivery is not configured"));
    }

    tracing::info!(to = %req.to, by = %claims.username, has_attachment = attachment.is_some(), "Sending email");

    state
        .email
        .send_relay(req.to.trim(), &req.subject, &req.body, attachment)
        .await
        .map_err(|e| {
            tracing::error!(to = %req.to, error = %e, "Error sending email");
            ApiError::internal("Failed to send email")
        })?;

    Ok(Json(json!({ "status": "Email sent successfully!" })))
}

/// GET /get_users_email_list (admin)
pub async fn users_email_list(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<Vec<String>>, ApiError> {
    require_admin(&claims)?;

    let emails: Vec<String> = sqlx::query_scalar("SELECT email FROM users ORDER BY created_at, rowid")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(emails))
}
