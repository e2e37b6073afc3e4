use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::auth::require_admin;
use super::error::ApiError;
use crate::auth::Claims;
use crate::chat::store;
use crate::db::{ActiveChatResponse, Chat, ChatHistoryQuery, ChatMessage};
use crate::AppState;

/// GET /api/active-chats (admin)
pub async fn active_chats(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<Vec<Chat>>, ApiError> {
    require_admin(&claims)?;
    Ok(Json(store::active_chats(&state.db).await?))
}

/// GET /api/active-chat - the caller's own open chat, if any
pub async fn active_chat(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Json<ActiveChatResponse>, ApiError> {
    let chat = store::active_chat_for_user(&state.db, &claims.sub).await?;

    Ok(Json(ActiveChatResponse {
        active: chat.is_some(),
        chat_id: chat.map(|c| c.id),
    }))
}

/// GET /api/chat-history?chat_id=
///
/// Users may only read their own chats; admins may read any.
pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Query(query): Query<ChatHistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let chat_id = query
        .chat_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("chat_id is required"))?;

    let chat = store::get(&state.db, &chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    if !claims.is_admin() && chat.user_id != claims.sub {
        return Err(ApiError::forbidden("Not a participant of this chat"));
    }

    Ok(Json(store::history(&state.db, &chat_id).await?))
}
