use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use super::auth::claims_from_jar;
use super::error::ApiError;
use crate::chat::{self, ChatContext, Participant};
use crate::AppState;

/// GET /ws - support chat socket.
///
/// The session cookie is resolved before the upgrade and pins the
/// connection's identity; sockets without a valid session are refused.
/// Admin sessions receive every chat's events.
pub async fn chat_ws(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let participant = match claims_from_jar(&state, &jar) {
        Ok(claims) => Participant::from(&claims),
        Err(e) => return ApiError::from(e).into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, participant))
}

async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>, participant: Participant) {
    let (mut sender, mut receiver) = socket.split();
    let user_id = participant.user_id.clone();
    let (conn, mut outbound) = state.chat_hub.connect(participant);
    tracing::info!(connection = conn, user_id = %user_id, "Chat socket opened");

    // Writer: drains this connection's queue into the socket
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let ctx = ChatContext {
        db: &state.db,
        hub: &state.chat_hub,
        policy: state.config.chat.closed_chat_policy,
    };

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => chat::handle_text(ctx, conn, &text).await,
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum; binary frames are not part of the protocol
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = conn, error = %e, "Chat socket read error");
                break;
            }
        }
    }

    // Dropping the sender half of the queue ends the writer task
    state.chat_hub.disconnect(conn);
    let _ = writer.await;

    tracing::info!(connection = conn, "Chat socket closed");
}
