//! Realtime support chat: frame dispatch on top of the hub and the store.

pub mod hub;
pub mod protocol;
pub mod store;

pub use hub::{ChatHub, ConnectionId, Participant};
pub use protocol::{ClientMessage, ServerEvent};
pub use store::ChatError;

use crate::auth::Claims;
use crate::config::ClosedChatPolicy;
use crate::db::{Chat, DbPool};

impl From<&Claims> for Participant {
    fn from(claims: &Claims) -> Self {
        Participant {
            user_id: claims.sub.clone(),
            username: claims.username.clone(),
            is_admin: claims.is_admin(),
        }
    }
}

/// Everything a connection needs to act on frames
#[derive(Clone, Copy)]
pub struct ChatContext<'a> {
    pub db: &'a DbPool,
    pub hub: &'a ChatHub,
    pub policy: ClosedChatPolicy,
}

/// Handle one raw text frame from a connection
pub async fn handle_text(ctx: ChatContext<'_>, conn: ConnectionId, text: &str) {
    match protocol::parse(text) {
        Ok(message) => handle_message(ctx, conn, message).await,
        Err(e) => {
            tracing::debug!(connection = conn, error = %e, "Malformed chat frame");
            ctx.hub
                .send_to(conn, &ServerEvent::error(format!("Invalid message: {}", e), None));
        }
    }
}

/// Apply one frame. Failures are answered to the sender only.
pub async fn handle_message(ctx: ChatContext<'_>, conn: ConnectionId, message: ClientMessage) {
    let kind = message.kind();
    let chat_id = message.chat_id().map(str::to_string);

    if let Err(e) = apply(ctx, conn, message).await {
        let text = match &e {
            ChatError::Database(db_err) => {
                tracing::error!(connection = conn, kind, error = %db_err, "Chat storage failure");
                "Internal error".to_string()
            }
            other => {
                tracing::debug!(connection = conn, kind, error = %other, "Chat frame rejected");
                other.to_string()
            }
        };
        ctx.hub
            .send_to(conn, &ServerEvent::error(text, chat_id.as_deref()));
    }
}

async fn apply(ctx: ChatContext<'_>, conn: ConnectionId, message: ClientMessage) -> Result<(), ChatError> {
    let ChatContext { db, hub, policy } = ctx;
    // Connection already gone
    let Some(me) = hub.participant(conn) else {
        return Ok(());
    };

    match message {
        ClientMessage::CheckChat { chat_id } => {
            let exists = match store::get(db, &chat_id).await? {
                Some(chat) => {
                    authorize(&me, &chat)?;
                    hub.subscribe(conn, &chat_id);
                    true
                }
                None => false,
            };
            hub.send_to(conn, &ServerEvent::ChatStatus { chat_id, exists });
        }
        ClientMessage::CreateChat { user_id } => {
            let owner = match user_id {
                Some(requested) if requested != me.user_id => {
                    if !me.is_admin {
                        return Err(ChatError::Forbidden);
                    }
                    requested
                }
                _ => me.user_id.clone(),
            };
            let chat = store::create(db, &owner).await?;
            hub.subscribe(conn, &chat.id);
            hub.send_to(conn, &ServerEvent::ChatCreated { chat_id: chat.id });
        }
        ClientMessage::SendMessage { chat_id, content } => {
            authorize(&me, &load(db, &chat_id).await?)?;
            store::append_message(db, &chat_id, &me.username, &content, policy).await?;
            hub.subscribe(conn, &chat_id);
            let event = ServerEvent::NewMessage {
                chat_id: chat_id.clone(),
                sender: me.username,
                content,
            };
            hub.publish(&chat_id, &event);
        }
        ClientMessage::CloseChat { chat_id } => {
            authorize(&me, &load(db, &chat_id).await?)?;
            store::close(db, &chat_id).await?;
            hub.subscribe(conn, &chat_id);
            hub.publish(&chat_id, &ServerEvent::ChatClosed { chat_id: chat_id.clone() });
        }
        ClientMessage::Subscribe { chat_id } => {
            authorize(&me, &load(db, &chat_id).await?)?;
            hub.subscribe(conn, &chat_id);
            hub.send_to(conn, &ServerEvent::Subscribed { chat_id });
        }
    }

    Ok(())
}

async fn load(db: &DbPool, chat_id: &str) -> Result<Chat, ChatError> {
    store::get(db, chat_id).await?.ok_or(ChatError::NotFound)
}

fn authorize(me: &Participant, chat: &Chat) -> Result<(), ChatError> {
    if me.may_access(&chat.user_id) {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}
