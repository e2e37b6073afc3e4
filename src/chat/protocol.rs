//! Wire format of the support chat socket.
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

/// Frames sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CheckChat {
        chat_id: String,
    },
    /// Users always open chats for themselves; only admins may name another user
    CreateChat {
        #[serde(default)]
        user_id: Option<String>,
    },
    /// The sender label comes from the session, never from the frame
    SendMessage {
        chat_id: String,
        content: String,
    },
    CloseChat {
        chat_id: String,
    },
    Subscribe {
        chat_id: String,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CheckChat { .. } => "check_chat",
            ClientMessage::CreateChat { .. } => "create_chat",
            ClientMessage::SendMessage { .. } => "send_message",
            ClientMessage::CloseChat { .. } => "close_chat",
            ClientMessage::Subscribe { .. } => "subscribe",
        }
    }

    /// The chat a frame refers to, if it names one
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            ClientMessage::CheckChat { chat_id }
            | ClientMessage::SendMessage { chat_id, .. }
            | ClientMessage::CloseChat { chat_id }
            | ClientMessage::Subscribe { chat_id } => Some(chat_id),
            ClientMessage::CreateChat { .. } => None,
        }
    }
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ChatStatus {
        chat_id: String,
        exists: bool,
    },
    ChatCreated {
        chat_id: String,
    },
    NewMessage {
        chat_id: String,
        sender: String,
        content: String,
    },
    ChatClosed {
        chat_id: String,
    },
    Subscribed {
        chat_id: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>, chat_id: Option<&str>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            chat_id: chat_id.map(str::to_string),
        }
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> String {
        // Every variant is plain strings and bools
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"serialization failed"}"#.to_string()
        })
    }
}

/// Parse one text frame
pub fn parse(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_frames() {
        assert_eq!(
            parse(r#"{"type":"send_message","chat_id":"c1","sender":"alice","content":"hi"}"#)
                .unwrap(),
            ClientMessage::SendMessage {
                chat_id: "c1".into(),
                content: "hi".into(),
            }
        );
        assert_eq!(
            parse(r#"{"type":"create_chat","user_id":"u1"}"#).unwrap(),
            ClientMessage::CreateChat {
                user_id: Some("u1".into())
            }
        );
        assert_eq!(
            parse(r#"{"type":"create_chat"}"#).unwrap(),
            ClientMessage::CreateChat { user_id: None }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_or_incomplete_frames() {
        assert!(parse(r#"{"type":"reopen_chat","chat_id":"c1"}"#).is_err());
        assert!(parse(r#"{"type":"send_message","chat_id":"c1"}"#).is_err());
        assert!(parse("not json").is_err());
    }

    #[test]
    fn test_server_event_shapes() {
        let value: serde_json::Value =
            serde_json::from_str(&ServerEvent::ChatStatus { chat_id: "c1".into(), exists: true }.to_json())
                .unwrap();
        assert_eq!(value, json!({"type": "chat_status", "chat_id": "c1", "exists": true}));

        let value: serde_json::Value =
            serde_json::from_str(&ServerEvent::error("Chat not found", None).to_json()).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "Chat not found"}));
    }

    #[test]
    fn test_chat_id_accessor() {
        let msg = ClientMessage::CloseChat {
            chat_id: "c9".into(),
        };
        assert_eq!(msg.chat_id(), Some("c9"));
        assert_eq!(msg.kind(), "close_chat");
    }
}
