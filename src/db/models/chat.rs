//! Support chat models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatStatus::Active => write!(f, "active"),
            ChatStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ChatStatus::Active),
            "inactive" => Ok(ChatStatus::Inactive),
            _ => Err(format!("Unknown chat status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    #[serde(rename = "chat_id")]
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl Chat {
    pub fn status_enum(&self) -> ChatStatus {
        self.status.parse().unwrap_or(ChatStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == ChatStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatHistoryQuery {
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActiveChatResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}
