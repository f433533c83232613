use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message in the shape returned to gateway clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i32,
    pub chat_id: String,
    pub chat_name: String,
    pub text: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub out: bool,
    pub has_photo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<i64>,
}

/// A conversation entry in the chat list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: i64,
    pub name: String,
    pub last_message: String,
    pub unread_count: i32,
    pub last_update_time: DateTime<Utc>,
    /// One of `user`, `chat`, `channel`; empty when the peer could not be resolved
    #[serde(rename = "type")]
    pub kind: String,
}

/// A live update delivered through the fan-out registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewMessage { message: Message },
}
