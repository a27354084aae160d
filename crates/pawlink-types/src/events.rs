use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Notification, Severity};

/// A chat message as delivered to clients, with the sender's name resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
}

/// Payload of the `disease-alert` / `weather-alert` push frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPush {
    pub notification_id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub severity: Option<Severity>,
    pub pet_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Frames sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Sent once right after the handshake
    OnlineUsers { users: Vec<Uuid> },

    UserConnected { user_id: Uuid },

    UserDisconnected { user_id: Uuid },

    /// A message was appended to one of the recipient's conversations
    NewMessage {
        conversation_id: Uuid,
        message: MessageView,
    },

    /// Compact summary shown as a toast/badge next to `NewMessage`
    NewMessageNotification {
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Acknowledges a `chat-message` frame back to its sender
    MessageSent {
        conversation_id: Uuid,
        message: MessageView,
    },

    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },

    UnreadCount { count: u64 },

    OnlineStatus { actor_id: Uuid, is_online: bool },

    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// Generic notification (orders, stock, approvals, system)
    Notification(Notification),

    DiseaseAlert(AlertPush),

    WeatherAlert(AlertPush),

    /// A client frame could not be carried out
    Error { code: String, message: String },
}

/// Frames sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    ChatMessage {
        conversation_id: Uuid,
        content: String,
    },

    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },

    /// The client is now showing this conversation (scopes typing relay)
    OpenConversation { conversation_id: Uuid },

    CloseConversation,

    CheckOnline { actor_id: Uuid },

    MarkMessagesRead { conversation_id: Uuid },

    GetUnreadCount,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage { .. } => "chat-message",
            Self::Typing { .. } => "typing",
            Self::OpenConversation { .. } => "open-conversation",
            Self::CloseConversation => "close-conversation",
            Self::CheckOnline { .. } => "check-online",
            Self::MarkMessagesRead { .. } => "mark-messages-read",
            Self::GetUnreadCount => "get-unread-count",
        }
    }
}
