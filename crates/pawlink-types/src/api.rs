use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::MessageView;
use crate::models::{
    Actor, ActorKind, ActorProfile, AlertCategory, AlertCriteria, ChatMessage, Conversation,
    NotificationCategory, Severity,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the WebSocket handshake.
/// Tokens are issued by the account service; this workspace only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: ActorKind,
    pub name: String,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor::new(self.sub, self.kind)
    }
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
    pub recipient_kind: ActorKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    /// The other participant, from the caller's point of view
    pub participant: ActorProfile,
    pub last_message: Option<ChatMessage>,
    pub last_activity_at: DateTime<Utc>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub participants: Vec<ActorProfile>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: u64,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<NotificationCategory>,
}

/// Body of the generic producer endpoint (orders, stock, vet approvals).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendNotificationRequest {
    pub recipient_id: Uuid,
    pub message: String,
    pub link: Option<String>,
    #[serde(default = "default_category")]
    pub category: NotificationCategory,
    pub severity: Option<Severity>,
    pub pet_id: Option<Uuid>,
}

fn default_category() -> NotificationCategory {
    NotificationCategory::System
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// -- Alerts --

/// Create/replace body for an alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub category: AlertCategory,
    pub hazard: Option<String>,
    #[serde(flatten)]
    pub criteria: AlertCriteria,
    #[serde(default)]
    pub message: String,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertStatusRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertCategoryQuery {
    pub category: Option<AlertCategory>,
}

/// One row of "who was told about this alert".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecipient {
    pub user_alert_id: Uuid,
    pub owner_id: Uuid,
    pub owner_name: String,
    pub city: Option<String>,
    pub village: Option<String>,
    pub pet_id: Uuid,
    pub pet_name: String,
    pub species: String,
    pub read: bool,
    pub notified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedOwner {
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub user_alert_id: Uuid,
    pub notification_id: Uuid,
}

/// Outcome of one fan-out pass over an alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub regions_processed: usize,
    pub notified: Vec<NotifiedOwner>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    #[serde(flatten)]
    pub alert: crate::models::Alert,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<FanOutReport>,
}
