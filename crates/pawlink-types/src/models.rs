use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Actors --

/// The five account kinds that can chat and receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Owner,
    Clinic,
    Shop,
    Doctor,
    Admin,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Clinic => "clinic",
            Self::Shop => "shop",
            Self::Doctor => "doctor",
            Self::Admin => "admin",
        }
    }

    /// Name shown when the profile store has nothing for an actor.
    pub fn fallback_name(&self) -> &'static str {
        match self {
            Self::Owner => "Unknown owner",
            Self::Clinic => "Unknown clinic",
            Self::Shop => "Unknown shop",
            Self::Doctor => "Unknown doctor",
            Self::Admin => "Administrator",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "clinic" => Ok(Self::Clinic),
            "shop" => Ok(Self::Shop),
            "doctor" => Ok(Self::Doctor),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown actor kind '{}'", other)),
        }
    }
}

/// Identity of anyone taking part in a conversation or receiving a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub kind: ActorKind,
}

impl Actor {
    pub fn new(id: Uuid, kind: ActorKind) -> Self {
        Self { id, kind }
    }

    /// Stable `kind:id` form used to build canonical participant keys.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorProfile {
    pub id: Uuid,
    pub kind: ActorKind,
    pub display_name: String,
    pub avatar: Option<String>,
    pub city: Option<String>,
    pub village: Option<String>,
}

impl ActorProfile {
    pub fn unknown(actor: Actor) -> Self {
        Self {
            id: actor.id,
            kind: actor.kind,
            display_name: actor.kind.fallback_name().to_string(),
            avatar: None,
            city: None,
            village: None,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub species: String,
}

// -- Chat --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<Actor>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, actor_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.id == actor_id)
    }

    pub fn others(&self, actor_id: Uuid) -> impl Iterator<Item = &Actor> {
        self.participants.iter().filter(move |p| p.id != actor_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Actor,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    System,
    Message,
    Adoption,
    AdoptionUpdate,
    Feeding,
    FeedingReminder,
    Order,
    LowStock,
    VetApproval,
    WeatherAlert,
    DiseaseAlert,
}

impl NotificationCategory {
    pub const ALL: [Self; 11] = [
        Self::System,
        Self::Message,
        Self::Adoption,
        Self::AdoptionUpdate,
        Self::Feeding,
        Self::FeedingReminder,
        Self::Order,
        Self::LowStock,
        Self::VetApproval,
        Self::WeatherAlert,
        Self::DiseaseAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Message => "message",
            Self::Adoption => "adoption",
            Self::AdoptionUpdate => "adoption-update",
            Self::Feeding => "feeding",
            Self::FeedingReminder => "feeding-reminder",
            Self::Order => "order",
            Self::LowStock => "low-stock",
            Self::VetApproval => "vet-approval",
            Self::WeatherAlert => "weather-alert",
            Self::DiseaseAlert => "disease-alert",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown notification category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Warning,
    Danger,
    Extreme,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Extreme => "extreme",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "warning" => Ok(Self::Warning),
            "danger" => Ok(Self::Danger),
            "extreme" => Ok(Self::Extreme),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub category: NotificationCategory,
    pub severity: Option<Severity>,
    pub pet_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// -- Alerts --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Disease,
    Weather,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disease => "disease",
            Self::Weather => "weather",
        }
    }

    pub fn notification_category(&self) -> NotificationCategory {
        match self {
            Self::Disease => NotificationCategory::DiseaseAlert,
            Self::Weather => NotificationCategory::WeatherAlert,
        }
    }
}

impl FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disease" => Ok(Self::Disease),
            "weather" => Ok(Self::Weather),
            other => Err(format!("unknown alert category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
}

impl Region {
    pub fn city(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            village: None,
        }
    }

    pub fn village(city: impl Into<String>, village: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            village: Some(village.into()),
        }
    }

    /// Village with empty strings folded into `None`.
    pub fn village_name(&self) -> Option<&str> {
        self.village.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.village_name() {
            Some(village) => write!(f, "{} - {}", self.city, village),
            None => f.write_str(&self.city),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    High,
    Low,
}

impl ThresholdDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl FromStr for ThresholdDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown threshold direction '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureThreshold {
    pub direction: ThresholdDirection,
    pub celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertCriteria {
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub species: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureThreshold>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub category: AlertCategory,
    /// Disease name for outbreak alerts.
    pub hazard: Option<String>,
    pub criteria: AlertCriteria,
    pub message: String,
    pub severity: Severity,
    pub active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable proof that an owner was told about an alert for one of their pets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAlert {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub pet_id: Uuid,
    pub alert_id: Uuid,
    pub category: AlertCategory,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
