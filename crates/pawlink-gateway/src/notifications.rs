use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use pawlink_db::Database;
use pawlink_types::events::{AlertPush, ServerEvent};
use pawlink_types::models::{Notification, NotificationCategory, Severity};

use crate::error::ServiceError;
use crate::registry::Registry;
use crate::{blocking, now};

/// What a producer asks to be delivered. Everything else is filled in on create.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub category: NotificationCategory,
    pub severity: Option<Severity>,
    pub pet_id: Option<Uuid>,
    pub alert_id: Option<Uuid>,
}

impl NotificationDraft {
    pub fn new(recipient_id: Uuid, category: NotificationCategory, message: impl Into<String>) -> Self {
        Self {
            recipient_id,
            message: message.into(),
            link: None,
            category,
            severity: None,
            pet_id: None,
            alert_id: None,
        }
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn pet(mut self, pet_id: Uuid) -> Self {
        self.pet_id = Some(pet_id);
        self
    }

    pub fn alert(mut self, alert_id: Uuid) -> Self {
        self.alert_id = Some(alert_id);
        self
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<Database>,
    registry: Registry,
}

impl NotificationService {
    pub fn new(db: Arc<Database>, registry: Registry) -> Self {
        Self { db, registry }
    }

    /// Persist, then push if the recipient is online. The notification is
    /// durable before anyone sees it; an offline recipient finds it unread later.
    pub async fn create(&self, draft: NotificationDraft) -> Result<Notification, ServiceError> {
        let message = draft.message.trim().to_string();
        if message.is_empty() {
            return Err(ServiceError::Validation("notification message is empty".into()));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: draft.recipient_id,
            message,
            link: draft.link,
            category: draft.category,
            severity: draft.severity,
            pet_id: draft.pet_id,
            alert_id: draft.alert_id,
            read: false,
            created_at: now(),
        };

        let stored = notification.clone();
        blocking(&self.db, move |db| db.insert_notification(&stored)).await?;

        let delivered = self
            .registry
            .send(notification.recipient_id, push_event(&notification))
            .await;
        if delivered {
            debug!(
                "Pushed {} notification {} to {}",
                notification.category.as_str(),
                notification.id,
                notification.recipient_id
            );
        } else {
            debug!(
                "{} offline, notification {} stored unread",
                notification.recipient_id, notification.id
            );
        }

        Ok(notification)
    }

    pub async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Notification, ServiceError> {
        blocking(&self.db, move |db| db.mark_notification_read(id, recipient_id))
            .await?
            .ok_or(ServiceError::NotFound("notification"))
    }

    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<usize, ServiceError> {
        let updated = blocking(&self.db, move |db| db.mark_all_notifications_read(recipient_id)).await?;
        if updated > 0 {
            info!("Marked {} notifications read for {}", updated, recipient_id);
        }
        Ok(updated)
    }

    pub async fn list_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>, ServiceError> {
        blocking(&self.db, move |db| db.notifications_for(recipient_id)).await
    }

    pub async fn unread_count(
        &self,
        recipient_id: Uuid,
        category: Option<NotificationCategory>,
    ) -> Result<u64, ServiceError> {
        blocking(&self.db, move |db| db.unread_notification_count(recipient_id, category)).await
    }
}

/// Alert categories get their own frame kinds; everything else is a plain
/// `notification` frame.
fn push_event(notification: &Notification) -> ServerEvent {
    let alert_push = || AlertPush {
        notification_id: notification.id,
        message: notification.message.clone(),
        link: notification.link.clone(),
        severity: notification.severity,
        pet_id: notification.pet_id,
        alert_id: notification.alert_id,
        created_at: notification.created_at,
    };

    match notification.category {
        NotificationCategory::DiseaseAlert => ServerEvent::DiseaseAlert(alert_push()),
        NotificationCategory::WeatherAlert => ServerEvent::WeatherAlert(alert_push()),
        _ => ServerEvent::Notification(notification.clone()),
    }
}
