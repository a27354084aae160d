use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use pawlink_db::Database;
use pawlink_db::models::AlertStatusChange;
use pawlink_types::api::{AlertRecipient, AlertRequest, AlertResponse};
use pawlink_types::models::{Alert, AlertCategory, AlertCriteria, Region, UserAlert};

use crate::error::ServiceError;
use crate::fanout::AlertFanOut;
use crate::{blocking, now};

/// Admin-side alert lifecycle. Fan-out runs whenever an alert becomes active.
#[derive(Clone)]
pub struct AlertService {
    db: Arc<Database>,
    fanout: AlertFanOut,
}

impl AlertService {
    pub fn new(db: Arc<Database>, fanout: AlertFanOut) -> Self {
        Self { db, fanout }
    }

    pub async fn create(&self, request: AlertRequest, created_by: Option<Uuid>) -> Result<AlertResponse, ServiceError> {
        let criteria = validate(&request)?;
        let at = now();
        let alert = Alert {
            id: Uuid::new_v4(),
            category: request.category,
            hazard: clean_hazard(request.hazard),
            criteria,
            message: request.message.trim().to_string(),
            severity: request.severity,
            active: request.active,
            created_by,
            created_at: at,
            updated_at: at,
        };

        let stored = alert.clone();
        blocking(&self.db, move |db| db.insert_alert(&stored)).await?;
        info!(
            "{} alert {} created ({} regions, active: {})",
            alert.category.as_str(),
            alert.id,
            alert.criteria.regions.len(),
            alert.active
        );

        let fan_out = if alert.active {
            Some(self.fanout.run(&alert).await?)
        } else {
            None
        };
        Ok(AlertResponse { alert, fan_out })
    }

    /// Replace an alert's contents. Fan-out runs only if this turns it on.
    pub async fn update(&self, id: Uuid, request: AlertRequest) -> Result<AlertResponse, ServiceError> {
        let criteria = validate(&request)?;
        let existing = self.get(id).await?;

        let alert = Alert {
            category: request.category,
            hazard: clean_hazard(request.hazard),
            criteria,
            message: request.message.trim().to_string(),
            severity: request.severity,
            active: request.active,
            updated_at: now(),
            ..existing
        };

        let change = blocking(&self.db, move |db| db.update_alert(&alert))
            .await?
            .ok_or(ServiceError::NotFound("alert"))?;
        info!("Alert {} updated", id);
        self.finish_change(change).await
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<AlertResponse, ServiceError> {
        let change = blocking(&self.db, move |db| db.set_alert_active(id, active, now()))
            .await?
            .ok_or(ServiceError::NotFound("alert"))?;
        info!("Alert {} set active={}", id, active);
        self.finish_change(change).await
    }

    async fn finish_change(&self, change: AlertStatusChange) -> Result<AlertResponse, ServiceError> {
        let fan_out = if !change.was_active && change.alert.active {
            Some(self.fanout.run(&change.alert).await?)
        } else {
            None
        };
        Ok(AlertResponse {
            alert: change.alert,
            fan_out,
        })
    }

    /// Remove an alert with its UserAlerts and the notifications about it.
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !blocking(&self.db, move |db| db.delete_alert(id)).await? {
            return Err(ServiceError::NotFound("alert"));
        }
        info!("Alert {} deleted", id);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Alert>, ServiceError> {
        blocking(&self.db, |db| db.list_alerts()).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Alert, ServiceError> {
        blocking(&self.db, move |db| db.get_alert(id))
            .await?
            .ok_or(ServiceError::NotFound("alert"))
    }

    pub async fn recipients(&self, id: Uuid) -> Result<Vec<AlertRecipient>, ServiceError> {
        self.get(id).await?;
        blocking(&self.db, move |db| db.alert_recipients(id)).await
    }

    /// Active alerts covering the owner's location. Owners without a city on
    /// file see none.
    pub async fn active_for_owner(&self, owner_id: Uuid) -> Result<Vec<Alert>, ServiceError> {
        blocking(&self.db, move |db| {
            let Some(profile) = db.get_profile(owner_id)? else {
                return Ok(vec![]);
            };
            let Some(city) = profile.city.filter(|c| !c.trim().is_empty()) else {
                return Ok(vec![]);
            };
            db.active_alerts_for_location(&city, profile.village.as_deref())
        })
        .await
    }

    pub async fn user_alerts_for(
        &self,
        owner_id: Uuid,
        category: Option<AlertCategory>,
    ) -> Result<Vec<UserAlert>, ServiceError> {
        blocking(&self.db, move |db| db.user_alerts_for(owner_id, category)).await
    }

    pub async fn mark_user_alert_read(&self, id: Uuid, owner_id: Uuid) -> Result<UserAlert, ServiceError> {
        blocking(&self.db, move |db| db.mark_user_alert_read(id, owner_id))
            .await?
            .ok_or(ServiceError::NotFound("user alert"))
    }
}

fn clean_hazard(hazard: Option<String>) -> Option<String> {
    hazard
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

/// Check a request and return its normalized targeting criteria.
fn validate(request: &AlertRequest) -> Result<AlertCriteria, ServiceError> {
    let regions: Vec<Region> = request
        .criteria
        .regions
        .iter()
        .map(|r| Region {
            city: r.city.trim().to_string(),
            village: r.village_name().map(str::to_string),
        })
        .collect();
    if regions.is_empty() {
        return Err(ServiceError::Validation("at least one region is required".into()));
    }
    if regions.iter().any(|r| r.city.is_empty()) {
        return Err(ServiceError::Validation("every region needs a city".into()));
    }

    let mut species: Vec<String> = Vec::new();
    for s in &request.criteria.species {
        let s = s.trim().to_lowercase();
        if !s.is_empty() && !species.contains(&s) {
            species.push(s);
        }
    }
    if species.is_empty() {
        return Err(ServiceError::Validation("at least one species is required".into()));
    }

    if request.category == AlertCategory::Disease {
        if clean_hazard(request.hazard.clone()).is_none() {
            return Err(ServiceError::Validation("disease alerts need a disease name".into()));
        }
        if species.len() != 1 {
            return Err(ServiceError::Validation(
                "disease alerts target exactly one species".into(),
            ));
        }
    }

    Ok(AlertCriteria {
        regions,
        species,
        temperature: request.criteria.temperature,
    })
}
