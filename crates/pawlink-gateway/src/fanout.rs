use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use pawlink_db::Database;
use pawlink_types::api::{FanOutReport, NotifiedOwner};
use pawlink_types::models::{Alert, AlertCategory, Pet, Region, ThresholdDirection, UserAlert};

use crate::error::ServiceError;
use crate::notifications::{NotificationDraft, NotificationService};
use crate::{blocking, now};

/// Turns an active alert into per-owner UserAlerts and notifications.
#[derive(Clone)]
pub struct AlertFanOut {
    db: Arc<Database>,
    notifications: NotificationService,
}

impl AlertFanOut {
    pub fn new(db: Arc<Database>, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    /// Walk the alert's regions in order. Each owner is notified at most once
    /// per pass, about the first matching pet. A failing region stops the pass;
    /// records written before it are kept.
    pub async fn run(&self, alert: &Alert) -> Result<FanOutReport, ServiceError> {
        let mut report = FanOutReport::default();
        if !alert.active {
            debug!("Alert {} inactive, skipping fan-out", alert.id);
            return Ok(report);
        }

        let mut seen_owners = HashSet::new();
        for region in &alert.criteria.regions {
            if let Err(e) = self.run_region(alert, region, &mut seen_owners, &mut report).await {
                error!("Fan-out of alert {} failed in {}: {}", alert.id, region, e);
                return Err(e);
            }
            report.regions_processed += 1;
        }

        info!(
            "Alert {} fanned out over {} regions, {} owners notified",
            alert.id,
            report.regions_processed,
            report.notified.len()
        );
        Ok(report)
    }

    async fn run_region(
        &self,
        alert: &Alert,
        region: &Region,
        seen_owners: &mut HashSet<Uuid>,
        report: &mut FanOutReport,
    ) -> Result<(), ServiceError> {
        let lookup = region.clone();
        let species = alert.criteria.species.clone();
        let pets = blocking(&self.db, move |db| db.pets_in_region(&lookup, &species)).await?;

        for pet in pets {
            if !seen_owners.insert(pet.owner_id) {
                continue;
            }

            let user_alert = UserAlert {
                id: Uuid::new_v4(),
                owner_id: pet.owner_id,
                pet_id: pet.id,
                alert_id: alert.id,
                category: alert.category,
                read: false,
                created_at: now(),
            };
            let stored = user_alert.clone();
            blocking(&self.db, move |db| db.insert_user_alert(&stored)).await?;

            let draft = NotificationDraft::new(
                pet.owner_id,
                alert.category.notification_category(),
                alert_message(alert, region, &pet),
            )
            .link(format!("/alerts/{}", alert.id))
            .severity(alert.severity)
            .pet(pet.id)
            .alert(alert.id);
            let notification = self.notifications.create(draft).await?;

            report.notified.push(NotifiedOwner {
                owner_id: pet.owner_id,
                pet_id: pet.id,
                user_alert_id: user_alert.id,
                notification_id: notification.id,
            });
        }
        Ok(())
    }
}

/// Text shown to an owner for `alert` in `region` about `pet`.
pub fn alert_message(alert: &Alert, region: &Region, pet: &Pet) -> String {
    match alert.category {
        AlertCategory::Disease => format!(
            "Disease alert in {}: {} may affect {} in your area.",
            region,
            alert.hazard.as_deref().unwrap_or("a disease"),
            pet.species
        ),
        AlertCategory::Weather => {
            let body = if !alert.message.trim().is_empty() {
                alert.message.trim().to_string()
            } else if let Some(threshold) = alert.criteria.temperature {
                let direction = match threshold.direction {
                    ThresholdDirection::High => "High",
                    ThresholdDirection::Low => "Low",
                };
                format!("{} temperature warning ({}°C)", direction, threshold.celsius)
            } else {
                "severe weather expected".to_string()
            };
            format!("Weather alert in {}: {}", region.city, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::testing::{seed_actor, seed_pet};
    use pawlink_types::models::{
        ActorKind, AlertCriteria, NotificationCategory, Severity, TemperatureThreshold,
    };

    fn setup() -> (Arc<Database>, AlertFanOut) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifications = NotificationService::new(db.clone(), Registry::new());
        let fanout = AlertFanOut::new(db.clone(), notifications);
        (db, fanout)
    }

    fn disease_alert(regions: Vec<Region>, species: &str) -> Alert {
        let at = now();
        Alert {
            id: Uuid::new_v4(),
            category: AlertCategory::Disease,
            hazard: Some("Parvovirus".into()),
            criteria: AlertCriteria {
                regions,
                species: vec![species.into()],
                temperature: None,
            },
            message: String::new(),
            severity: Severity::High,
            active: true,
            created_by: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_gaza_dog_alert_reaches_only_matching_owner() {
        let (db, fanout) = setup();
        let o1 = seed_actor(&db, ActorKind::Owner, "O1", "Gaza", None);
        let o2 = seed_actor(&db, ActorKind::Owner, "O2", "Gaza", None);
        let o3 = seed_actor(&db, ActorKind::Owner, "O3", "Jenin", None);
        let rex = seed_pet(&db, o1, "Rex", "dog");
        seed_pet(&db, o2, "Tom", "cat");
        seed_pet(&db, o3, "Max", "dog");

        let alert = disease_alert(vec![Region::city("Gaza")], "dog");
        db.insert_alert(&alert).unwrap();

        let report = fanout.run(&alert).await.unwrap();
        assert_eq!(report.regions_processed, 1);
        assert_eq!(report.notified.len(), 1);
        assert_eq!(report.notified[0].owner_id, o1);
        assert_eq!(report.notified[0].pet_id, rex);

        let user_alerts = db.user_alerts_for(o1, None).unwrap();
        assert_eq!(user_alerts.len(), 1);
        assert!(db.user_alerts_for(o2, None).unwrap().is_empty());
        assert!(db.user_alerts_for(o3, None).unwrap().is_empty());

        let notifications = db.notifications_for(o1).unwrap();
        assert_eq!(notifications.len(), 1);
        let n = &notifications[0];
        assert_eq!(n.category, NotificationCategory::DiseaseAlert);
        assert_eq!(n.message, "Disease alert in Gaza: Parvovirus may affect dog in your area.");
        assert_eq!(n.link.as_deref(), Some(format!("/alerts/{}", alert.id).as_str()));
        assert_eq!(n.severity, Some(Severity::High));
        assert_eq!(n.pet_id, Some(rex));
        assert!(!n.read);
    }

    #[tokio::test]
    async fn test_village_region_includes_owners_without_village() {
        let (db, fanout) = setup();
        let balata = seed_actor(&db, ActorKind::Owner, "A", "Nablus", Some("Balata"));
        let unset = seed_actor(&db, ActorKind::Owner, "B", "Nablus", None);
        let askar = seed_actor(&db, ActorKind::Owner, "C", "Nablus", Some("Askar"));
        for owner in [balata, unset, askar] {
            seed_pet(&db, owner, "Luna", "cat");
        }

        let alert = disease_alert(vec![Region::village("Nablus", "Balata")], "cat");
        db.insert_alert(&alert).unwrap();

        let report = fanout.run(&alert).await.unwrap();
        let notified: Vec<Uuid> = report.notified.iter().map(|n| n.owner_id).collect();
        assert_eq!(notified, vec![balata, unset]);

        let message = &db.notifications_for(balata).unwrap()[0].message;
        assert!(message.starts_with("Disease alert in Nablus - Balata:"));
    }

    #[tokio::test]
    async fn test_owner_matched_by_two_regions_notified_once() {
        let (db, fanout) = setup();
        let owner = seed_actor(&db, ActorKind::Owner, "A", "Gaza", Some("Rimal"));
        let first_pet = seed_pet(&db, owner, "Rex", "dog");
        seed_pet(&db, owner, "Bolt", "dog");

        let alert = disease_alert(vec![Region::city("Gaza"), Region::village("Gaza", "Rimal")], "dog");
        db.insert_alert(&alert).unwrap();

        let report = fanout.run(&alert).await.unwrap();
        assert_eq!(report.regions_processed, 2);
        assert_eq!(report.notified.len(), 1);
        assert_eq!(report.notified[0].pet_id, first_pet);
        assert_eq!(db.notifications_for(owner).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_region_keeps_earlier_records() {
        let (db, fanout) = setup();
        let gaza = seed_actor(&db, ActorKind::Owner, "A", "Gaza", None);
        let jenin = seed_actor(&db, ActorKind::Owner, "B", "Jenin", None);
        seed_pet(&db, gaza, "Rex", "dog");
        seed_pet(&db, jenin, "Max", "dog");

        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER block_jenin BEFORE INSERT ON user_alerts
                 WHEN NEW.owner_id = '{}'
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
                jenin
            ))?;
            Ok(())
        })
        .unwrap();

        let alert = disease_alert(vec![Region::city("Gaza"), Region::city("Jenin")], "dog");
        db.insert_alert(&alert).unwrap();

        assert!(fanout.run(&alert).await.is_err());

        assert_eq!(db.user_alerts_for(gaza, None).unwrap().len(), 1);
        assert_eq!(db.notifications_for(gaza).unwrap().len(), 1);
        assert!(db.user_alerts_for(jenin, None).unwrap().is_empty());
        assert!(db.notifications_for(jenin).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_alert_is_noop() {
        let (db, fanout) = setup();
        let owner = seed_actor(&db, ActorKind::Owner, "A", "Gaza", None);
        seed_pet(&db, owner, "Rex", "dog");

        let mut alert = disease_alert(vec![Region::city("Gaza")], "dog");
        alert.active = false;
        db.insert_alert(&alert).unwrap();

        let report = fanout.run(&alert).await.unwrap();
        assert_eq!(report.regions_processed, 0);
        assert!(report.notified.is_empty());
        assert!(db.user_alerts_for(owner, None).unwrap().is_empty());
    }

    #[test]
    fn test_weather_message_defaults_to_threshold() {
        let mut alert = disease_alert(vec![Region::city("Hebron")], "dog");
        alert.category = AlertCategory::Weather;
        alert.hazard = None;
        alert.criteria.temperature = Some(TemperatureThreshold {
            direction: ThresholdDirection::High,
            celsius: 38.0,
        });
        let pet = Pet {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Rex".into(),
            species: "dog".into(),
        };

        assert_eq!(
            alert_message(&alert, &Region::city("Hebron"), &pet),
            "Weather alert in Hebron: High temperature warning (38°C)"
        );

        alert.message = "Keep pets indoors".into();
        assert_eq!(
            alert_message(&alert, &Region::village("Hebron", "Dura"), &pet),
            "Weather alert in Hebron: Keep pets indoors"
        );
    }
}
