use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use pawlink_types::api::AlertRecipient;
use pawlink_types::models::{
    Alert, AlertCategory, AlertCriteria, Region, TemperatureThreshold, ThresholdDirection, UserAlert,
};

use crate::models::AlertStatusChange;
use crate::{Database, OptionalExt, opt_text_col, text_col, ts};

const USER_ALERT_COLUMNS: &str = "id, owner_id, pet_id, alert_id, category, read, created_at";

impl Database {
    // -- Alerts --

    pub fn insert_alert(&self, alert: &Alert) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO alerts
                    (id, category, hazard, message, severity, active,
                     threshold_direction, threshold_celsius, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    alert.id.to_string(),
                    alert.category.as_str(),
                    alert.hazard,
                    alert.message,
                    alert.severity.as_str(),
                    alert.active,
                    alert.criteria.temperature.map(|t| t.direction.as_str()),
                    alert.criteria.temperature.map(|t| t.celsius),
                    alert.created_by.map(|id| id.to_string()),
                    ts(alert.created_at),
                    ts(alert.updated_at),
                ],
            )?;
            write_criteria(&tx, alert.id, &alert.criteria)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Replaces every mutable field of an existing alert. Returns `None` if it
    /// does not exist; otherwise the stored alert and its previous active flag.
    pub fn update_alert(&self, alert: &Alert) -> Result<Option<AlertStatusChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let aid = alert.id.to_string();

            let was_active: Option<bool> = tx
                .query_row("SELECT active FROM alerts WHERE id = ?1", [&aid], |row| row.get(0))
                .optional()?;
            let Some(was_active) = was_active else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE alerts SET
                    category = ?2, hazard = ?3, message = ?4, severity = ?5, active = ?6,
                    threshold_direction = ?7, threshold_celsius = ?8, updated_at = ?9
                 WHERE id = ?1",
                params![
                    aid,
                    alert.category.as_str(),
                    alert.hazard,
                    alert.message,
                    alert.severity.as_str(),
                    alert.active,
                    alert.criteria.temperature.map(|t| t.direction.as_str()),
                    alert.criteria.temperature.map(|t| t.celsius),
                    ts(alert.updated_at),
                ],
            )?;
            tx.execute("DELETE FROM alert_regions WHERE alert_id = ?1", [&aid])?;
            tx.execute("DELETE FROM alert_species WHERE alert_id = ?1", [&aid])?;
            write_criteria(&tx, alert.id, &alert.criteria)?;

            let alert = query_alert(&tx, &aid)?.ok_or_else(|| anyhow!("Alert vanished: {}", aid))?;
            tx.commit()?;
            Ok(Some(AlertStatusChange { was_active, alert }))
        })
    }

    pub fn set_alert_active(
        &self,
        id: Uuid,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertStatusChange>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let aid = id.to_string();

            let was_active: Option<bool> = tx
                .query_row("SELECT active FROM alerts WHERE id = ?1", [&aid], |row| row.get(0))
                .optional()?;
            let Some(was_active) = was_active else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE alerts SET active = ?2, updated_at = ?3 WHERE id = ?1",
                params![aid, active, ts(now)],
            )?;
            let alert = query_alert(&tx, &aid)?.ok_or_else(|| anyhow!("Alert vanished: {}", aid))?;
            tx.commit()?;
            Ok(Some(AlertStatusChange { was_active, alert }))
        })
    }

    pub fn get_alert(&self, id: Uuid) -> Result<Option<Alert>> {
        self.with_conn(|conn| query_alert(conn, &id.to_string()))
    }

    /// Active alerts first, then newest first.
    pub fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM alerts ORDER BY active DESC, created_at DESC")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collect_alerts(conn, ids)
        })
    }

    /// Active alerts with a region covering the given location. Village-specific
    /// regions cover owners without a village on file.
    pub fn active_alerts_for_location(&self, city: &str, village: Option<&str>) -> Result<Vec<Alert>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT a.id, a.created_at FROM alerts a
                 JOIN alert_regions r ON r.alert_id = a.id
                 WHERE a.active = 1 AND r.city = ?1
                   AND (r.village IS NULL OR r.village = '' OR ?2 IS NULL OR r.village = ?2)
                 ORDER BY a.created_at DESC",
            )?;
            let ids = stmt
                .query_map(params![city, village], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collect_alerts(conn, ids)
        })
    }

    /// Deletes the alert together with every UserAlert and Notification that
    /// points at it. Returns false when the alert does not exist.
    pub fn delete_alert(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let aid = id.to_string();
            tx.execute("DELETE FROM notifications WHERE alert_id = ?1", [&aid])?;
            tx.execute("DELETE FROM user_alerts WHERE alert_id = ?1", [&aid])?;
            let deleted = tx.execute("DELETE FROM alerts WHERE id = ?1", [&aid])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- User alerts --

    pub fn insert_user_alert(&self, ua: &UserAlert) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_alerts (id, owner_id, pet_id, alert_id, category, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ua.id.to_string(),
                    ua.owner_id.to_string(),
                    ua.pet_id.to_string(),
                    ua.alert_id.to_string(),
                    ua.category.as_str(),
                    ua.read,
                    ts(ua.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first, optionally narrowed to one alert category.
    pub fn user_alerts_for(&self, owner_id: Uuid, category: Option<AlertCategory>) -> Result<Vec<UserAlert>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM user_alerts
                 WHERE owner_id = ?1 AND (?2 IS NULL OR category = ?2)
                 ORDER BY seq DESC",
                USER_ALERT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![owner_id.to_string(), category.map(|c| c.as_str())],
                    map_user_alert,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_user_alert_read(&self, id: Uuid, owner_id: Uuid) -> Result<Option<UserAlert>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE user_alerts SET read = 1 WHERE id = ?1 AND owner_id = ?2",
                params![id.to_string(), owner_id.to_string()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {} FROM user_alerts WHERE id = ?1", USER_ALERT_COLUMNS),
                [id.to_string()],
                map_user_alert,
            )
            .optional()
        })
    }

    /// Who was told about an alert, joined with owner and pet details.
    pub fn alert_recipients(&self, alert_id: Uuid) -> Result<Vec<AlertRecipient>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ua.id, ua.owner_id, a.display_name, a.city, a.village,
                        ua.pet_id, p.name, p.species, ua.read, ua.created_at
                 FROM user_alerts ua
                 LEFT JOIN actors a ON a.id = ua.owner_id
                 LEFT JOIN pets p ON p.id = ua.pet_id
                 WHERE ua.alert_id = ?1
                 ORDER BY ua.seq",
            )?;
            let rows = stmt
                .query_map([alert_id.to_string()], |row| {
                    Ok(AlertRecipient {
                        user_alert_id: text_col(row, 0)?,
                        owner_id: text_col(row, 1)?,
                        owner_name: row
                            .get::<_, Option<String>>(2)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        city: row.get(3)?,
                        village: row.get(4)?,
                        pet_id: text_col(row, 5)?,
                        pet_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        species: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                        read: row.get(8)?,
                        notified_at: text_col(row, 9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn write_criteria(conn: &Connection, alert_id: Uuid, criteria: &AlertCriteria) -> Result<()> {
    let aid = alert_id.to_string();
    for (position, region) in criteria.regions.iter().enumerate() {
        conn.execute(
            "INSERT INTO alert_regions (alert_id, position, city, village) VALUES (?1, ?2, ?3, ?4)",
            params![aid, position as i64, region.city.trim(), region.village_name()],
        )?;
    }
    for species in &criteria.species {
        conn.execute(
            "INSERT OR IGNORE INTO alert_species (alert_id, species) VALUES (?1, ?2)",
            params![aid, species.trim().to_lowercase()],
        )?;
    }
    Ok(())
}

fn collect_alerts(conn: &Connection, ids: Vec<String>) -> Result<Vec<Alert>> {
    let mut alerts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(alert) = query_alert(conn, &id)? {
            alerts.push(alert);
        }
    }
    Ok(alerts)
}

fn query_alert(conn: &Connection, id: &str) -> Result<Option<Alert>> {
    let head = conn
        .query_row(
            "SELECT id, category, hazard, message, severity, active,
                    threshold_direction, threshold_celsius, created_by, created_at, updated_at
             FROM alerts WHERE id = ?1",
            [id],
            |row| {
                let direction: Option<ThresholdDirection> = opt_text_col(row, 6)?;
                let celsius: Option<f64> = row.get(7)?;
                Ok(Alert {
                    id: text_col(row, 0)?,
                    category: text_col(row, 1)?,
                    hazard: row.get(2)?,
                    message: row.get(3)?,
                    severity: text_col(row, 4)?,
                    active: row.get(5)?,
                    criteria: AlertCriteria {
                        regions: vec![],
                        species: vec![],
                        temperature: direction
                            .zip(celsius)
                            .map(|(direction, celsius)| TemperatureThreshold { direction, celsius }),
                    },
                    created_by: opt_text_col(row, 8)?,
                    created_at: text_col(row, 9)?,
                    updated_at: text_col(row, 10)?,
                })
            },
        )
        .optional()?;

    let Some(mut alert) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT city, village FROM alert_regions WHERE alert_id = ?1 ORDER BY position",
    )?;
    alert.criteria.regions = stmt
        .query_map([id], |row| {
            Ok(Region {
                city: row.get(0)?,
                village: opt_text_col(row, 1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare("SELECT species FROM alert_species WHERE alert_id = ?1 ORDER BY species")?;
    alert.criteria.species = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(alert))
}

fn map_user_alert(row: &Row<'_>) -> rusqlite::Result<UserAlert> {
    Ok(UserAlert {
        id: text_col(row, 0)?,
        owner_id: text_col(row, 1)?,
        pet_id: text_col(row, 2)?,
        alert_id: text_col(row, 3)?,
        category: text_col(row, 4)?,
        read: row.get(5)?,
        created_at: text_col(row, 6)?,
    })
}
