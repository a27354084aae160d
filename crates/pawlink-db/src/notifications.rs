use anyhow::Result;
use rusqlite::{Row, params};
use uuid::Uuid;

use pawlink_types::models::{Notification, NotificationCategory};

use crate::{Database, OptionalExt, opt_text_col, text_col, ts};

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, message, link, category, severity, pet_id, alert_id, read, created_at";

impl Database {
    pub fn insert_notification(&self, n: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                    (id, recipient_id, message, link, category, severity, pet_id, alert_id, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    n.id.to_string(),
                    n.recipient_id.to_string(),
                    n.message,
                    n.link,
                    n.category.as_str(),
                    n.severity.map(|s| s.as_str()),
                    n.pet_id.map(|id| id.to_string()),
                    n.alert_id.map(|id| id.to_string()),
                    n.read,
                    ts(n.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first.
    pub fn notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM notifications WHERE recipient_id = ?1 ORDER BY seq DESC",
                NOTIFICATION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([recipient_id.to_string()], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns `None` when the notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id.to_string(), recipient_id.to_string()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
                [id.to_string()],
                map_notification,
            )
            .optional()
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
                [recipient_id.to_string()],
            )?;
            Ok(updated)
        })
    }

    pub fn unread_notification_count(
        &self,
        recipient_id: Uuid,
        category: Option<NotificationCategory>,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE recipient_id = ?1 AND read = 0 AND (?2 IS NULL OR category = ?2)",
                params![recipient_id.to_string(), category.map(|c| c.as_str())],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: text_col(row, 0)?,
        recipient_id: text_col(row, 1)?,
        message: row.get(2)?,
        link: row.get(3)?,
        category: text_col(row, 4)?,
        severity: opt_text_col(row, 5)?,
        pet_id: opt_text_col(row, 6)?,
        alert_id: opt_text_col(row, 7)?,
        read: row.get(8)?,
        created_at: text_col(row, 9)?,
    })
}
