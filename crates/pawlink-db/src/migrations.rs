use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Read-only mirror of the account store: display names and owner locations
        CREATE TABLE IF NOT EXISTS actors (
            id              TEXT PRIMARY KEY,
            kind            TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            avatar          TEXT,
            city            TEXT,
            village         TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_actors_location
            ON actors(kind, city, village);

        CREATE TABLE IF NOT EXISTS pets (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            owner_id    TEXT NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            species     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pets_owner
            ON pets(owner_id, species);

        -- participant_key is the sorted `kind:id` list; UNIQUE makes find-or-create safe
        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            participant_key     TEXT NOT NULL UNIQUE,
            created_at          TEXT NOT NULL,
            last_activity_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_activity
            ON conversations(last_activity_at);

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            actor_id        TEXT NOT NULL,
            actor_kind      TEXT NOT NULL,
            position        INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, actor_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_actor
            ON conversation_participants(actor_id);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL,
            sender_kind     TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            read            INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, seq);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(conversation_id, read, sender_id);

        CREATE TABLE IF NOT EXISTS notifications (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            recipient_id    TEXT NOT NULL,
            message         TEXT NOT NULL,
            link            TEXT,
            category        TEXT NOT NULL,
            severity        TEXT,
            pet_id          TEXT,
            alert_id        TEXT,
            read            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, read, category);

        CREATE INDEX IF NOT EXISTS idx_notifications_alert
            ON notifications(alert_id);

        CREATE TABLE IF NOT EXISTS alerts (
            id                  TEXT PRIMARY KEY,
            category            TEXT NOT NULL,
            hazard              TEXT,
            message             TEXT NOT NULL,
            severity            TEXT NOT NULL,
            active              INTEGER NOT NULL DEFAULT 1,
            threshold_direction TEXT,
            threshold_celsius   REAL,
            created_by          TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alert_regions (
            alert_id    TEXT NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            city        TEXT NOT NULL,
            village     TEXT,
            PRIMARY KEY (alert_id, position)
        );

        CREATE INDEX IF NOT EXISTS idx_alert_regions_city
            ON alert_regions(city, village);

        CREATE TABLE IF NOT EXISTS alert_species (
            alert_id    TEXT NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            species     TEXT NOT NULL,
            PRIMARY KEY (alert_id, species)
        );

        CREATE TABLE IF NOT EXISTS user_alerts (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            owner_id    TEXT NOT NULL,
            pet_id      TEXT NOT NULL,
            alert_id    TEXT NOT NULL REFERENCES alerts(id) ON DELETE CASCADE,
            category    TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_user_alerts_owner
            ON user_alerts(owner_id, category);

        CREATE INDEX IF NOT EXISTS idx_user_alerts_alert
            ON user_alerts(alert_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
