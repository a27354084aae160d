pub mod alerts;
pub mod chat;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod notifications;
pub mod registry;

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use pawlink_db::Database;

use crate::error::ServiceError;

/// Run a synchronous database call on the blocking pool.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ServiceError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| ServiceError::Storage(anyhow::anyhow!("Blocking task failed: {}", e)))?
        .map_err(ServiceError::Storage)
}

/// Current time at storage precision, so values handed back to callers
/// compare equal to what a later read returns.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use pawlink_db::Database;
    use pawlink_types::events::ServerEvent;
    use pawlink_types::models::{ActorKind, ActorProfile, Pet};

    pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn seed_actor(db: &Database, kind: ActorKind, name: &str, city: &str, village: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        db.upsert_actor(&ActorProfile {
            id,
            kind,
            display_name: name.into(),
            avatar: None,
            city: Some(city.into()),
            village: village.map(Into::into),
        })
        .unwrap();
        id
    }

    pub fn seed_pet(db: &Database, owner_id: Uuid, name: &str, species: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.insert_pet(&Pet {
            id,
            owner_id,
            name: name.into(),
            species: species.into(),
        })
        .unwrap();
        id
    }
}
