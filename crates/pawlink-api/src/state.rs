use std::sync::Arc;

use pawlink_db::Database;
use pawlink_gateway::alerts::AlertService;
use pawlink_gateway::chat::ChatService;
use pawlink_gateway::fanout::AlertFanOut;
use pawlink_gateway::notifications::NotificationService;
use pawlink_gateway::registry::Registry;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub registry: Registry,
    pub chat: ChatService,
    pub notifications: NotificationService,
    pub alerts: AlertService,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// Wire every service around one database and one connection registry.
    pub fn new(db: Arc<Database>, registry: Registry, jwt_secret: String) -> AppState {
        let chat = ChatService::new(db.clone(), registry.clone());
        let notifications = NotificationService::new(db.clone(), registry.clone());
        let fanout = AlertFanOut::new(db.clone(), notifications.clone());
        let alerts = AlertService::new(db, fanout);

        Arc::new(Self {
            registry,
            chat,
            notifications,
            alerts,
            jwt_secret,
        })
    }
}
