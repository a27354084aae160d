pub mod alerts;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod state;

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use serde_json::json;

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;

/// Every REST route. The WebSocket endpoint is mounted by the server.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/alerts", get(alerts::list_alerts).post(alerts::create_alert))
        .route(
            "/admin/alerts/{alert_id}",
            get(alerts::get_alert)
                .put(alerts::update_alert)
                .delete(alerts::delete_alert),
        )
        .route("/admin/alerts/{alert_id}/status", put(alerts::set_alert_status))
        .route("/admin/alerts/{alert_id}/recipients", get(alerts::alert_recipients))
        .route("/admin/notifications", post(notifications::send_notification))
        .layer(from_fn(require_admin));

    let protected_routes = Router::new()
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::start_conversation),
        )
        .route("/conversations/unread-count", get(conversations::unread_count))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/{notification_id}/read", patch(notifications::mark_read))
        .route("/alerts/active", get(alerts::active_alerts))
        .route("/alerts/mine", get(alerts::my_alerts))
        .route("/alerts/mine/{user_alert_id}/read", patch(alerts::mark_my_alert_read))
        .merge(admin_routes)
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use pawlink_db::Database;
    use pawlink_gateway::registry::Registry;
    use pawlink_types::api::Claims;
    use pawlink_types::models::{ActorKind, ActorProfile, Pet};

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    fn token(sub: Uuid, kind: ActorKind) -> String {
        let claims = Claims {
            sub,
            kind,
            name: "tester".into(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn app() -> (Arc<Database>, Router) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state = AppStateInner::new(db.clone(), Registry::new(), SECRET.to_string());
        (db, router(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_auth_guard() {
        let (_, app) = app();
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(&app, "GET", "/notifications", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/notifications", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let owner = token(Uuid::new_v4(), ActorKind::Owner);
        let (status, _) = call(&app, "GET", "/admin/alerts", Some(&owner), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_alert_reaches_owner_notifications() {
        let (db, app) = app();
        let owner_id = Uuid::new_v4();
        db.upsert_actor(&ActorProfile {
            id: owner_id,
            kind: ActorKind::Owner,
            display_name: "Lina".into(),
            avatar: None,
            city: Some("Gaza".into()),
            village: None,
        })
        .unwrap();
        db.insert_pet(&Pet {
            id: Uuid::new_v4(),
            owner_id,
            name: "Rex".into(),
            species: "dog".into(),
        })
        .unwrap();

        let admin = token(Uuid::new_v4(), ActorKind::Admin);
        let owner = token(owner_id, ActorKind::Owner);

        let (status, created) = call(
            &app,
            "POST",
            "/admin/alerts",
            Some(&admin),
            Some(json!({
                "category": "disease",
                "hazard": "Parvovirus",
                "regions": [{ "city": "Gaza" }],
                "species": ["dog"],
                "severity": "high"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["fanOut"]["notified"].as_array().unwrap().len(), 1);
        let alert_id = created["id"].as_str().unwrap().to_string();

        let (status, count) = call(
            &app,
            "GET",
            "/notifications/unread-count?category=disease-alert",
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count["count"], 1);

        let (_, mine) = call(&app, "GET", "/alerts/mine?category=disease", Some(&owner), None).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (_, active) = call(&app, "GET", "/alerts/active", Some(&owner), None).await;
        assert_eq!(active[0]["id"], alert_id.as_str());

        let (_, recipients) = call(
            &app,
            "GET",
            &format!("/admin/alerts/{}/recipients", alert_id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(recipients[0]["petName"], "Rex");

        let (status, updated) = call(&app, "PATCH", "/notifications/read-all", Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["updated"], 1);

        let (status, _) = call(&app, "DELETE", &format!("/admin/alerts/{}", alert_id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, listed) = call(&app, "GET", "/notifications", Some(&owner), None).await;
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_alert_is_bad_request() {
        let (_, app) = app();
        let admin = token(Uuid::new_v4(), ActorKind::Admin);
        let (status, body) = call(
            &app,
            "POST",
            "/admin/alerts",
            Some(&admin),
            Some(json!({
                "category": "disease",
                "hazard": "Rabies",
                "regions": [],
                "species": ["dog"],
                "severity": "low"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("region"));
    }

    #[tokio::test]
    async fn test_conversation_routes() {
        let (_, app) = app();
        let owner_id = Uuid::new_v4();
        let clinic_id = Uuid::new_v4();
        let owner = token(owner_id, ActorKind::Owner);
        let stranger = token(Uuid::new_v4(), ActorKind::Shop);

        let body = json!({ "recipientId": clinic_id, "recipientKind": "clinic" });
        let (status, first) = call(&app, "POST", "/conversations", Some(&owner), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, second) = call(&app, "POST", "/conversations", Some(&owner), Some(body)).await;
        assert_eq!(first["id"], second["id"]);

        let id = first["id"].as_str().unwrap();
        let (status, detail) = call(&app, "GET", &format!("/conversations/{}", id), Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(detail["messages"].as_array().unwrap().is_empty());

        let (status, _) = call(&app, "GET", &format!("/conversations/{}", id), Some(&stranger), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            "GET",
            &format!("/conversations/{}", Uuid::new_v4()),
            Some(&owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, count) = call(&app, "GET", "/conversations/unread-count", Some(&owner), None).await;
        assert_eq!(count["count"], 0);

        let (_, listed) = call(&app, "GET", "/conversations", Some(&owner), None).await;
        assert_eq!(listed[0]["participant"]["displayName"], "Unknown clinic");
    }

    #[tokio::test]
    async fn test_admin_can_send_generic_notification() {
        let (_, app) = app();
        let admin = token(Uuid::new_v4(), ActorKind::Admin);
        let recipient = Uuid::new_v4();

        let (status, created) = call(
            &app,
            "POST",
            "/admin/notifications",
            Some(&admin),
            Some(json!({
                "recipientId": recipient,
                "message": "Your order has shipped",
                "category": "order"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["read"], false);

        let id = created["id"].as_str().unwrap();
        let (status, _) = call(&app, "PATCH", &format!("/notifications/{}/read", id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let recipient_token = token(recipient, ActorKind::Shop);
        let (status, marked) = call(
            &app,
            "PATCH",
            &format!("/notifications/{}/read", id),
            Some(&recipient_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marked["read"], true);
    }
}
