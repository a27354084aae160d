use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pawlink_gateway::notifications::NotificationDraft;
use pawlink_types::api::{
    CategoryQuery, Claims, MarkAllReadResponse, SendNotificationRequest, UnreadCountResponse,
};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = state.notifications.list_for(claims.sub).await?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.notifications.unread_count(claims.sub, query.category).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.notifications.mark_as_read(notification_id, claims.sub).await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.notifications.mark_all_read(claims.sub).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

/// Entry point for other subsystems (orders, stock, vet approvals).
pub async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut draft = NotificationDraft::new(req.recipient_id, req.category, req.message);
    draft.link = req.link;
    draft.severity = req.severity;
    draft.pet_id = req.pet_id;

    let notification = state.notifications.create(draft).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
