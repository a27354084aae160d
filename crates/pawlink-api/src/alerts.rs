use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pawlink_types::api::{AlertCategoryQuery, AlertRequest, AlertStatusRequest, Claims};

use crate::error::ApiError;
use crate::state::AppState;

// -- Owner views --

pub async fn active_alerts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let alerts = state.alerts.active_for_owner(claims.sub).await?;
    Ok(Json(alerts))
}

pub async fn my_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertCategoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let alerts = state.alerts.user_alerts_for(claims.sub, query.category).await?;
    Ok(Json(alerts))
}

pub async fn mark_my_alert_read(
    State(state): State<AppState>,
    Path(user_alert_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_alert = state.alerts.mark_user_alert_read(user_alert_id, claims.sub).await?;
    Ok(Json(user_alert))
}

// -- Admin --

pub async fn list_alerts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.alerts.list().await?))
}

pub async fn create_alert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.alerts.create(req, Some(claims.sub)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.alerts.get(alert_id).await?))
}

pub async fn update_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(req): Json<AlertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.alerts.update(alert_id, req).await?))
}

pub async fn set_alert_status(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
    Json(req): Json<AlertStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.alerts.set_active(alert_id, req.active).await?))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.alerts.delete(alert_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn alert_recipients(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.alerts.recipients(alert_id).await?))
}
