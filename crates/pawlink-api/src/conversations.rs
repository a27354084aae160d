use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pawlink_types::api::{Claims, StartConversationRequest, UnreadCountResponse};
use pawlink_types::models::Actor;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.chat.list_conversations_for(claims.sub).await?;
    Ok(Json(conversations))
}

/// Returns the existing conversation with the recipient if there is one.
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = Actor::new(req.recipient_id, req.recipient_kind);
    let conversation = state.chat.find_or_create(claims.actor(), recipient).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.chat.unread_count_for(claims.sub).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Full history; fetching it marks the caller's unread messages as read.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.chat.open_conversation(conversation_id, claims.sub).await?;
    Ok(Json(detail))
}
