use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use tracing::debug;

use pawlink_gateway::connection::authenticate;
use pawlink_types::api::Claims;
use pawlink_types::models::ActorKind;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the bearer JWT, then expose its claims to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());
    let claims = authenticate(token, &state.jwt_secret).map_err(|e| {
        debug!("Rejected request to {}: {}", req.uri().path(), e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run inside `require_auth`.
pub async fn require_admin(
    Extension(claims): Extension<Claims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if claims.kind != ActorKind::Admin {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
