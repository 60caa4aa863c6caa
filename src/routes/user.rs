use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::core::CoreService;
use crate::error::CoreError;

use super::{auth::AuthService, utils::validate_auth_token};

type UserState = (Arc<AuthService>, CoreService);

async fn get_me(
    headers: HeaderMap,
    State((service, core)): State<UserState>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let user = core
        .store()
        .find_user_by_id(user_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    tracing::info!("User found: {}", user_id);
    Ok((StatusCode::OK, Json(json!(user))))
}

async fn list_users(
    headers: HeaderMap,
    State((service, core)): State<UserState>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let caller = core
        .store()
        .find_user_by_id(user_id)
        .await?
        .ok_or(CoreError::AuthFailure)?;
    if !caller.is_admin {
        tracing::warn!("Unauthorized user listing attempt by user: {}", user_id);
        return Err(CoreError::AuthFailure);
    }
    let users = core.store().list_users().await?;
    Ok((StatusCode::OK, Json(json!(users))))
}

pub fn user_routes(service: Arc<AuthService>, core: CoreService) -> Router {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users", get(list_users))
        .with_state((service, core))
}
