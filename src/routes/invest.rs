use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::core::{invest::OpenInvestment, CoreService};
use crate::error::CoreError;

use super::{auth::AuthService, utils::validate_auth_token};

type InvestState = (Arc<AuthService>, CoreService);

async fn open_investment(
    headers: HeaderMap,
    State((service, core)): State<InvestState>,
    Json(payload): Json<OpenInvestment>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let investment = core.open_investment(user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Investment added successfully",
            "investment": investment,
        })),
    ))
}

async fn list_investments(
    headers: HeaderMap,
    State((service, core)): State<InvestState>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let investments = core.list_investments(user_id).await?;
    Ok((StatusCode::OK, Json(json!({ "investments": investments }))))
}

pub fn invest_routes(service: Arc<AuthService>, core: CoreService) -> Router {
    Router::new()
        .route("/invest", post(open_investment))
        .route("/investments", get(list_investments))
        .with_state((service, core))
}
