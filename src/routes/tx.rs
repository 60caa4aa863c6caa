use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde_json::json;

use crate::core::CoreService;
use crate::db::models::{TransactionFilter, TransactionStatus};
use crate::error::CoreError;

use super::{auth::AuthService, utils};

type TxState = (Arc<AuthService>, CoreService);

async fn history(
    headers: HeaderMap,
    state: TxState,
    filter: TransactionFilter,
    key: &'static str,
) -> Result<impl IntoResponse, CoreError> {
    let (service, core) = state;
    let user_id = utils::validate_auth_token(headers, &service)?;
    let records = core.store().query_transactions(user_id, &filter).await?;
    Ok((StatusCode::OK, Json(json!({ key: records }))))
}

// type-filtered history; the match is a case-insensitive substring

async fn deposit_history(
    headers: HeaderMap,
    State(state): State<TxState>,
) -> Result<impl IntoResponse, CoreError> {
    let filter = TransactionFilter {
        tx_type: Some("deposit".to_string()),
        status: None,
    };
    history(headers, state, filter, "deposits").await
}

async fn withdrawal_history(
    headers: HeaderMap,
    State(state): State<TxState>,
) -> Result<impl IntoResponse, CoreError> {
    let filter = TransactionFilter {
        tx_type: Some("withdraw".to_string()),
        status: None,
    };
    history(headers, state, filter, "withdrawals").await
}

async fn investment_history(
    headers: HeaderMap,
    State(state): State<TxState>,
) -> Result<impl IntoResponse, CoreError> {
    let filter = TransactionFilter {
        tx_type: Some("investment".to_string()),
        status: None,
    };
    history(headers, state, filter, "investments").await
}

// status-filtered history, e.g. /tx/trades/completed

async fn trades_by_status(
    headers: HeaderMap,
    State(state): State<TxState>,
    Path(status): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let status = match status.to_lowercase().as_str() {
        "completed" => TransactionStatus::Completed,
        "pending" => TransactionStatus::Pending,
        "failed" => TransactionStatus::Failed,
        _ => return Err(CoreError::NotFound),
    };
    let filter = TransactionFilter {
        tx_type: None,
        status: Some(status),
    };
    history(headers, state, filter, "trades").await
}

// stream the caller's full history as server-sent events
async fn stream_transactions(
    headers: HeaderMap,
    State((service, core)): State<TxState>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = utils::validate_auth_token(headers, &service)?;

    let records = core
        .store()
        .query_transactions(user_id, &TransactionFilter::default())
        .await?;

    let stream = futures::stream::iter(records).map(|tx| Event::default().json_data(tx));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

pub fn tx_routes(service: Arc<AuthService>, core: CoreService) -> Router {
    Router::new()
        .route("/tx/deposits", get(deposit_history))
        .route("/tx/withdrawals", get(withdrawal_history))
        .route("/tx/investments", get(investment_history))
        .route("/tx/trades/:status", get(trades_by_status))
        .route("/tx/stream", get(stream_transactions))
        .with_state((service, core))
}
