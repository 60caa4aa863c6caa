use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::CoreService;
use crate::db::models::{Currency, Wallet};
use crate::error::CoreError;

use super::{auth::AuthService, utils::validate_auth_token};

type WalletState = (Arc<AuthService>, CoreService);

/// Wire shape of a wallet, field names matching the stored documents.
#[derive(Debug, Serialize)]
struct WalletView<'a> {
    balances: &'a crate::db::models::Balances,
    addresses: &'a crate::db::models::Addresses,
    #[serde(rename = "totalBalance")]
    total_balance: Decimal,
}

impl<'a> From<&'a Wallet> for WalletView<'a> {
    fn from(wallet: &'a Wallet) -> Self {
        Self {
            balances: &wallet.balances,
            addresses: &wallet.addresses,
            total_balance: wallet.total_balance(),
        }
    }
}

async fn get_wallet(
    headers: HeaderMap,
    State((service, core)): State<WalletState>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let wallet = core.get_wallet(user_id).await?;
    Ok((StatusCode::OK, Json(json!(WalletView::from(&wallet)))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateAddress {
    #[serde(rename = "cryptoType")]
    pub crypto_type: String,
    #[serde(rename = "newAddress")]
    pub new_address: String,
}

async fn update_address(
    headers: HeaderMap,
    State((service, core)): State<WalletState>,
    Json(payload): Json<UpdateAddress>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let wallet = core
        .set_address(user_id, &payload.crypto_type, &payload.new_address)
        .await?;
    tracing::info!("address updated for user: {}", user_id);
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Address updated successfully",
            "wallet": WalletView::from(&wallet),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub currency: Currency,
    pub qty: Decimal,
    pub amount: Decimal,
}

async fn deposit(
    headers: HeaderMap,
    State((service, core)): State<WalletState>,
    Json(payload): Json<DepositRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let deposit = core
        .deposit(user_id, payload.currency, payload.qty, payload.amount)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Cryptocurrency deposit initiated successfully",
            "deposit": deposit,
        })),
    ))
}

async fn list_deposits(
    headers: HeaderMap,
    State((service, core)): State<WalletState>,
) -> Result<impl IntoResponse, CoreError> {
    validate_auth_token(headers, &service)?;
    let deposits = core.store().list_deposits().await?;
    Ok((StatusCode::OK, Json(json!({ "data": deposits }))))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub currency: Currency,
    pub amount: Decimal,
    pub address: String,
}

async fn withdraw(
    headers: HeaderMap,
    State((service, core)): State<WalletState>,
    Json(payload): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let user_id = validate_auth_token(headers, &service)?;
    let wallet = core
        .withdraw(user_id, payload.currency, payload.amount, &payload.address)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Withdrawal successful",
            "wallet": WalletView::from(&wallet),
        })),
    ))
}

pub fn wallet_routes(service: Arc<AuthService>, core: CoreService) -> Router {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/address", put(update_address))
        .route("/wallet/deposit", post(deposit))
        .route("/wallet/deposits/all", get(list_deposits))
        .route("/wallet/withdraw", post(withdraw))
        .with_state((service, core))
}
