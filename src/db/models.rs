use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// The fixed set of supported currencies. Stored strings are exactly these
/// codes, matching existing wallet documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    BTC,
    ETH,
    BNB,
    USDT,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::BTC, Currency::ETH, Currency::BNB, Currency::USDT];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::BTC => "BTC",
            Currency::ETH => "ETH",
            Currency::BNB => "BNB",
            Currency::USDT => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(Currency::BTC),
            "ETH" => Ok(Currency::ETH),
            "BNB" => Ok(Currency::BNB),
            "USDT" => Ok(Currency::USDT),
            _ => Err(CoreError::InvalidCurrency),
        }
    }
}

/// Per-currency balances. The aggregate is always derived with [`Balances::total`],
/// never stored independently of the per-currency fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(rename = "BTC")]
    pub btc: Decimal,
    #[serde(rename = "ETH")]
    pub eth: Decimal,
    #[serde(rename = "BNB")]
    pub bnb: Decimal,
    #[serde(rename = "USDT")]
    pub usdt: Decimal,
}

impl Balances {
    pub fn get(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::BTC => self.btc,
            Currency::ETH => self.eth,
            Currency::BNB => self.bnb,
            Currency::USDT => self.usdt,
        }
    }

    pub fn get_mut(&mut self, currency: Currency) -> &mut Decimal {
        match currency {
            Currency::BTC => &mut self.btc,
            Currency::ETH => &mut self.eth,
            Currency::BNB => &mut self.bnb,
            Currency::USDT => &mut self.usdt,
        }
    }

    pub fn total(&self) -> Decimal {
        self.btc + self.eth + self.bnb + self.usdt
    }
}

pub const ADDRESS_PLACEHOLDER: &str = "Not Added Yet";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addresses {
    #[serde(rename = "BTC")]
    pub btc: String,
    #[serde(rename = "ETH")]
    pub eth: String,
    #[serde(rename = "BNB")]
    pub bnb: String,
    #[serde(rename = "USDT")]
    pub usdt: String,
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            btc: ADDRESS_PLACEHOLDER.to_string(),
            eth: ADDRESS_PLACEHOLDER.to_string(),
            bnb: ADDRESS_PLACEHOLDER.to_string(),
            usdt: ADDRESS_PLACEHOLDER.to_string(),
        }
    }
}

impl Addresses {
    pub fn get_mut(&mut self, currency: Currency) -> &mut String {
        match currency {
            Currency::BTC => &mut self.btc,
            Currency::ETH => &mut self.eth,
            Currency::BNB => &mut self.bnb,
            Currency::USDT => &mut self.usdt,
        }
    }
}

/// One wallet per user. `total_balance` on the wire and in storage is the
/// derived sum of the per-currency balances at save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balances: Balances,
    pub addresses: Addresses,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            balances: Balances::default(),
            addresses: Addresses::default(),
        }
    }

    pub fn total_balance(&self) -> Decimal {
        self.balances.total()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvestmentStatus {
    Active,
    Completed,
}

impl InvestmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentStatus::Active => "Active",
            InvestmentStatus::Completed => "Completed",
        }
    }
}

impl FromStr for InvestmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(InvestmentStatus::Active),
            "Completed" => Ok(InvestmentStatus::Completed),
            _ => Err(CoreError::Internal(format!("unknown investment status: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_name: String,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    /// Fixed term in whole days.
    #[serde(rename = "period")]
    pub period_days: i64,
    pub currency: Currency,
    pub earnings: Decimal,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Allowed transitions: Pending -> Completed and Pending -> Failed.
    /// Re-affirming a terminal status is a no-op (`Ok(None)`), anything else
    /// is rejected.
    pub fn transition(self, new: TransactionStatus) -> Result<Option<TransactionStatus>, CoreError> {
        if self == new && self.is_terminal() {
            return Ok(None);
        }
        match (self, new) {
            (TransactionStatus::Pending, TransactionStatus::Completed)
            | (TransactionStatus::Pending, TransactionStatus::Failed) => Ok(Some(new)),
            _ => Err(CoreError::InvalidTransition),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TransactionStatus::Pending),
            "Completed" => Ok(TransactionStatus::Completed),
            "Failed" => Ok(TransactionStatus::Failed),
            _ => Err(CoreError::Internal(format!("unknown transaction status: {s}"))),
        }
    }
}

/// Append-only audit entry paired with every balance-affecting action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for the transaction history queries. The type filter is a
/// case-insensitive substring match.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub tx_type: Option<String>,
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub qty: Decimal,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub address: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    Maturation,
    DepositConfirm,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Maturation => "maturation",
            JobKind::DepositConfirm => "deposit_confirm",
        }
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maturation" => Ok(JobKind::Maturation),
            "deposit_confirm" => Ok(JobKind::DepositConfirm),
            _ => Err(CoreError::Internal(format!("unknown job kind: {s}"))),
        }
    }
}

/// Durable deferred-work row. Pending jobs survive restarts and are re-armed
/// (or fired immediately when overdue) by the startup recovery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaturationJob {
    pub id: Uuid,
    pub kind: JobKind,
    /// Investment id for maturation jobs, deposit id for confirmations.
    pub subject_id: Option<Uuid>,
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub earnings: Decimal,
    pub fire_at: DateTime<Utc>,
    pub done: bool,
}
