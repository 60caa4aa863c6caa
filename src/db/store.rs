use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreError;

use super::models::{
    Deposit, Investment, MaturationJob, Transaction, TransactionFilter, TransactionStatus, User,
    Wallet, Withdrawal,
};

/// Persistence boundary. Every method is an individually atomic single-row
/// read or write; composing them safely (per-user locking, fail-fast
/// validation) is the core's job, not the store's.
#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> Result<(), CoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, CoreError>;
    async fn list_users(&self) -> Result<Vec<User>, CoreError>;
    async fn set_reset_token(&self, user_id: Uuid, token: Option<&str>) -> Result<(), CoreError>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), CoreError>;

    // refresh tokens
    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, CoreError>;
    async fn revoke_refresh_token(&self, token: &str) -> Result<(), CoreError>;

    // wallets
    async fn load_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, CoreError>;
    /// Upsert; persists `total_balance` as the derived sum.
    async fn save_wallet(&self, wallet: &Wallet) -> Result<(), CoreError>;

    // investments
    async fn insert_investment(&self, investment: &Investment) -> Result<(), CoreError>;
    async fn load_investment(&self, id: Uuid) -> Result<Option<Investment>, CoreError>;
    async fn list_investments(&self, user_id: Uuid) -> Result<Vec<Investment>, CoreError>;

    // transaction log
    async fn append_transaction(&self, tx: &Transaction) -> Result<(), CoreError>;
    async fn load_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError>;
    /// Applies the Pending -> Completed/Failed transition policy; re-affirming
    /// a terminal status is a no-op.
    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError>;
    async fn query_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError>;

    // deposits / withdrawals
    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), CoreError>;
    async fn update_deposit_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError>;
    async fn list_deposits(&self) -> Result<Vec<Deposit>, CoreError>;
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), CoreError>;

    // deferred jobs
    async fn insert_job(&self, job: &MaturationJob) -> Result<(), CoreError>;
    /// Applies a maturation as a single commit: credits the wallet with the
    /// job's earnings, accrues them on the investment and marks it Completed,
    /// resolves the paired transaction and marks the job done. All-or-nothing,
    /// so a failed attempt leaves every row untouched and a retry starts from
    /// a clean slate instead of re-crediting.
    async fn complete_maturation(
        &self,
        job: &MaturationJob,
        investment_id: Uuid,
    ) -> Result<(), CoreError>;
    async fn load_job(&self, id: Uuid) -> Result<Option<MaturationJob>, CoreError>;
    async fn pending_jobs(&self) -> Result<Vec<MaturationJob>, CoreError>;
    async fn mark_job_done(&self, id: Uuid) -> Result<(), CoreError>;
    /// Marks the pending maturation job for an investment done without firing
    /// it, so an armed timer becomes a no-op.
    async fn cancel_job_for_investment(&self, investment_id: Uuid) -> Result<(), CoreError>;
}
