use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CoreError;

use super::models::{
    Deposit, Investment, InvestmentStatus, JobKind, MaturationJob, Transaction,
    TransactionFilter, TransactionStatus, User, Wallet, Withdrawal,
};
use super::store::Store;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
    wallets: HashMap<Uuid, Wallet>,
    investments: HashMap<Uuid, Investment>,
    transactions: HashMap<Uuid, Transaction>,
    tx_order: Vec<Uuid>,
    deposits: Vec<Deposit>,
    withdrawals: Vec<Withdrawal>,
    jobs: HashMap<Uuid, MaturationJob>,
}

/// HashMap-backed [`Store`]. Mirrors the single-row atomicity of the Postgres
/// store: one lock acquisition per method, no cross-method coordination.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_user(&self, user: &User) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(CoreError::DuplicateIdentity);
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, CoreError> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_reset_token(&self, user_id: Uuid, token: Option<&str>) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&user_id).ok_or(CoreError::NotFound)?;
        user.reset_token = token.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&user_id).ok_or(CoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        inner
            .refresh_tokens
            .insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, CoreError> {
        let inner = self.inner.read().await;
        match inner.refresh_tokens.get(token) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => {
                Ok(inner.users.get(user_id).cloned())
            }
            _ => Ok(None),
        }
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), CoreError> {
        self.inner.write().await.refresh_tokens.remove(token);
        Ok(())
    }

    async fn load_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, CoreError> {
        Ok(self.inner.read().await.wallets.get(&user_id).cloned())
    }

    async fn save_wallet(&self, wallet: &Wallet) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        inner.wallets.insert(wallet.user_id, wallet.clone());
        Ok(())
    }

    async fn insert_investment(&self, investment: &Investment) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        inner.investments.insert(investment.id, investment.clone());
        Ok(())
    }

    async fn load_investment(&self, id: Uuid) -> Result<Option<Investment>, CoreError> {
        Ok(self.inner.read().await.investments.get(&id).cloned())
    }

    async fn list_investments(&self, user_id: Uuid) -> Result<Vec<Investment>, CoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<Investment> = inner
            .investments
            .values()
            .filter(|inv| inv.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        inner.transactions.insert(tx.id, tx.clone());
        inner.tx_order.push(tx.id);
        Ok(())
    }

    async fn load_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        Ok(self.inner.read().await.transactions.get(&id).cloned())
    }

    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let tx = inner.transactions.get_mut(&id).ok_or(CoreError::NotFound)?;
        if let Some(next) = tx.status.transition(status)? {
            tx.status = next;
            tx.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn query_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError> {
        let inner = self.inner.read().await;
        let needle = filter.tx_type.as_ref().map(|t| t.to_lowercase());
        let out = inner
            .tx_order
            .iter()
            .rev()
            .filter_map(|id| inner.transactions.get(id))
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| match &needle {
                Some(needle) => tx.tx_type.to_lowercase().contains(needle),
                None => true,
            })
            .filter(|tx| match filter.status {
                Some(status) => tx.status == status,
                None => true,
            })
            .cloned()
            .collect();
        Ok(out)
    }

    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), CoreError> {
        self.inner.write().await.deposits.push(deposit.clone());
        Ok(())
    }

    async fn update_deposit_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let deposit = inner
            .deposits
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(CoreError::NotFound)?;
        deposit.status = status;
        Ok(())
    }

    async fn list_deposits(&self) -> Result<Vec<Deposit>, CoreError> {
        let mut out = self.inner.read().await.deposits.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), CoreError> {
        self.inner.write().await.withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn insert_job(&self, job: &MaturationJob) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn complete_maturation(
        &self,
        job: &MaturationJob,
        investment_id: Uuid,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        if !inner.investments.contains_key(&investment_id) {
            return Err(CoreError::NotFound);
        }
        let wallet = inner
            .wallets
            .entry(job.user_id)
            .or_insert_with(|| Wallet::new(job.user_id));
        *wallet.balances.get_mut(job.currency) += job.earnings;
        let investment = inner
            .investments
            .get_mut(&investment_id)
            .ok_or(CoreError::NotFound)?;
        investment.earnings += job.earnings;
        investment.status = InvestmentStatus::Completed;
        if let Some(tx) = inner.transactions.get_mut(&job.transaction_id) {
            if tx.status == TransactionStatus::Pending {
                tx.status = TransactionStatus::Completed;
                tx.updated_at = Utc::now();
            }
        }
        if let Some(job) = inner.jobs.get_mut(&job.id) {
            job.done = true;
        }
        Ok(())
    }

    async fn load_job(&self, id: Uuid) -> Result<Option<MaturationJob>, CoreError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn pending_jobs(&self) -> Result<Vec<MaturationJob>, CoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<MaturationJob> =
            inner.jobs.values().filter(|j| !j.done).cloned().collect();
        out.sort_by_key(|j| j.fire_at);
        Ok(out)
    }

    async fn mark_job_done(&self, id: Uuid) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let job = inner.jobs.get_mut(&id).ok_or(CoreError::NotFound)?;
        job.done = true;
        Ok(())
    }

    async fn cancel_job_for_investment(&self, investment_id: Uuid) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        for job in inner.jobs.values_mut() {
            if job.kind == JobKind::Maturation && job.subject_id == Some(investment_id) && !job.done
            {
                job.done = true;
            }
        }
        Ok(())
    }
}
