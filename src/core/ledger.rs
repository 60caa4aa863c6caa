use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::models::{
    Currency, Deposit, JobKind, MaturationJob, Transaction, TransactionStatus, Wallet, Withdrawal,
};
use crate::error::CoreError;

use super::{scheduler, CoreService};

impl CoreService {
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Wallet, CoreError> {
        self.store()
            .load_wallet(user_id)
            .await?
            .ok_or(CoreError::NotFound)
    }

    pub async fn get_balance(&self, user_id: Uuid, currency: Currency) -> Result<Decimal, CoreError> {
        Ok(self.get_wallet(user_id).await?.balances.get(currency))
    }

    /// Decrements a balance. Fails before any mutation when the amount is
    /// non-positive or the balance is short.
    pub async fn debit(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Wallet, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        let lock = self.wallet_lock(user_id);
        let _guard = lock.lock().await;
        self.debit_locked(user_id, currency, amount).await
    }

    /// Body of [`debit`], for callers that already hold the wallet lock.
    pub(crate) async fn debit_locked(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Wallet, CoreError> {
        let mut wallet = self.get_wallet(user_id).await?;
        if wallet.balances.get(currency) < amount {
            return Err(CoreError::InsufficientFunds);
        }
        *wallet.balances.get_mut(currency) -= amount;
        self.store().save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Increments a balance, creating the wallet on first credit with every
    /// other currency at zero.
    pub async fn credit(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Wallet, CoreError> {
        if amount < Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        let lock = self.wallet_lock(user_id);
        let _guard = lock.lock().await;
        self.credit_locked(user_id, currency, amount).await
    }

    pub(crate) async fn credit_locked(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: Decimal,
    ) -> Result<Wallet, CoreError> {
        let mut wallet = self
            .store()
            .load_wallet(user_id)
            .await?
            .unwrap_or_else(|| Wallet::new(user_id));
        *wallet.balances.get_mut(currency) += amount;
        self.store().save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Overwrites the deposit address for a currency. The currency comes in
    /// as a raw string so an unrecognized code is rejected here, not at some
    /// outer parsing layer.
    pub async fn set_address(
        &self,
        user_id: Uuid,
        currency: &str,
        address: &str,
    ) -> Result<Wallet, CoreError> {
        let currency: Currency = currency.parse()?;
        let lock = self.wallet_lock(user_id);
        let _guard = lock.lock().await;
        let mut wallet = self.get_wallet(user_id).await?;
        *wallet.addresses.get_mut(currency) = address.to_string();
        self.store().save_wallet(&wallet).await?;
        Ok(wallet)
    }

    /// Records a deposit: credits the wallet right away, logs a Pending
    /// transaction and schedules the confirmation that flips both records to
    /// Completed after the confirmation window.
    pub async fn deposit(
        &self,
        user_id: Uuid,
        currency: Currency,
        qty: Decimal,
        amount: Decimal,
    ) -> Result<Deposit, CoreError> {
        if amount <= Decimal::ZERO || qty < Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }
        if self.store().find_user_by_id(user_id).await?.is_none() {
            return Err(CoreError::NotFound);
        }

        let now = Utc::now();
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id,
            currency,
            qty,
            amount,
            status: TransactionStatus::Pending,
            created_at: now,
        };
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            tx_type: "Deposit".to_string(),
            amount,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let job = MaturationJob {
            id: Uuid::new_v4(),
            kind: JobKind::DepositConfirm,
            subject_id: Some(deposit.id),
            transaction_id: tx.id,
            user_id,
            currency,
            earnings: Decimal::ZERO,
            fire_at: now + self.deposit_confirm(),
            done: false,
        };

        // the job row lands with the Pending transaction, so a crash between
        // them cannot orphan a deposit with no confirmation to recover
        {
            let lock = self.wallet_lock(user_id);
            let _guard = lock.lock().await;
            self.credit_locked(user_id, currency, amount).await?;
            self.store().insert_deposit(&deposit).await?;
            self.store().append_transaction(&tx).await?;
            self.store().insert_job(&job).await?;
        }
        scheduler::arm(self.clone(), job);

        tracing::info!(user = %user_id, %currency, %amount, "deposit recorded");
        Ok(deposit)
    }

    /// Flips the deposit and its paired transaction to Completed. Invoked by
    /// the scheduler once the confirmation window has elapsed.
    pub(crate) async fn confirm_deposit(&self, job: &MaturationJob) -> Result<(), CoreError> {
        match self.store().load_job(job.id).await? {
            Some(current) if !current.done => {}
            _ => return Ok(()),
        }
        let deposit_id = job
            .subject_id
            .ok_or_else(|| CoreError::Internal("confirm job without deposit id".to_string()))?;
        self.store()
            .update_transaction_status(job.transaction_id, TransactionStatus::Completed)
            .await?;
        self.store()
            .update_deposit_status(deposit_id, TransactionStatus::Completed)
            .await?;
        self.store().mark_job_done(job.id).await?;
        tracing::info!(user = %job.user_id, deposit = %deposit_id, "deposit confirmed");
        Ok(())
    }

    /// Debits the wallet and records the withdrawal. An insufficient balance
    /// still leaves a Failed transaction in the audit log before the error
    /// reaches the caller.
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: Decimal,
        address: &str,
    ) -> Result<Wallet, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount);
        }

        let lock = self.wallet_lock(user_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let wallet = match self.debit_locked(user_id, currency, amount).await {
            Ok(wallet) => wallet,
            Err(CoreError::InsufficientFunds) => {
                let failed = Transaction {
                    id: Uuid::new_v4(),
                    user_id,
                    tx_type: "Withdrawal".to_string(),
                    amount,
                    status: TransactionStatus::Failed,
                    created_at: now,
                    updated_at: now,
                };
                self.store().append_transaction(&failed).await?;
                tracing::warn!(user = %user_id, %currency, %amount, "withdrawal rejected, insufficient funds");
                return Err(CoreError::InsufficientFunds);
            }
            Err(err) => return Err(err),
        };

        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id,
            currency,
            address: address.to_string(),
            amount,
            status: TransactionStatus::Completed,
            created_at: now,
        };
        self.store().insert_withdrawal(&withdrawal).await?;

        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            tx_type: "Withdrawal".to_string(),
            amount,
            status: TransactionStatus::Completed,
            created_at: now,
            updated_at: now,
        };
        self.store().append_transaction(&tx).await?;

        tracing::info!(user = %user_id, %currency, %amount, "withdrawal completed");
        Ok(wallet)
    }
}
