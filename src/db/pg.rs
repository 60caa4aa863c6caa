use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::error::CoreError;

use super::models::{
    Currency, Deposit, Investment, JobKind, MaturationJob, Transaction, TransactionFilter,
    TransactionStatus, User, Wallet, Withdrawal,
};
use super::store::Store;

/// Postgres-backed store. Each method is a single-statement write or read;
/// enum columns are stored as their exact status/currency strings.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_err(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::DuplicateIdentity,
        _ => CoreError::Storage(err),
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    username: String,
    country: String,
    password_hash: String,
    is_admin: bool,
    reset_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            username: row.username,
            country: row.country,
            password_hash: row.password_hash,
            is_admin: row.is_admin,
            reset_token: row.reset_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const USER_COLS: &str =
    "id, name, email, username, country, password_hash, is_admin, reset_token, created_at, updated_at";

#[derive(FromRow)]
struct WalletRow {
    user_id: Uuid,
    btc_balance: Decimal,
    eth_balance: Decimal,
    bnb_balance: Decimal,
    usdt_balance: Decimal,
    btc_address: String,
    eth_address: String,
    bnb_address: String,
    usdt_address: String,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        let mut wallet = Wallet::new(row.user_id);
        wallet.balances.btc = row.btc_balance;
        wallet.balances.eth = row.eth_balance;
        wallet.balances.bnb = row.bnb_balance;
        wallet.balances.usdt = row.usdt_balance;
        wallet.addresses.btc = row.btc_address;
        wallet.addresses.eth = row.eth_address;
        wallet.addresses.bnb = row.bnb_address;
        wallet.addresses.usdt = row.usdt_address;
        wallet
    }
}

#[derive(FromRow)]
struct InvestmentRow {
    id: Uuid,
    user_id: Uuid,
    plan_name: String,
    principal_amount: Decimal,
    interest_rate: Decimal,
    period_days: i64,
    currency: String,
    earnings: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvestmentRow> for Investment {
    type Error = CoreError;

    fn try_from(row: InvestmentRow) -> Result<Self, Self::Error> {
        Ok(Investment {
            id: row.id,
            user_id: row.user_id,
            plan_name: row.plan_name,
            principal_amount: row.principal_amount,
            interest_rate: row.interest_rate,
            period_days: row.period_days,
            currency: row.currency.parse()?,
            earnings: row.earnings,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    tx_type: String,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = CoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            tx_type: row.tx_type,
            amount: row.amount,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DepositRow {
    id: Uuid,
    user_id: Uuid,
    currency: String,
    qty: Decimal,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DepositRow> for Deposit {
    type Error = CoreError;

    fn try_from(row: DepositRow) -> Result<Self, Self::Error> {
        Ok(Deposit {
            id: row.id,
            user_id: row.user_id,
            currency: row.currency.parse()?,
            qty: row.qty,
            amount: row.amount,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    subject_id: Option<Uuid>,
    transaction_id: Uuid,
    user_id: Uuid,
    currency: String,
    earnings: Decimal,
    fire_at: DateTime<Utc>,
    done: bool,
}

impl TryFrom<JobRow> for MaturationJob {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(MaturationJob {
            id: row.id,
            kind: row.kind.parse::<JobKind>()?,
            subject_id: row.subject_id,
            transaction_id: row.transaction_id,
            user_id: row.user_id,
            currency: row.currency.parse()?,
            earnings: row.earnings,
            fire_at: row.fire_at,
            done: row.done,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO users (id, name, email, username, country, password_hash, is_admin, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.country)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> Result<Vec<User>, CoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn set_reset_token(&self, user_id: Uuid, token: Option<&str>) -> Result<(), CoreError> {
        sqlx::query("UPDATE users SET reset_token = $1, updated_at = NOW() WHERE id = $2")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, CoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.name, u.email, u.username, u.country, u.password_hash, u.is_admin,
                    u.reset_token, u.created_at, u.updated_at
             FROM users u
             INNER JOIN refresh_tokens rt ON rt.user_id = u.id
             WHERE rt.token = $1 AND rt.expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, CoreError> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, btc_balance, eth_balance, bnb_balance, usdt_balance,
                    btc_address, eth_address, bnb_address, usdt_address
             FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Wallet::from))
    }

    async fn save_wallet(&self, wallet: &Wallet) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, btc_balance, eth_balance, bnb_balance, usdt_balance,
                                  total_balance, btc_address, eth_address, bnb_address, usdt_address)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (user_id) DO UPDATE SET
                 btc_balance = EXCLUDED.btc_balance,
                 eth_balance = EXCLUDED.eth_balance,
                 bnb_balance = EXCLUDED.bnb_balance,
                 usdt_balance = EXCLUDED.usdt_balance,
                 total_balance = EXCLUDED.total_balance,
                 btc_address = EXCLUDED.btc_address,
                 eth_address = EXCLUDED.eth_address,
                 bnb_address = EXCLUDED.bnb_address,
                 usdt_address = EXCLUDED.usdt_address",
        )
        .bind(wallet.user_id)
        .bind(wallet.balances.btc)
        .bind(wallet.balances.eth)
        .bind(wallet.balances.bnb)
        .bind(wallet.balances.usdt)
        .bind(wallet.total_balance())
        .bind(&wallet.addresses.btc)
        .bind(&wallet.addresses.eth)
        .bind(&wallet.addresses.bnb)
        .bind(&wallet.addresses.usdt)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_investment(&self, investment: &Investment) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO investments (id, user_id, plan_name, principal_amount, interest_rate,
                                      period_days, currency, earnings, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(investment.id)
        .bind(investment.user_id)
        .bind(&investment.plan_name)
        .bind(investment.principal_amount)
        .bind(investment.interest_rate)
        .bind(investment.period_days)
        .bind(investment.currency.as_str())
        .bind(investment.earnings)
        .bind(investment.status.as_str())
        .bind(investment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_investment(&self, id: Uuid) -> Result<Option<Investment>, CoreError> {
        let row = sqlx::query_as::<_, InvestmentRow>("SELECT * FROM investments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Investment::try_from).transpose()
    }

    async fn list_investments(&self, user_id: Uuid) -> Result<Vec<Investment>, CoreError> {
        let rows = sqlx::query_as::<_, InvestmentRow>(
            "SELECT * FROM investments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Investment::try_from).collect()
    }

    async fn append_transaction(&self, tx: &Transaction) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO transactions (id, user_id, tx_type, amount, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(&tx.tx_type)
        .bind(tx.amount)
        .bind(tx.status.as_str())
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        let current = self
            .load_transaction(id)
            .await?
            .ok_or(CoreError::NotFound)?;
        let Some(next) = current.status.transition(status)? else {
            return Ok(());
        };
        sqlx::query("UPDATE transactions SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(next.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError> {
        let mut builder = QueryBuilder::new(
            "SELECT id, user_id, tx_type, amount, status, created_at, updated_at
             FROM transactions WHERE user_id = ",
        );
        builder.push_bind(user_id);
        if let Some(tx_type) = &filter.tx_type {
            builder.push(" AND tx_type ILIKE ");
            builder.push_bind(format!("%{tx_type}%"));
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO deposits (id, user_id, currency, qty, amount, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(deposit.id)
        .bind(deposit.user_id)
        .bind(deposit.currency.as_str())
        .bind(deposit.qty)
        .bind(deposit.amount)
        .bind(deposit.status.as_str())
        .bind(deposit.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_deposit_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        sqlx::query("UPDATE deposits SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_deposits(&self) -> Result<Vec<Deposit>, CoreError> {
        let rows =
            sqlx::query_as::<_, DepositRow>("SELECT * FROM deposits ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Deposit::try_from).collect()
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO withdrawals (id, user_id, currency, address, amount, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(withdrawal.currency.as_str())
        .bind(&withdrawal.address)
        .bind(withdrawal.amount)
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_job(&self, job: &MaturationJob) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO maturation_jobs (id, kind, subject_id, transaction_id, user_id,
                                          currency, earnings, fire_at, done)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(job.subject_id)
        .bind(job.transaction_id)
        .bind(job.user_id)
        .bind(job.currency.as_str())
        .bind(job.earnings)
        .bind(job.fire_at)
        .bind(job.done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_maturation(
        &self,
        job: &MaturationJob,
        investment_id: Uuid,
    ) -> Result<(), CoreError> {
        // column name comes from the closed Currency enum, never from input
        let column = match job.currency {
            Currency::BTC => "btc_balance",
            Currency::ETH => "eth_balance",
            Currency::BNB => "bnb_balance",
            Currency::USDT => "usdt_balance",
        };
        let mut txn = self.pool.begin().await?;
        let updated = sqlx::query(&format!(
            "UPDATE wallets SET {column} = {column} + $1, total_balance = total_balance + $1
             WHERE user_id = $2"
        ))
        .bind(job.earnings)
        .bind(job.user_id)
        .execute(&mut *txn)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(CoreError::NotFound);
        }
        sqlx::query(
            "UPDATE investments SET earnings = earnings + $1, status = 'Completed' WHERE id = $2",
        )
        .bind(job.earnings)
        .bind(investment_id)
        .execute(&mut *txn)
        .await?;
        sqlx::query(
            "UPDATE transactions SET status = 'Completed', updated_at = NOW()
             WHERE id = $1 AND status = 'Pending'",
        )
        .bind(job.transaction_id)
        .execute(&mut *txn)
        .await?;
        sqlx::query("UPDATE maturation_jobs SET done = TRUE WHERE id = $1")
            .bind(job.id)
            .execute(&mut *txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn load_job(&self, id: Uuid) -> Result<Option<MaturationJob>, CoreError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM maturation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MaturationJob::try_from).transpose()
    }

    async fn pending_jobs(&self) -> Result<Vec<MaturationJob>, CoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM maturation_jobs WHERE NOT done ORDER BY fire_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MaturationJob::try_from).collect()
    }

    async fn mark_job_done(&self, id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE maturation_jobs SET done = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_job_for_investment(&self, investment_id: Uuid) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE maturation_jobs SET done = TRUE
             WHERE subject_id = $1 AND kind = 'maturation' AND NOT done",
        )
            .bind(investment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
