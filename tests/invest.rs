mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use backend_invest_platform::core::invest::OpenInvestment;
use backend_invest_platform::core::scheduler;
use backend_invest_platform::db::mem::MemStore;
use backend_invest_platform::db::models::{
    Currency, Deposit, Investment, InvestmentStatus, JobKind, MaturationJob, Transaction,
    TransactionFilter, TransactionStatus, User, Wallet, Withdrawal,
};
use backend_invest_platform::db::store::Store;
use backend_invest_platform::error::CoreError;

use common::{mem_store, seed_user, service, service_on};

fn plan(principal: i64) -> OpenInvestment {
    OpenInvestment {
        plan_name: "Gold".to_string(),
        principal_amount: Decimal::from(principal),
        interest_rate: Decimal::from(10),
        period_days: 1,
        currency: Currency::BTC,
        min: None,
        max: None,
    }
}

#[tokio::test]
async fn open_investment_debits_principal_and_schedules_maturation() {
    let core = service();
    let user = seed_user(&core, "alice").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let investment = core.open_investment(user, plan(50)).await.unwrap();
    assert_eq!(investment.status, InvestmentStatus::Active);
    assert_eq!(investment.earnings, Decimal::ZERO);

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(50));

    let jobs = core.store().pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, JobKind::Maturation);
    assert_eq!(jobs[0].subject_id, Some(investment.id));
    assert_eq!(jobs[0].earnings, Decimal::from(5));

    let txs = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter { tx_type: Some("investment".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_type, "Investment - Gold");
    assert_eq!(txs[0].status, TransactionStatus::Pending);
}

#[tokio::test]
async fn maturation_credits_earnings_once_even_when_fired_twice() {
    let core = service();
    let user = seed_user(&core, "bob").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let investment = core.open_investment(user, plan(50)).await.unwrap();
    let job = core.store().pending_jobs().await.unwrap().remove(0);

    core.run_job(&job).await.unwrap();

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(55));

    let matured = core
        .store()
        .load_investment(investment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matured.status, InvestmentStatus::Completed);
    assert_eq!(matured.earnings, Decimal::from(5));

    // duplicate fire is a no-op
    core.run_job(&job).await.unwrap();
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(55));
    let matured = core
        .store()
        .load_investment(investment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matured.earnings, Decimal::from(5));

    // paired transaction resolved
    let txs = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter { tx_type: Some("investment".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(txs[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn open_investment_validates_funds_and_bounds() {
    let core = service();
    let user = seed_user(&core, "carol").await;
    core.credit(user, Currency::BTC, Decimal::from(40)).await.unwrap();

    assert!(matches!(
        core.open_investment(user, plan(50)).await,
        Err(CoreError::InsufficientFunds)
    ));
    assert!(matches!(
        core.open_investment(user, plan(0)).await,
        Err(CoreError::InvalidAmount)
    ));

    let mut below_min = plan(10);
    below_min.min = Some(Decimal::from(20));
    assert!(matches!(
        core.open_investment(user, below_min).await,
        Err(CoreError::InvalidAmount)
    ));

    let mut above_max = plan(30);
    above_max.max = Some(Decimal::from(25));
    assert!(matches!(
        core.open_investment(user, above_max).await,
        Err(CoreError::InvalidAmount)
    ));

    // failed validation mutates nothing
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(40));
    assert!(core.list_investments(user).await.unwrap().is_empty());
    assert!(core.store().pending_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_maturation_never_pays_out() {
    let core = service();
    let user = seed_user(&core, "dave").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let investment = core.open_investment(user, plan(50)).await.unwrap();
    let job = core.store().pending_jobs().await.unwrap().remove(0);

    core.cancel_maturation(investment.id).await.unwrap();
    assert!(core.store().pending_jobs().await.unwrap().is_empty());

    // a stale timer firing after cancellation finds the job done
    core.run_job(&job).await.unwrap();
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(50));
    let investment = core
        .store()
        .load_investment(investment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(investment.status, InvestmentStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recovery_fires_overdue_jobs_from_a_previous_run() {
    let store = mem_store();

    // state as a crashed process would have left it: debited wallet, Active
    // investment, Pending transaction, not-done job already past its fire time
    let user = Uuid::new_v4();
    let now = Utc::now();
    let mut wallet = Wallet::new(user);
    *wallet.balances.get_mut(Currency::BTC) += Decimal::from(50);
    store.save_wallet(&wallet).await.unwrap();

    let investment = Investment {
        id: Uuid::new_v4(),
        user_id: user,
        plan_name: "Silver".to_string(),
        principal_amount: Decimal::from(50),
        interest_rate: Decimal::from(10),
        period_days: 1,
        currency: Currency::BTC,
        earnings: Decimal::ZERO,
        status: InvestmentStatus::Active,
        created_at: now - chrono::Duration::days(2),
    };
    store.insert_investment(&investment).await.unwrap();

    let tx = Transaction {
        id: Uuid::new_v4(),
        user_id: user,
        tx_type: "Investment - Silver".to_string(),
        amount: Decimal::from(50),
        status: TransactionStatus::Pending,
        created_at: investment.created_at,
        updated_at: investment.created_at,
    };
    store.append_transaction(&tx).await.unwrap();

    let job = MaturationJob {
        id: Uuid::new_v4(),
        kind: JobKind::Maturation,
        subject_id: Some(investment.id),
        transaction_id: tx.id,
        user_id: user,
        currency: Currency::BTC,
        earnings: Decimal::from(5),
        fire_at: now - chrono::Duration::days(1),
        done: false,
    };
    store.insert_job(&job).await.unwrap();

    // "restart": fresh service over the same store
    let core = service_on(store);
    let armed = scheduler::recover(&core).await.unwrap();
    assert_eq!(armed, 1);

    // overdue job fires with no timer delay; poll briefly for the async task
    let mut matured = None;
    for _ in 0..200 {
        let current = core
            .store()
            .load_investment(investment.id)
            .await
            .unwrap()
            .unwrap();
        if current.status == InvestmentStatus::Completed {
            matured = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let matured = matured.expect("overdue maturation did not fire");
    assert_eq!(matured.earnings, Decimal::from(5));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(55));
    assert!(core.store().pending_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_period_rejected_before_any_mutation() {
    let core = service();
    let user = seed_user(&core, "erin").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let mut huge = plan(50);
    huge.period_days = i64::MAX;
    assert!(matches!(
        core.open_investment(user, huge).await,
        Err(CoreError::InvalidAmount)
    ));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(100));
    assert!(core.list_investments(user).await.unwrap().is_empty());
    assert!(core.store().pending_jobs().await.unwrap().is_empty());
}

/// Store whose maturation commit fails a set number of times before letting
/// the underlying store apply it, to exercise the retry path.
struct FlakyCommitStore {
    inner: MemStore,
    failures_left: AtomicU32,
}

impl FlakyCommitStore {
    fn failing(times: u32) -> Arc<dyn Store> {
        Arc::new(Self {
            inner: MemStore::new(),
            failures_left: AtomicU32::new(times),
        })
    }
}

#[async_trait]
impl Store for FlakyCommitStore {
    async fn insert_user(&self, user: &User) -> Result<(), CoreError> {
        self.inner.insert_user(user).await
    }
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        self.inner.find_user_by_id(id).await
    }
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        self.inner.find_user_by_email(email).await
    }
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        self.inner.find_user_by_username(username).await
    }
    async fn list_users(&self) -> Result<Vec<User>, CoreError> {
        self.inner.list_users().await
    }
    async fn set_reset_token(&self, user_id: Uuid, token: Option<&str>) -> Result<(), CoreError> {
        self.inner.set_reset_token(user_id, token).await
    }
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), CoreError> {
        self.inner.update_password(user_id, password_hash).await
    }
    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.inner.store_refresh_token(user_id, token, expires_at).await
    }
    async fn verify_refresh_token(&self, token: &str) -> Result<Option<User>, CoreError> {
        self.inner.verify_refresh_token(token).await
    }
    async fn revoke_refresh_token(&self, token: &str) -> Result<(), CoreError> {
        self.inner.revoke_refresh_token(token).await
    }
    async fn load_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, CoreError> {
        self.inner.load_wallet(user_id).await
    }
    async fn save_wallet(&self, wallet: &Wallet) -> Result<(), CoreError> {
        self.inner.save_wallet(wallet).await
    }
    async fn insert_investment(&self, investment: &Investment) -> Result<(), CoreError> {
        self.inner.insert_investment(investment).await
    }
    async fn load_investment(&self, id: Uuid) -> Result<Option<Investment>, CoreError> {
        self.inner.load_investment(id).await
    }
    async fn list_investments(&self, user_id: Uuid) -> Result<Vec<Investment>, CoreError> {
        self.inner.list_investments(user_id).await
    }
    async fn append_transaction(&self, tx: &Transaction) -> Result<(), CoreError> {
        self.inner.append_transaction(tx).await
    }
    async fn load_transaction(&self, id: Uuid) -> Result<Option<Transaction>, CoreError> {
        self.inner.load_transaction(id).await
    }
    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        self.inner.update_transaction_status(id, status).await
    }
    async fn query_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, CoreError> {
        self.inner.query_transactions(user_id, filter).await
    }
    async fn insert_deposit(&self, deposit: &Deposit) -> Result<(), CoreError> {
        self.inner.insert_deposit(deposit).await
    }
    async fn update_deposit_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<(), CoreError> {
        self.inner.update_deposit_status(id, status).await
    }
    async fn list_deposits(&self) -> Result<Vec<Deposit>, CoreError> {
        self.inner.list_deposits().await
    }
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), CoreError> {
        self.inner.insert_withdrawal(withdrawal).await
    }
    async fn insert_job(&self, job: &MaturationJob) -> Result<(), CoreError> {
        self.inner.insert_job(job).await
    }
    async fn complete_maturation(
        &self,
        job: &MaturationJob,
        investment_id: Uuid,
    ) -> Result<(), CoreError> {
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(CoreError::Internal("maturation commit lost".to_string()));
        }
        self.inner.complete_maturation(job, investment_id).await
    }
    async fn load_job(&self, id: Uuid) -> Result<Option<MaturationJob>, CoreError> {
        self.inner.load_job(id).await
    }
    async fn pending_jobs(&self) -> Result<Vec<MaturationJob>, CoreError> {
        self.inner.pending_jobs().await
    }
    async fn mark_job_done(&self, id: Uuid) -> Result<(), CoreError> {
        self.inner.mark_job_done(id).await
    }
    async fn cancel_job_for_investment(&self, investment_id: Uuid) -> Result<(), CoreError> {
        self.inner.cancel_job_for_investment(investment_id).await
    }
}

#[tokio::test]
async fn retry_after_failed_maturation_commit_credits_once() {
    let core = service_on(FlakyCommitStore::failing(1));
    let user = seed_user(&core, "frank").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let investment = core.open_investment(user, plan(50)).await.unwrap();
    let job = core.store().pending_jobs().await.unwrap().remove(0);

    // first attempt dies mid-commit: nothing may stick
    assert!(core.run_job(&job).await.is_err());
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(50));
    let current = core
        .store()
        .load_investment(investment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status, InvestmentStatus::Active);
    assert_eq!(current.earnings, Decimal::ZERO);

    // the retry pays out exactly once
    core.run_job(&job).await.unwrap();
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(55));

    // a further fire changes nothing
    core.run_job(&job).await.unwrap();
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(55));
    let matured = core
        .store()
        .load_investment(investment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matured.earnings, Decimal::from(5));
    assert_eq!(matured.status, InvestmentStatus::Completed);
}
