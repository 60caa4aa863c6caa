use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::models::{
    Currency, Investment, InvestmentStatus, JobKind, MaturationJob, Transaction,
    TransactionStatus,
};
use crate::error::CoreError;

use super::{scheduler, CoreService};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInvestment {
    pub plan_name: String,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    /// Fixed term in whole days.
    #[serde(rename = "period")]
    pub period_days: i64,
    pub currency: Currency,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl CoreService {
    /// Opens a fixed-term investment: validates bounds and balance, debits
    /// the principal, records the investment and its Pending audit entry,
    /// and schedules the maturation that pays out
    /// `principal * rate / 100` after `period` days.
    pub async fn open_investment(
        &self,
        user_id: Uuid,
        req: OpenInvestment,
    ) -> Result<Investment, CoreError> {
        if req.principal_amount <= Decimal::ZERO || req.period_days < 0 {
            return Err(CoreError::InvalidAmount);
        }
        // an absurdly large period must fail validation, not overflow the timer
        let period = Duration::try_days(req.period_days).ok_or(CoreError::InvalidAmount)?;
        if let Some(min) = req.min {
            if req.principal_amount < min {
                return Err(CoreError::InvalidAmount);
            }
        }
        if let Some(max) = req.max {
            if req.principal_amount > max {
                return Err(CoreError::InvalidAmount);
            }
        }

        let earnings = req.principal_amount * req.interest_rate / Decimal::from(100);
        let now = Utc::now();
        let fire_at = now
            .checked_add_signed(period)
            .ok_or(CoreError::InvalidAmount)?;

        let investment = Investment {
            id: Uuid::new_v4(),
            user_id,
            plan_name: req.plan_name.clone(),
            principal_amount: req.principal_amount,
            interest_rate: req.interest_rate,
            period_days: req.period_days,
            currency: req.currency,
            earnings: Decimal::ZERO,
            status: InvestmentStatus::Active,
            created_at: now,
        };
        let tx = Transaction {
            id: Uuid::new_v4(),
            user_id,
            tx_type: format!("Investment - {}", req.plan_name),
            amount: req.principal_amount,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let job = MaturationJob {
            id: Uuid::new_v4(),
            kind: JobKind::Maturation,
            subject_id: Some(investment.id),
            transaction_id: tx.id,
            user_id,
            currency: req.currency,
            earnings,
            fire_at,
            done: false,
        };

        {
            let lock = self.wallet_lock(user_id);
            let _guard = lock.lock().await;
            self.debit_locked(user_id, req.currency, req.principal_amount)
                .await?;
            self.store().insert_investment(&investment).await?;
            self.store().append_transaction(&tx).await?;
            self.store().insert_job(&job).await?;
        }

        scheduler::arm(self.clone(), job);
        tracing::info!(
            user = %user_id,
            investment = %investment.id,
            plan = %investment.plan_name,
            principal = %investment.principal_amount,
            "investment opened"
        );
        Ok(investment)
    }

    pub async fn list_investments(&self, user_id: Uuid) -> Result<Vec<Investment>, CoreError> {
        self.store().list_investments(user_id).await
    }

    /// Matures an investment: credits the earnings, accrues them on the
    /// record, marks it Completed and flips the paired transaction, all in
    /// one store commit. A failed attempt leaves every row untouched, so a
    /// retry re-credits nothing it already applied.
    ///
    /// Idempotent: a duplicate timer fire or a restart replay finds the job
    /// done or the investment Completed and changes nothing.
    pub(crate) async fn maturate(&self, job: &MaturationJob) -> Result<(), CoreError> {
        let lock = self.wallet_lock(job.user_id);
        let _guard = lock.lock().await;

        match self.store().load_job(job.id).await? {
            Some(current) if !current.done => {}
            _ => return Ok(()),
        }
        let investment_id = job
            .subject_id
            .ok_or_else(|| CoreError::Internal("maturation job without investment id".to_string()))?;
        let investment = self
            .store()
            .load_investment(investment_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if investment.status == InvestmentStatus::Completed {
            self.store().mark_job_done(job.id).await?;
            return Ok(());
        }

        self.store().complete_maturation(job, investment_id).await?;

        tracing::info!(
            user = %job.user_id,
            investment = %investment_id,
            earnings = %job.earnings,
            "investment matured"
        );
        Ok(())
    }
}
