use std::time::Duration;

use chrono::Utc;

use crate::db::models::{JobKind, MaturationJob};
use crate::error::CoreError;

use super::CoreService;

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Arms a one-shot timer for a durable job. The task sleeps until `fire_at`
/// (no sleep when already overdue), then runs the job with retries. The
/// request that scheduled the job is never blocked.
pub fn arm(service: CoreService, job: MaturationJob) {
    tokio::spawn(async move {
        let delay = (job.fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;
        fire_with_retry(&service, &job).await;
    });
}

/// Startup recovery pass: re-arms every not-done job. Overdue jobs fire
/// immediately; at-least-once delivery is safe because the handlers are
/// idempotent. Returns the number of jobs re-armed.
pub async fn recover(service: &CoreService) -> Result<usize, CoreError> {
    let jobs = service.store().pending_jobs().await?;
    let count = jobs.len();
    for job in jobs {
        if job.fire_at <= Utc::now() {
            tracing::warn!(job = %job.id, fire_at = %job.fire_at, "overdue job found at startup, firing now");
        }
        arm(service.clone(), job);
    }
    if count > 0 {
        tracing::info!(count, "re-armed pending jobs");
    }
    Ok(count)
}

async fn fire_with_retry(service: &CoreService, job: &MaturationJob) {
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        let result = match job.kind {
            JobKind::Maturation => service.maturate(job).await,
            JobKind::DepositConfirm => service.confirm_deposit(job).await,
        };
        match result {
            Ok(()) => return,
            Err(err) => {
                tracing::warn!(job = %job.id, attempt, "deferred job failed: {err}");
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    // the row stays not-done; the next startup recovery pass retries it
    tracing::error!(job = %job.id, "deferred job gave up after {MAX_ATTEMPTS} attempts, left pending");
}

impl CoreService {
    /// Cancels the pending maturation for an investment, if any. An armed
    /// timer that later fires finds the job done and does nothing.
    pub async fn cancel_maturation(&self, investment_id: uuid::Uuid) -> Result<(), CoreError> {
        self.store().cancel_job_for_investment(investment_id).await
    }

    /// Runs a job immediately, bypassing its timer.
    pub async fn run_job(&self, job: &MaturationJob) -> Result<(), CoreError> {
        match job.kind {
            JobKind::Maturation => self.maturate(job).await,
            JobKind::DepositConfirm => self.confirm_deposit(job).await,
        }
    }
}
