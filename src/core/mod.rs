use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use uuid::Uuid;

use crate::db::store::Store;

pub mod invest;
pub mod ledger;
pub mod scheduler;

/// The money core: wallet ledger, investment lifecycle and deferred jobs.
///
/// Every balance mutation for a user runs under that user's async mutex,
/// held across the read-check-write. Maturation timers acquire the same lock,
/// so a withdrawal racing an investment maturing on the same wallet is
/// serialized.
#[derive(Clone)]
pub struct CoreService {
    store: Arc<dyn Store>,
    wallet_locks: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
    deposit_confirm: Duration,
}

impl CoreService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_deposit_confirm(store, Duration::seconds(120))
    }

    pub fn with_deposit_confirm(store: Arc<dyn Store>, deposit_confirm: Duration) -> Self {
        Self {
            store,
            wallet_locks: Arc::new(Mutex::new(HashMap::new())),
            deposit_confirm,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(crate) fn deposit_confirm(&self) -> Duration {
        self.deposit_confirm
    }

    /// One mutex per user, created on first touch and reused for the process
    /// lifetime.
    pub(crate) fn wallet_lock(&self, user_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.wallet_locks.lock().unwrap();
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
