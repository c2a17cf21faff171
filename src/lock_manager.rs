//! Per-aggregate lock manager
//!
//! One async mutex per `(aggregate_type, aggregate_id)`, created on demand
//! and dropped from the table once nobody holds or waits on it. Writers to
//! different aggregates never contend. Acquisition is bounded by a timeout
//! and retried a fixed number of times with linear backoff plus jitter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::StoreConfig;
use crate::domain::AggregateKey;
use crate::error::{StoreError, StoreResult};

type LockHandle = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
struct LockTable {
    handles: Mutex<HashMap<AggregateKey, LockHandle>>,
}

impl LockTable {
    fn handle(&self, key: &AggregateKey) -> LockHandle {
        let mut handles = self.handles.lock();
        Arc::clone(handles.entry(key.clone()).or_default())
    }

    /// Drop the entry if the table holds the only reference
    fn prune(&self, key: &AggregateKey) {
        let mut handles = self.handles.lock();
        if handles.get(key).is_some_and(|h| Arc::strong_count(h) == 1) {
            handles.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.handles.lock().len()
    }
}

/// Lock manager for per-aggregate mutation sections
#[derive(Debug, Clone)]
pub struct LockManager {
    table: Arc<LockTable>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

/// Exclusive hold on one aggregate. Released on drop, on every exit path.
#[derive(Debug)]
pub struct AggregateGuard {
    table: Arc<LockTable>,
    key: AggregateKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl AggregateGuard {
    pub fn key(&self) -> &AggregateKey {
        &self.key
    }
}

impl Drop for AggregateGuard {
    fn drop(&mut self) {
        // Release first so the strong count reflects only the table and waiters
        drop(self.guard.take());
        self.table.prune(&self.key);
    }
}

impl LockManager {
    pub fn new(timeout: Duration, retries: u32, backoff: Duration) -> Self {
        Self {
            table: Arc::new(LockTable::default()),
            timeout,
            retries,
            backoff,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.lock_timeout, config.lock_retries, config.retry_backoff)
    }

    /// Acquire the mutation lock for an aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Timeout` once every attempt has timed out.
    pub async fn acquire(&self, key: &AggregateKey) -> StoreResult<AggregateGuard> {
        let attempts = self.retries.saturating_add(1);

        for attempt in 0..attempts {
            let handle = self.table.handle(key);
            match tokio::time::timeout(self.timeout, handle.lock_owned()).await {
                Ok(guard) => {
                    return Ok(AggregateGuard {
                        table: Arc::clone(&self.table),
                        key: key.clone(),
                        guard: Some(guard),
                    });
                }
                Err(_) if attempt + 1 < attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        aggregate = %key,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Lock acquisition timed out, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {}
            }
        }

        self.table.prune(key);
        tracing::warn!(aggregate = %key, attempts, "Lock acquisition failed");
        Err(StoreError::Timeout {
            key: key.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
            attempts,
        })
    }

    /// Linear backoff with up to 50% random jitter
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(attempt + 1);
        let jitter_ms = (base.as_millis() as u64) / 2;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Number of aggregates with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.table.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
