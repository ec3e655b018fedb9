//! Worker-ID leasing over a shared [`CoordinationStore`].
//!
//! Each process claims a worker ID in `[0, max_worker_id)` by drawing a ticket
//! from a shared counter and trying to create the lease key for
//! `ticket mod max_worker_id` with a TTL. The first process to create the key
//! owns the ID until the key expires or is released; renewal pushes the expiry
//! forward.

use core::{future::Future, time::Duration};
use std::sync::Arc;

use rand::Rng;
use tokio::time::{sleep, timeout};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, FlakeId, Result,
    lease::{CoordinationStore, RenewalHandle, StoreError},
};

/// Shared counter tickets are drawn from.
pub const WORKER_ID_INCREMENT_KEY: &str = "ID_WORKER_ID_INCREMENT";

/// Prefix of the per-worker lease keys.
pub const WORKER_ID_KEY_PREFIX: &str = "ID_WORKER_ID_";

/// Size of the worker-ID pool, one per value of the 6-bit worker field.
pub const DEFAULT_MAX_WORKER_ID: u64 = FlakeId::max_worker_id() + 1;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60 * 60);

/// Recommended renewal cadence for [`DEFAULT_LEASE_TTL`].
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(60);

/// Returns the lease key for `worker_id`.
///
/// ```
/// assert_eq!(flakeid::worker_id_key(7), "ID_WORKER_ID_7");
/// ```
pub fn worker_id_key(worker_id: u64) -> String {
    format!("{WORKER_ID_KEY_PREFIX}{worker_id}")
}

/// Tuning for [`WorkerIdLeaseManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Size of the pool; IDs are drawn from `[0, max_worker_id)`. At most
    /// [`DEFAULT_MAX_WORKER_ID`].
    pub max_worker_id: u64,
    /// Number of tickets drawn before giving up with
    /// [`Error::WorkerIdPoolExhausted`].
    pub max_attempts: u32,
    /// Lifetime of a lease that is not renewed.
    pub ttl: Duration,
    /// Deadline for a single store operation. A timeout counts as a failed
    /// attempt.
    pub op_timeout: Duration,
    /// Extra attempts for a failed store operation during acquire and
    /// release. Renewal never retries; the next tick is its retry.
    pub store_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            max_worker_id: DEFAULT_MAX_WORKER_ID,
            max_attempts: 64,
            ttl: DEFAULT_LEASE_TTL,
            op_timeout: Duration::from_secs(2),
            store_retries: 3,
            retry_base_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_secs(1),
        }
    }
}

impl LeaseConfig {
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if `max_worker_id` exceeds the worker
    ///   field.
    /// - [`Error::InvalidArgument`] if `max_worker_id`, `max_attempts` or
    ///   `op_timeout` is zero, or `ttl` is under one second.
    pub fn validate(&self) -> Result<()> {
        if self.max_worker_id > DEFAULT_MAX_WORKER_ID {
            return Err(Error::InvalidConfiguration {
                field: "max_worker_id",
                value: self.max_worker_id,
                max: DEFAULT_MAX_WORKER_ID,
            });
        }
        let invalid = |reason: &str| {
            Err(Error::InvalidArgument {
                reason: reason.to_owned(),
            })
        };
        if self.max_worker_id == 0 {
            return invalid("max_worker_id must be at least 1");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if self.ttl < Duration::from_secs(1) {
            return invalid("lease ttl must be at least one second");
        }
        if self.op_timeout.is_zero() {
            return invalid("store operation timeout must be non-zero");
        }
        Ok(())
    }
}

/// A worker ID held by this process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerIdLease {
    worker_id: u64,
    ticket: i64,
    attempts: u32,
}

impl WorkerIdLease {
    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// The counter value this process won the lease with. It is stored as
    /// the lease value and is unique to this claim.
    pub const fn ticket(&self) -> i64 {
        self.ticket
    }

    /// Number of tickets drawn before the claim succeeded.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn key(&self) -> String {
        worker_id_key(self.worker_id)
    }
}

/// Acquires, renews and releases worker-ID leases.
///
/// # Example
///
/// ```
/// use flakeid::{LeaseConfig, MemoryStore, WorkerIdLeaseManager};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let manager = WorkerIdLeaseManager::new(MemoryStore::new(), LeaseConfig::default()).unwrap();
/// let lease = manager.acquire().await.unwrap();
/// assert!(lease.worker_id() < 64);
/// assert!(manager.renew(lease.worker_id()).await.unwrap());
/// assert!(manager.release(&lease).await.unwrap());
/// # });
/// ```
pub struct WorkerIdLeaseManager<S> {
    store: S,
    config: LeaseConfig,
}

impl<S> WorkerIdLeaseManager<S>
where
    S: CoordinationStore,
{
    /// # Errors
    ///
    /// See [`LeaseConfig::validate`].
    pub fn new(store: S, config: LeaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub const fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Claims a worker ID no other live process holds.
    ///
    /// Draws up to `max_attempts` tickets. For each one the candidate ID is
    /// `ticket mod max_worker_id`; the claim succeeds if this process creates
    /// the candidate's lease key.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerIdPoolExhausted`] if every candidate was taken.
    /// - [`Error::CoordinationStoreUnavailable`] if a store operation kept
    ///   failing or timing out.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn acquire(&self) -> Result<WorkerIdLease> {
        let pool = i64::try_from(self.config.max_worker_id).unwrap_or(i64::MAX);
        let ttl = self.config.ttl;

        for attempt in 1..=self.config.max_attempts {
            let ticket = self
                .call("increment", self.config.store_retries, || {
                    self.store.increment(WORKER_ID_INCREMENT_KEY)
                })
                .await?;
            let worker_id = ticket.rem_euclid(pool).unsigned_abs();
            let key = worker_id_key(worker_id);

            let mut sends = 0u32;
            let claimed = self
                .call("set_if_absent", self.config.store_retries, || {
                    sends += 1;
                    self.store.set_if_absent(&key, ticket, ttl)
                })
                .await?;

            // A failed send may still have been applied. The ticket is unique
            // to this attempt, so a key holding it is ours and must be freed.
            if !claimed && sends > 1 {
                self.free_unacknowledged_claim(&key, ticket).await?;
            }

            if claimed {
                #[cfg(feature = "tracing")]
                tracing::info!(worker_id, attempts = attempt, "Acquired worker id lease");
                return Ok(WorkerIdLease {
                    worker_id,
                    ticket,
                    attempts: attempt,
                });
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(worker_id, attempt, "Worker id already leased");
        }

        #[cfg(feature = "tracing")]
        tracing::error!(
            attempts = self.config.max_attempts,
            pool = self.config.max_worker_id,
            "Worker id pool exhausted"
        );
        Err(Error::WorkerIdPoolExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Resets the lease TTL of `worker_id`.
    ///
    /// Returns `false` if the lease had already expired; renewal does not
    /// reclaim it. The store is called once, without retries.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if `worker_id` is outside the pool.
    /// - [`Error::CoordinationStoreUnavailable`] if the store call failed or
    ///   timed out.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn renew(&self, worker_id: u64) -> Result<bool> {
        self.check_worker_id(worker_id)?;
        let key = worker_id_key(worker_id);
        let renewed = self
            .call("expire", 0, || self.store.expire(&key, self.config.ttl))
            .await?;

        #[cfg(feature = "tracing")]
        {
            if renewed {
                tracing::trace!(worker_id, "Renewed worker id lease");
            } else {
                tracing::warn!(worker_id, "Worker id lease was lost before renewal");
            }
        }
        Ok(renewed)
    }

    /// Deletes the lease key if it still holds this lease's ticket.
    ///
    /// Returns `false` if the lease had expired or was taken over, or if the
    /// store does not support [`CoordinationStore::delete_if_equals`].
    ///
    /// Ownership is decided by comparing the stored value with the ticket.
    /// Writers that store the candidate worker ID instead of a ticket are not
    /// told apart: a ticket below `max_worker_id` equals its candidate, so
    /// mixing such writers on one store can make release delete a lease it
    /// does not hold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationStoreUnavailable`] if the store kept
    /// failing.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, lease), fields(worker_id = lease.worker_id)))]
    pub async fn release(&self, lease: &WorkerIdLease) -> Result<bool> {
        let key = lease.key();
        let released = self
            .call("delete_if_equals", self.config.store_retries, || {
                self.store.delete_if_equals(&key, lease.ticket)
            })
            .await?;

        #[cfg(feature = "tracing")]
        {
            if released {
                tracing::info!(worker_id = lease.worker_id, "Released worker id lease");
            } else {
                tracing::warn!(
                    worker_id = lease.worker_id,
                    "Worker id lease was no longer held at release"
                );
            }
        }
        Ok(released)
    }

    /// Spawns a task on the current tokio runtime that calls
    /// [`Self::renew`] every `period`.
    ///
    /// The first renewal happens one `period` after the call. Failures are
    /// logged and retried on the next tick.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if `period` is zero.
    pub fn spawn_renewal(self: Arc<Self>, worker_id: u64, period: Duration) -> RenewalHandle
    where
        S: 'static,
    {
        RenewalHandle::spawn(worker_id, period, move || {
            let manager = Arc::clone(&self);
            async move { manager.renew(worker_id).await }
        })
    }

    async fn free_unacknowledged_claim(&self, key: &str, ticket: i64) -> Result<()> {
        let _freed = self
            .call("delete_if_equals", self.config.store_retries, || {
                self.store.delete_if_equals(key, ticket)
            })
            .await?;

        #[cfg(feature = "tracing")]
        {
            if _freed {
                tracing::debug!(key, ticket, "Freed a claim whose reply was lost");
            }
        }
        Ok(())
    }

    fn check_worker_id(&self, worker_id: u64) -> Result<()> {
        if worker_id >= self.config.max_worker_id {
            return Err(Error::InvalidConfiguration {
                field: "worker_id",
                value: worker_id,
                max: self.config.max_worker_id - 1,
            });
        }
        Ok(())
    }

    /// Runs one store operation under `op_timeout`, retrying up to `retries`
    /// more times with jittered exponential backoff.
    async fn call<T, F, Fut>(&self, operation: &'static str, retries: u32, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            let failure = match timeout(self.config.op_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => StoreError::Timeout(self.config.op_timeout),
            };

            if attempt >= retries {
                #[cfg(feature = "tracing")]
                tracing::error!(operation, attempts = attempt + 1, "Coordination store failed: {failure}");
                return Err(Error::CoordinationStoreUnavailable {
                    context: format!("{operation} failed after {} attempts: {failure}", attempt + 1),
                });
            }

            let delay = self.retry_delay(attempt);
            #[cfg(feature = "tracing")]
            tracing::warn!(
                operation,
                attempt = attempt + 1,
                ?delay,
                "Coordination store call failed, retrying: {failure}"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Exponential backoff with equal jitter: half the step is fixed, the
    /// other half random.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let step = self
            .config
            .retry_base_delay
            .saturating_mul(1 << attempt.min(16))
            .min(self.config.max_retry_delay);
        let half = u64::try_from(step.as_micros() / 2).unwrap_or(u64::MAX);
        let jitter = rand::rng().random_range(0..=half);
        Duration::from_micros(half.saturating_add(jitter))
    }
}

impl<S> core::fmt::Debug for WorkerIdLeaseManager<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerIdLeaseManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
