use core::{future::Future, time::Duration};

/// Failure reported by a [`CoordinationStore`] backend.
///
/// The lease manager retries these a bounded number of times and then
/// surfaces them as [`Error::CoordinationStoreUnavailable`].
///
/// [`Error::CoordinationStoreUnavailable`]: crate::Error::CoordinationStoreUnavailable
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected reply: {0}")]
    Protocol(String),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// The shared key/value store worker IDs are leased from.
///
/// Leasing needs `increment`, `set_if_absent` and `expire`;
/// `delete_if_equals` only backs [`release`] and has a default.
///
/// Every operation must be atomic with respect to all other processes using
/// the same store. Integer values are stored as decimal strings by network
/// backends, so `set_if_absent` and `delete_if_equals` compare integers.
///
/// [`release`]: crate::WorkerIdLeaseManager::release
pub trait CoordinationStore: Send + Sync {
    /// Atomically increments the integer at `key` (missing keys start at 0)
    /// and returns the new value.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Stores `value` at `key` with a time-to-live if and only if `key` holds
    /// no live value. Returns `true` when this call created the key.
    fn set_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Resets the time-to-live of a live `key`. Returns `false` if the key
    /// had already expired or never existed.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes `key` only if it currently holds `value`. Returns `true` when
    /// the key was deleted.
    ///
    /// Optional: the default deletes nothing and returns `false`, which turns
    /// lease release into a no-op and leaves cleanup to expiry.
    fn delete_if_equals(
        &self,
        _key: &str,
        _value: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async { Ok(false) }
    }
}
