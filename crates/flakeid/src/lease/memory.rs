use core::time::Duration;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::lease::{CoordinationStore, StoreError};

#[derive(Clone, Copy, Debug)]
struct Entry {
    value: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    failures: AtomicU32,
    stalls: AtomicU32,
}

/// An in-process [`CoordinationStore`].
///
/// Expiry follows [`tokio::time::Instant`], so tests running on a paused
/// runtime can move leases through their lifetime with
/// [`tokio::time::advance`]. Clones share the same keyspace, which lets
/// several lease managers in one test act as separate processes.
///
/// # Example
///
/// ```
/// use core::time::Duration;
/// use flakeid::{CoordinationStore, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// assert_eq!(store.increment("counter").await.unwrap(), 1);
/// assert!(store.set_if_absent("k", 7, Duration::from_secs(5)).await.unwrap());
/// assert!(!store.set_if_absent("k", 8, Duration::from_secs(5)).await.unwrap());
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with [`StoreError::Connection`].
    pub fn fail_next(&self, count: u32) {
        self.inner.failures.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` operations never complete.
    pub fn stall_next(&self, count: u32) {
        self.inner.stalls.store(count, Ordering::SeqCst);
    }

    /// Returns `true` if `key` holds a live value.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// The live value at `key`.
    pub fn value(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    /// Remaining time-to-live of `key`, or `None` if the key is missing,
    /// expired or has no expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now)
    }

    async fn inject_faults(&self) -> Result<(), StoreError> {
        if take_one(&self.inner.stalls) {
            core::future::pending::<()>().await;
        }
        if take_one(&self.inner.failures) {
            return Err(StoreError::Connection("injected failure".to_owned()));
        }
        Ok(())
    }

    /// Runs `f` on the live entry at `key` (expired entries are dropped
    /// first).
    fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut Option<Entry>, Instant) -> R) -> R {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        let mut slot = entries.get(key).copied().filter(|entry| entry.is_live(now));
        let result = f(&mut slot, now);
        match slot {
            Some(entry) => {
                entries.insert(key.to_owned(), entry);
            }
            None => {
                entries.remove(key);
            }
        }
        result
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl CoordinationStore for MemoryStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.inject_faults().await?;
        self.with_entry(key, |slot, _| -> Result<i64, StoreError> {
            let entry = slot.get_or_insert(Entry {
                value: 0,
                expires_at: None,
            });
            entry.value = entry
                .value
                .checked_add(1)
                .ok_or_else(|| StoreError::Protocol(format!("increment of `{key}` overflows")))?;
            Ok(entry.value)
        })
    }

    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration) -> Result<bool, StoreError> {
        self.inject_faults().await?;
        Ok(self.with_entry(key, |slot, now| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Entry {
                value,
                expires_at: now.checked_add(ttl),
            });
            true
        }))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inject_faults().await?;
        Ok(self.with_entry(key, |slot, now| match slot {
            Some(entry) => {
                entry.expires_at = now.checked_add(ttl);
                true
            }
            None => false,
        }))
    }

    async fn delete_if_equals(&self, key: &str, value: i64) -> Result<bool, StoreError> {
        self.inject_faults().await?;
        Ok(self.with_entry(key, |slot, _| {
            if slot.is_some_and(|entry| entry.value == value) {
                *slot = None;
                true
            } else {
                false
            }
        }))
    }
}
