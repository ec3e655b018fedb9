use core::{cmp::Ordering, time::Duration};
use std::sync::Arc;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    DEFAULT_EPOCH, FlakeId, IdGenStatus, Result, SystemClock, TimeSource,
    generator::{IdGenerator, Identity, cold_clock_behind},
};

/// Kind name of [`LockSnowflakeGenerator`] in a [`GeneratorRegistry`].
///
/// [`GeneratorRegistry`]: crate::GeneratorRegistry
pub const SNOWFLAKE_KIND: &str = "snowflake";

#[derive(Clone, Copy, Debug, Default)]
struct State {
    last_timestamp: u64,
    sequence: u64,
}

/// A lock-based Snowflake ID generator suitable for multi-threaded
/// environments.
///
/// The last issued timestamp and the sequence live behind a
/// [`parking_lot::Mutex`]. The clock is read while the lock is held, so every
/// caller observes a strictly serialized view of the state.
///
/// Clones share state: a clone is the same generator, not a second one with
/// the same identity.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Fair access across threads
/// - ✅ Reports a clock moving backwards as [`Error::ClockRegression`]
///
/// ## See Also
/// - [`AtomicSnowflakeGenerator`]
///
/// [`Error::ClockRegression`]: crate::Error::ClockRegression
/// [`AtomicSnowflakeGenerator`]: crate::AtomicSnowflakeGenerator
#[derive(Clone)]
pub struct LockSnowflakeGenerator<T = SystemClock>
where
    T: TimeSource,
{
    #[cfg(feature = "cache-padded")]
    state: Arc<crossbeam_utils::CachePadded<Mutex<State>>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Arc<Mutex<State>>,
    identity: Identity,
    time: T,
}

impl<T> LockSnowflakeGenerator<T>
where
    T: TimeSource,
{
    /// Creates a new [`LockSnowflakeGenerator`] for `(data_center_id,
    /// worker_id)` measuring time from [`DEFAULT_EPOCH`].
    ///
    /// # Parameters
    ///
    /// - `data_center_id`: Deployment, region or shard, in `[0, 63]`.
    /// - `worker_id`: The process-unique worker ID, in `[0, 63]`. Usually
    ///   obtained from a [`WorkerIdLeaseManager`].
    /// - `time`: A [`TimeSource`] implementation (e.g., [`SystemClock`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either ID is out of range.
    ///
    /// # Example
    /// ```
    /// use flakeid::{IdGenerator, LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(1, 1, SystemClock).unwrap();
    /// let a = generator.next_id().unwrap();
    /// let b = generator.next_id().unwrap();
    /// assert!(b > a);
    /// ```
    ///
    /// [`WorkerIdLeaseManager`]: crate::WorkerIdLeaseManager
    /// [`Error::InvalidConfiguration`]: crate::Error::InvalidConfiguration
    pub fn new(data_center_id: u64, worker_id: u64, time: T) -> Result<Self> {
        Self::with_epoch(data_center_id, worker_id, DEFAULT_EPOCH, time)
    }

    /// Creates a generator measuring time from a custom epoch.
    ///
    /// The epoch must stay fixed for as long as IDs issued against it exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either ID is out of range.
    ///
    /// [`Error::InvalidConfiguration`]: crate::Error::InvalidConfiguration
    pub fn with_epoch(
        data_center_id: u64,
        worker_id: u64,
        epoch: Duration,
        time: T,
    ) -> Result<Self> {
        Self::from_components(data_center_id, worker_id, epoch, 0, 0, time)
    }

    /// Creates a generator preloaded with a last timestamp (absolute Unix
    /// millis) and sequence.
    ///
    /// This is useful for tests and for resuming a generator whose last state
    /// is known.
    ///
    /// # ⚠️ Note
    /// In typical use cases, you should prefer [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if either ID is out of range.
    ///
    /// [`Error::InvalidConfiguration`]: crate::Error::InvalidConfiguration
    pub fn from_components(
        data_center_id: u64,
        worker_id: u64,
        epoch: Duration,
        last_timestamp: u64,
        sequence: u64,
        time: T,
    ) -> Result<Self> {
        let identity = Identity::new(data_center_id, worker_id, epoch)?;
        let state = State {
            last_timestamp,
            sequence: sequence.min(FlakeId::max_sequence()),
        };
        Ok(Self {
            #[cfg(feature = "cache-padded")]
            state: Arc::new(crossbeam_utils::CachePadded::new(Mutex::new(state))),
            #[cfg(not(feature = "cache-padded"))]
            state: Arc::new(Mutex::new(state)),
            identity,
            time,
        })
    }

    /// Attempts to generate the next available ID.
    ///
    /// # Returns
    /// - `Ok(IdGenStatus::Ready { id })`: A new ID is available
    /// - `Ok(IdGenStatus::Pending { yield_for })`: The sequence for this
    ///   millisecond is exhausted; wait `yield_for` milliseconds
    ///
    /// # Errors
    /// - [`Error::ClockRegression`] if the clock is behind the last issued
    ///   timestamp. The state is left untouched.
    /// - [`Error::TimestampOutOfRange`] if the clock cannot be encoded.
    ///
    /// # Example
    /// ```
    /// use flakeid::{IdGenStatus, LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(0, 0, SystemClock).unwrap();
    ///
    /// let id = loop {
    ///     match generator.try_poll_id() {
    ///         Ok(IdGenStatus::Ready { id }) => break id,
    ///         Ok(IdGenStatus::Pending { .. }) => std::thread::yield_now(),
    ///         Err(e) => panic!("Generator error: {}", e),
    ///     }
    /// };
    /// assert_eq!(id.worker_id(), 0);
    /// ```
    ///
    /// [`Error::ClockRegression`]: crate::Error::ClockRegression
    /// [`Error::TimestampOutOfRange`]: crate::Error::TimestampOutOfRange
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_poll_id(&self) -> Result<IdGenStatus> {
        let mut state = self.state.lock();
        let now = self.time.current_millis();

        match now.cmp(&state.last_timestamp) {
            Ordering::Equal => {
                if state.sequence < FlakeId::max_sequence() {
                    let delta = self.identity.check_timestamp(now)?;
                    state.sequence += 1;
                    Ok(IdGenStatus::Ready {
                        id: self.identity.encode(delta, state.sequence),
                    })
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(timestamp = now, "Sequence exhausted");
                    Ok(IdGenStatus::Pending { yield_for: 1 })
                }
            }
            Ordering::Greater => {
                let delta = self.identity.check_timestamp(now)?;
                state.last_timestamp = now;
                state.sequence = 0;
                Ok(IdGenStatus::Ready {
                    id: self.identity.encode(delta, 0),
                })
            }
            Ordering::Less => Err(cold_clock_behind(now, state.last_timestamp)),
        }
    }
}

impl<T> IdGenerator for LockSnowflakeGenerator<T>
where
    T: TimeSource + Send + Sync,
{
    fn kind(&self) -> &'static str {
        SNOWFLAKE_KIND
    }

    fn data_center_id(&self) -> u64 {
        self.identity.data_center_id
    }

    fn worker_id(&self) -> u64 {
        self.identity.worker_id
    }

    fn epoch(&self) -> Duration {
        self.identity.epoch()
    }

    fn try_poll_id(&self) -> Result<IdGenStatus> {
        self.try_poll_id()
    }
}
