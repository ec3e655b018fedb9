use core::time::Duration;

use crossbeam_utils::Backoff;

use crate::{FlakeId, IdGenStatus, Result};

/// How long a caller sleeps between clock reads once spinning has not seen the
/// millisecond roll over.
pub const EXHAUSTED_SLEEP: Duration = Duration::from_micros(250);

/// The interface every generator kind implements.
///
/// A generator is bound to one `(data_center_id, worker_id)` identity for its
/// whole life and is shared between threads, so implementations serialize
/// their own state.
pub trait IdGenerator: Send + Sync {
    /// Short, stable name of the algorithm (e.g. `"snowflake"`).
    fn kind(&self) -> &'static str;

    /// The data-center ID encoded into every ID.
    fn data_center_id(&self) -> u64;

    /// The worker ID encoded into every ID.
    fn worker_id(&self) -> u64;

    /// The epoch timestamps are measured from.
    fn epoch(&self) -> Duration;

    /// Attempts to generate the next ID without blocking.
    ///
    /// The returned [`IdGenStatus`] contains either:
    /// - the newly generated ID, or
    /// - a duration to yield/sleep if the sequence for the current millisecond
    ///   is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockRegression`] if the clock is behind the last issued
    ///   timestamp.
    /// - [`Error::TimestampOutOfRange`] if the clock is before the epoch or
    ///   past the last representable timestamp.
    ///
    /// [`Error::ClockRegression`]: crate::Error::ClockRegression
    /// [`Error::TimestampOutOfRange`]: crate::Error::TimestampOutOfRange
    fn try_poll_id(&self) -> Result<IdGenStatus>;

    /// Generates the next ID, waiting for the clock to advance if the current
    /// millisecond is exhausted.
    ///
    /// The wait spins briefly and then sleeps [`EXHAUSTED_SLEEP`] between
    /// clock reads. Under a correct clock it resolves within about one
    /// millisecond.
    ///
    /// # Errors
    ///
    /// Propagates every error of [`IdGenerator::try_poll_id`]. Errors are never
    /// retried.
    fn next_flake_id(&self) -> Result<FlakeId> {
        let backoff = Backoff::new();
        loop {
            match self.try_poll_id()? {
                IdGenStatus::Ready { id } => break Ok(id),
                IdGenStatus::Pending { yield_for: 0 } => core::hint::spin_loop(),
                IdGenStatus::Pending { .. } => {
                    if backoff.is_completed() {
                        std::thread::sleep(EXHAUSTED_SLEEP);
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    /// Generates the next ID as a signed 64-bit integer.
    ///
    /// # Errors
    ///
    /// See [`IdGenerator::next_flake_id`].
    fn next_id(&self) -> Result<i64> {
        self.next_flake_id().map(|id| id.as_i64())
    }
}
