use crate::FlakeId;

/// Represents the result of polling a generator for a new ID.
///
/// This type models the outcome of `try_poll_id()`:
///
/// - [`IdGenStatus::Ready`] indicates a new ID was successfully generated.
/// - [`IdGenStatus::Pending`] means the generator cannot produce an ID until
///   the clock advances by `yield_for` milliseconds (the sequence for the
///   current millisecond is exhausted), or, for lock-free generators, that a
///   concurrent caller won the race and the poll should be retried at once
///   (`yield_for == 0`).
///
/// A clock that moved backwards is never reported as `Pending`; it is an
/// [`Error::ClockRegression`].
///
/// # Example
///
/// ```
/// use flakeid::{IdGenStatus, LockSnowflakeGenerator, TimeSource};
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1_700_000_000_000
///     }
/// }
///
/// let generator = LockSnowflakeGenerator::new(1, 1, FixedTime).unwrap();
/// match generator.try_poll_id().unwrap() {
///     IdGenStatus::Ready { id } => println!("ID: {}", id),
///     IdGenStatus::Pending { yield_for } => println!("Back off for: {yield_for}ms"),
/// }
/// ```
///
/// [`Error::ClockRegression`]: crate::Error::ClockRegression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: FlakeId,
    },
    /// No ID could be generated right now.
    Pending {
        /// Milliseconds to wait before polling again.
        yield_for: u64,
    },
}
