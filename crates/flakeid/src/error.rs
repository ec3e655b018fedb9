//! Error types for ID generation and worker-id leasing.
//!
//! Every fallible operation in this crate returns [`Error`]. The variants map
//! one-to-one onto the failure modes a caller has to tell apart:
//!
//! - `InvalidConfiguration`: a data-center or worker id outside its bit width.
//!   A deployment error, never retried.
//! - `ClockRegression`: the wall clock moved behind the last issued timestamp.
//!   Fatal for that call; the caller must not reuse a stale sequence.
//! - `TimestampOutOfRange`: the clock is before the epoch or past the last
//!   timestamp the layout can hold.
//! - `InvalidArgument`: a required argument was absent.
//! - `UnsupportedGeneratorKind`: the registry has no constructor for a kind,
//!   or the constructor failed.
//! - `WorkerIdPoolExhausted`: every worker id is leased by a live process.
//! - `CoordinationStoreUnavailable`: the shared store failed or timed out.

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the `flakeid` crate.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A generator identity component does not fit its bit field.
    #[error("invalid configuration: {field} must be in [0, {max}], got {value}")]
    InvalidConfiguration {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// The clock reported a time earlier than the last issued timestamp.
    #[error("clock moved backwards, refusing to generate id for {behind_by_ms} milliseconds")]
    ClockRegression { behind_by_ms: u64 },

    /// The clock cannot be encoded relative to the generator epoch.
    #[error("timestamp {now_ms} is outside the representable range for epoch {epoch_ms}")]
    TimestampOutOfRange { now_ms: u64, epoch_ms: u64 },

    /// A required argument was not supplied.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// No constructor is registered for the kind, or it failed to build.
    #[error("unsupported generator kind `{kind}`")]
    UnsupportedGeneratorKind {
        kind: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// All worker ids in the shared pool are currently leased.
    #[error("worker id pool exhausted after {attempts} attempts")]
    WorkerIdPoolExhausted { attempts: u32 },

    /// The coordination store could not be reached or failed the operation.
    #[error("coordination store unavailable: {context}")]
    CoordinationStoreUnavailable { context: String },
}

impl Error {
    /// Returns `true` for failures that may succeed if the operation is
    /// attempted again later.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CoordinationStoreUnavailable { .. })
    }
}
