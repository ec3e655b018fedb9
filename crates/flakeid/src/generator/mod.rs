mod atomic;
mod interface;
mod lock;
#[cfg(test)]
mod tests;

pub use atomic::*;
pub use interface::*;
pub use lock::*;

use core::time::Duration;

use crate::{Error, FlakeId, Result};

/// Checks that an identity fits the 6-bit data-center and worker fields.
///
/// # Errors
///
/// Returns [`Error::InvalidConfiguration`] naming the first field out of range.
pub fn validate_identity(data_center_id: u64, worker_id: u64) -> Result<()> {
    if data_center_id > FlakeId::max_data_center_id() {
        return Err(Error::InvalidConfiguration {
            field: "data_center_id",
            value: data_center_id,
            max: FlakeId::max_data_center_id(),
        });
    }
    if worker_id > FlakeId::max_worker_id() {
        return Err(Error::InvalidConfiguration {
            field: "worker_id",
            value: worker_id,
            max: FlakeId::max_worker_id(),
        });
    }
    Ok(())
}

/// The fixed part of every ID a generator emits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Identity {
    pub(crate) data_center_id: u64,
    pub(crate) worker_id: u64,
    pub(crate) epoch_ms: u64,
}

impl Identity {
    pub(crate) fn new(data_center_id: u64, worker_id: u64, epoch: Duration) -> Result<Self> {
        validate_identity(data_center_id, worker_id)?;
        Ok(Self {
            data_center_id,
            worker_id,
            epoch_ms: u64::try_from(epoch.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub(crate) const fn epoch(&self) -> Duration {
        Duration::from_millis(self.epoch_ms)
    }

    /// Checks that an absolute Unix timestamp can be stored relative to the
    /// epoch.
    pub(crate) fn check_timestamp(&self, now_ms: u64) -> Result<u64> {
        now_ms
            .checked_sub(self.epoch_ms)
            .filter(|delta| *delta <= FlakeId::max_timestamp())
            .ok_or(Error::TimestampOutOfRange {
                now_ms,
                epoch_ms: self.epoch_ms,
            })
    }

    /// Packs a timestamp delta returned by [`Self::check_timestamp`] and a
    /// sequence.
    pub(crate) const fn encode(&self, delta: u64, sequence: u64) -> FlakeId {
        FlakeId::from_components(delta, self.data_center_id, self.worker_id, sequence)
    }
}

#[cold]
#[inline(never)]
pub(crate) fn cold_clock_behind(now: u64, last_timestamp: u64) -> Error {
    let behind_by_ms = last_timestamp - now;
    #[cfg(feature = "tracing")]
    tracing::error!(
        now,
        last_timestamp,
        "Clock moved backwards, refusing to generate id for {behind_by_ms}ms"
    );
    Error::ClockRegression { behind_by_ms }
}
