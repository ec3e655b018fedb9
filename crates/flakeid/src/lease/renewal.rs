use core::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::Result;

/// A running background renewal task.
///
/// Dropping the handle cancels the task without waiting for it; call
/// [`RenewalHandle::shutdown`] to stop it and wait until it has exited.
#[derive(Debug)]
pub struct RenewalHandle {
    worker_id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl RenewalHandle {
    pub(crate) fn spawn<F, Fut>(worker_id: u64, period: Duration, mut renew: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(_e) = renew().await {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(worker_id, "Lease renewal failed, retrying next tick: {_e}");
                        }
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(worker_id, "Lease renewal stopped");
        });

        Self {
            worker_id,
            _guard: token.clone().drop_guard(),
            token,
            task,
        }
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Returns `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the renewal task and waits for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(_e) = self.task.await {
            #[cfg(feature = "tracing")]
            tracing::error!(worker_id = self.worker_id, "Lease renewal task failed: {_e}");
        }
    }
}
