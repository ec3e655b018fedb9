//! Console logging for the binary.
//!
//! Log records go to stderr so that stdout carries nothing but IDs. The filter
//! is read from `RUST_LOG` and defaults to `info`, e.g.:
//!
//! ```bash
//! RUST_LOG=flakeid=debug flakeid-server --data-center-id 1
//! ```
//!
//! Library events are only emitted when the `tracing` feature is enabled (the
//! default).

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .try_init()?;
    Ok(())
}
