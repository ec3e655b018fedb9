//! Leases a worker id from the coordination store, then emits IDs to stdout.
//!
//! ```bash
//! # Single node, in-process store
//! flakeid-server --data-center-id 1 --id-count 10
//!
//! # Shared Redis store (build with `--features redis`)
//! REDIS_URL=redis://127.0.0.1:6379 DATA_CENTER_ID=1 flakeid-server --id-count 10
//!
//! # Inspect an ID
//! flakeid-server decode 152167826735435776
//! ```

mod server;

use anyhow::Context;
use clap::Parser;
use flakeid::{
    CoordinationStore, DEFAULT_EPOCH, FlakeId, GeneratorRegistry, IdGenerator, MemoryStore,
    WorkerIdLeaseManager,
};
use server::config::{CliArgs, Command, ServerConfig};
use server::telemetry::init_telemetry;
use std::{
    io::{BufWriter, Write},
    sync::Arc,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    if let Some(Command::Decode { id }) = args.command {
        return decode(id);
    }

    let config = ServerConfig::try_from(args)?;
    init_telemetry()?;
    log_startup_info(&config);

    match config.redis_url.clone() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = flakeid::RedisStore::connect(&url)
                .await
                .context("failed to connect to the coordination store")?;
            run(store, config, std::io::stdout()).await
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("built without the `redis` feature"),
        None => run(MemoryStore::new(), config, std::io::stdout()).await,
    }
}

fn log_startup_info(_config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting ID service with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting ID service for data center {} ({} store)",
            _config.data_center_id,
            if _config.redis_url.is_some() {
                "redis"
            } else {
                "in-process"
            }
        );
    }
}

async fn run<S, W>(store: S, config: ServerConfig, out: W) -> anyhow::Result<()>
where
    S: CoordinationStore + 'static,
    W: Write + Send + 'static,
{
    let manager = Arc::new(WorkerIdLeaseManager::new(store, config.lease.clone())?);

    // Without a worker id no ID may be issued.
    let lease = manager
        .acquire()
        .await
        .context("failed to acquire a worker id lease")?;
    let renewal = Arc::clone(&manager).spawn_renewal(lease.worker_id(), config.renew_interval);

    let result = serve(lease.worker_id(), &config, out).await;

    renewal.shutdown().await;
    if let Err(_e) = manager.release(&lease).await {
        #[cfg(feature = "tracing")]
        tracing::warn!("Failed to release worker id lease, it will expire: {_e}");
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    result
}

/// Emits IDs to `out` until `id_count` is reached or a shutdown signal
/// arrives.
async fn serve<W>(worker_id: u64, config: &ServerConfig, out: W) -> anyhow::Result<()>
where
    W: Write + Send + 'static,
{
    let mut registry = GeneratorRegistry::new(worker_id)?;
    registry.set_default_kind(&config.generator_kind)?;
    let generator = registry.get(Some(config.data_center_id))?;

    if config.id_count == 0 {
        #[cfg(feature = "tracing")]
        tracing::info!(worker_id, "Holding worker id until shutdown");
        shutdown_signal().await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let id_count = config.id_count;
    let mut emitter = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || emit_ids(generator.as_ref(), id_count, &cancel, out))
    };

    tokio::select! {
        joined = &mut emitter => joined.context("ID emitter panicked")?,
        () = shutdown_signal() => {
            cancel.cancel();
            emitter.await.context("ID emitter panicked")?
        }
    }
}

fn emit_ids(
    generator: &dyn IdGenerator,
    count: u64,
    cancel: &CancellationToken,
    out: impl Write,
) -> anyhow::Result<()> {
    let mut out = BufWriter::new(out);
    for _ in 0..count {
        if cancel.is_cancelled() {
            break;
        }
        let id = generator.next_id()?;
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    Ok(())
}

fn decode(id: i64) -> anyhow::Result<()> {
    let raw = u64::try_from(id).context("IDs are never negative")?;
    let id = FlakeId::from_raw(raw);
    let epoch_ms = u64::try_from(DEFAULT_EPOCH.as_millis())?;

    println!("id:             {}", id.as_i64());
    println!("timestamp:      {}", id.timestamp());
    println!("unix millis:    {}", id.unix_millis(epoch_ms));
    println!("data center id: {}", id.data_center_id());
    println!("worker id:      {}", id.worker_id());
    println!("sequence:       {}", id.sequence());
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");
}
