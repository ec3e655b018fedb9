use anyhow::bail;
use clap::{Parser, Subcommand};
use core::time::Duration;
use flakeid::{FlakeId, LeaseConfig, SNOWFLAKE_ATOMIC_KIND, SNOWFLAKE_KIND};

/// Runtime configuration for the `flakeid-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for production.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flakeid-server",
    version,
    about = "Leases a worker id and emits Snowflake-style IDs"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Data-center (deployment, region or shard) encoded into every ID.
    ///
    /// Must be in `[0, 63]`.
    ///
    /// Environment variable: `DATA_CENTER_ID`
    #[arg(long, env = "DATA_CENTER_ID", default_value_t = 0)]
    pub data_center_id: u64,

    /// Redis URL of the shared coordination store, e.g.
    /// `redis://127.0.0.1:6379`.
    ///
    /// Without it, worker ids are leased from an in-process store. That is
    /// only safe when this is the single process using the data-center.
    ///
    /// Environment variable: `REDIS_URL`
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Lifetime of a worker-id lease that is not renewed.
    ///
    /// Environment variable: `LEASE_TTL_SECS`
    #[arg(long, env = "LEASE_TTL_SECS", default_value_t = 3600)]
    pub lease_ttl_secs: u64,

    /// Interval between lease renewals. Must be shorter than the lease TTL.
    ///
    /// Environment variable: `RENEW_INTERVAL_SECS`
    #[arg(long, env = "RENEW_INTERVAL_SECS", default_value_t = 60)]
    pub renew_interval_secs: u64,

    /// Deadline for a single coordination store operation.
    ///
    /// Environment variable: `STORE_TIMEOUT_MS`
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,

    /// Number of candidate worker ids tried before giving up.
    ///
    /// Environment variable: `MAX_ACQUIRE_ATTEMPTS`
    #[arg(long, env = "MAX_ACQUIRE_ATTEMPTS", default_value_t = 64)]
    pub max_acquire_attempts: u32,

    /// Number of IDs to print. `0` holds the lease until a shutdown signal.
    ///
    /// Environment variable: `ID_COUNT`
    #[arg(long, env = "ID_COUNT", default_value_t = 1)]
    pub id_count: u64,

    /// Generator algorithm: `snowflake` (lock-based) or `snowflake-atomic`
    /// (lock-free).
    ///
    /// Environment variable: `GENERATOR_KIND`
    #[arg(long, env = "GENERATOR_KIND", default_value_t = String::from(SNOWFLAKE_KIND))]
    pub generator_kind: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the components of an ID.
    Decode {
        /// The ID as a decimal integer.
        id: i64,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_center_id: u64,
    pub redis_url: Option<String>,
    pub lease: LeaseConfig,
    pub renew_interval: Duration,
    pub id_count: u64,
    pub generator_kind: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.data_center_id > FlakeId::max_data_center_id() {
            bail!(
                "DATA_CENTER_ID ({}) exceeds the data-center ID space (max = {})",
                args.data_center_id,
                FlakeId::max_data_center_id()
            );
        }

        if args.lease_ttl_secs == 0 {
            bail!("LEASE_TTL_SECS must be greater than 0");
        }

        if args.renew_interval_secs == 0 {
            bail!("RENEW_INTERVAL_SECS must be greater than 0");
        }

        if args.renew_interval_secs >= args.lease_ttl_secs {
            bail!(
                "RENEW_INTERVAL_SECS ({}) must be shorter than LEASE_TTL_SECS ({})",
                args.renew_interval_secs,
                args.lease_ttl_secs
            );
        }

        if args.store_timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be greater than 0");
        }

        if args.max_acquire_attempts == 0 {
            bail!("MAX_ACQUIRE_ATTEMPTS must be greater than 0");
        }

        if ![SNOWFLAKE_KIND, SNOWFLAKE_ATOMIC_KIND].contains(&args.generator_kind.as_str()) {
            bail!(
                "GENERATOR_KIND `{}` is not one of `{SNOWFLAKE_KIND}`, `{SNOWFLAKE_ATOMIC_KIND}`",
                args.generator_kind
            );
        }

        if args.redis_url.is_some() && !cfg!(feature = "redis") {
            bail!("REDIS_URL is set but this binary was built without the `redis` feature");
        }

        let lease = LeaseConfig {
            max_attempts: args.max_acquire_attempts,
            ttl: Duration::from_secs(args.lease_ttl_secs),
            op_timeout: Duration::from_millis(args.store_timeout_ms),
            ..LeaseConfig::default()
        };
        lease.validate()?;

        Ok(Self {
            data_center_id: args.data_center_id,
            redis_url: args.redis_url,
            lease,
            renew_interval: Duration::from_secs(args.renew_interval_secs),
            id_count: args.id_count,
            generator_kind: args.generator_kind,
        })
    }
}
