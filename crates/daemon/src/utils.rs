use amrdc_core::{find_config_file, load_config, ConfigSource, DEFAULT_INGEST_INTERVAL};
use clap::Parser;
use slog::{o, Drain, Level, Logger};
use std::{
    env,
    time::{Duration, Instant},
};

/// Default CKAN repository hosting the quality-controlled AWS datasets
pub const DEFAULT_CATALOG_URL: &str = "https://amrdcdata.ssec.wisc.edu";

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "AMRDC Daemon - Ingests weather station observations into the warehouse"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $AMRDC_DAEMON_CONFIG, ./daemon.toml,
    /// $XDG_CONFIG_HOME/amrdc-warehouse/daemon.toml, /etc/amrdc-warehouse/daemon.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "AMRDC_DAEMON_LEVEL")]
    pub level: Option<String>,

    /// Base URL of the dataset catalog to discover stations from
    #[arg(short = 'u', long, env = "AMRDC_DAEMON_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// Path to the SQLite warehouse database file
    #[arg(short, long, env = "AMRDC_DAEMON_DB_PATH")]
    pub db_path: Option<String>,

    /// Ingest interval in seconds (upstream files change at most daily)
    #[arg(short, long, env = "AMRDC_DAEMON_SLEEP_INTERVAL")]
    pub sleep_interval: Option<u64>,

    /// Number of station pipelines to run concurrently
    #[arg(short = 'n', long, env = "AMRDC_DAEMON_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Rate limiter refill rate in tokens per second
    #[arg(short, long, env = "AMRDC_DAEMON_REFILL_RATE")]
    pub refill_rate: Option<f64>,

    /// Rate limiter token capacity
    #[arg(short, long, env = "AMRDC_DAEMON_TOKEN_CAPACITY")]
    pub token_capacity: Option<usize>,

    /// HTTP User-Agent header for catalog and resource requests
    #[arg(long, env = "AMRDC_DAEMON_USER_AGENT")]
    pub user_agent: Option<String>,
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn catalog_url(&self) -> String {
        self.catalog_url
            .clone()
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string())
    }

    pub fn db_path(&self) -> String {
        self.db_path
            .clone()
            .unwrap_or_else(|| "./data/warehouse.sqlite".to_string())
    }

    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_INGEST_INTERVAL)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(4)
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate.unwrap_or(0.2)
    }

    pub fn token_capacity(&self) -> usize {
        self.token_capacity.unwrap_or(3)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| "amrdc-warehouse-daemon/1.0".to_string())
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    // Determine config file path
    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("AMRDC_DAEMON_CONFIG", "daemon.toml")
    };

    // Load from config file
    let file_config: Cli = load_config(&source).unwrap_or_default();

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        catalog_url: cli_args.catalog_url.or(file_config.catalog_url),
        db_path: cli_args.db_path.or(file_config.db_path),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        concurrency: cli_args.concurrency.or(file_config.concurrency),
        refill_rate: cli_args.refill_rate.or(file_config.refill_rate),
        token_capacity: cli_args.token_capacity.or(file_config.token_capacity),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_default();
    let log_level = match level_str.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// Token bucket limiting how fast the daemon hits the upstream repository.
pub struct RateLimiter {
    capacity: usize,
    tokens: f64,
    last_refill: Instant,
    refill_rate: f64,
}

impl RateLimiter {
    pub fn new(capacity: usize, refill_rate: f64) -> Self {
        RateLimiter {
            capacity,
            tokens: capacity as f64,
            last_refill: Instant::now(),
            refill_rate,
        }
    }

    fn refill_tokens(&mut self) {
        let now = Instant::now();
        let elapsed_time = now.duration_since(self.last_refill).as_secs_f64();
        let tokens_to_add = elapsed_time * self.refill_rate;

        self.tokens = (self.tokens + tokens_to_add).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Take one token if available, otherwise report how long to wait
    /// before the next token arrives.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill_tokens();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(deficit / self.refill_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_hands_out_capacity_then_blocks() {
        let mut limiter = RateLimiter::new(2, 0.001);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().expect_err("bucket should be empty");
        assert!(wait > Duration::ZERO);
    }
}
