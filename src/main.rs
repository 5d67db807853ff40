mod config;
mod farmer;
mod game;
mod http_client;
mod scheduler;
mod session;
mod stats;
mod tasks;
#[cfg(test)]
mod test_support;
mod token_store;
mod tribe;
mod user;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use config::{Config, ConfigError};
use stats::StatsBook;
use token_store::{StoreError, TokenStore};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Automation client for Dropee game accounts", long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[clap(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the accounts file.
    #[clap(long, default_value = "accounts.json")]
    accounts: PathBuf,

    /// Path to the cached token file.
    #[clap(long, default_value = "tokens.json")]
    tokens: PathBuf,

    /// Path to the statistics file.
    #[clap(long, default_value = "stats.json")]
    stats_file: PathBuf,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process all accounts (the default when no subcommand is given).
    Run {
        /// Do a single scan and exit instead of looping.
        #[clap(long)]
        once: bool,

        /// Override the configured seconds between scans.
        #[clap(long)]
        interval: Option<u64>,
    },
    /// Print accumulated per-account statistics and exit.
    Stats,
}

#[derive(Debug)]
enum AppError {
    Config(ConfigError),
    Store(StoreError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "Configuration error: {}", err),
            AppError::Store(err) => write!(f, "Token store error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(Command::Stats) = args.command {
        StatsBook::open(args.stats_file).print();
        return Ok(());
    }

    let (once, interval) = match args.command {
        Some(Command::Run { once, interval }) => (once, interval),
        _ => (false, None),
    };

    let mut config = Config::load_or_create(&args.config)?;
    if let Some(interval) = interval {
        config.check_interval = interval;
    }
    let config = Arc::new(config);
    let store = TokenStore::open(args.tokens)?;
    let stats = StatsBook::open(args.stats_file);

    if once {
        let accounts = config::load_accounts(&args.accounts)?;
        let summary = scheduler::run_scan(&accounts, config, store, stats).await;
        info!(
            "single scan done: {} account(s) ok, {} failed",
            summary.succeeded, summary.failed
        );
        return Ok(());
    }

    scheduler::run_forever(args.accounts, config, store, stats).await;
    Ok(())
}
