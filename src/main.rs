//! Activity Archive CLI
//!
//! ## Usage
//!
//! ```bash
//! # Cached records for one account (all months, or one)
//! activity-archive cached --account 12345 --key "$REFRESH_TOKEN"
//! activity-archive cached --account 12345 --month 2024-01
//!
//! # Partitions on disk
//! activity-archive months --account 12345
//!
//! # Archive a JSON array of activities
//! activity-archive import --account 12345 --file activities.json
//!
//! # Fetch a year through the archive (0 = all time)
//! STRAVA_ACCESS_TOKEN=... activity-archive year --account 12345 --year 2024
//!
//! # Statistics over cached records
//! activity-archive stats --account 12345 --year 2024
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use activity_archive::{
    activities_in_year, calculate_stats, sort_newest_first, Activity, ArchiveStore, Config,
    HttpActivitySource, Month, SyncOptions, SyncOrchestrator, Window,
};

#[derive(Parser, Debug)]
#[command(name = "activity-archive")]
#[command(about = "Encrypted month-partitioned activity cache")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "ACTIVITY_ARCHIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, env = "ACTIVITY_ARCHIVE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Partition encryption key (usually the account's refresh token)
    #[arg(long, env = "ARCHIVE_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print cached records as JSON
    Cached {
        #[arg(long)]
        account: i64,
        /// Only this month (YYYY-MM)
        #[arg(long)]
        month: Option<Month>,
    },
    /// List partitions on disk
    Months {
        #[arg(long)]
        account: i64,
    },
    /// Archive records from a JSON array file
    Import {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch a year (0 = all time) through the archive and print it as JSON
    Year {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        year: i32,
        #[arg(long, env = "STRAVA_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,
    },
    /// Statistics over cached records
    Stats {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        year: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("activity_archive=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }

    let store = Arc::new(ArchiveStore::from_config(&config).await?);

    match args.command {
        Command::Cached { account, month } => {
            let mut records = store
                .get_cached(account, require_key(&args.key)?, month)
                .await;
            sort_newest_first(&mut records);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Months { account } => {
            for month in store.list_months(account).await {
                println!("{month}");
            }
        }
        Command::Import { account, file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let records: Vec<Activity> = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", file.display()))?;
            let report = store
                .archive(account, &records, require_key(&args.key)?)
                .await?;
            info!(
                archived = report.archived,
                skipped_recent = report.skipped_recent,
                skipped_invalid = report.skipped_invalid,
                months = report.months_written.len(),
                "Import complete"
            );
        }
        Command::Year {
            account,
            year,
            access_token,
        } => {
            let key = require_key(&args.key)?;
            let source = HttpActivitySource::new(config.api_base_url.clone())?;
            let orchestrator =
                SyncOrchestrator::new(Arc::clone(&store), source, SyncOptions::from(&config));
            let result = orchestrator
                .activities(account, &access_token, key, Window::from_year(year))
                .await;
            // Let queued writes land before the process exits
            orchestrator.shutdown().await;
            let records = result?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Stats { account, year } => {
            let records = store.get_cached(account, require_key(&args.key)?, None).await;
            let stats = match year {
                Some(year) => calculate_stats(activities_in_year(&records, year)),
                None => calculate_stats(&records),
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn require_key(key: &Option<String>) -> anyhow::Result<&str> {
    key.as_deref()
        .context("an archive key is required (--key or ARCHIVE_KEY)")
}
