use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tradepost::{AppConfig, Database, ExpirationSweeper};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sweeper")]
#[command(about = "Refunds and retires lapsed trade offers")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, env = "TRADEPOST_DATABASE_URL")]
    database_url: Option<String>,

    /// Seconds between passes; overrides the config file.
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single pass and exit, for cron-style scheduling.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_with_env_overrides(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(interval) = args.interval {
        config.sweeper.interval_seconds = interval;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.level))
        .init();

    let db = Database::from_config(&config.database)
        .await
        .context("opening trade database")?;
    let sweeper = ExpirationSweeper::new(db);

    if args.once {
        let expired = sweeper.sweep().await?;
        tracing::info!(expired, "single sweep pass done");
        return Ok(());
    }

    tracing::info!(
        interval_seconds = config.sweeper.interval_seconds,
        "sweeper started"
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweeper.interval_seconds));
    loop {
        ticker.tick().await;
        if let Err(err) = sweeper.sweep().await {
            tracing::error!(error = %err, "sweep pass failed");
        }
    }
}
