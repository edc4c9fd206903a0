use anyhow::Context;
use clap::Parser;
use rss_collector::{
    load_config, Collector, CollectorConfig, FeedFetcher, PgItemStore, WorkflowClassifier,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

const WAKE_ATTEMPTS: u32 = 12;
const WAKE_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(
    name = "rss-collector",
    about = "Collects feed items, filters them through an AI relevance classifier and upserts them into Postgres"
)]
struct Cli {
    /// Run a single collection pass and exit.
    #[arg(long)]
    now: bool,

    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if cli.now {
        info!("running a single collection pass");
        return run_once(&config).await;
    }

    info!(
        "running on a {}-day schedule",
        config.schedule.interval_days
    );
    loop {
        wake_feed_service(&config).await;
        if let Err(e) = run_once(&config).await {
            error!("collection run failed: {:#}", e);
        }
        info!("next run in {} days", config.schedule.interval_days);
        tokio::time::sleep(Duration::from_secs(
            config.schedule.interval_days * 24 * 60 * 60,
        ))
        .await;
    }
}

async fn run_once(config: &CollectorConfig) -> anyhow::Result<()> {
    // The one fatal failure of a run: no store connection, no pipeline.
    let store = PgItemStore::connect(&config.database)
        .await
        .context("failed to open store connection")?;

    let collector = Collector::new(
        config,
        FeedFetcher::new(),
        WorkflowClassifier::new(&config.classifier),
        store,
    );
    collector.run().await?;
    Ok(())
}

/// Probe the remote feed bridge before a scheduled run so it has a chance to
/// wake from idle. After the attempts are exhausted the collection proceeds
/// regardless.
async fn wake_feed_service(config: &CollectorConfig) {
    let Some(wake_url) = &config.schedule.wake_url else {
        return;
    };

    let client = reqwest::Client::new();
    for attempt in 1..=WAKE_ATTEMPTS {
        match client.get(wake_url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("feed service awake (status {})", response.status());
                return;
            }
            Ok(response) => warn!(
                "wake probe attempt {}/{} returned status {}",
                attempt,
                WAKE_ATTEMPTS,
                response.status()
            ),
            Err(e) => warn!(
                "wake probe attempt {}/{} failed: {}",
                attempt, WAKE_ATTEMPTS, e
            ),
        }
        if attempt < WAKE_ATTEMPTS {
            tokio::time::sleep(WAKE_RETRY_DELAY).await;
        }
    }
    warn!(
        "feed service did not wake after {} attempts, collecting anyway",
        WAKE_ATTEMPTS
    );
}
