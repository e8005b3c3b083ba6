use anyhow::{Context, Result};
use clap::Parser;
use reqwest::redirect::Policy;
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use podcast_ingest::config::Config;
use podcast_ingest::episode::{Classifier, Extractor};
use podcast_ingest::pipeline::{Pipeline, RunSummary};
use podcast_ingest::store::{NotionStore, RecordStore};

#[derive(Parser, Debug)]
#[command(
    name = "podcast-ingest",
    version,
    about = "Ingest podcast episodes from an RSS feed into a Notion database"
)]
struct Args {
    /// Config file (default: ~/.config/podcast-ingest/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read feed markup from a file instead of fetching it
    #[arg(long, value_name = "PATH")]
    feed_file: Option<PathBuf>,

    /// Resolve new episodes without saving them
    #[arg(long)]
    dry_run: bool,

    /// Only verify the Notion connection
    #[arg(long)]
    check: bool,
}

/// Get the default config path (~/.config/podcast-ingest/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("podcast-ingest")
        .join("config.toml"))
}

fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

fn http_client() -> Result<reqwest::Client> {
    // PERF-019: one pooled client shared by the feed fetch and the store
    reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

fn check_feed_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("Invalid feed URL: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("Feed URL must use http or https: {raw}");
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", summary.message);
    println!(
        "  fetched: {}  new: {}  saved: {}  failed: {}",
        summary.fetched,
        summary.new,
        summary.succeeded(),
        summary.failed()
    );
    println!(
        "  with audio: {}  with duration: {}  last 7 days: {}",
        summary.stats.with_audio, summary.stats.with_duration, summary.stats.recent
    );

    for episode in &summary.pending {
        println!("  [dry-run] {} ({}) -> {}", episode.title, episode.id, episode.category);
    }
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(_) => println!("  ✓ {}", outcome.title),
            Err(e) => println!("  ✗ {}: {}", outcome.title, e),
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env();
    tracing::debug!(?config, "Effective configuration");

    let needs_feed_url = !args.check && args.feed_file.is_none();
    config.validate(needs_feed_url)?;

    let client = http_client()?;

    // validate() guarantees both are present
    let api_key = config.store.api_key.clone().unwrap_or_default();
    let database_id = config.store.database_id.clone().unwrap_or_default();
    let store = NotionStore::new(client.clone(), SecretString::from(api_key), database_id)
        .with_base_url(config.store.base_url.clone());

    if args.check {
        let name = store
            .check_connection()
            .await
            .context("Notion connection check failed")?;
        println!("Connected to Notion database: {name}");
        return Ok(());
    }

    let ruleset = config.ruleset().context("Invalid classifier configuration")?;
    let extractor = Extractor::new(
        Classifier::new(Arc::new(ruleset)),
        config.channel_id.clone(),
    );
    let pipeline = Pipeline::new(store, extractor)
        .page_size(config.store.page_size)
        .persist_options(config.persist.options())
        .dry_run(args.dry_run);

    let summary = match &args.feed_file {
        Some(path) => {
            let markup = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read feed file {}", path.display()))?;
            pipeline.run_markup(&markup).await?
        }
        None => {
            let feed_url = config.feed_url.as_deref().unwrap_or_default();
            check_feed_url(feed_url)?;
            pipeline.run(&client, feed_url).await?
        }
    };

    print_summary(&summary);
    if summary.failed() > 0 {
        // Item failures are reported, not fatal
        tracing::warn!(failed = summary.failed(), "Some episodes were not saved");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Run failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
