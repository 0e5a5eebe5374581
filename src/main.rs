//! ig-crawler main entry point
//!
//! This is the command-line interface for the ig-crawler media feed crawler.

use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use clap::{Parser, ValueEnum};
use ig_crawler::config::{load_config_with_hash, resolve_user_agent, Config};
use ig_crawler::crawler::HttpFetcher;
use ig_crawler::{fetch_profile_image, fetch_resources, Resource};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit status used when the user interrupts a crawl
const ABORTED_EXIT_CODE: i32 = 2;

/// What to fetch for the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetchType {
    /// The high resolution profile picture URL
    Profile,
    /// Every photo and video on the feed
    Posts,
}

/// ig-crawler: enumerate the media of a public profile
///
/// Reads the profile page the way a browser would, then pages through the
/// feed and prints the URL of every photo and video newer than the cutoff.
#[derive(Parser, Debug)]
#[command(name = "ig-crawler")]
#[command(version)]
#[command(about = "Enumerate the media of a public profile", long_about = None)]
struct Cli {
    /// What to fetch
    #[arg(short = 't', long = "type", value_enum, default_value_t = FetchType::Profile)]
    fetch_type: FetchType,

    /// Target username (overrides the configuration file)
    #[arg(short, long)]
    username: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long)]
    concurrency: Option<u32>,

    /// Skip media taken at or before this time (unix seconds, RFC 3339 or YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_after)]
    after: Option<i64>,

    /// User agent to present instead of a random browser one
    #[arg(long)]
    user_agent: Option<String>,

    /// Path to TOML configuration file
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Print posts as JSON
    #[arg(long)]
    json: bool,

    /// Download every post's media into this directory
    #[arg(long, value_name = "DIR")]
    download: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("Operation has been aborted.");
            std::process::exit(ABORTED_EXIT_CODE);
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ig_crawler=info,warn"),
            1 => EnvFilter::new("ig_crawler=debug,info"),
            2 => EnvFilter::new("ig_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses a cutoff given as unix seconds, an RFC 3339 timestamp or a date
fn parse_after(value: &str) -> Result<i64, String> {
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.timestamp());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| format!("invalid cutoff \"{}\"", value))
}

/// Builds the effective configuration from the optional file and the flags
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::new(""),
    };

    let mut overrides = Config::new(cli.username.clone().unwrap_or_default());
    overrides.crawler.concurrency = cli.concurrency.unwrap_or(0);
    overrides.target.after = cli.after.unwrap_or(0);
    overrides.user_agent.value = cli.user_agent.clone();
    config.merge(&overrides);

    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;

    match cli.fetch_type {
        FetchType::Profile => {
            let url = fetch_profile_image(&config)
                .await
                .context("failed to fetch the profile image")?;
            println!("{}", url);
        }
        FetchType::Posts => {
            let resources = fetch_resources(&config)
                .await
                .context("failed to fetch posts")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else {
                for resource in &resources {
                    println!("{}", resource.url);
                }
            }

            if let Some(dir) = &cli.download {
                download_all(&config, &resources, dir).await?;
            }
        }
    }

    Ok(())
}

/// Local file name of the `index`-th resource
fn download_file_name(resource: &Resource, index: usize) -> String {
    resource.file_name().unwrap_or_else(|| {
        let extension = if resource.is_video { "mp4" } else { "jpg" };
        format!("{}_{}.{}", resource.timestamp, index, extension)
    })
}

/// Fetches every resource and writes it under `dir`
async fn download_all(config: &Config, resources: &[Resource], dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let user_agent = resolve_user_agent(config.user_agent.value.as_deref());
    let fetcher = HttpFetcher::from_config(&config.crawler, user_agent)?;

    for (index, resource) in resources.iter().enumerate() {
        let target = dir.join(download_file_name(resource, index));
        let data = resource
            .data(&fetcher)
            .await
            .with_context(|| format!("failed to download {}", resource.url))?;

        tokio::fs::write(&target, &data)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::debug!("Saved {} ({} bytes)", target.display(), data.len());
    }

    tracing::info!("Downloaded {} files to {}", resources.len(), dir.display());
    Ok(())
}
