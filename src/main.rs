use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loudcast::{
    audio::NormalizationStrategy,
    cache::CacheMode,
    config::Config,
    publish::PublishOutcome,
    tool::ExternalTool,
    RunStatus, Runner,
};

#[derive(Parser)]
#[command(
    name = "loudcast",
    version,
    about = "Normalize podcast loudness and republish the feed",
    long_about = "Loudcast downloads every episode of a podcast feed, brings its peak level into an acceptable band with ffmpeg, and writes a new feed pointing at the corrected audio. Unchanged episodes are reused between runs."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upstream feed URL
    #[arg(short, long)]
    feed: Option<String>,

    /// Rewritten feed path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Base URL the artifacts are served from
    #[arg(long)]
    public_base_url: Option<String>,

    /// How finished episodes are recognized across runs
    #[arg(long, value_enum)]
    cache_mode: Option<CacheMode>,

    /// Correction applied to out-of-band audio
    #[arg(long, value_enum)]
    strategy: Option<NormalizationStrategy>,

    /// Episodes processed at the same time
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Commit and push the results with git
    #[arg(long)]
    publish: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.feed {
            config.feed.url = url.clone();
        }
        if let Some(output) = &self.output {
            config.feed.output_file = output.clone();
        }
        if let Some(base) = &self.public_base_url {
            config.feed.public_base_url = Some(base.clone());
        }
        if let Some(mode) = self.cache_mode {
            config.storage.cache_mode = mode;
        }
        if let Some(strategy) = self.strategy {
            config.loudness.strategy = strategy;
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if self.publish {
            config.publish.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting loudcast v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    cli.apply(&mut config);
    config.validate()?;

    if let Some(path) = &cli.write_config {
        config.save_to_file(path)?;
        info!("Configuration written to {:?}", path);
        return Ok(());
    }

    let ffmpeg = ExternalTool::new(&config.tools.ffmpeg, config.tools.timeout());
    if !ffmpeg.is_available("-version").await {
        anyhow::bail!(
            "ffmpeg not found at {:?}; install it or set tools.ffmpeg",
            ffmpeg.program()
        );
    }

    info!("Feed: {}", config.feed.url);
    info!("Output: {:?}", config.feed.output_file);
    info!(
        "Cache: {} in {:?}, strategy: {:?}",
        config.storage.cache_mode, config.storage.output_dir, config.loudness.strategy
    );

    let runner = Runner::from_config(config).context("Failed to set up the run")?;
    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    report.summary.log();

    match &report.publish {
        Some(Ok(PublishOutcome::Pushed)) => info!("Published"),
        Some(Ok(PublishOutcome::NothingToCommit)) => info!("Nothing new to publish"),
        Some(Err(reason)) => warn!("Publishing failed: {}", reason),
        None => {}
    }

    match report.summary.status() {
        RunStatus::AllFailed => warn!("Run finished without processing any audio"),
        RunStatus::Partial => warn!("Run finished with {} failed episode(s)", report.summary.failed.len()),
        _ => info!("Run complete! Feed saved to: {:?}", report.feed_path),
    }

    Ok(())
}
