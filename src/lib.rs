//! # Loudcast
//!
//! Republish a podcast feed with loudness-normalized audio.
//!
//! Loudcast downloads every episode of an RSS feed, measures its levels with
//! ffmpeg, corrects the ones outside an acceptable peak band, and writes a
//! new feed whose enclosures point at the corrected copies. Artifacts are
//! content-addressed, so repeated runs reuse earlier work and produce the
//! same feed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loudcast::{config::Config, runner::Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.feed.url = "https://example.com/podcast.xml".to_string();
//! config.feed.public_base_url = Some("https://cdn.example.com/podcast".to_string());
//!
//! let report = Runner::from_config(config)?.run().await?;
//! report.summary.log();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`feed`] - Feed fetching, parsing and rewriting
//! - [`audio`] - Loudness probing, decisions and normalization
//! - [`cache`] - Content-addressed artifact reuse
//! - [`pipeline`] - Per-episode processing with bounded concurrency
//! - [`publish`] - Pushing results to a git remote
//! - [`config`] - Configuration management
//!
//! ## Custom Backends
//!
//! The network, ffmpeg and git all sit behind traits, so any of them can be
//! swapped out:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use async_trait::async_trait;
//! use loudcast::audio::{AudioProber, LoudnessMeasurement, LoudnormStats};
//! use loudcast::Result;
//!
//! struct FixedProber;
//!
//! #[async_trait]
//! impl AudioProber for FixedProber {
//!     async fn probe(&self, _path: &Path) -> Result<LoudnessMeasurement> {
//!         Ok(LoudnessMeasurement { max_peak_db: Some(-1.5), mean_volume_db: Some(-20.0) })
//!     }
//!
//!     async fn probe_integrated(&self, _path: &Path) -> Result<LoudnormStats> {
//!         unimplemented!()
//!     }
//! }
//! ```

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
mod files;
pub mod pipeline;
pub mod publish;
pub mod runner;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{LoudcastError, Result},
    pipeline::{NormalizationPipeline, RunStatus, RunSummary},
    runner::{RunReport, Runner},
};
