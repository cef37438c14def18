use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    audio::types::{LoudnessBand, LoudnormTarget, NormalizationStrategy},
    cache::CacheMode,
    error::{ConfigError, Result},
};

/// Main configuration for loudcast
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream feed and rewritten feed settings
    pub feed: FeedConfig,

    /// Channel metadata overrides for the rewritten feed
    pub channel: ChannelConfig,

    /// On-disk layout and caching
    pub storage: StorageConfig,

    /// Loudness decision settings
    pub loudness: LoudnessConfig,

    /// External tool settings
    pub tools: ToolsConfig,

    /// Worker pool settings
    pub pipeline: PipelineConfig,

    /// HTTP client settings
    pub http: HttpConfig,

    /// Git publishing settings
    pub publish: PublishConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.feed.validate()?;
        self.loudness.validate()?;
        self.tools.validate()?;
        self.pipeline.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Upstream feed and output feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// RSS feed to normalize
    pub url: String,

    /// Where the rewritten feed is written
    pub output_file: PathBuf,

    /// Base URL the published artifacts are served from.
    /// When unset, enclosures point at local paths.
    pub public_base_url: Option<String>,

    /// File extension an audio link must carry (without the dot)
    pub audio_extension: String,

    /// Fixed UTC offset, in minutes, used for every `pubDate`
    pub utc_offset_minutes: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://www.nhk.or.jp/s-media/news/podcast/list/v1/all.xml".to_string(),
            output_file: PathBuf::from("updated_feed.xml"),
            public_base_url: None,
            audio_extension: "mp3".to_string(),
            utc_offset_minutes: 9 * 60,
        }
    }
}

impl FeedConfig {
    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingKey { key: "feed.url".to_string() }.into());
        }

        if self.audio_extension.trim().is_empty() {
            return Err(ConfigError::MissingKey { key: "feed.audio_extension".to_string() }.into());
        }

        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid("feed.utc_offset_minutes", self.utc_offset_minutes).into());
        }

        Ok(())
    }
}

/// Channel-level values for the rewritten feed.
///
/// Unset fields are taken from the upstream channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub itunes_image: Option<String>,
    pub itunes_category: Option<String>,
    pub itunes_explicit: Option<bool>,
}

/// Disk layout and cache mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Raw downloaded audio
    pub downloads_dir: PathBuf,

    /// Normalized artifacts
    pub output_dir: PathBuf,

    /// Directory that maps onto `feed.public_base_url`
    pub public_root: PathBuf,

    /// How finished artifacts are recognized across runs
    pub cache_mode: CacheMode,

    /// Keep an existing download instead of fetching it again.
    /// Upstream changes behind an unchanged filename go unnoticed.
    pub reuse_downloads: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("output"),
            public_root: PathBuf::from("."),
            cache_mode: CacheMode::Hash,
            reuse_downloads: false,
        }
    }
}

/// Loudness decision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Lower edge of the acceptable peak band (dB)
    pub band_low: f64,

    /// Upper edge of the acceptable peak band, also the gain target (dB)
    pub band_high: f64,

    /// What to do with out-of-band episodes
    pub strategy: NormalizationStrategy,

    /// Record integrated loudness of normalized outputs
    pub report_integrated: bool,

    /// Targets for full loudness normalization
    pub loudnorm: LoudnormTarget,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        let band = LoudnessBand::default();
        Self {
            band_low: band.low,
            band_high: band.high,
            strategy: NormalizationStrategy::Peak,
            report_integrated: true,
            loudnorm: LoudnormTarget::default(),
        }
    }
}

impl LoudnessConfig {
    /// The acceptable peak band
    pub fn band(&self) -> LoudnessBand {
        LoudnessBand::new(self.band_low, self.band_high)
    }

    fn validate(&self) -> Result<()> {
        if !self.band_low.is_finite() || !self.band_high.is_finite() || self.band_low > self.band_high {
            return Err(invalid(
                "loudness.band",
                format!("{}..{}", self.band_low, self.band_high),
            ).into());
        }

        let target = &self.loudnorm;
        if !(-70.0..=-5.0).contains(&target.integrated) {
            return Err(invalid("loudness.loudnorm.integrated", target.integrated).into());
        }
        if !(-9.0..=0.0).contains(&target.true_peak) {
            return Err(invalid("loudness.loudnorm.true_peak", target.true_peak).into());
        }
        if !(1.0..=50.0).contains(&target.range) {
            return Err(invalid("loudness.loudnorm.range", target.range).into());
        }

        Ok(())
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// ffmpeg executable
    pub ffmpeg: PathBuf,

    /// git executable
    pub git: PathBuf,

    /// Deadline for a single ffmpeg invocation (seconds)
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            git: PathBuf::from("git"),
            timeout_secs: 900,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(invalid("tools.timeout_secs", self.timeout_secs).into());
        }
        Ok(())
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Episodes processed at the same time
    pub concurrency: usize,

    /// Keep failed episodes in the feed, pointing at their original audio
    pub keep_failed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            keep_failed: false,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(invalid("pipeline.concurrency", self.concurrency).into());
        }
        Ok(())
    }
}

/// Each worker runs one ffmpeg process, so stay well below the core count.
fn default_concurrency() -> usize {
    (num_cpus::get() / 2).clamp(2, 4)
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout (seconds)
    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: format!("loudcast/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs", self.timeout_secs).into());
        }
        Ok(())
    }
}

/// Git publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub enabled: bool,

    /// Working tree that holds the feed and artifacts
    pub repo_dir: PathBuf,

    pub remote: String,

    /// Added as `remote` when the repository does not have it yet
    pub remote_url: Option<String>,

    pub branch: String,

    pub commit_message: String,

    /// Deadline for a single git invocation (seconds)
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: PathBuf::from("."),
            remote: "origin".to_string(),
            remote_url: None,
            branch: "master".to_string(),
            commit_message: "Update normalized feed".to_string(),
            timeout_secs: 120,
        }
    }
}
