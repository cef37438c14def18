use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::audio::{
    AudioNormalizer, AudioProber, FfmpegNormalizer, FfmpegProber, LoudnessBand,
    NormalizationDecision, NormalizationStrategy,
};
use crate::cache::{cache_for, hash_file, CacheKey, ContentHash, EpisodeCache};
use crate::config::Config;
use crate::error::{FetchError, LoudcastError, NormalizeError, ProbeError, Result};
use crate::feed::{file_name_from_url, Episode, Fetcher, SourceFeed};
use crate::files::published_tempfile;
use crate::pipeline::mapping::{Artifact, FeedMapping};
use crate::pipeline::report::{EpisodeOutcome, EpisodeState, RunSummary};
use crate::tool::ExternalTool;

/// Hex digits of the URL digest prefixed to download names
const URL_DIGEST_LEN: usize = 16;

/// Knobs of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub downloads_dir: PathBuf,
    pub band: LoudnessBand,
    pub strategy: NormalizationStrategy,

    /// Measure integrated loudness of gain-corrected artifacts
    pub report_integrated: bool,

    pub concurrency: usize,
    pub keep_failed: bool,

    /// Use an existing download instead of fetching again
    pub reuse_downloads: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            downloads_dir: config.storage.downloads_dir.clone(),
            band: config.loudness.band(),
            strategy: config.loudness.strategy,
            report_integrated: config.loudness.report_integrated,
            concurrency: config.pipeline.concurrency,
            keep_failed: config.pipeline.keep_failed,
            reuse_downloads: config.storage.reuse_downloads,
        }
    }
}

/// Result of processing every episode of a feed
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// One outcome per episode, in feed order
    pub outcomes: Vec<EpisodeOutcome>,
    pub mapping: FeedMapping,
    pub summary: RunSummary,
}

/// Drives each episode from download to a published artifact.
///
/// Episodes are independent: a failure is recorded on its own outcome
/// and never stops the others.
pub struct NormalizationPipeline {
    settings: PipelineSettings,
    fetcher: Arc<dyn Fetcher>,
    prober: Arc<dyn AudioProber>,
    normalizer: Arc<dyn AudioNormalizer>,
    cache: Arc<dyn EpisodeCache>,
}

impl NormalizationPipeline {
    pub fn new(
        settings: PipelineSettings,
        fetcher: Arc<dyn Fetcher>,
        prober: Arc<dyn AudioProber>,
        normalizer: Arc<dyn AudioNormalizer>,
        cache: Arc<dyn EpisodeCache>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            prober,
            normalizer,
            cache,
        }
    }

    /// Pipeline backed by ffmpeg, downloading through `fetcher`
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let ffmpeg = ExternalTool::new(&config.tools.ffmpeg, config.tools.timeout());

        Self::new(
            PipelineSettings::from_config(config),
            fetcher,
            Arc::new(FfmpegProber::new(ffmpeg.clone())),
            Arc::new(FfmpegNormalizer::new(ffmpeg, config.loudness.loudnorm)),
            cache_for(config.storage.cache_mode, &config.storage.output_dir),
        )
    }

    pub fn cache(&self) -> &Arc<dyn EpisodeCache> {
        &self.cache
    }

    /// Process every episode, at most `concurrency` at a time.
    ///
    /// Outcomes and the mapping are in feed order regardless of completion
    /// order.
    pub async fn run(&self, feed: &SourceFeed) -> Result<PipelineRun> {
        tokio::fs::create_dir_all(&self.settings.downloads_dir).await?;
        tokio::fs::create_dir_all(self.cache.output_dir()).await?;

        let concurrency = self.settings.concurrency.max(1);
        info!(
            "Processing {} episode(s), {} with audio, {} at a time ({} cache)",
            feed.episodes.len(),
            feed.audio_count(),
            concurrency,
            self.cache.mode()
        );

        let mut outcomes: Vec<EpisodeOutcome> = stream::iter(feed.episodes.iter().cloned())
            .map(|episode| self.process(episode))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|outcome| outcome.episode.index);

        let mapping = self.mapping_for(&outcomes);
        let summary = RunSummary::from_outcomes(&outcomes);

        Ok(PipelineRun {
            outcomes,
            mapping,
            summary,
        })
    }

    /// Process one episode to a terminal state
    pub async fn process(&self, episode: Episode) -> EpisodeOutcome {
        let mut outcome = EpisodeOutcome::new(episode);

        let Some(url) = outcome.episode.source_audio_url.clone() else {
            debug!("{} has no audio link", outcome.episode.label());
            outcome.advance(EpisodeState::Passthrough);
            return outcome;
        };

        if let Err(e) = self.process_audio(&mut outcome, &url).await {
            warn!("{} failed: {}", outcome.episode.label(), e);
            outcome.fail(e);
        }
        outcome
    }

    async fn process_audio(&self, outcome: &mut EpisodeOutcome, url: &str) -> Result<()> {
        let file_name = file_name_from_url(url).ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        let mut key = CacheKey::by_name(file_name.clone());

        // Filename-keyed hits need no download at all
        if !self.cache.needs_source_hash() {
            if let Some(path) = self.cache.lookup(&key) {
                return self.reuse(outcome, url, path, None).await;
            }
        }

        let source = self.fetch(url, &file_name).await?;
        outcome.advance(EpisodeState::Fetched);

        if self.cache.needs_source_hash() {
            let hash = hash_file(&source).await?;
            key = key.with_hash(hash.clone());
            if let Some(path) = self.cache.lookup(&key) {
                return self.reuse(outcome, url, path, Some(hash)).await;
            }
        }

        let measurement = self.prober.probe(&source).await?;
        outcome.measurement = Some(measurement);
        outcome.advance(EpisodeState::Measured);

        let peak = measurement.max_peak_db.ok_or_else(|| ProbeError::MissingField {
            path: source.display().to_string(),
            field: "max_volume".to_string(),
        })?;

        let decision = self.settings.band.decide(peak, self.settings.strategy);
        outcome.decision = Some(decision);
        outcome.advance(EpisodeState::Decided);
        info!("{}: peak {:.1} dB -> {}", outcome.episode.label(), peak, decision);

        let target = self.cache.artifact_path(&key).ok_or_else(|| {
            LoudcastError::generic(format!("No artifact path for {}", file_name))
        })?;

        let state = match decision {
            NormalizationDecision::Skip => {
                copy_into_place(&source, &target).await?;
                EpisodeState::Skipped
            }
            NormalizationDecision::ApplyGain(gain_db) => {
                self.normalizer.apply_gain(&source, &target, gain_db).await?;
                if self.settings.report_integrated {
                    outcome.output_loudness = self.integrated_loudness(&target).await;
                }
                EpisodeState::Normalized
            }
            NormalizationDecision::ApplyFullNormalization => {
                let report = self.normalizer.apply_full_normalization(&source, &target).await?;
                outcome.output_loudness = match report.loudnorm {
                    Some(stats) => Some(stats.output_i),
                    None if self.settings.report_integrated => {
                        self.integrated_loudness(&target).await
                    }
                    None => None,
                };
                EpisodeState::Normalized
            }
        };

        let size_bytes = tokio::fs::metadata(&target).await?.len();
        outcome.artifact = Some(Artifact {
            content_hash: key.source_hash,
            local_path: target,
            source_url: url.to_string(),
            size_bytes,
        });
        outcome.advance(state);
        Ok(())
    }

    async fn reuse(
        &self,
        outcome: &mut EpisodeOutcome,
        url: &str,
        path: PathBuf,
        content_hash: Option<ContentHash>,
    ) -> Result<()> {
        let size_bytes = tokio::fs::metadata(&path).await?.len();
        info!("{}: reusing {:?}", outcome.episode.label(), path);

        outcome.artifact = Some(Artifact {
            content_hash,
            local_path: path,
            source_url: url.to_string(),
            size_bytes,
        });
        outcome.advance(EpisodeState::Cached);
        Ok(())
    }

    async fn fetch(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        let dest = self.settings.downloads_dir.join(download_name(url, file_name));

        if self.settings.reuse_downloads && dest.is_file() {
            debug!("Using existing download {:?}", dest);
            return Ok(dest);
        }

        info!("Downloading {}", url);
        self.fetcher.download(url, &dest).await?;
        Ok(dest)
    }

    /// Post-normalization loudness; only feeds the statistics
    async fn integrated_loudness(&self, path: &Path) -> Option<f64> {
        match self.prober.probe_integrated(path).await {
            Ok(stats) => Some(stats.file_loudness()),
            Err(e) => {
                warn!("Could not measure integrated loudness of {:?}: {}", path, e);
                None
            }
        }
    }

    fn mapping_for(&self, outcomes: &[EpisodeOutcome]) -> FeedMapping {
        let mut mapping = FeedMapping::new();
        for outcome in outcomes {
            match &outcome.artifact {
                Some(artifact) => mapping.insert(outcome.episode.clone(), artifact.clone()),
                None if outcome.state == EpisodeState::Failed && !self.settings.keep_failed => {
                    mapping.exclude(outcome.episode.index)
                }
                None => {}
            }
        }
        mapping
    }
}

/// Download file name, unique per source URL and stable across runs
fn download_name(url: &str, file_name: &str) -> String {
    let digest = ContentHash::of_bytes(url.as_bytes());
    format!("{}_{}", &digest.as_str()[..URL_DIGEST_LEN], file_name)
}

/// Publish the source unchanged under the artifact path
async fn copy_into_place(source: &Path, target: &Path) -> Result<()> {
    let source = source.to_path_buf();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let partial = published_tempfile(".partial-", "").tempfile_in(&dir)?;
        std::fs::copy(&source, partial.path())?;
        partial.persist(&target).map_err(|e| NormalizeError::Persist {
            path: target.display().to_string(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    })
    .await
    .map_err(|e| LoudcastError::generic(format!("Copy task failed: {}", e)))?
}
