//! One end-to-end republishing run.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audio::{AudioNormalizer, AudioProber};
use crate::cache::cache_for;
use crate::config::Config;
use crate::error::Result;
use crate::feed::{parse_feed, FeedRewriter, Fetcher, HttpFetcher};
use crate::pipeline::{EpisodeOutcome, NormalizationPipeline, PipelineSettings, RunSummary};
use crate::publish::{GitPublisher, PublishOutcome, Publisher};

/// What a run produced
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub outcomes: Vec<EpisodeOutcome>,
    pub feed_path: PathBuf,

    /// Items written to the rewritten feed
    pub items: usize,

    /// `None` when publishing was not requested
    pub publish: Option<std::result::Result<PublishOutcome, String>>,
}

/// Fetch, process, rewrite and optionally publish
pub struct Runner {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    pipeline: NormalizationPipeline,
    rewriter: FeedRewriter,
    publisher: Option<Arc<dyn Publisher>>,
}

impl Runner {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        prober: Arc<dyn AudioProber>,
        normalizer: Arc<dyn AudioNormalizer>,
        publisher: Option<Arc<dyn Publisher>>,
    ) -> Result<Self> {
        config.validate()?;

        let pipeline = NormalizationPipeline::new(
            PipelineSettings::from_config(&config),
            fetcher.clone(),
            prober,
            normalizer,
            cache_for(config.storage.cache_mode, &config.storage.output_dir),
        );
        let rewriter = FeedRewriter::from_config(&config)?;

        Ok(Self {
            config,
            fetcher,
            pipeline,
            rewriter,
            publisher,
        })
    }

    /// Runner backed by HTTP, ffmpeg and git
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.http)?);
        let pipeline = NormalizationPipeline::from_config(&config, fetcher.clone());
        let rewriter = FeedRewriter::from_config(&config)?;
        let publisher: Option<Arc<dyn Publisher>> = if config.publish.enabled {
            Some(Arc::new(GitPublisher::from_config(&config)))
        } else {
            None
        };

        Ok(Self {
            config,
            fetcher,
            pipeline,
            rewriter,
            publisher,
        })
    }

    /// Run once.
    ///
    /// Only an unreadable feed aborts; per-episode and publishing failures
    /// are carried in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let url = &self.config.feed.url;
        let body = self.fetcher.fetch_feed(url).await?;
        let feed = parse_feed(&body, &self.config.feed.audio_extension)?;
        info!(
            "Feed \"{}\": {} entries, {} with audio",
            feed.channel.title,
            feed.episodes.len(),
            feed.audio_count()
        );

        let run = self.pipeline.run(&feed).await?;

        let document = self.rewriter.rewrite(&feed, &run.mapping)?;
        let feed_path = self.config.feed.output_file.clone();
        document.write_to(&feed_path).await?;
        info!(
            "Rewrote feed with {} item(s), {} served locally",
            document.items(),
            document.local_enclosures()
        );

        let publish = match &self.publisher {
            Some(publisher) => {
                let paths = vec![feed_path.clone(), self.pipeline.cache().output_dir().to_path_buf()];
                Some(match publisher.publish(&paths).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => {
                        error!("{}", e.user_message());
                        Err(e.to_string())
                    }
                })
            }
            None => None,
        };

        if run.mapping.is_empty() && feed.audio_count() > 0 {
            warn!("No episode has a local artifact");
        }

        Ok(RunReport {
            summary: run.summary,
            outcomes: run.outcomes,
            feed_path,
            items: document.items(),
            publish,
        })
    }
}
