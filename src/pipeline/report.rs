use std::fmt;

use tracing::{info, warn};

use crate::audio::{LoudnessMeasurement, NormalizationDecision};
use crate::feed::Episode;
use crate::pipeline::mapping::Artifact;

/// Where an episode stands in its processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Pending,
    Fetched,
    Measured,
    Decided,

    /// No audio link; left as it is upstream
    Passthrough,

    /// A previous run's artifact was reused
    Cached,

    /// Peak already in band; the source is published unchanged
    Skipped,

    Normalized,
    Failed,
}

impl EpisodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passthrough | Self::Cached | Self::Skipped | Self::Normalized | Self::Failed
        )
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Measured => "measured",
            Self::Decided => "decided",
            Self::Passthrough => "passthrough",
            Self::Cached => "cached",
            Self::Skipped => "skipped",
            Self::Normalized => "normalized",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything learned about one episode during a run
#[derive(Debug, Clone)]
pub struct EpisodeOutcome {
    pub episode: Episode,
    pub state: EpisodeState,
    pub measurement: Option<LoudnessMeasurement>,
    pub decision: Option<NormalizationDecision>,

    /// Integrated loudness of the published artifact (LUFS), when measured
    pub output_loudness: Option<f64>,

    pub artifact: Option<Artifact>,
    pub error: Option<String>,
}

impl EpisodeOutcome {
    pub fn new(episode: Episode) -> Self {
        Self {
            episode,
            state: EpisodeState::Pending,
            measurement: None,
            decision: None,
            output_loudness: None,
            artifact: None,
            error: None,
        }
    }

    /// Move to `next`. Terminal states are final.
    pub fn advance(&mut self, next: EpisodeState) {
        if self.state.is_terminal() {
            return;
        }
        tracing::trace!("{}: {} -> {}", self.episode.label(), self.state, next);
        self.state = next;
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        self.error = Some(error.to_string());
        self.advance(EpisodeState::Failed);
    }
}

/// Running count, mean and range of a loudness figure
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoudnessStats {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl LoudnessStats {
    /// Add a value. Non-finite values (silence) are ignored.
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

impl fmt::Display for LoudnessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean() {
            Some(mean) => write!(
                f,
                "mean {:.2}, min {:.2}, max {:.2} over {} episode(s)",
                mean, self.min, self.max, self.count
            ),
            None => write!(f, "no measurements"),
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The feed has no entries
    Empty,

    /// Entries exist but none carries audio
    NoAudio,

    /// Every audio episode failed
    AllFailed,

    /// Some audio episodes failed
    Partial,

    Complete,
}

/// An episode that could not be processed
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEpisode {
    pub index: usize,
    pub title: String,
    pub error: String,
}

/// Counts and loudness statistics of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passthrough: usize,
    pub cached: usize,
    pub skipped: usize,
    pub normalized: usize,
    pub failed: Vec<FailedEpisode>,

    /// `mean_volume` of every measured source (dB)
    pub mean_volume: LoudnessStats,

    /// Integrated loudness of newly normalized artifacts (LUFS)
    pub output_loudness: LoudnessStats,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[EpisodeOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome.state {
                EpisodeState::Passthrough => summary.passthrough += 1,
                EpisodeState::Cached => summary.cached += 1,
                EpisodeState::Skipped => summary.skipped += 1,
                EpisodeState::Normalized => summary.normalized += 1,
                EpisodeState::Failed => summary.failed.push(FailedEpisode {
                    index: outcome.episode.index,
                    title: outcome.episode.title.clone(),
                    error: outcome.error.clone().unwrap_or_default(),
                }),
                _ => {}
            }

            if let Some(mean) = outcome.measurement.and_then(|m| m.mean_volume_db) {
                summary.mean_volume.record(mean);
            }
            if outcome.state == EpisodeState::Normalized {
                if let Some(loudness) = outcome.output_loudness {
                    summary.output_loudness.record(loudness);
                }
            }
        }

        summary
    }

    /// Episodes that carried audio
    pub fn audio_episodes(&self) -> usize {
        self.total - self.passthrough
    }

    pub fn status(&self) -> RunStatus {
        if self.total == 0 {
            RunStatus::Empty
        } else if self.audio_episodes() == 0 {
            RunStatus::NoAudio
        } else if self.failed.len() == self.audio_episodes() {
            RunStatus::AllFailed
        } else if !self.failed.is_empty() {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        }
    }

    pub fn log(&self) {
        info!(
            "Episodes: {} total, {} normalized, {} skipped, {} cached, {} without audio, {} failed",
            self.total,
            self.normalized,
            self.skipped,
            self.cached,
            self.passthrough,
            self.failed.len()
        );
        info!("Source mean volume (dB): {}", self.mean_volume);
        if self.output_loudness.count() > 0 {
            info!("Normalized loudness (LUFS): {}", self.output_loudness);
        }
        for failure in &self.failed {
            warn!("Failed #{} \"{}\": {}", failure.index + 1, failure.title, failure.error);
        }

        match self.status() {
            RunStatus::Empty => warn!("The feed has no entries"),
            RunStatus::NoAudio => warn!("No entry in the feed carries audio"),
            RunStatus::AllFailed => warn!("Every audio episode failed"),
            RunStatus::Partial | RunStatus::Complete => {}
        }
    }
}
