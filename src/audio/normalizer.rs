use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::audio::prober::parse_loudnorm_report;
use crate::audio::types::{LoudnormTarget, NormalizeReport};
use crate::error::{NormalizeError, Result};
use crate::files::published_tempfile;
use crate::tool::{ExternalTool, ToolFailure};

/// Writes a loudness-adjusted copy of an audio file.
///
/// Implementations must be all-or-nothing: when they fail, nothing may be
/// left at `output`.
#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    /// Shift the whole signal by `gain_db`
    async fn apply_gain(&self, input: &Path, output: &Path, gain_db: f64) -> Result<NormalizeReport>;

    /// Integrated-loudness normalization
    async fn apply_full_normalization(&self, input: &Path, output: &Path) -> Result<NormalizeReport>;
}

/// Normalizer backed by ffmpeg's `volume` and `loudnorm` filters
pub struct FfmpegNormalizer {
    tool: ExternalTool,
    target: LoudnormTarget,
}

impl FfmpegNormalizer {
    pub fn new(tool: ExternalTool, target: LoudnormTarget) -> Self {
        Self { tool, target }
    }

    /// Render `input` through `filter` into a hidden file next to `output`,
    /// then move it into place. Returns the tool's diagnostics.
    async fn render(&self, input: &Path, output: &Path, filter: &str) -> Result<String> {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(dir).await?;

        // ffmpeg picks the container from the extension, so keep it.
        let suffix = output
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let partial = published_tempfile(".partial-", &suffix)
            .tempfile_in(dir)?
            .into_temp_path();

        let args = [
            OsStr::new("-hide_banner"),
            OsStr::new("-nostdin"),
            OsStr::new("-nostats"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-af"),
            OsStr::new(filter),
            OsStr::new("-y"),
            partial.as_os_str(),
        ];

        debug!("Rendering {:?} -> {:?} with {}", input, output, filter);
        let result = self.tool.run(None, args).await.map_err(|failure| match failure {
            ToolFailure::TimedOut => NormalizeError::TimedOut {
                path: input.display().to_string(),
                seconds: self.tool.timeout().as_secs(),
            },
            other => NormalizeError::ToolFailed {
                path: input.display().to_string(),
                reason: other.to_string(),
            },
        })?;

        let written = tokio::fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(NormalizeError::MissingOutput { path: output.display().to_string() }.into());
        }

        partial.persist(output).map_err(|e| NormalizeError::Persist {
            path: output.display().to_string(),
            reason: e.error.to_string(),
        })?;

        Ok(result.stderr)
    }
}

#[async_trait]
impl AudioNormalizer for FfmpegNormalizer {
    async fn apply_gain(&self, input: &Path, output: &Path, gain_db: f64) -> Result<NormalizeReport> {
        self.render(input, output, &format!("volume={:.2}dB", gain_db)).await?;
        Ok(NormalizeReport::default())
    }

    async fn apply_full_normalization(&self, input: &Path, output: &Path) -> Result<NormalizeReport> {
        let diagnostics = self.render(input, output, &self.target.filter()).await?;

        // The output is already in place; a garbled report only loses statistics.
        let loudnorm = match parse_loudnorm_report(&diagnostics) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Discarding loudnorm report for {:?}: {}", output, e);
                None
            }
        };

        Ok(NormalizeReport { loudnorm })
    }
}
