use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::audio::types::{LoudnessMeasurement, LoudnormStats};
use crate::error::{ProbeError, Result};
use crate::tool::{ExternalTool, ToolFailure};

const MAX_VOLUME_LABEL: &str = "max_volume:";
const MEAN_VOLUME_LABEL: &str = "mean_volume:";

/// Measures loudness of an audio file
#[async_trait]
pub trait AudioProber: Send + Sync {
    /// Peak and mean volume
    async fn probe(&self, path: &Path) -> Result<LoudnessMeasurement>;

    /// Integrated loudness (EBU R128) figures
    async fn probe_integrated(&self, path: &Path) -> Result<LoudnormStats>;
}

/// Prober backed by ffmpeg's `volumedetect` and `loudnorm` filters
pub struct FfmpegProber {
    tool: ExternalTool,
}

impl FfmpegProber {
    pub fn new(tool: ExternalTool) -> Self {
        Self { tool }
    }

    /// Run an analysis filter over the whole file and return its diagnostics
    async fn analyze(&self, path: &Path, filter: &str) -> Result<String> {
        let args = [
            OsStr::new("-hide_banner"),
            OsStr::new("-nostdin"),
            OsStr::new("-nostats"),
            OsStr::new("-i"),
            path.as_os_str(),
            OsStr::new("-af"),
            OsStr::new(filter),
            OsStr::new("-f"),
            OsStr::new("null"),
            OsStr::new("-"),
        ];

        let output = self.tool.run(None, args).await.map_err(|failure| match failure {
            ToolFailure::TimedOut => ProbeError::TimedOut {
                path: path.display().to_string(),
                seconds: self.tool.timeout().as_secs(),
            },
            other => ProbeError::ToolFailed {
                path: path.display().to_string(),
                reason: other.to_string(),
            },
        })?;

        Ok(output.stderr)
    }
}

#[async_trait]
impl AudioProber for FfmpegProber {
    async fn probe(&self, path: &Path) -> Result<LoudnessMeasurement> {
        let diagnostics = self.analyze(path, "volumedetect").await?;
        let measurement = parse_volume_report(&diagnostics)?;

        if measurement.is_empty() {
            return Err(ProbeError::NoMeasurement { path: path.display().to_string() }.into());
        }

        debug!("Measured {:?}: {:?}", path, measurement);
        Ok(measurement)
    }

    async fn probe_integrated(&self, path: &Path) -> Result<LoudnormStats> {
        let diagnostics = self.analyze(path, "loudnorm=print_format=json").await?;
        match parse_loudnorm_report(&diagnostics)? {
            Some(stats) => Ok(stats),
            None => Err(ProbeError::NoMeasurement { path: path.display().to_string() }.into()),
        }
    }
}

/// Extract `max_volume` and `mean_volume` from `volumedetect` diagnostics.
///
/// The first line carrying a label wins; later repeats are ignored.
pub fn parse_volume_report(diagnostics: &str) -> Result<LoudnessMeasurement> {
    let mut measurement = LoudnessMeasurement::default();

    for line in diagnostics.lines() {
        if measurement.max_peak_db.is_none() {
            if let Some(value) = labeled_value(line, MAX_VOLUME_LABEL) {
                measurement.max_peak_db = Some(parse_decibels(MAX_VOLUME_LABEL, value)?);
                continue;
            }
        }
        if measurement.mean_volume_db.is_none() {
            if let Some(value) = labeled_value(line, MEAN_VOLUME_LABEL) {
                measurement.mean_volume_db = Some(parse_decibels(MEAN_VOLUME_LABEL, value)?);
            }
        }
    }

    Ok(measurement)
}

fn labeled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.find(label).map(|at| line[at + label.len()..].trim())
}

fn parse_decibels(label: &str, raw: &str) -> Result<f64> {
    let number = raw
        .strip_suffix("dB")
        .or_else(|| raw.strip_suffix("db"))
        .unwrap_or(raw)
        .trim();

    number.parse::<f64>().map_err(|_| {
        ProbeError::MalformedValue {
            label: label.trim_end_matches(':').to_string(),
            value: raw.to_string(),
        }
        .into()
    })
}

/// ffmpeg prints every figure as a JSON string
#[derive(Deserialize)]
struct RawLoudnormReport {
    input_i: Option<String>,
    input_tp: Option<String>,
    input_lra: Option<String>,
    input_thresh: Option<String>,
    output_i: Option<String>,
    output_tp: Option<String>,
    output_lra: Option<String>,
    output_thresh: Option<String>,
}

/// Extract the JSON block printed by `loudnorm=print_format=json`.
///
/// Returns `Ok(None)` when the diagnostics contain no JSON block at all.
pub fn parse_loudnorm_report(diagnostics: &str) -> Result<Option<LoudnormStats>> {
    let mut block = String::new();
    let mut inside = false;

    for line in diagnostics.lines() {
        let line = line.trim();
        if !inside && line.starts_with('{') {
            inside = true;
        }
        if inside {
            block.push_str(line);
            if line.ends_with('}') {
                break;
            }
        }
    }

    if block.is_empty() {
        return Ok(None);
    }

    let raw: RawLoudnormReport = serde_json::from_str(&block)
        .map_err(|e| ProbeError::MalformedReport { reason: e.to_string() })?;

    let output_i = match raw.output_i.as_deref() {
        Some(value) => parse_figure("output_i", value)?,
        None => {
            return Err(ProbeError::MalformedReport {
                reason: "missing output_i".to_string(),
            }
            .into())
        }
    };

    Ok(Some(LoudnormStats {
        input_i: optional_figure("input_i", raw.input_i.as_deref())?,
        input_tp: optional_figure("input_tp", raw.input_tp.as_deref())?,
        input_lra: optional_figure("input_lra", raw.input_lra.as_deref())?,
        input_thresh: optional_figure("input_thresh", raw.input_thresh.as_deref())?,
        output_i,
        output_tp: optional_figure("output_tp", raw.output_tp.as_deref())?,
        output_lra: optional_figure("output_lra", raw.output_lra.as_deref())?,
        output_thresh: optional_figure("output_thresh", raw.output_thresh.as_deref())?,
    }))
}

fn parse_figure(label: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        ProbeError::MalformedValue {
            label: label.to_string(),
            value: raw.to_string(),
        }
        .into()
    })
}

fn optional_figure(label: &str, raw: Option<&str>) -> Result<Option<f64>> {
    raw.map(|value| parse_figure(label, value)).transpose()
}
