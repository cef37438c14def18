use serde::{Deserialize, Serialize};

/// Peak and mean levels reported by a `volumedetect` pass.
///
/// Either field may be missing if the tool printed no matching line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoudnessMeasurement {
    /// Maximum sample level (dBFS)
    pub max_peak_db: Option<f64>,

    /// Mean volume (dBFS)
    pub mean_volume_db: Option<f64>,
}

impl LoudnessMeasurement {
    pub fn is_empty(&self) -> bool {
        self.max_peak_db.is_none() && self.mean_volume_db.is_none()
    }
}

/// Integrated loudness figures printed by ffmpeg's `loudnorm` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnormStats {
    /// Integrated loudness of the input (LUFS)
    pub input_i: Option<f64>,

    /// True peak of the input (dBTP)
    pub input_tp: Option<f64>,

    /// Loudness range of the input (LU)
    pub input_lra: Option<f64>,

    pub input_thresh: Option<f64>,

    /// Integrated loudness after the filter (LUFS)
    pub output_i: f64,

    pub output_tp: Option<f64>,
    pub output_lra: Option<f64>,
    pub output_thresh: Option<f64>,
}

impl LoudnormStats {
    /// Loudness of the analyzed file as it stands
    pub fn file_loudness(&self) -> f64 {
        self.input_i.unwrap_or(self.output_i)
    }
}

/// What to do with one episode's audio
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizationDecision {
    /// Already inside the acceptable band
    Skip,

    /// Shift the whole signal by this many dB
    ApplyGain(f64),

    /// Run integrated-loudness normalization
    ApplyFullNormalization,
}

impl std::fmt::Display for NormalizationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::ApplyGain(db) => write!(f, "gain {:+.2} dB", db),
            Self::ApplyFullNormalization => write!(f, "loudnorm"),
        }
    }
}

/// How out-of-band audio is corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationStrategy {
    /// Uniform gain that moves the peak onto the band's upper edge
    #[default]
    Peak,

    /// ffmpeg `loudnorm` integrated-loudness normalization
    Loudnorm,
}

/// Inclusive band of acceptable peak levels, in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessBand {
    pub low: f64,
    pub high: f64,
}

impl Default for LoudnessBand {
    fn default() -> Self {
        Self { low: -2.5, high: -1.0 }
    }
}

impl LoudnessBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Peak level that gain adjustments aim for
    pub fn target(&self) -> f64 {
        self.high
    }

    pub fn contains(&self, peak_db: f64) -> bool {
        (self.low..=self.high).contains(&peak_db)
    }

    /// Decide how to treat audio whose peak sits at `peak_db`.
    pub fn decide(&self, peak_db: f64, strategy: NormalizationStrategy) -> NormalizationDecision {
        if self.contains(peak_db) {
            return NormalizationDecision::Skip;
        }

        match strategy {
            NormalizationStrategy::Peak => NormalizationDecision::ApplyGain(self.target() - peak_db),
            NormalizationStrategy::Loudnorm => NormalizationDecision::ApplyFullNormalization,
        }
    }
}

/// Targets handed to the `loudnorm` filter.
///
/// Defaults match ffmpeg's own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnormTarget {
    /// Integrated loudness (LUFS)
    pub integrated: f64,

    /// Maximum true peak (dBTP)
    pub true_peak: f64,

    /// Loudness range (LU)
    pub range: f64,
}

impl Default for LoudnormTarget {
    fn default() -> Self {
        Self {
            integrated: -24.0,
            true_peak: -2.0,
            range: 7.0,
        }
    }
}

impl LoudnormTarget {
    /// Filter expression that normalizes and prints a JSON report
    pub fn filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}:print_format=json",
            self.integrated, self.true_peak, self.range
        )
    }
}

/// Result of a successful normalizer run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    /// Integrated loudness figures, when the filter printed them
    pub loudnorm: Option<LoudnormStats>,
}
