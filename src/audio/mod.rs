//! # Audio Loudness Module
//!
//! Measures and corrects episode loudness through ffmpeg.
//!
//! ## Core Features
//!
//! - **Probing**: peak/mean volume (`volumedetect`) and integrated loudness (`loudnorm`)
//! - **Decisions**: acceptable peak band with gain or full-normalization correction
//! - **Normalization**: atomic rendering of corrected copies
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use loudcast::audio::{AudioProber, FfmpegProber, LoudnessBand, NormalizationStrategy};
//! use loudcast::tool::ExternalTool;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let prober = FfmpegProber::new(ExternalTool::new("ffmpeg", Duration::from_secs(600)));
//! let measurement = prober.probe("episode.mp3".as_ref()).await?;
//!
//! if let Some(peak) = measurement.max_peak_db {
//!     let decision = LoudnessBand::default().decide(peak, NormalizationStrategy::Peak);
//!     println!("Peak {:.1} dB -> {}", peak, decision);
//! }
//! # Ok(())
//! # }
//! ```

pub mod normalizer;
pub mod prober;
pub mod types;
pub use normalizer::{AudioNormalizer, FfmpegNormalizer};
pub use prober::{AudioProber, FfmpegProber};
pub use types::{
    LoudnessBand, LoudnessMeasurement, LoudnormStats, LoudnormTarget,
    NormalizationDecision, NormalizationStrategy, NormalizeReport
};
