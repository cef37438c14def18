//! # Normalization Pipeline
//!
//! Takes every episode of a feed through fetch, hash, cache lookup, probe,
//! decision and normalization, with bounded concurrency.
//!
//! Each episode ends in exactly one of the terminal [`EpisodeState`]s.
//! The resulting [`FeedMapping`] pairs episodes with the artifacts that
//! replace their upstream audio.

pub mod engine;
pub mod mapping;
pub mod report;

pub use engine::{NormalizationPipeline, PipelineRun, PipelineSettings};
pub use mapping::{Artifact, FeedMapping};
pub use report::{EpisodeOutcome, EpisodeState, FailedEpisode, LoudnessStats, RunStatus, RunSummary};
