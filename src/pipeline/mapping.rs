use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cache::ContentHash;
use crate::feed::Episode;

/// The local audio file that stands in for an episode's upstream audio
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Digest of the source bytes; unknown for filename-keyed cache hits
    pub content_hash: Option<ContentHash>,
    pub local_path: PathBuf,
    pub source_url: String,
    pub size_bytes: u64,
}

/// Episode-to-artifact pairing handed to the feed rewriter, in feed order.
///
/// Episodes without a pair keep their upstream audio, unless excluded.
#[derive(Debug, Clone, Default)]
pub struct FeedMapping {
    pairs: Vec<(Episode, Artifact)>,
    excluded: BTreeSet<usize>,
}

impl FeedMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, episode: Episode, artifact: Artifact) {
        self.pairs.push((episode, artifact));
    }

    /// Drop the episode at `index` from the rewritten feed
    pub fn exclude(&mut self, index: usize) {
        self.excluded.insert(index);
    }

    pub fn is_excluded(&self, index: usize) -> bool {
        self.excluded.contains(&index)
    }

    pub fn artifact_for(&self, index: usize) -> Option<&Artifact> {
        self.pairs
            .iter()
            .find(|(episode, _)| episode.index == index)
            .map(|(_, artifact)| artifact)
    }

    pub fn pairs(&self) -> &[(Episode, Artifact)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
