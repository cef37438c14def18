use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::hasher::ContentHash;

/// How finished artifacts are recognized across runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// `output/<original filename>`; presence alone means done
    Name,

    /// `output/<sha256 of source>_<original filename>`
    #[default]
    Hash,
}

impl std::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Hash => write!(f, "hash"),
        }
    }
}

/// Identity of one episode's audio for cache purposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Last path segment of the source URL
    pub file_name: String,

    /// Digest of the downloaded source bytes, once known
    pub source_hash: Option<ContentHash>,
}

impl CacheKey {
    /// Key available before anything is downloaded
    pub fn by_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            source_hash: None,
        }
    }

    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.source_hash = Some(hash);
        self
    }
}

/// Decides where normalized artifacts live and whether one can be reused
pub trait EpisodeCache: Send + Sync {
    fn mode(&self) -> CacheMode;

    /// Directory artifacts are written to
    fn output_dir(&self) -> &Path;

    /// Whether keys must carry the source hash before they resolve
    fn needs_source_hash(&self) -> bool;

    /// Where the artifact for `key` belongs, or `None` if the key lacks
    /// what this cache keys on.
    fn artifact_path(&self, key: &CacheKey) -> Option<PathBuf>;

    /// An existing artifact that can stand in for `key`
    fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        self.artifact_path(key).filter(|path| path.is_file())
    }

    fn exists(&self, key: &CacheKey) -> bool {
        self.lookup(key).is_some()
    }
}

/// Filename-keyed cache. Cheap, but blind to upstream changes behind an
/// unchanged filename.
#[derive(Debug, Clone)]
pub struct NameCache {
    output_dir: PathBuf,
}

impl NameCache {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }
}

impl EpisodeCache for NameCache {
    fn mode(&self) -> CacheMode {
        CacheMode::Name
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn needs_source_hash(&self) -> bool {
        false
    }

    fn artifact_path(&self, key: &CacheKey) -> Option<PathBuf> {
        Some(self.output_dir.join(&key.file_name))
    }
}

/// Content-keyed cache over the downloaded source bytes.
#[derive(Debug, Clone)]
pub struct HashCache {
    output_dir: PathBuf,
}

impl HashCache {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    /// Any artifact produced from the same bytes under another filename.
    /// The lexicographically first one wins so repeated runs agree.
    fn find_by_hash(&self, hash: &ContentHash) -> Option<PathBuf> {
        let prefix = format!("{}_", hash);
        let entries = std::fs::read_dir(&self.output_dir).ok()?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        matches.sort();
        matches.into_iter().next()
    }
}

impl EpisodeCache for HashCache {
    fn mode(&self) -> CacheMode {
        CacheMode::Hash
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn needs_source_hash(&self) -> bool {
        true
    }

    fn artifact_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let hash = key.source_hash.as_ref()?;
        Some(self.output_dir.join(format!("{}_{}", hash, key.file_name)))
    }

    fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let exact = self.artifact_path(key)?;
        if exact.is_file() {
            return Some(exact);
        }
        key.source_hash.as_ref().and_then(|hash| self.find_by_hash(hash))
    }
}

/// Build the cache implementation selected by configuration
pub fn cache_for(mode: CacheMode, output_dir: impl Into<PathBuf>) -> Arc<dyn EpisodeCache> {
    match mode {
        CacheMode::Name => Arc::new(NameCache::new(output_dir)),
        CacheMode::Hash => Arc::new(HashCache::new(output_dir)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_name_cache_paths() {
        let dir = tempdir().unwrap();
        let cache = NameCache::new(dir.path());
        let key = CacheKey::by_name("ep1.mp3");

        assert_eq!(cache.artifact_path(&key), Some(dir.path().join("ep1.mp3")));
        assert!(!cache.exists(&key));

        std::fs::write(dir.path().join("ep1.mp3"), b"x").unwrap();
        assert!(cache.exists(&key));
    }

    #[test]
    fn test_name_cache_ignores_content() {
        let dir = tempdir().unwrap();
        let cache = NameCache::new(dir.path());
        std::fs::write(dir.path().join("ep1.mp3"), b"old").unwrap();

        let key = CacheKey::by_name("ep1.mp3").with_hash(ContentHash::of_bytes(b"new"));
        assert!(cache.exists(&key));
    }

    #[test]
    fn test_hash_cache_needs_hash() {
        let dir = tempdir().unwrap();
        let cache = HashCache::new(dir.path());
        std::fs::write(dir.path().join("ep1.mp3"), b"x").unwrap();

        let key = CacheKey::by_name("ep1.mp3");
        assert_eq!(cache.artifact_path(&key), None);
        assert!(!cache.exists(&key));
    }

    #[test]
    fn test_hash_cache_tracks_bytes() {
        let dir = tempdir().unwrap();
        let cache = HashCache::new(dir.path());
        let old = ContentHash::of_bytes(b"old");
        let new = ContentHash::of_bytes(b"new");

        let old_key = CacheKey::by_name("ep1.mp3").with_hash(old.clone());
        let path = cache.artifact_path(&old_key).unwrap();
        assert_eq!(path, dir.path().join(format!("{}_ep1.mp3", old)));
        std::fs::write(&path, b"normalized").unwrap();

        assert!(cache.exists(&old_key));
        assert!(!cache.exists(&CacheKey::by_name("ep1.mp3").with_hash(new)));
    }

    #[test]
    fn test_hash_cache_dedups_across_names() {
        let dir = tempdir().unwrap();
        let cache = HashCache::new(dir.path());
        let hash = ContentHash::of_bytes(b"shared");
        let original = dir.path().join(format!("{}_first.mp3", hash));
        std::fs::write(&original, b"normalized").unwrap();

        let renamed = CacheKey::by_name("second.mp3").with_hash(hash);
        assert_eq!(cache.lookup(&renamed), Some(original));
    }

    #[test]
    fn test_missing_output_dir_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = HashCache::new(dir.path().join("absent"));
        let key = CacheKey::by_name("ep1.mp3").with_hash(ContentHash::of_bytes(b"x"));
        assert_eq!(cache.lookup(&key), None);
    }

    #[test]
    fn test_cache_for_mode() {
        assert_eq!(cache_for(CacheMode::Name, "out").mode(), CacheMode::Name);
        assert_eq!(cache_for(CacheMode::Hash, "out").mode(), CacheMode::Hash);
        assert!(cache_for(CacheMode::Hash, "out").needs_source_hash());
    }
}
