use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{LoudcastError, Result};

/// Read size used while hashing
const CHUNK_SIZE: usize = 1024 * 1024;

/// Hex-encoded SHA-256 digest of a file's full contents
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Digest of an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a file on a blocking thread.
pub async fn hash_file(path: &Path) -> Result<ContentHash> {
    let path = path.to_path_buf();
    tracing::debug!("Hashing {:?}", path);

    tokio::task::spawn_blocking(move || hash_file_blocking(&path))
        .await
        .map_err(|e| LoudcastError::generic(format!("Hash task failed: {}", e)))?
}

fn hash_file_blocking(path: &Path) -> Result<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(ContentHash(format!("{:x}", hasher.finalize())))
}
