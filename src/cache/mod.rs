//! # Episode Cache
//!
//! Content addressing and reuse of finished artifacts between runs.
//!
//! Two interchangeable strategies sit behind [`EpisodeCache`]:
//!
//! - [`HashCache`] (default) keys on the SHA-256 of the downloaded source
//! - [`NameCache`] keys on the source filename alone

pub mod hasher;
pub mod store;

pub use hasher::{hash_file, ContentHash};
pub use store::{cache_for, CacheKey, CacheMode, EpisodeCache, HashCache, NameCache};
