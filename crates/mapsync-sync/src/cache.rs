//! Hash memo for local files

use mapsync_types::{ContentMode, Error, HashAlgorithm, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Memoized digest of one file in one content mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// File path
    pub path: PathBuf,
    /// Hashing mode the digest was computed in
    pub mode: ContentMode,
    /// File size when hashed
    pub size: u64,
    /// Modification time when hashed
    pub modified: SystemTime,
    /// Lowercase hex digest
    pub hash: String,
    /// Number of times this entry has been reused
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(
        path: PathBuf,
        mode: ContentMode,
        size: u64,
        modified: SystemTime,
        hash: String,
    ) -> Self {
        Self {
            path,
            mode,
            size,
            modified,
            hash,
            access_count: 0,
        }
    }

    /// Check if this cache entry is still valid for the given file metadata
    pub fn is_valid(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified == modified
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    algorithm: HashAlgorithm,
    entries: Vec<CacheEntry>,
}

/// In-memory memo keyed by path and content mode
#[derive(Debug)]
pub struct HashCache {
    algorithm: HashAlgorithm,
    entries: HashMap<(PathBuf, ContentMode), CacheEntry>,
    max_entries: usize,
    dirty: bool,
}

impl HashCache {
    /// Default upper bound on memoized entries
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    /// Create an empty memo for `algorithm`
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            entries: HashMap::new(),
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            dirty: false,
        }
    }

    /// Load a memo saved by [`HashCache::to_json`].
    ///
    /// A missing file gives an empty memo. An unreadable file or one written
    /// for another algorithm is discarded with a warning.
    pub async fn load(path: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache file does not exist, starting with empty cache");
                return Ok(Self::new(algorithm));
            }
            Err(e) => {
                return Err(Error::io(format!(
                    "Failed to read cache file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        let file: CacheFile = match serde_json::from_slice(&data) {
            Ok(file) => file,
            Err(e) => {
                warn!("Ignoring unreadable hash cache {}: {}", path.display(), e);
                return Ok(Self::new(algorithm));
            }
        };
        if file.algorithm != algorithm {
            info!(
                "Hash cache {} was written for {}, starting fresh",
                path.display(),
                file.algorithm
            );
            return Ok(Self::new(algorithm));
        }

        let mut cache = Self::new(algorithm);
        for entry in file.entries {
            cache
                .entries
                .insert((entry.path.clone(), entry.mode), entry);
        }
        info!("Loaded {} cache entries from disk", cache.entries.len());
        Ok(cache)
    }

    /// Digest algorithm the memo belongs to
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Limit the number of memoized entries
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Memoized digest, if the file still has the recorded size and mtime
    pub fn get(
        &mut self,
        path: &Path,
        mode: ContentMode,
        size: u64,
        modified: SystemTime,
    ) -> Option<String> {
        let key = (path.to_path_buf(), mode);
        match self.entries.get(&key).map(|e| e.is_valid(size, modified)) {
            Some(true) => {
                let entry = self.entries.get_mut(&key)?;
                entry.access_count += 1;
                Some(entry.hash.clone())
            }
            Some(false) => {
                self.entries.remove(&key);
                self.dirty = true;
                debug!("Cache entry outdated for: {}", path.display());
                None
            }
            None => None,
        }
    }

    /// Record a digest
    pub fn store(
        &mut self,
        path: &Path,
        mode: ContentMode,
        size: u64,
        modified: SystemTime,
        hash: String,
    ) {
        let key = (path.to_path_buf(), mode);
        let entry = CacheEntry::new(path.to_path_buf(), mode, size, modified, hash);
        self.entries.insert(key.clone(), entry);
        self.dirty = true;

        if self.entries.len() > self.max_entries {
            self.evict(&key);
        }
    }

    /// Drop every memoized digest of `path`
    pub fn remove(&mut self, path: &Path) {
        let before = self.entries.len();
        self.entries.retain(|(p, _), _| p != path);
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    /// Number of memoized digests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is memoized
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the memo changed since it was loaded or last serialized
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forget that the memo changed
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            total_size: self.entries.values().map(|entry| entry.size).sum(),
            total_hits: self.entries.values().map(|entry| entry.access_count).sum(),
        }
    }

    /// Serialize the memo
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<CacheEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let file = CacheFile {
            algorithm: self.algorithm,
            entries,
        };
        serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::other(format!("Failed to serialize hash cache: {}", e)))
    }

    /// Keep the most reused entries plus the one just stored
    fn evict(&mut self, stored: &(PathBuf, ContentMode)) {
        let kept = self.entries.remove_entry(stored);
        let mut entries: Vec<_> = self.entries.drain().collect();
        entries.sort_by(|a, b| b.1.access_count.cmp(&a.1.access_count));
        entries.truncate(self.max_entries.saturating_sub(usize::from(kept.is_some())));
        self.entries = entries.into_iter().chain(kept).collect();
        debug!("Evicted hash cache down to {} entries", self.entries.len());
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cache entries
    pub total_entries: usize,
    /// Total size of the memoized files
    pub total_size: u64,
    /// Number of lookups answered from the memo
    pub total_hits: u64,
}
