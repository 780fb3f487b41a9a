//! Content digests for local files
//!
//! Source assets are hashed as text: CRLF and lone CR are folded to LF so a
//! checkout with different newline conventions still matches the catalog.
//! Artifacts are hashed as raw bytes. Digests are always lowercase hex.

use crate::cache::{CacheStats, HashCache};
use mapsync_types::{ContentMode, Error, HashAlgorithm, Result};
use sha2::Digest;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Incremental digest for one of the supported algorithms
#[derive(Clone)]
pub enum Digester {
    /// MD5
    Md5(md5::Md5),
    /// SHA-256
    Sha256(sha2::Sha256),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    /// Start a new digest
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            HashAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Feed more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Folds CRLF and lone CR into LF across chunk boundaries
#[derive(Debug, Default, Clone)]
pub struct LineEndingNormalizer {
    pending_cr: bool,
}

impl LineEndingNormalizer {
    /// Create a normalizer
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one chunk into `out`, replacing its contents
    pub fn normalize(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.clear();
        out.reserve(input.len());
        for &byte in input {
            if self.pending_cr {
                self.pending_cr = false;
                out.push(b'\n');
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(byte);
            }
        }
    }

    /// Flush a CR held back at the end of the input
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        out.clear();
        if self.pending_cr {
            self.pending_cr = false;
            out.push(b'\n');
        }
    }
}

/// Digest everything `reader` yields
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithm: HashAlgorithm,
    mode: ContentMode,
    chunk_size: usize,
) -> io::Result<String> {
    let mut digester = Digester::new(algorithm);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut normalizer = LineEndingNormalizer::new();
    let mut normalized = Vec::new();

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        match mode {
            ContentMode::Binary => digester.update(&buffer[..read]),
            ContentMode::Text => {
                normalizer.normalize(&buffer[..read], &mut normalized);
                digester.update(&normalized);
            }
        }
    }

    if mode == ContentMode::Text {
        normalizer.finish(&mut normalized);
        digester.update(&normalized);
    }
    Ok(digester.finalize_hex())
}

/// Digest an in-memory buffer
pub fn digest_bytes(data: &[u8], algorithm: HashAlgorithm, mode: ContentMode) -> String {
    match mode {
        ContentMode::Binary => {
            let mut digester = Digester::new(algorithm);
            digester.update(data);
            digester.finalize_hex()
        }
        // Reading from a slice cannot fail
        ContentMode::Text => digest_reader(data, algorithm, mode, 64 * 1024).unwrap_or_default(),
    }
}

/// Writer adapter that digests the bytes passing through it
pub struct HashingWriter<W> {
    inner: W,
    digester: Digester,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`, hashing raw bytes with `algorithm`
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            digester: Digester::new(algorithm),
            written: 0,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Return the inner writer and the hex digest
    pub fn finish(self) -> (W, String) {
        (self.inner, self.digester.finalize_hex())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digester.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Digests of local files with a size/mtime memo
///
/// A memoized digest is reused only while the file keeps the size and
/// modification time it had when it was hashed.
#[derive(Debug)]
pub struct HashStore {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    cache: Mutex<HashCache>,
}

impl HashStore {
    /// Create a store with an empty memo
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        Self::with_cache(HashCache::new(algorithm), chunk_size)
    }

    /// Create a store around an existing memo
    pub fn with_cache(cache: HashCache, chunk_size: usize) -> Self {
        Self {
            algorithm: cache.algorithm(),
            chunk_size: chunk_size.max(1),
            cache: Mutex::new(cache),
        }
    }

    /// Digest algorithm in use
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Digest `path`; fails with [`Error::FileNotFound`] when it does not exist
    pub async fn digest(&self, path: &Path, mode: ContentMode) -> Result<String> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(Error::io(format!(
                    "Failed to stat {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if !metadata.is_file() {
            return Err(Error::io(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let size = metadata.len();
        let modified = metadata.modified().ok();
        if let Some(modified) = modified {
            if let Some(hash) = self.lock().get(path, mode, size, modified) {
                trace!("Memoized digest for {}", path.display());
                return Ok(hash);
            }
        }

        let owned = path.to_path_buf();
        let algorithm = self.algorithm;
        let chunk_size = self.chunk_size;
        let hash = tokio::task::spawn_blocking(move || {
            let file = File::open(&owned)
                .map_err(|e| Error::io(format!("Failed to open {}: {}", owned.display(), e)))?;
            digest_reader(file, algorithm, mode, chunk_size)
                .map_err(|e| Error::io(format!("Failed to read {}: {}", owned.display(), e)))
        })
        .await
        .map_err(|e| Error::other(format!("Hashing task failed: {}", e)))??;

        debug!("{} {:?} -> {}", path.display(), mode, hash);
        if let Some(modified) = modified {
            self.lock().store(path, mode, size, modified, hash.clone());
        }
        Ok(hash)
    }

    /// Forget memoized digests of `path`
    pub fn invalidate(&self, path: &Path) {
        self.lock().remove(path);
    }

    /// Memo statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Persist the memo as JSON if it changed
    pub async fn save(&self, path: &Path) -> Result<()> {
        let data = {
            let mut cache = self.lock();
            if !cache.is_dirty() {
                return Ok(());
            }
            let data = cache.to_json()?;
            cache.mark_clean();
            data
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(path, data).await.map_err(|e| {
            Error::io(format!(
                "Failed to write hash cache '{}': {}",
                path.display(),
                e
            ))
        })?;
        debug!("Saved hash cache to {}", path.display());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use proptest::prelude::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(HashAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e")]
    #[case(
        HashAlgorithm::Sha256,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    )]
    #[case(
        HashAlgorithm::Blake3,
        "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
    )]
    fn test_empty_digests(#[case] algorithm: HashAlgorithm, #[case] expected: &str) {
        assert_eq!(digest_bytes(b"", algorithm, ContentMode::Binary), expected);
    }

    #[test]
    fn test_md5_known_value() {
        assert_eq!(
            digest_bytes(b"abc", HashAlgorithm::Md5, ContentMode::Binary),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[rstest]
    #[case(b"a\r\nb\r\n", b"a\nb\n")]
    #[case(b"a\rb\r", b"a\nb\n")]
    #[case(b"\r\r\n", b"\n\n")]
    #[case(b"no newline", b"no newline")]
    fn test_text_mode_folds_line_endings(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(
            digest_bytes(input, HashAlgorithm::Md5, ContentMode::Text),
            digest_bytes(expected, HashAlgorithm::Md5, ContentMode::Binary)
        );
    }

    #[test]
    fn test_binary_mode_keeps_bytes() {
        assert_ne!(
            digest_bytes(b"a\r\n", HashAlgorithm::Md5, ContentMode::Binary),
            digest_bytes(b"a\n", HashAlgorithm::Md5, ContentMode::Binary)
        );
    }

    proptest! {
        #[test]
        fn test_normalization_ignores_chunking(
            data in proptest::collection::vec(prop_oneof![Just(b'\r'), Just(b'\n'), Just(b'x')], 0..200),
            chunk in 1usize..17
        ) {
            let whole = digest_bytes(&data, HashAlgorithm::Md5, ContentMode::Text);
            let chunked = digest_reader(&data[..], HashAlgorithm::Md5, ContentMode::Text, chunk).unwrap();
            prop_assert_eq!(whole, chunked);
        }

        #[test]
        fn test_crlf_and_lf_checkouts_match(lines in proptest::collection::vec("[a-z ]{0,12}", 0..20)) {
            let lf = lines.join("\n");
            let crlf = lines.join("\r\n");
            prop_assert_eq!(
                digest_bytes(lf.as_bytes(), HashAlgorithm::Md5, ContentMode::Text),
                digest_bytes(crlf.as_bytes(), HashAlgorithm::Md5, ContentMode::Text)
            );
        }
    }

    #[test]
    fn test_hashing_writer() {
        let mut writer = HashingWriter::new(Vec::new(), HashAlgorithm::Md5);
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.written(), 3);
        let (inner, hash) = writer.finish();
        assert_eq!(inner, b"abc");
        assert_eq!(hash, "900150983cd24fb0d6963f7d28e17f72");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = HashStore::new(HashAlgorithm::Md5, 1024);
        let err = store
            .digest(&dir.path().join("absent.map"), ContentMode::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_hashable() {
        let dir = TempDir::new().unwrap();
        let store = HashStore::new(HashAlgorithm::Md5, 1024);
        let err = store.digest(dir.path(), ContentMode::Binary).await.unwrap_err();
        assert_eq!(err.kind(), mapsync_types::ErrorKind::Io);
    }

    #[tokio::test]
    async fn test_memo_is_invalidated_by_size_or_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bsp");
        std::fs::write(&path, b"one").unwrap();
        let store = HashStore::new(HashAlgorithm::Md5, 1024);

        let first = store.digest(&path, ContentMode::Binary).await.unwrap();
        assert_eq!(store.cache_stats().total_entries, 1);

        // Same size, new mtime
        std::fs::write(&path, b"two").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        let second = store.digest(&path, ContentMode::Binary).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(second, digest_bytes(b"two", HashAlgorithm::Md5, ContentMode::Binary));

        // Same mtime, new size
        std::fs::write(&path, b"three").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        let third = store.digest(&path, ContentMode::Binary).await.unwrap();
        assert_eq!(third, digest_bytes(b"three", HashAlgorithm::Md5, ContentMode::Binary));
    }

    #[tokio::test]
    async fn test_modes_are_memoized_separately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.map");
        std::fs::write(&path, b"x\r\n").unwrap();
        let store = HashStore::new(HashAlgorithm::Md5, 1024);

        let text = store.digest(&path, ContentMode::Text).await.unwrap();
        let binary = store.digest(&path, ContentMode::Binary).await.unwrap();
        assert_ne!(text, binary);
        assert_eq!(store.cache_stats().total_entries, 2);
    }

    #[tokio::test]
    async fn test_save_and_reload_memo() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.map");
        let cache_file = dir.path().join("state").join("hashes.json");
        std::fs::write(&path, b"source").unwrap();

        let store = HashStore::new(HashAlgorithm::Sha256, 1024);
        store.digest(&path, ContentMode::Text).await.unwrap();
        store.save(&cache_file).await.unwrap();

        let cache = HashCache::load(&cache_file, HashAlgorithm::Sha256).await.unwrap();
        assert_eq!(cache.len(), 1);

        let other = HashCache::load(&cache_file, HashAlgorithm::Md5).await.unwrap();
        assert!(other.is_empty());
    }
}
