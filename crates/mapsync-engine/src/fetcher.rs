//! Payload retrieval and atomic installation
//!
//! An artifact is never written in place. The compressed payload is
//! downloaded to a private temporary file next to the destination, decoded
//! into a second temporary file, optionally verified, and only then renamed
//! over the destination. Both temporary files are removed on every exit path.

use futures::TryStreamExt;
use mapsync_compression::GzipDecoder;
use mapsync_network::Transport;
use mapsync_sync::HashingWriter;
use mapsync_types::{Error, HashAlgorithm, NoopReporter, ProgressReporter, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TEMP_PREFIX: &str = ".mapsync-";

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Payload location
    pub url: String,
    /// Installed file
    pub destination: PathBuf,
    /// Compressed bytes received
    pub downloaded_bytes: u64,
    /// Size of the installed artifact
    pub installed_bytes: u64,
    /// Binary digest of the installed artifact
    pub artifact_hash: String,
    /// Whether the digest was checked against an expected value
    pub verified: bool,
    /// Time spent downloading, decoding and installing
    pub duration: Duration,
}

/// Streams payloads and installs decoded artifacts
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
    algorithm: HashAlgorithm,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Create a fetcher reading `chunk_size` bytes at a time
    pub fn new(transport: Arc<dyn Transport>, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
            algorithm: HashAlgorithm::default(),
            reporter: Arc::new(NoopReporter),
            cancel: CancellationToken::new(),
        }
    }

    /// Digest used to verify installed artifacts
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Report download progress to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Abort decoding and skip the final rename once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Download a resource into memory
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.fetch_into(url, &mut buffer).await?;
        Ok(buffer)
    }

    /// Stream a resource into `sink` in chunks of at most `chunk_size` bytes
    pub async fn fetch_into<W>(&self, url: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let payload = self.transport.open(url).await?;
        self.reporter.download_started(url, payload.content_length);

        let mut reader = StreamReader::new(payload.stream.map_err(io::Error::other));
        let mut buffer = vec![0u8; self.chunk_size];
        let mut received = 0u64;

        loop {
            let read = reader.read(&mut buffer).await.map_err(stream_error)?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])
                .await
                .map_err(|e| Error::io(format!("Failed to write download of {}: {}", url, e)))?;
            received += read as u64;
            self.reporter.download_progress(url, received);
        }
        sink.flush()
            .await
            .map_err(|e| Error::io(format!("Failed to flush download of {}: {}", url, e)))?;

        self.reporter.download_finished(url, received);
        Ok(received)
    }

    /// Download a gzip payload and install its content at `destination`.
    ///
    /// With `expected` set, the decoded bytes must hash to that digest or the
    /// entry fails with [`Error::Verification`]. On any failure the previous
    /// file at `destination` is left untouched.
    pub async fn install_compressed(
        &self,
        url: &str,
        destination: &Path,
        expected: Option<&str>,
    ) -> Result<InstallReport> {
        let start = Instant::now();
        let directory = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| Error::io(format!("Failed to create {}: {}", directory.display(), e)))?;

        let download = temp_file_in(&directory, ".download")?;
        let handle = download
            .reopen()
            .map_err(|e| Error::io(format!("Failed to open temporary file: {}", e)))?;
        let mut sink = tokio::fs::File::from_std(handle);
        let downloaded_bytes = self.fetch_into(url, &mut sink).await?;
        drop(sink);
        debug!("Downloaded {} bytes from {}", downloaded_bytes, url);

        let job = InstallJob {
            download,
            directory,
            destination: destination.to_path_buf(),
            expected: expected.map(str::to_ascii_lowercase),
            algorithm: self.algorithm,
            cancel: self.cancel.clone(),
        };
        let staged = tokio::task::spawn_blocking(move || job.stage())
            .await
            .map_err(|e| Error::other(format!("Install task failed: {}", e)))??;
        // No await between the cancellation check and the rename
        let (installed_bytes, artifact_hash) = staged.commit(destination, &self.cancel)?;

        info!(
            "Installed {} ({} bytes)",
            destination.display(),
            installed_bytes
        );
        Ok(InstallReport {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            downloaded_bytes,
            installed_bytes,
            artifact_hash,
            verified: expected.is_some(),
            duration: start.elapsed(),
        })
    }
}

struct InstallJob {
    download: NamedTempFile,
    directory: PathBuf,
    destination: PathBuf,
    expected: Option<String>,
    algorithm: HashAlgorithm,
    cancel: CancellationToken,
}

/// Decoded artifact waiting next to its destination
struct StagedArtifact {
    file: NamedTempFile,
    written: u64,
    hash: String,
}

impl StagedArtifact {
    /// Rename over `destination` unless the run was cancelled
    fn commit(self, destination: &Path, cancel: &CancellationToken) -> Result<(u64, String)> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.file.persist(destination).map_err(|e| {
            Error::io(format!(
                "Failed to replace {}: {}",
                destination.display(),
                e.error
            ))
        })?;
        Ok((self.written, self.hash))
    }
}

impl InstallJob {
    fn stage(self) -> Result<StagedArtifact> {
        let input = self
            .download
            .reopen()
            .map_err(|e| Error::io(format!("Failed to reopen download: {}", e)))?;
        let staging = temp_file_in(&self.directory, ".staging")?;

        let (written, actual) = {
            let sink = CancelAwareWriter {
                inner: BufWriter::new(staging.as_file()),
                cancel: &self.cancel,
            };
            let mut writer = HashingWriter::new(sink, self.algorithm);
            let decoded = GzipDecoder::default().decode(BufReader::new(input), &mut writer);
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            decoded?;
            let written = writer.written();
            let (mut sink, actual) = writer.finish();
            sink.inner
                .flush()
                .map_err(|e| Error::io(format!("Failed to write artifact: {}", e)))?;
            (written, actual)
        };

        if let Some(expected) = &self.expected {
            if *expected != actual {
                return Err(Error::Verification {
                    name: self.destination.display().to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        staging
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(format!("Failed to sync artifact: {}", e)))?;
        apply_permissions(staging.as_file(), &self.destination)?;

        Ok(StagedArtifact {
            file: staging,
            written,
            hash: actual,
        })
    }
}

struct CancelAwareWriter<'a, W> {
    inner: W,
    cancel: &'a CancellationToken,
}

impl<W: Write> Write for CancelAwareWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Other, "cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn temp_file_in(directory: &Path, suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(suffix)
        .tempfile_in(directory)
        .map_err(|e| {
            Error::io(format!(
                "Failed to create temporary file in {}: {}",
                directory.display(),
                e
            ))
        })
}

// Keep the mode of the file being replaced; new files get the usual 0644.
fn apply_permissions(file: &File, destination: &Path) -> Result<()> {
    let permissions = match std::fs::metadata(destination) {
        Ok(metadata) => metadata.permissions(),
        Err(_) => default_permissions(file)?,
    };
    file.set_permissions(permissions)
        .map_err(|e| Error::io(format!("Failed to set permissions: {}", e)))
}

#[cfg(unix)]
fn default_permissions(_file: &File) -> Result<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(file: &File) -> Result<std::fs::Permissions> {
    file.metadata()
        .map(|m| m.permissions())
        .map_err(|e| Error::io(format!("Failed to read permissions: {}", e)))
}

// Transport errors travel through the reader wrapped in io::Error
fn stream_error(error: io::Error) -> Error {
    match error.into_inner() {
        Some(inner) => match inner.downcast::<Error>() {
            Ok(original) => *original,
            Err(other) => Error::network(other.to_string()),
        },
        None => Error::network("connection closed while reading payload"),
    }
}
