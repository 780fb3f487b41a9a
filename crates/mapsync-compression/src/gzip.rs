//! Streaming gzip decoding
//!
//! Payloads are single-member gzip streams. Decoding reads from any
//! `Read` and writes to any `Write` in fixed-size blocks, so callers can
//! stage the output in a temporary file instead of memory.

use flate2::read::GzDecoder;
use mapsync_types::{Error, Result};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Statistics of one decode operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Bytes consumed from the compressed input
    pub compressed_bytes: u64,
    /// Bytes written to the output
    pub decompressed_bytes: u64,
    /// Wall time spent decoding
    pub duration: Duration,
}

impl DecodeStats {
    /// Compressed size divided by decompressed size
    pub fn compression_ratio(&self) -> f64 {
        if self.decompressed_bytes == 0 {
            1.0
        } else {
            self.compressed_bytes as f64 / self.decompressed_bytes as f64
        }
    }
}

/// Gzip decoder with a configurable block size
#[derive(Debug, Clone, Copy)]
pub struct GzipDecoder {
    buffer_size: usize,
}

impl GzipDecoder {
    /// Default output block size (64KB)
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    /// Create a decoder that writes blocks of `buffer_size` bytes
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Decode a complete gzip stream from `reader` into `writer`.
    ///
    /// Malformed or truncated input is reported as [`Error::Decode`];
    /// failures of the writer are reported as [`Error::Io`].
    pub fn decode<R: Read, W: Write>(&self, reader: R, writer: &mut W) -> Result<DecodeStats> {
        let start = Instant::now();
        let mut counting = CountingReader::new(reader);
        let mut decoder = GzDecoder::new(&mut counting);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut decompressed_bytes = 0u64;

        loop {
            let read = match decoder.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::decode(format!("invalid gzip payload: {}", e))),
            };
            writer
                .write_all(&buffer[..read])
                .map_err(|e| Error::io(format!("Failed to write decoded data: {}", e)))?;
            decompressed_bytes += read as u64;
        }

        drop(decoder);
        if counting.count == 0 {
            return Err(Error::decode("empty gzip payload"));
        }

        writer
            .flush()
            .map_err(|e| Error::io(format!("Failed to flush decoded data: {}", e)))?;

        let stats = DecodeStats {
            compressed_bytes: counting.count,
            decompressed_bytes,
            duration: start.elapsed(),
        };
        debug!(
            "Decoded {} -> {} bytes in {:?}",
            stats.compressed_bytes, stats.decompressed_bytes, stats.duration
        );
        Ok(stats)
    }

    /// Decode an in-memory gzip stream
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() * 2);
        self.decode(data, &mut output)?;
        Ok(output)
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BUFFER_SIZE)
    }
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use mapsync_types::ErrorKind;
    use proptest::prelude::*;
    use rstest::rstest;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_decode_stats() {
        let payload = vec![7u8; 100_000];
        let compressed = gzip(&payload);
        let mut out = Vec::new();
        let stats = GzipDecoder::new(1024).decode(&compressed[..], &mut out).unwrap();

        assert_eq!(out, payload);
        assert_eq!(stats.decompressed_bytes, 100_000);
        assert_eq!(stats.compressed_bytes, compressed.len() as u64);
        assert!(stats.compression_ratio() < 0.1);
    }

    #[rstest]
    #[case::not_gzip(b"plain text, not gzip".to_vec())]
    #[case::empty(Vec::new())]
    fn test_rejects_invalid_input(#[case] input: Vec<u8>) {
        let err = GzipDecoder::default().decode_bytes(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_rejects_truncated_stream() {
        let compressed = gzip(&vec![42u8; 50_000]);
        let truncated = &compressed[..compressed.len() / 2];
        let err = GzipDecoder::default().decode_bytes(truncated).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_rejects_corrupt_trailer() {
        let mut compressed = gzip(b"some artifact bytes");
        let crc_offset = compressed.len() - 8;
        compressed[crc_offset] ^= 0xff;
        let err = GzipDecoder::default().decode_bytes(&compressed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_writer_failure_is_io() {
        let compressed = gzip(b"artifact");
        let err = GzipDecoder::default()
            .decode(&compressed[..], &mut FailingWriter)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    proptest! {
        #[test]
        fn test_decode_restores_input(data in proptest::collection::vec(any::<u8>(), 1..4096)) {
            let decoded = GzipDecoder::new(1024).decode_bytes(&gzip(&data)).unwrap();
            prop_assert_eq!(decoded, data);
        }
    }
}
