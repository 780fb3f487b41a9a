//! Payload decompression for mapsync
//!
//! Artifacts are published as gzip-compressed payloads. This crate decodes
//! them block by block from any reader into any writer, reporting malformed
//! input separately from local write failures.
//!
//! # Examples
//!
//! ```rust
//! use mapsync_compression::GzipDecoder;
//!
//! # fn main() -> mapsync_types::Result<()> {
//! // "hello" compressed with gzip
//! let payload: &[u8] = &[
//!     0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xcb, 0x48, 0xcd, 0xc9,
//!     0xc9, 0x07, 0x00, 0x86, 0xa6, 0x10, 0x36, 0x05, 0x00, 0x00, 0x00,
//! ];
//! let decoded = GzipDecoder::default().decode_bytes(payload)?;
//! assert_eq!(decoded, b"hello");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod gzip;

pub use gzip::{DecodeStats, GzipDecoder};
