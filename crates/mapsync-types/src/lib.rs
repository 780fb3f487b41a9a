//! Core type system and error handling for mapsync
//!
//! This crate provides the foundational types, error handling, and shared data structures
//! used by every mapsync crate. It includes:
//!
//! - **Error handling**: Error taxonomy with severity, recoverability and retry hints
//! - **Catalog model**: Catalog entries, reconciliation verdicts and run tallies
//! - **Tool metadata**: Extraction of version and source digest from tool descriptions
//! - **Configuration values**: Validated chunk sizes, concurrency, retry and timeout policies
//! - **Traits**: Progress reporting and cancellation seams
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use mapsync_types::{EntryOutcome, SyncTally};
//!
//! let mut tally = SyncTally::new();
//! tally.record(&EntryOutcome::Updated { bytes: 1024 });
//! tally.record(&EntryOutcome::UpToDate);
//! assert_eq!(
//!     tally.to_string(),
//!     "1 upgraded, 0 version mismatched, 1 already up to date"
//! );
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metadata;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ChunkSize, Concurrency, RetryConfig, TimeoutConfig};
pub use error::{Error, ErrorKind};
pub use metadata::ToolMetadata;
pub use result::Result;
pub use traits::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_starts_empty() {
        let tally = SyncTally::new();
        assert_eq!(tally.total(), 0);
        assert_eq!(
            tally.to_string(),
            "0 upgraded, 0 version mismatched, 0 already up to date"
        );
    }

    #[test]
    fn test_error_kind() {
        let io_error = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        assert_eq!(io_error.kind(), ErrorKind::Io);

        let config_error = Error::config("invalid reply mode");
        assert_eq!(config_error.kind(), ErrorKind::Config);
        assert!(!config_error.should_retry());
    }

    #[test]
    fn test_noop_reporter_is_object_safe() {
        let reporter: &dyn ProgressReporter = &NoopReporter;
        reporter.download_started("file:///tmp/x.gz", Some(10));
        reporter.download_progress("file:///tmp/x.gz", 5);
        reporter.download_finished("file:///tmp/x.gz", 10);
    }
}
