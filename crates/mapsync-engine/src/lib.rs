//! Run orchestration for mapsync
//!
//! This crate ties the repository client, the reconciler and the installer
//! together into a complete synchronization run.
//!
//! # Features
//!
//! - **Atomic installs**: Payloads are downloaded, decoded and verified in
//!   temporary files before a single rename replaces the artifact
//! - **Mismatch policy**: Tool mismatches are confirmed through a
//!   yes/no/query policy with an injectable prompt
//! - **Bounded concurrency**: Entries are processed on a bounded pool while
//!   events are reported in catalog order
//! - **Cancellation**: In-flight fetches abort and unstarted entries are skipped
//! - **Run reports**: Serializable per-entry results and tallies
//!
//! # Examples
//!
//! ```rust,no_run
//! use mapsync_config::Config;
//! use mapsync_engine::{DeclinePrompt, SyncDriver};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = SyncDriver::from_config(Config::default(), Arc::new(DeclinePrompt)).await?;
//! let report = driver.run().await?;
//! println!("{}", report.tally);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod driver;
pub mod events;
pub mod fetcher;
pub mod policy;
pub mod tool;

pub use driver::{CancelHandle, RunFailure, SyncDriver, SyncReport};
pub use events::{EntryReport, SyncEvent, SyncObserver, TracingObserver};
pub use fetcher::{Fetcher, InstallReport};
pub use policy::{should_continue, DeclinePrompt, Prompt};
pub use tool::LocalToolSource;

pub use tokio_util::sync::CancellationToken;
