//! Local state reconciliation for mapsync
//!
//! This crate decides, for every catalog entry, what the local tree needs:
//!
//! - **Hash store**: MD5, SHA-256 or BLAKE3 digests of local files, with
//!   line-ending normalization for source assets and a size/mtime memo that
//!   can be persisted between runs
//! - **Layout**: mapping of catalog names to source, artifact and payload paths
//! - **Reconciler**: the read-only per-entry state machine producing
//!   not-present, mismatch, stale or up-to-date verdicts
//!
//! # Examples
//!
//! ```rust,no_run
//! use mapsync_sync::{AssetLayout, HashStore, Reconciler};
//! use mapsync_types::{CatalogEntry, HashAlgorithm};
//! use std::sync::Arc;
//!
//! # async fn example() -> mapsync_types::Result<()> {
//! let hashes = Arc::new(HashStore::new(HashAlgorithm::Md5, 10 * 1024));
//! let reconciler = Reconciler::new(AssetLayout::new("base"), hashes);
//!
//! let entry = CatalogEntry::new("maps/mapA", "abc123", "def456");
//! let assessment = reconciler.evaluate(&entry).await?;
//! println!("{}: {}", entry.name, assessment.verdict);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod hash;
pub mod layout;
pub mod reconcile;

pub use cache::{CacheEntry, CacheStats, HashCache};
pub use hash::{digest_bytes, digest_reader, Digester, HashStore, HashingWriter, LineEndingNormalizer};
pub use layout::{AssetLayout, LocalAssetPair};
pub use reconcile::{Assessment, Reconciler};
