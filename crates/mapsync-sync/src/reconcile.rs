//! Per-entry reconciliation
//!
//! The decision for a catalog entry only reads the filesystem:
//!
//! 1. no local source → [`Verdict::NotPresent`]
//! 2. source digest differs from the catalog → [`Verdict::Mismatch`]
//! 3. artifact missing or its digest differs → [`Verdict::Stale`]
//! 4. otherwise → [`Verdict::UpToDate`]
//!
//! A mismatching source wins over any artifact state.

use crate::hash::HashStore;
use crate::layout::{AssetLayout, LocalAssetPair};
use mapsync_types::{CatalogEntry, ContentMode, Error, Result, Verdict};
use std::sync::Arc;
use tracing::trace;

/// Verdict together with the local state it was based on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Outcome of the state machine
    pub verdict: Verdict,
    /// Paths and digests observed
    pub pair: LocalAssetPair,
}

/// Evaluates catalog entries against the local tree
#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: AssetLayout,
    hashes: Arc<HashStore>,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(layout: AssetLayout, hashes: Arc<HashStore>) -> Self {
        Self { layout, hashes }
    }

    /// Local tree layout
    pub fn layout(&self) -> &AssetLayout {
        &self.layout
    }

    /// Digest store shared with the installer
    pub fn hashes(&self) -> &Arc<HashStore> {
        &self.hashes
    }

    /// Decide what to do with `entry`
    pub async fn evaluate(&self, entry: &CatalogEntry) -> Result<Assessment> {
        let mut pair = self.layout.pair(&entry.name);

        let source_hash = match self.hashes.digest(&pair.source_path, ContentMode::Text).await {
            Ok(hash) => hash,
            Err(Error::FileNotFound { .. }) => {
                return Ok(Assessment {
                    verdict: Verdict::NotPresent,
                    pair,
                })
            }
            Err(e) => return Err(e),
        };
        let source_matches = source_hash.eq_ignore_ascii_case(&entry.source_hash);
        pair.source_hash = Some(source_hash);
        if !source_matches {
            trace!("{}: source differs from catalog", entry.name);
            return Ok(Assessment {
                verdict: Verdict::Mismatch,
                pair,
            });
        }

        let verdict = match self
            .hashes
            .digest(&pair.artifact_path, ContentMode::Binary)
            .await
        {
            Ok(hash) => {
                let matches = hash.eq_ignore_ascii_case(&entry.artifact_hash);
                pair.artifact_hash = Some(hash);
                if matches {
                    Verdict::UpToDate
                } else {
                    Verdict::Stale
                }
            }
            Err(Error::FileNotFound { .. }) => Verdict::Stale,
            Err(e) => return Err(e),
        };

        trace!("{}: {}", entry.name, verdict);
        Ok(Assessment { verdict, pair })
    }
}
