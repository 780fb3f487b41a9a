//! Run events for front ends
//!
//! The driver emits events in a deterministic order: setup events first,
//! then one [`SyncEvent::Entry`] per catalog entry sorted by name, even when
//! entries are processed concurrently.

use mapsync_network::{LineIssue, Repository};
use mapsync_types::{CatalogEntry, EntryOutcome, ToolMetadata, Verdict};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// What happened to one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    /// The catalog entry
    pub entry: CatalogEntry,
    /// Reconciler verdict, if evaluation got that far
    pub verdict: Option<Verdict>,
    /// Final outcome
    pub outcome: EntryOutcome,
    /// Payload location for stale entries
    pub url: Option<String>,
    /// Time spent on the entry
    pub duration: Duration,
}

/// Progress of a sync run
#[derive(Debug, Clone, Copy)]
pub enum SyncEvent<'a> {
    /// The local tool was inspected
    LocalTool(&'a ToolMetadata),
    /// The repository branch was resolved
    RepositoryResolved(&'a Repository),
    /// The reference tool description was retrieved
    RemoteTool(&'a ToolMetadata),
    /// Local and reference tools were built from different sources
    ToolMismatch {
        /// Local tool
        local: &'a ToolMetadata,
        /// Reference tool
        remote: &'a ToolMetadata,
        /// Whether the versions differ too, which requires confirmation
        versions_differ: bool,
    },
    /// The mismatch question was answered
    ConfirmationAnswered(bool),
    /// The catalog was parsed
    CatalogLoaded {
        /// Usable entries
        entries: usize,
        /// Skipped lines
        issues: usize,
    },
    /// A catalog line was skipped
    CatalogIssue(&'a LineIssue),
    /// An entry was settled
    Entry(&'a EntryReport),
}

/// Receiver of run events
pub trait SyncObserver: Send + Sync {
    /// Called for every event, in order
    fn on_event(&self, event: &SyncEvent<'_>);
}

/// Observer that turns events into log records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent<'_>) {
        match event {
            SyncEvent::LocalTool(meta) => info!(
                "Local tool version {} (source {})",
                meta.version(),
                meta.source_hash()
            ),
            SyncEvent::RepositoryResolved(repo) => info!("Using repository {}", repo),
            SyncEvent::RemoteTool(meta) => info!(
                "Repository tool version {} (source {})",
                meta.version(),
                meta.source_hash()
            ),
            SyncEvent::ToolMismatch {
                local,
                remote,
                versions_differ,
            } => warn!(
                "Local tool source {} differs from repository source {}{}",
                local.source_hash(),
                remote.source_hash(),
                if *versions_differ {
                    ", versions differ too"
                } else {
                    ""
                }
            ),
            SyncEvent::ConfirmationAnswered(answer) => {
                info!("Continue after mismatch: {}", answer);
            }
            SyncEvent::CatalogLoaded { entries, issues } => {
                info!("Catalog: {} entries, {} skipped lines", entries, issues);
            }
            SyncEvent::CatalogIssue(issue) => warn!("{}", issue),
            SyncEvent::Entry(report) => match &report.outcome {
                EntryOutcome::Failed { message } => {
                    warn!("{}: failed: {}", report.entry.name, message);
                }
                outcome => info!("{}: {:?}", report.entry.name, outcome),
            },
        }
    }
}
