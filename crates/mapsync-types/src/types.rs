//! Core data types for mapsync
//!
//! Catalog entries, per-entry verdicts and outcomes, the run tally and the
//! small policy enums selected by configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One remote asset listed in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CatalogEntry {
    /// Asset identifier relative to the sync root, without extension
    pub name: String,
    /// Digest of the source asset the artifact was built from
    pub source_hash: String,
    /// Digest of the compiled artifact
    pub artifact_hash: String,
}

impl CatalogEntry {
    /// Create a new catalog entry
    pub fn new(
        name: impl Into<String>,
        source_hash: impl Into<String>,
        artifact_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_hash: source_hash.into(),
            artifact_hash: artifact_hash.into(),
        }
    }
}

/// Reconciliation verdict for a single catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Verdict {
    /// The source asset is not checked out locally
    NotPresent,
    /// The local source differs from the one the artifact was built from
    Mismatch,
    /// The source matches but the artifact is missing or outdated
    Stale,
    /// Source and artifact both match the catalog
    UpToDate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotPresent => "not present",
            Self::Mismatch => "mismatch",
            Self::Stale => "stale",
            Self::UpToDate => "up to date",
        };
        f.write_str(text)
    }
}

/// What the driver did with a catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "outcome", rename_all = "snake_case"))]
pub enum EntryOutcome {
    /// Skipped because the source asset does not exist
    NotPresent,
    /// Reported as a local source modification
    Mismatched,
    /// Nothing to do
    UpToDate,
    /// A new artifact was installed
    Updated {
        /// Size of the installed artifact
        bytes: u64,
    },
    /// A fetch was skipped because of dry-run mode
    WouldUpdate,
    /// Evaluating or installing the entry failed
    Failed {
        /// Failure description
        message: String,
    },
    /// The run was cancelled before the entry completed
    Cancelled,
}

impl EntryOutcome {
    /// Map a verdict that requires no fetch to its outcome
    pub fn from_verdict(verdict: Verdict) -> Option<Self> {
        match verdict {
            Verdict::NotPresent => Some(Self::NotPresent),
            Verdict::Mismatch => Some(Self::Mismatched),
            Verdict::UpToDate => Some(Self::UpToDate),
            Verdict::Stale => None,
        }
    }
}

/// Run-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncTally {
    /// Artifacts installed
    pub updated: u64,
    /// Entries whose local source differs from the catalog
    pub mismatched: u64,
    /// Entries already consistent with the catalog
    pub up_to_date: u64,
    /// Entries whose source asset is not checked out
    pub not_present: u64,
    /// Stale entries left alone in dry-run mode
    pub would_update: u64,
    /// Entries whose evaluation or install failed
    pub failed: u64,
    /// Entries skipped because the run was cancelled
    pub cancelled: u64,
}

impl SyncTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one entry outcome
    pub fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::NotPresent => self.not_present += 1,
            EntryOutcome::Mismatched => self.mismatched += 1,
            EntryOutcome::UpToDate => self.up_to_date += 1,
            EntryOutcome::Updated { .. } => self.updated += 1,
            EntryOutcome::WouldUpdate => self.would_update += 1,
            EntryOutcome::Failed { .. } => self.failed += 1,
            EntryOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Number of entries counted so far
    pub fn total(&self) -> u64 {
        self.updated
            + self.mismatched
            + self.up_to_date
            + self.not_present
            + self.would_update
            + self.failed
            + self.cancelled
    }
}

impl fmt::Display for SyncTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} upgraded, {} version mismatched, {} already up to date",
            self.updated, self.mismatched, self.up_to_date
        )
    }
}

/// How the tool-mismatch confirmation is answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReplyMode {
    /// Always continue
    Yes,
    /// Always abort
    No,
    /// Ask interactively
    #[default]
    Query,
}

impl FromStr for ReplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "query" => Ok(Self::Query),
            other => Err(format!(
                "invalid reply mode '{}', expected one of yes, no, query",
                other
            )),
        }
    }
}

impl fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Query => "query",
        })
    }
}

/// Digest used for source and artifact identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum HashAlgorithm {
    /// MD5, the digest published by existing catalogs
    #[default]
    Md5,
    /// SHA-256
    Sha256,
    /// BLAKE3
    Blake3,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!("unknown hash algorithm '{}'", other)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        })
    }
}

/// Whether line endings are normalized before hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ContentMode {
    /// Source identity: CRLF and lone CR are hashed as LF
    Text,
    /// Artifact identity: raw bytes
    Binary,
}

/// Order of the two hash columns in a catalog line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ColumnOrder {
    /// `<name> <sourceHash> <artifactHash>`
    #[default]
    SourceFirst,
    /// `<name> <artifactHash> <sourceHash>`
    ArtifactFirst,
}

/// Phases of a sync run, used to report where a fatal error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncPhase {
    /// Reading the local tool description
    LocalMetadata,
    /// Building the repository URL
    ResolveRepository,
    /// Downloading the reference tool description
    RemoteMetadata,
    /// Asking whether to continue after a tool mismatch
    Confirmation,
    /// Downloading and parsing the catalog
    Catalog,
    /// Reconciling and fetching entries
    Entries,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalMetadata => "local tool inspection",
            Self::ResolveRepository => "repository resolution",
            Self::RemoteMetadata => "remote tool metadata retrieval",
            Self::Confirmation => "mismatch confirmation",
            Self::Catalog => "catalog retrieval",
            Self::Entries => "entry processing",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_tally_summary_line() {
        let mut tally = SyncTally::new();
        tally.record(&EntryOutcome::Updated { bytes: 10 });
        tally.record(&EntryOutcome::Mismatched);
        tally.record(&EntryOutcome::UpToDate);
        tally.record(&EntryOutcome::UpToDate);
        tally.record(&EntryOutcome::NotPresent);

        assert_eq!(
            tally.to_string(),
            "1 upgraded, 1 version mismatched, 2 already up to date"
        );
        assert_eq!(tally.total(), 5);
    }

    #[rstest]
    #[case("yes", Some(ReplyMode::Yes))]
    #[case("no", Some(ReplyMode::No))]
    #[case("query", Some(ReplyMode::Query))]
    #[case("YES", None)]
    #[case("maybe", None)]
    #[case("", None)]
    fn test_reply_mode_parsing(#[case] input: &str, #[case] expected: Option<ReplyMode>) {
        assert_eq!(input.parse::<ReplyMode>().ok(), expected);
    }

    #[test]
    fn test_verdict_mapping() {
        assert_eq!(EntryOutcome::from_verdict(Verdict::Stale), None);
        assert_eq!(
            EntryOutcome::from_verdict(Verdict::Mismatch),
            Some(EntryOutcome::Mismatched)
        );
    }

    #[test]
    fn test_hash_algorithm_parsing() {
        assert_eq!("MD5".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Md5));
        assert_eq!("blake3".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Blake3));
        assert!("crc32".parse::<HashAlgorithm>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&EntryOutcome::Updated { bytes: 42 }).unwrap();
        assert_eq!(json, r#"{"outcome":"updated","bytes":42}"#);
    }
}
