//! JSON output structures for the mapsync CLI

use chrono::Utc;
use mapsync_engine::{RunFailure, SyncReport};
use mapsync_types::{ErrorKind, SyncPhase, SyncTally};
use serde::Serialize;

/// Complete JSON document printed with `--json`
#[derive(Debug, Serialize)]
pub struct RunResultJson<'a> {
    /// mapsync version
    pub version: &'static str,
    /// When the document was produced
    pub timestamp: String,
    /// Process exit status
    pub exit_code: u8,
    /// Overall result
    pub result: RunStatus,
    /// Full report of a completed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<&'a SyncReport>,
    /// Details of a failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureJson>,
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every entry was processed
    Success,
    /// The run stopped early
    Failed,
}

/// Failed run in JSON format
#[derive(Debug, Serialize)]
pub struct FailureJson {
    /// Phase that failed
    pub phase: SyncPhase,
    /// Error category
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// Counts reached before the failure
    pub tally: SyncTally,
}

impl<'a> RunResultJson<'a> {
    /// Document for a completed run
    pub fn success(report: &'a SyncReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().to_rfc3339(),
            exit_code: 0,
            result: RunStatus::Success,
            report: Some(report),
            failure: None,
        }
    }

    /// Document for a failed run
    pub fn failure(failure: &RunFailure, exit_code: u8) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().to_rfc3339(),
            exit_code,
            result: RunStatus::Failed,
            report: None,
            failure: Some(FailureJson {
                phase: failure.phase,
                kind: failure.error.kind(),
                message: failure.error.to_string(),
                tally: failure.tally,
            }),
        }
    }

    /// Pretty-printed document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_types::Error;

    #[test]
    fn test_failure_document() {
        let failure = RunFailure::new(SyncPhase::Confirmation, Error::Declined, SyncTally::new());
        let json = RunResultJson::failure(&failure, 3).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["result"], "failed");
        assert_eq!(value["exit_code"], 3);
        assert_eq!(value["failure"]["phase"], "confirmation");
        assert_eq!(value["failure"]["kind"], "Declined");
        assert!(value.get("report").is_none());
    }
}
