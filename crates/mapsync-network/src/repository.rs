//! Repository location
//!
//! Every resource lives under `<base>/<branch>/`. The branch is either given
//! verbatim or derived from the `major.minor` part of the local tool version.

use mapsync_types::{Error, Result, ToolMetadata};
use std::fmt;

/// Branch setting that follows the local tool version
pub const AUTO_BRANCH: &str = mapsync_config::AUTO_BRANCH;

/// A resolved repository branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    base: String,
    branch: String,
}

impl Repository {
    /// Create a repository from a base location and an explicit branch
    pub fn new(base: impl Into<String>, branch: impl Into<String>) -> Self {
        let base = base.into();
        let branch = branch.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            branch: branch.trim_matches('/').to_string(),
        }
    }

    /// Resolve the branch setting against the local tool
    pub fn resolve(base: &str, branch: &str, local: &ToolMetadata) -> Result<Self> {
        if branch != AUTO_BRANCH {
            return Ok(Self::new(base, branch));
        }

        let derived = local.branch().ok_or_else(|| {
            Error::config(format!(
                "Cannot derive a branch from local tool version '{}'; set repository.branch",
                local.version()
            ))
        })?;
        Ok(Self::new(base, derived))
    }

    /// Base location without the branch
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolved branch segment
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// `<base>/<branch>`
    pub fn url(&self) -> String {
        format!("{}/{}", self.base, self.branch)
    }

    /// Location of a resource in this branch
    pub fn resource(&self, name: &str) -> String {
        format!("{}/{}", self.url(), name.trim_start_matches('/'))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
