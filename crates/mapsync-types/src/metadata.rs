//! Tool identity extracted from free-form descriptions
//!
//! Both the local compiler and the repository publish a short text that
//! mentions the tool version and a digest of the sources it was built from.
//! The same extraction runs on both so the two can be compared.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\bversion\b[ \t]*[:=]?[ \t]*v?([0-9]+(?:\.[0-9]+)*(?:[-+~][0-9A-Za-z.]+)?)")
        .expect("Invalid version regex")
});

static SOURCE_HASH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)\b(?:source[ \t_-]*(?:hash|md5|digest|checksum)|hash[ \t_-]*from[ \t_-]*source)\b[ \t]*[:=]?[ \t]*([0-9a-f]{6,128})\b",
    )
    .expect("Invalid source hash regex")
});

static BRANCH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)\.([0-9]+)").expect("Invalid branch regex")
});

/// Identity of the tool that compiles artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolMetadata {
    version: String,
    source_hash: String,
    full_description: String,
}

impl ToolMetadata {
    /// Build metadata from already extracted parts
    pub fn new(
        version: impl Into<String>,
        source_hash: impl Into<String>,
        full_description: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            source_hash: source_hash.into().to_ascii_lowercase(),
            full_description: full_description.into(),
        }
    }

    /// Extract the version and source digest from a tool description.
    ///
    /// Both tokens are required; without them the mismatch check cannot be
    /// evaluated, so a missing token is a protocol error.
    pub fn parse(text: &str) -> Result<Self> {
        let version = VERSION_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let source_hash = SOURCE_HASH_PATTERN
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        match (version, source_hash) {
            (Some(version), Some(source_hash)) => Ok(Self::new(version, source_hash, text.trim())),
            (None, None) => Err(Error::protocol(
                "tool description contains neither a version nor a source hash",
            )),
            (None, Some(_)) => Err(Error::protocol("tool description has no version token")),
            (Some(_), None) => Err(Error::protocol("tool description has no source hash token")),
        }
    }

    /// Tool version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Lowercase hex digest of the tool sources
    pub fn source_hash(&self) -> &str {
        &self.source_hash
    }

    /// The description the tokens were extracted from
    pub fn full_description(&self) -> &str {
        &self.full_description
    }

    /// Whether both tools were built from the same sources
    pub fn same_source(&self, other: &Self) -> bool {
        self.source_hash == other.source_hash
    }

    /// Whether both tools report the same version
    pub fn same_version(&self, other: &Self) -> bool {
        self.version == other.version
    }

    /// Repository branch matching this version (`major.minor`)
    pub fn branch(&self) -> Option<String> {
        BRANCH_PATTERN
            .captures(&self.version)
            .map(|c| format!("{}.{}", &c[1], &c[2]))
    }
}
