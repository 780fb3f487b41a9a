//! Catalog parsing
//!
//! The catalog is a line-oriented text resource, one `name hash hash` line
//! per asset. Bad lines are reported and skipped; they never fail the whole
//! catalog.

use mapsync_types::{CatalogEntry, ColumnOrder};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// A catalog line that was not turned into an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum LineIssue {
    /// The line does not have exactly three fields
    Corrupted {
        /// 1-based line number
        line_number: usize,
        /// The offending line
        line: String,
    },
    /// The name was already listed; the first occurrence wins
    Duplicate {
        /// 1-based line number of the repeated entry
        line_number: usize,
        /// Normalized asset name
        name: String,
    },
    /// The name would resolve outside the sync root
    UnsafeName {
        /// 1-based line number
        line_number: usize,
        /// Name as listed
        name: String,
    },
}

impl LineIssue {
    /// Line the issue was found on
    pub fn line_number(&self) -> usize {
        match self {
            Self::Corrupted { line_number, .. }
            | Self::Duplicate { line_number, .. }
            | Self::UnsafeName { line_number, .. } => *line_number,
        }
    }
}

impl fmt::Display for LineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted { line, .. } => write!(f, "Line \"{}\" corrupted", line),
            Self::Duplicate { line_number, name } => {
                write!(f, "Duplicate entry \"{}\" on line {} ignored", name, line_number)
            }
            Self::UnsafeName { line_number, name } => {
                write!(f, "Unsafe name \"{}\" on line {} rejected", name, line_number)
            }
        }
    }
}

/// Parsed catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    /// Entries sorted by name, names unique
    pub entries: Vec<CatalogEntry>,
    /// Lines that were skipped, in file order
    pub issues: Vec<LineIssue>,
}

impl Catalog {
    /// Number of usable entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog lists no usable entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parser for catalog text
#[derive(Debug, Clone)]
pub struct CatalogParser {
    sentinel: String,
    column_order: ColumnOrder,
    artifact_extension: Option<String>,
}

impl CatalogParser {
    /// Create a parser that skips lines naming `sentinel`, the tool itself
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            column_order: ColumnOrder::default(),
            artifact_extension: None,
        }
    }

    /// Set the order of the two hash columns
    pub fn with_column_order(mut self, order: ColumnOrder) -> Self {
        self.column_order = order;
        self
    }

    /// Strip this extension from names that carry it (`maps/foo.bsp`)
    pub fn with_artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = Some(extension.into());
        self
    }

    /// Parse catalog text into entries sorted by name
    pub fn parse(&self, text: &str) -> Catalog {
        let mut catalog = Catalog::default();
        let mut seen = HashSet::new();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let [name, first, second] = fields.as_slice() else {
                warn!("Line \"{}\" corrupted", line);
                catalog.issues.push(LineIssue::Corrupted {
                    line_number,
                    line: line.to_string(),
                });
                continue;
            };

            let name = self.normalize_name(name);
            if name == self.sentinel {
                debug!("Skipping tool line {}", line_number);
                continue;
            }
            if name.is_empty() {
                catalog.issues.push(LineIssue::Corrupted {
                    line_number,
                    line: line.to_string(),
                });
                continue;
            }
            if !is_safe_name(name) {
                warn!("Rejecting unsafe name \"{}\"", name);
                catalog.issues.push(LineIssue::UnsafeName {
                    line_number,
                    name: name.to_string(),
                });
                continue;
            }
            if !seen.insert(name.to_string()) {
                warn!("Duplicate catalog entry \"{}\"", name);
                catalog.issues.push(LineIssue::Duplicate {
                    line_number,
                    name: name.to_string(),
                });
                continue;
            }

            let (source_hash, artifact_hash) = match self.column_order {
                ColumnOrder::SourceFirst => (first, second),
                ColumnOrder::ArtifactFirst => (second, first),
            };
            catalog.entries.push(CatalogEntry::new(
                name,
                source_hash.to_ascii_lowercase(),
                artifact_hash.to_ascii_lowercase(),
            ));
        }

        catalog.entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            "Parsed {} catalog entries, {} issues",
            catalog.entries.len(),
            catalog.issues.len()
        );
        catalog
    }

    fn normalize_name<'a>(&self, name: &'a str) -> &'a str {
        self.artifact_extension
            .as_deref()
            .and_then(|ext| {
                name.strip_suffix(ext)
                    .and_then(|rest| rest.strip_suffix('.'))
            })
            .unwrap_or(name)
    }
}

fn is_safe_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') || name.contains(':') {
        return false;
    }
    !name
        .split(['/', '\\'])
        .any(|part| part.is_empty() || part == "." || part == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn parser() -> CatalogParser {
        CatalogParser::new("ufo2map").with_artifact_extension("bsp")
    }

    #[test]
    fn test_parses_and_sorts() {
        let catalog = parser().parse("mapB 11 22\nmapA abc123 def456\n");
        let names: Vec<_> = catalog.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["mapA", "mapB"]);
        assert_eq!(catalog.entries[0].source_hash, "abc123");
        assert_eq!(catalog.entries[0].artifact_hash, "def456");
        assert!(catalog.issues.is_empty());
    }

    #[test]
    fn test_corrupted_line_is_skipped() {
        let catalog = parser().parse("mapB xyz\nmapA abc123 def456\n");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].name, "mapA");
        assert_eq!(
            catalog.issues,
            vec![LineIssue::Corrupted {
                line_number: 1,
                line: "mapB xyz".to_string(),
            }]
        );
        assert_eq!(catalog.issues[0].to_string(), "Line \"mapB xyz\" corrupted");
    }

    #[test]
    fn test_sentinel_is_excluded() {
        let catalog = parser().parse("ufo2map aaaa bbbb\nmapA abc123 def456\n");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.issues.is_empty());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let catalog = parser().parse("mapA 01 02\nmapA 03 04\n");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].source_hash, "01");
        assert!(matches!(
            catalog.issues[0],
            LineIssue::Duplicate { line_number: 2, .. }
        ));
    }

    #[test]
    fn test_legacy_names_and_columns() {
        let catalog = parser()
            .with_column_order(ColumnOrder::ArtifactFirst)
            .parse("maps/base.bsp ARTIFACT0 SOURCE00\r\n");
        assert_eq!(catalog.entries[0].name, "maps/base");
        assert_eq!(catalog.entries[0].source_hash, "source00");
        assert_eq!(catalog.entries[0].artifact_hash, "artifact0");
    }

    #[rstest]
    #[case("/etc/passwd")]
    #[case("../outside")]
    #[case("maps/../../x")]
    #[case("C:\\maps\\x")]
    #[case("maps//x")]
    fn test_unsafe_names_are_rejected(#[case] name: &str) {
        let catalog = parser().parse(&format!("{} 01 02\n", name));
        assert!(catalog.is_empty());
        assert!(matches!(catalog.issues[0], LineIssue::UnsafeName { .. }));
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let catalog = parser().parse("\n   \nmapA 01 02\n\n");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.issues.is_empty());
    }

    proptest! {
        #[test]
        fn test_entries_are_sorted_and_unique(
            names in proptest::collection::vec("[a-z]{1,6}(/[a-z]{1,6})?", 0..40)
        ) {
            let text: String = names.iter().map(|n| format!("{} 0a 0b\n", n)).collect();
            let catalog = parser().parse(&text);
            let listed: Vec<_> = catalog.entries.iter().map(|e| e.name.clone()).collect();
            let mut expected = listed.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(listed, expected);
            prop_assert_eq!(catalog.entries.len() + catalog.issues.len(), names.len());
        }
    }
}
