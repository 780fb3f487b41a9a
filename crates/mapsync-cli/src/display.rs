//! Console output for sync runs

use console::style;
use mapsync_engine::{EntryReport, RunFailure, SyncReport};
use mapsync_types::{EntryOutcome, SyncTally, ToolMetadata};

/// Line printed for a settled entry, if any
pub fn entry_line(
    report: &EntryReport,
    show_up_to_date: bool,
    show_not_present: bool,
) -> Option<String> {
    let name = &report.entry.name;
    match &report.outcome {
        EntryOutcome::NotPresent if show_not_present => Some(format!(
            "{} {} not found",
            style("skip").dim(),
            name
        )),
        EntryOutcome::NotPresent => None,
        EntryOutcome::Mismatched => Some(format!(
            "{} {}: local source differs from the catalog",
            style("mismatch").yellow().bold(),
            name
        )),
        EntryOutcome::UpToDate if show_up_to_date => Some(format!(
            "{} {} already up to date",
            style("ok").green(),
            name
        )),
        EntryOutcome::UpToDate => None,
        EntryOutcome::Updated { bytes } => Some(format!(
            "{} {} ({})",
            style("upgraded").green().bold(),
            name,
            format_bytes(*bytes)
        )),
        EntryOutcome::WouldUpdate => Some(format!(
            "{} {} (dry run)",
            style("would upgrade").cyan(),
            name
        )),
        EntryOutcome::Failed { message } => Some(format!(
            "{} {}: {}",
            style("failed").red().bold(),
            name,
            message
        )),
        EntryOutcome::Cancelled => None,
    }
}

/// Full tool description, one bullet per line
pub fn tool_lines(label: &str, meta: &ToolMetadata) -> Vec<String> {
    let mut lines = vec![format!("{} ufo2map information:", style(label).bold())];
    lines.extend(
        meta.full_description()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| format!("  * {}", line)),
    );
    lines
}

/// Warning shown when local and repository tools were built from different sources
pub fn tool_mismatch_lines(local: &ToolMetadata, remote: &ToolMetadata) -> Vec<String> {
    vec![
        format!(
            "{} your ufo2map was built from different sources than the repository maps",
            style("warning:").yellow().bold()
        ),
        format!(
            "  local:      version {} source {}",
            local.version(),
            local.source_hash()
        ),
        format!(
            "  repository: version {} source {}",
            remote.version(),
            remote.source_hash()
        ),
    ]
}

/// Final tally line plus the extra counters when they are non-zero
pub fn tally_lines(tally: &SyncTally) -> Vec<String> {
    let mut lines = vec![tally.to_string()];
    let extras = [
        ("not checked out", tally.not_present),
        ("would be upgraded", tally.would_update),
        ("failed", tally.failed),
        ("cancelled", tally.cancelled),
    ];
    let extras: Vec<String> = extras
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| format!("{} {}", count, label))
        .collect();
    if !extras.is_empty() {
        lines.push(extras.join(", "));
    }
    lines
}

/// Print the summary of a completed run
pub fn display_summary(report: &SyncReport, quiet: bool) {
    if !quiet {
        println!();
        println!(
            "{} {}",
            style("Repository:").bold(),
            style(&report.repository).cyan()
        );
        if !report.issues.is_empty() {
            println!(
                "  {} catalog lines skipped",
                style(report.issues.len()).yellow()
            );
        }
        println!(
            "  Duration: {}",
            style(format_duration(report.duration.as_secs_f64())).dim()
        );
    }
    for line in tally_lines(&report.tally) {
        println!("{}", line);
    }
}

/// Print a fatal failure and the counts reached before it
pub fn display_failure(failure: &RunFailure) {
    eprintln!("{} {}", style("error:").red().bold(), failure);
    if failure.tally.total() > 0 {
        for line in tally_lines(&failure.tally) {
            eprintln!("{}", line);
        }
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{:.0}ms", seconds * 1000.0)
    } else if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else {
        format!("{:.0}m {:.0}s", (seconds / 60.0).floor(), seconds % 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_types::CatalogEntry;
    use rstest::rstest;
    use std::time::Duration;

    fn report(outcome: EntryOutcome) -> EntryReport {
        EntryReport {
            entry: CatalogEntry::new("maps/a", "aa", "bb"),
            verdict: None,
            outcome,
            url: None,
            duration: Duration::ZERO,
        }
    }

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1536, "1.5 KB")]
    #[case(3 * 1024 * 1024, "3.0 MB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[test]
    fn test_hide_up_to_date() {
        assert!(entry_line(&report(EntryOutcome::UpToDate), false, false).is_none());
        assert!(entry_line(&report(EntryOutcome::UpToDate), true, false).is_some());
    }

    #[test]
    fn test_not_present_shown_unless_hidden() {
        let line = entry_line(&report(EntryOutcome::NotPresent), true, true).unwrap();
        assert!(line.ends_with("maps/a not found"));
        assert!(entry_line(&report(EntryOutcome::NotPresent), true, false).is_none());
    }

    #[test]
    fn test_tool_lines_list_full_description() {
        let meta = ToolMetadata::new(
            "2.3.1",
            "0a1b2c3d4e5f",
            "ufo2map version 2.3.1\n  built from source 0a1b2c3d4e5f\n\ncompiled with gcc\n",
        );
        let lines = tool_lines("Local", &meta);
        assert!(lines[0].contains("Local"));
        assert_eq!(
            lines[1..],
            [
                "  * ufo2map version 2.3.1".to_string(),
                "  * built from source 0a1b2c3d4e5f".to_string(),
                "  * compiled with gcc".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_entry_names_cause() {
        let line = entry_line(
            &report(EntryOutcome::Failed {
                message: "connection reset".to_string(),
            }),
            false,
            false,
        )
        .unwrap();
        assert!(line.contains("maps/a"));
        assert!(line.contains("connection reset"));
    }

    #[test]
    fn test_tally_lines() {
        let mut tally = SyncTally::new();
        tally.record(&EntryOutcome::Updated { bytes: 1 });
        assert_eq!(
            tally_lines(&tally),
            vec!["1 upgraded, 0 version mismatched, 0 already up to date".to_string()]
        );

        tally.record(&EntryOutcome::Failed {
            message: String::new(),
        });
        tally.record(&EntryOutcome::NotPresent);
        assert_eq!(tally_lines(&tally)[1], "1 not checked out, 1 failed");
    }
}
