//! Live progress for downloads and entries
//!
//! One [`ConsoleProgress`] serves both as the download reporter and as the
//! run observer, so entry lines are printed above the active download bars
//! instead of tearing through them.

use crate::display::{entry_line, tool_lines, tool_mismatch_lines};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use mapsync_engine::{SyncEvent, SyncObserver};
use mapsync_types::{EntryOutcome, ProgressReporter};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// What the console shows during a run
#[derive(Debug, Clone, Copy)]
pub struct ProgressOptions {
    /// Live byte counters for downloads
    pub download_status: bool,
    /// Print entries that are already up to date
    pub show_up_to_date: bool,
    /// Print entries whose source is not checked out
    pub show_not_present: bool,
    /// Only print failures
    pub quiet: bool,
}

/// Console reporter backed by indicatif
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    options: ProgressOptions,
}

impl ConsoleProgress {
    /// Create a reporter drawing on stderr
    pub fn new(options: ProgressOptions) -> Self {
        let target = if options.quiet || !options.download_status {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            options,
        }
    }

    fn print(&self, line: &str) {
        self.multi.suspend(|| println!("{}", line));
    }

    fn bar_style(total: Option<u64>) -> ProgressStyle {
        match total {
            Some(_) => ProgressStyle::with_template(
                "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
            )
            .map(|s| s.progress_chars("█▉▊▋▌▍▎▏  "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
            None => ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        }
    }

    fn finish_bar(&self, url: &str) {
        let bar = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url);
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn download_started(&self, url: &str, total: Option<u64>) {
        if self.options.quiet {
            return;
        }
        if !self.options.download_status {
            self.print(&format!("Downloading {}", url));
            return;
        }

        let bar = self
            .multi
            .add(ProgressBar::new(total.unwrap_or(0)));
        bar.set_style(Self::bar_style(total));
        bar.set_message(short_name(url).to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), bar);
    }

    fn download_progress(&self, url: &str, bytes: u64) {
        if let Some(bar) = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            bar.set_position(bytes);
        }
    }

    fn download_finished(&self, url: &str, _bytes: u64) {
        self.finish_bar(url);
    }
}

impl SyncObserver for ConsoleProgress {
    fn on_event(&self, event: &SyncEvent<'_>) {
        match event {
            SyncEvent::LocalTool(meta) if !self.options.quiet => {
                for line in tool_lines("Local", meta) {
                    self.print(&line);
                }
            }
            SyncEvent::RemoteTool(meta) if !self.options.quiet => {
                for line in tool_lines("Repository", meta) {
                    self.print(&line);
                }
            }
            SyncEvent::RepositoryResolved(repository) if !self.options.quiet => {
                self.print(&format!(
                    "{} {}",
                    style("Syncing from").bold(),
                    style(repository).cyan()
                ));
            }
            SyncEvent::ToolMismatch { local, remote, .. } => {
                for line in tool_mismatch_lines(local, remote) {
                    self.print(&line);
                }
            }
            SyncEvent::CatalogIssue(issue) if !self.options.quiet => {
                self.print(&format!("{} {}", style("warning:").yellow().bold(), issue));
            }
            SyncEvent::Entry(report) => {
                // A failed download never reports completion
                if let Some(url) = &report.url {
                    self.finish_bar(url);
                }
                let show = !self.options.quiet
                    || matches!(report.outcome, EntryOutcome::Failed { .. });
                if show {
                    if let Some(line) = entry_line(
                        report,
                        self.options.show_up_to_date,
                        self.options.show_not_present,
                    ) {
                        self.print(&line);
                    }
                }
            }
            _ => {}
        }
    }
}

fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ProgressOptions {
        ProgressOptions {
            download_status: true,
            show_up_to_date: true,
            show_not_present: true,
            quiet: false,
        }
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("http://mirror/2.3/maps/a.bsp.gz"), "a.bsp.gz");
        assert_eq!(short_name("a.bsp.gz"), "a.bsp.gz");
    }

    #[test]
    fn test_bars_are_tracked_per_url() {
        let progress = ConsoleProgress::new(options());
        progress.download_started("http://mirror/a.bsp.gz", Some(100));
        progress.download_started("http://mirror/b.bsp.gz", None);
        progress.download_progress("http://mirror/a.bsp.gz", 50);
        assert_eq!(progress.bars.lock().unwrap().len(), 2);

        progress.download_finished("http://mirror/a.bsp.gz", 100);
        assert_eq!(progress.bars.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_quiet_creates_no_bars() {
        let progress = ConsoleProgress::new(ProgressOptions {
            quiet: true,
            ..options()
        });
        progress.download_started("http://mirror/a.bsp.gz", Some(100));
        assert!(progress.bars.lock().unwrap().is_empty());
    }
}
