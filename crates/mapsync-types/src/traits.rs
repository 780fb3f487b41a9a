//! Core traits for mapsync operations
//!
//! Seams between the library crates and their front ends: progress display
//! and run cancellation.

/// Trait for reporting payload download progress
///
/// Progress is an observability side effect; implementations must not fail.
pub trait ProgressReporter: Send + Sync {
    /// A download has started; `total` comes from the transport when known
    fn download_started(&self, url: &str, total: Option<u64>);

    /// `bytes` have been received so far
    fn download_progress(&self, url: &str, bytes: u64);

    /// The download completed with `bytes` received
    fn download_finished(&self, url: &str, bytes: u64);
}

/// Reporter that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn download_started(&self, _url: &str, _total: Option<u64>) {}

    fn download_progress(&self, _url: &str, _bytes: u64) {}

    fn download_finished(&self, _url: &str, _bytes: u64) {}
}

/// Trait for operation cancellation
pub trait Cancellable {
    /// Cancel the operation
    fn cancel(&self);

    /// Check if the operation is cancelled
    fn is_cancelled(&self) -> bool;
}
