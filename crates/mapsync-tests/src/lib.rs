//! mapsync end-to-end testing support
//!
//! Fixtures for running the complete sync driver against a repository mirror
//! on disk or served over HTTP from a local socket.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Mirror and game tree fixtures, payload helpers, instrumented transports,
/// scripted prompts and a minimal HTTP server.
pub mod test_utils;
