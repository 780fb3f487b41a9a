//! Confirmation policy for tool mismatches

use mapsync_types::{ReplyMode, Result};
use tracing::info;

/// Source of interactive yes/no answers
pub trait Prompt: Send + Sync {
    /// Ask `question`; `Ok(true)` means continue
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompt for non-interactive runs; every question is declined
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinePrompt;

impl Prompt for DeclinePrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        info!("No terminal to ask \"{}\", declining", question);
        Ok(false)
    }
}

/// Decide whether the run continues after a tool mismatch.
///
/// `Yes` and `No` answer without asking; `Query` delegates to `prompt`.
pub fn should_continue(policy: ReplyMode, question: &str, prompt: &dyn Prompt) -> Result<bool> {
    match policy {
        ReplyMode::Yes => {
            info!("{} yes (automatic)", question);
            Ok(true)
        }
        ReplyMode::No => {
            info!("{} no (automatic)", question);
            Ok(false)
        }
        ReplyMode::Query => prompt.confirm(question),
    }
}
