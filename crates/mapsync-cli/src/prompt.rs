//! Interactive confirmation

use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use mapsync_engine::Prompt;
use mapsync_types::{Error, Result};

/// Asks on the terminal; pressing Enter continues
#[derive(Debug)]
pub struct DialoguerPrompt {
    default_answer: bool,
}

impl DialoguerPrompt {
    /// Prompt that continues unless the user answers no
    pub fn new() -> Self {
        Self {
            default_answer: true,
        }
    }

    /// Answer taken when the user just presses Enter
    pub fn default_answer(&self) -> bool {
        self.default_answer
    }
}

impl Default for DialoguerPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for DialoguerPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(self.default_answer)
            .interact()
            .map_err(|e| Error::io(format!("Failed to read answer: {}", e)))
    }
}
