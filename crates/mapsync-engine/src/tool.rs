//! Inspection of the local tool
//!
//! The local description comes either from a text file or from the output of
//! the tool itself, and is parsed exactly like the repository copy.

use mapsync_config::ToolConfig;
use mapsync_types::{Error, Result, ToolMetadata};
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Where the local tool description is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalToolSource {
    /// A text file holding the description
    File(PathBuf),
    /// A command printing the description
    Command {
        /// Program to run
        program: PathBuf,
        /// Arguments
        args: Vec<String>,
    },
}

impl LocalToolSource {
    /// Pick the source configured in `tool`; the program defaults to `<root>/<name>`
    pub fn from_config(tool: &ToolConfig, root: &Path) -> Self {
        match &tool.metadata_file {
            Some(file) => Self::File(file.clone()),
            None => Self::Command {
                program: tool
                    .program
                    .clone()
                    .unwrap_or_else(|| root.join(&tool.name)),
                args: tool.args.clone(),
            },
        }
    }

    /// Read and parse the local description
    pub async fn inspect(&self) -> Result<ToolMetadata> {
        let text = match self {
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| not_found_or_io(path, &e))?,
            Self::Command { program, args } => run_tool(program, args).await?,
        };
        debug!("Local tool description: {}", text.trim());
        ToolMetadata::parse(&text)
    }
}

async fn run_tool(program: &Path, args: &[String]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| not_found_or_io(program, &e))?;

    if !output.status.success() {
        return Err(Error::io(format!(
            "{} exited with {}",
            program.display(),
            output.status
        )));
    }

    // Some builds print their banner on stderr
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

fn not_found_or_io(path: &Path, error: &io::Error) -> Error {
    if error.kind() == io::ErrorKind::NotFound {
        Error::FileNotFound {
            path: path.to_path_buf(),
        }
    } else {
        Error::io(format!("Failed to read {}: {}", path.display(), error))
    }
}
