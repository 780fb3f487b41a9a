//! mapsync - keep compiled map artifacts in sync with a repository
//!
//! Compares the local map sources and compiled artifacts against the catalog
//! published for the installed compiler and downloads every artifact that is
//! out of date.

mod display;
mod json_output;
mod progress;
mod prompt;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use display::{display_failure, display_summary};
use json_output::RunResultJson;
use mapsync_config::{Config, ConfigLoader, LoggingConfig};
use mapsync_engine::{CancellationToken, DeclinePrompt, Prompt, RunFailure, SyncDriver};
use mapsync_types::{Concurrency, ErrorKind, ReplyMode};
use progress::{ConsoleProgress, ProgressOptions};
use prompt::DialoguerPrompt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;

/// mapsync - keep compiled map artifacts in sync with a repository
#[derive(Parser, Debug)]
#[command(
    name = "mapsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Download compiled maps whose sources match the repository catalog",
    long_about = "mapsync compares local map sources and compiled maps against the catalog\n\
                  published for your ufo2map build and installs every compiled map that\n\
                  is missing or out of date. Locally modified sources are never touched."
)]
struct Cli {
    /// Repository base URL or local mirror directory
    #[arg(short, long)]
    repository: Option<String>,

    /// Repository branch, or "auto" to follow the local ufo2map version
    #[arg(short, long)]
    branch: Option<String>,

    /// Answer to the version mismatch question: yes, no or query
    #[arg(long)]
    reply: Option<String>,

    /// Game directory holding the map sources
    #[arg(long)]
    root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,

    /// Number of entries processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Report what would be upgraded without downloading
    #[arg(long)]
    dry_run: bool,

    /// Skip hashing the installed artifact against the catalog
    #[arg(long)]
    no_verify: bool,

    /// Print "Downloading <url>" lines instead of live progress bars
    #[arg(long)]
    no_download_status: bool,

    /// Do not list maps that are already up to date
    #[arg(long)]
    hide_uptodate: bool,

    /// Do not list maps whose source is not checked out
    #[arg(long)]
    hide_notfound: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - only failures and the final tally
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = usage_exit_code(&e);
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            return ExitCode::from(exit_code(ErrorKind::Config));
        }
    };

    let _guard = match init_logging(&cli, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            return ExitCode::from(exit_code(ErrorKind::Config));
        }
    };

    if let Some(path) = &cli.generate_config {
        return match ConfigLoader::generate_default_config(path) {
            Ok(()) => {
                println!("Default configuration written to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                ExitCode::from(exit_code(ErrorKind::Io))
            }
        };
    }

    info!("mapsync v{} starting", env!("CARGO_PKG_VERSION"));
    ExitCode::from(run(&cli, config).await)
}

/// Load configuration and apply command line overrides.
///
/// The reply mode is checked first so a bad value fails before any I/O.
fn load_config(cli: &Cli) -> Result<Config> {
    let reply = cli
        .reply
        .as_deref()
        .map(str::parse::<ReplyMode>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ConfigLoader::load_default().context("Failed to load configuration")?,
    };

    if let Some(reply) = reply {
        config.display.reply = reply;
    }
    if let Some(repository) = &cli.repository {
        config.repository.base_url = repository.clone();
    }
    if let Some(branch) = &cli.branch {
        config.repository.branch = branch.clone();
    }
    if let Some(root) = &cli.root {
        config.sync.root = root.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.sync.concurrency = Concurrency::new(concurrency).map_err(anyhow::Error::msg)?;
    }
    if cli.dry_run {
        config.sync.dry_run = true;
    }
    if cli.no_verify {
        config.sync.verify_artifacts = false;
    }
    if cli.no_download_status {
        config.display.download_status = false;
    }
    if cli.hide_uptodate {
        config.display.show_up_to_date = false;
    }
    if cli.hide_notfound {
        config.display.show_not_present = false;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let (writer, guard) = match &logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), PathBuf::from);
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.colored_output && logging.file.is_none())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(guard)
}

async fn run(cli: &Cli, config: Config) -> u8 {
    let prompt: Arc<dyn Prompt> = if console::user_attended() {
        Arc::new(DialoguerPrompt::new())
    } else {
        Arc::new(DeclinePrompt)
    };
    let options = ProgressOptions {
        download_status: config.display.download_status && !cli.json,
        show_up_to_date: config.display.show_up_to_date,
        show_not_present: config.display.show_not_present,
        quiet: cli.quiet || cli.json,
    };

    let cancel = CancellationToken::new();
    let driver = match SyncDriver::from_config(config, prompt).await {
        Ok(driver) => driver.with_cancellation(cancel.clone()),
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return exit_code(e.kind());
        }
    };
    let console = Arc::new(ConsoleProgress::new(options));
    let driver = driver
        .with_reporter(console.clone())
        .with_observer(console);

    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", style("Cancelling...").yellow());
            signal.cancel();
        }
    });

    let result = driver.run().await;
    debug!("Run finished: {:?}", result.as_ref().map(|r| r.tally));
    match result {
        Ok(report) => {
            if cli.json {
                print_json(&RunResultJson::success(&report));
            } else {
                display_summary(&report, cli.quiet);
            }
            0
        }
        Err(failure) => {
            let code = exit_code(failure.error.kind());
            report_failure(cli, &failure, code);
            code
        }
    }
}

fn report_failure(cli: &Cli, failure: &RunFailure, code: u8) {
    if cli.json {
        print_json(&RunResultJson::failure(failure, code));
    } else {
        display_failure(failure);
    }
}

fn print_json(document: &RunResultJson<'_>) {
    match document.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{} failed to encode report: {}", style("error:").red().bold(), e),
    }
}

/// Exit status for a command line that clap rejected.
///
/// `--help` and `--version` succeed; malformed flags are configuration errors.
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        exit_code(ErrorKind::Config)
    } else {
        0
    }
}

/// Process exit status for a fatal error
fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Config => 1,
        ErrorKind::Network | ErrorKind::Protocol | ErrorKind::Timeout => 2,
        ErrorKind::Declined => 3,
        ErrorKind::Io | ErrorKind::Decode | ErrorKind::Verification | ErrorKind::Other => 4,
        ErrorKind::Cancelled => 130,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(ErrorKind::Config, 1)]
    #[case(ErrorKind::Network, 2)]
    #[case(ErrorKind::Protocol, 2)]
    #[case(ErrorKind::Timeout, 2)]
    #[case(ErrorKind::Declined, 3)]
    #[case(ErrorKind::Decode, 4)]
    #[case(ErrorKind::Io, 4)]
    #[case(ErrorKind::Cancelled, 130)]
    fn test_exit_codes(#[case] kind: ErrorKind, #[case] expected: u8) {
        assert_eq!(exit_code(kind), expected);
    }

    #[rstest]
    #[case(&["mapsync", "--concurrency", "abc"])]
    #[case(&["mapsync", "--no-such-flag"])]
    fn test_malformed_flags_are_configuration_errors(#[case] args: &[&str]) {
        let err = Cli::try_parse_from(args.iter().copied()).unwrap_err();
        let code = usage_exit_code(&err);
        assert_eq!(code, exit_code(ErrorKind::Config));
        assert_ne!(code, exit_code(ErrorKind::Network));
    }

    #[rstest]
    #[case("--help")]
    #[case("--version")]
    fn test_help_and_version_exit_cleanly(#[case] flag: &str) {
        let err = Cli::try_parse_from(["mapsync", flag]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 0);
    }

    fn config_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("mapsync.yaml");
        ConfigLoader::generate_default_config(&path).unwrap();
        path
    }

    #[test]
    fn test_invalid_reply_rejected() {
        let cli = Cli::parse_from(["mapsync", "--reply", "maybe"]);
        let err = load_config(&cli).unwrap_err();
        assert!(err.to_string().contains("invalid reply mode"));
    }

    #[test]
    fn test_flags_override_config() {
        let dir = TempDir::new().unwrap();
        let path = config_file(&dir);
        let cli = Cli::parse_from([
            "mapsync",
            "--config",
            path.to_str().unwrap(),
            "--repository",
            "http://mirror.example/maps",
            "--branch",
            "2.4",
            "--reply",
            "yes",
            "--concurrency",
            "4",
            "--hide-uptodate",
            "--hide-notfound",
            "--no-download-status",
            "--dry-run",
        ]);
        let config = load_config(&cli).unwrap();

        assert_eq!(config.repository.base_url, "http://mirror.example/maps");
        assert_eq!(config.repository.branch, "2.4");
        assert_eq!(config.display.reply, ReplyMode::Yes);
        assert_eq!(config.sync.concurrency.get(), 4);
        assert!(!config.display.show_up_to_date);
        assert!(!config.display.show_not_present);
        assert!(!config.display.download_status);
        assert!(config.sync.dry_run);
    }

    #[test]
    fn test_invalid_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let path = config_file(&dir);
        let cli = Cli::parse_from([
            "mapsync",
            "--config",
            path.to_str().unwrap(),
            "--concurrency",
            "0",
        ]);
        assert!(load_config(&cli).is_err());
    }
}
