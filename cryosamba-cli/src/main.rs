//! CryoSamba CLI: interactive wizard for denoising experiments.
//!
//! Without a subcommand the menu-driven wizard starts. Subcommands cover
//! one-shot tasks: creating an experiment, listing experiments, querying
//! devices and managing the settings file.

mod commands;
mod terminal;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// CryoSamba: set up, train and run inference on denoising experiments
#[derive(Parser, Debug)]
#[command(name = "cryosamba", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (settings, relative data paths and the default runs folder)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory holding the experiments (overrides the settings file)
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Set up a new experiment with the given name
    New {
        /// Experiment name
        name: String,
    },
    /// List existing experiments
    List,
    /// Show the device report and the available GPUs
    Devices,
    /// Manage the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write the default settings to .cryosamba/config.toml
    Init,
    /// Print the merged settings
    Show,
}

fn stderr_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable layer for stderr; kept quiet by default so prompts stay readable
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(stderr_filter(cli.verbose, cli.quiet)));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("org", "cryosamba", "cryosamba")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cryosamba.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let ctx = commands::Context::new(workspace, cli.runs_dir);
    let result = match cli.command {
        None => commands::run_menu(&ctx).await,
        Some(command) => commands::handle_command(command, &ctx).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Command failed");
            eprintln!("An error occurred: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_starts_menu() {
        let cli = Cli::try_parse_from(["cryosamba"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.workspace, PathBuf::from("."));
        assert!(cli.runs_dir.is_none());
    }

    #[test]
    fn test_new_takes_a_name() {
        let cli = Cli::try_parse_from(["cryosamba", "--runs-dir", "/data/runs", "new", "e1"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::New { ref name }) if name == "e1"));
        assert_eq!(cli.runs_dir, Some(PathBuf::from("/data/runs")));
        assert!(Cli::try_parse_from(["cryosamba", "new"]).is_err());
    }

    #[test]
    fn test_config_actions() {
        let cli = Cli::try_parse_from(["cryosamba", "config", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Init
            })
        ));
    }

    #[test]
    fn test_stderr_filter_levels() {
        assert_eq!(stderr_filter(0, false), "warn");
        assert_eq!(stderr_filter(0, true), "error");
        assert_eq!(stderr_filter(1, false), "info");
        assert_eq!(stderr_filter(2, true), "debug");
        assert_eq!(stderr_filter(5, false), "trace");
    }
}
