//! Binary entry point for gitkv.
//!
//! Configuration is layered: config file, then `.env` and `GITKV_*`
//! environment variables, then command-line flags.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use gitkv::cli::{Flow, OutputMode, Shell, ShellCommand, parse_line};
use gitkv::config::{ConfigFile, StoreConfigBuilder};
use gitkv::observability;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// gitkv - a key-value store backed by a git repository.
#[derive(Parser)]
#[command(name = "gitkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Connection string: an https or ssh git clone link.
    #[arg(short = 'H', long, env = "GITKV_HOST", global = true)]
    host: Option<String>,

    /// Access token for the repository.
    #[arg(short, long, env = "GITKV_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Database (repository subdirectory) to use.
    #[arg(short, long, env = "GITKV_DB", global = true)]
    db: Option<String>,

    /// Branch to commit to.
    #[arg(short, long, env = "GITKV_BRANCH", global = true)]
    branch: Option<String>,

    /// Secret for encrypting keys and values.
    #[arg(long, env = "GITKV_SECRET", hide_env_values = true, global = true)]
    secret: Option<String>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only output values or key names.
    #[arg(short, long, global = true)]
    short_output: bool,

    /// Disable the read and listing caches.
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Get the value of a key.
    Get {
        /// Key name.
        key: String,
    },

    /// Set the value of a key.
    Set {
        /// Key name.
        key: String,
        /// Value.
        value: String,
    },

    /// Append to the value of a key.
    Append {
        /// Key name.
        key: String,
        /// Value to append.
        value: String,
    },

    /// Delete a key.
    Delete {
        /// Key name.
        key: String,
    },

    /// List all keys.
    Keys,

    /// Check whether a key exists.
    Exists {
        /// Key name.
        key: String,
    },

    /// Execute shell statements separated by ';' and quit.
    Exec {
        /// Statements, e.g. "USE sessions; GET alpha".
        line: String,
    },

    /// Start the interactive shell (default).
    Shell,
}

fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let file = match load_config_file(cli.config.as_ref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let debug_env = std::env::var("GITKV_DEBUG")
        .is_ok_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"));
    let debug = cli.verbose || debug_env || file.debug.unwrap_or(false);
    if let Err(e) = observability::init_from_settings(file.logging.as_ref(), debug) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Loads the explicit config file, or the default one if present.
fn load_config_file(path: Option<&PathBuf>) -> anyhow::Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(ConfigFile::load_default()?.unwrap_or_default()),
    }
}

/// Applies command-line flags on top of file and environment settings.
fn build_config(cli: &Cli, file: ConfigFile) -> StoreConfigBuilder {
    let mut builder = StoreConfigBuilder::from_config_file(file).with_env();

    if let Some(host) = &cli.host {
        builder = builder.with_host(host.as_str());
    }
    if let Some(token) = &cli.token {
        builder = builder.with_token(token.as_str());
    }
    if let Some(db) = &cli.db {
        builder = builder.with_namespace(db.as_str());
    }
    if let Some(branch) = &cli.branch {
        builder = builder.with_branch(branch.as_str());
    }
    if let Some(secret) = &cli.secret {
        builder = builder.with_secret(secret.as_str());
    }
    if cli.verbose {
        builder = builder.with_debug(true);
    }
    if cli.no_cache {
        builder = builder.with_cache(false);
    }
    builder
}

/// Runs the selected command.
fn run_command(cli: Cli, file: ConfigFile) -> anyhow::Result<()> {
    let builder = build_config(&cli, file);
    let mut shell = Shell::new(builder, OutputMode::from_short_flag(cli.short_output));
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let statements = match cli.command {
        None | Some(Commands::Shell) => {
            shell.connect().context("connecting to host")?;
            let stdin = io::stdin();
            shell.run(stdin.lock(), &mut out)?;
            return Ok(());
        },
        Some(Commands::Exec { line }) => parse_line(&line)?,
        Some(Commands::Get { key }) => vec![ShellCommand::Get { key }],
        Some(Commands::Set { key, value }) => vec![ShellCommand::Set { key, value }],
        Some(Commands::Append { key, value }) => vec![ShellCommand::Append { key, value }],
        Some(Commands::Delete { key }) => vec![ShellCommand::Delete { key }],
        Some(Commands::Keys) => vec![ShellCommand::Keys],
        Some(Commands::Exists { key }) => vec![ShellCommand::Exists { key }],
    };

    shell.require_connection().context(
        "host and token are required; pass --host and --token or set GITKV_HOST and GITKV_TOKEN",
    )?;
    for statement in statements {
        if shell.execute(statement, &mut out)? == Flow::Exit {
            break;
        }
    }
    out.flush().context("flushing output")?;
    Ok(())
}
