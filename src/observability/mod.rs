//! Observability.
//!
//! Library code emits `tracing` events with a `category` field (`github`,
//! `kv`, `cipher`) and `metrics` counters. Nothing is printed unless the
//! binary installs a subscriber with [`init`].

mod logging;

pub use logging::{LogFormat, LoggingConfig};

use crate::config::ConfigFileLogging;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing::Dispatch;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initializes logging from config file settings with env overrides.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log file
/// cannot be opened.
pub fn init_from_settings(settings: Option<&ConfigFileLogging>, verbose: bool) -> Result<()> {
    init(LoggingConfig::from_settings(settings, verbose))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if logging has already been initialized, the filter is
/// invalid or the log file cannot be opened.
pub fn init(config: LoggingConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    tracing::dispatcher::set_global_default(dispatch(&config)?).map_err(|e| {
        Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: e.to_string(),
        }
    })?;

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "failed to mark observability initialized".to_string(),
        })?;

    Ok(())
}

/// Builds the subscriber described by `config` without installing it.
fn dispatch(config: &LoggingConfig) -> Result<Dispatch> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        Error::Configuration(format!("invalid log filter '{}': {e}", config.filter))
    })?;
    Ok(Dispatch::new(
        tracing_subscriber::registry()
            .with(format_layer(config)?)
            .with(filter),
    ))
}

/// One fmt layer; the format and the destination vary independently.
///
/// Files get plain single-line output with thread ids. The terminal gets
/// colors and, for the pretty format, multi-line events.
fn format_layer(config: &LoggingConfig) -> Result<BoxedLayer> {
    let to_file = config.file.is_some();
    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(!to_file)
        .with_target(true)
        .with_thread_ids(to_file);

    Ok(match (config.format, to_file) {
        (LogFormat::Json, _) => layer.json().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().boxed(),
        (LogFormat::Pretty, true) => layer.boxed(),
    })
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}
