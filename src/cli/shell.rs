//! Command executor and interactive loop.

use crate::cli::command::{ConfigItem, ShellCommand, parse_bool, parse_line};
use crate::cli::output::{
    OutputMode, write_elapsed, write_line, write_list, write_not_found, write_record,
};
use crate::config::{StoreConfig, StoreConfigBuilder};
use crate::services::KvStore;
use crate::{Error, Result};
use std::io::{BufRead, Write};
use std::time::Instant;

/// Prompt printed before each interactive line.
pub const PROMPT: &str = "gitkv> ";

/// Opens a store from a configuration.
pub type StoreOpener = Box<dyn Fn(StoreConfig) -> Result<KvStore> + Send + Sync>;

/// Whether the shell keeps reading after a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// `EXIT` was executed.
    Exit,
}

/// Executes shell statements against a store.
///
/// The shell keeps the configuration builder so `CONFIG` can derive a new
/// immutable configuration and reopen the store.
pub struct Shell {
    builder: StoreConfigBuilder,
    store: Option<KvStore>,
    opener: StoreOpener,
    output: OutputMode,
}

impl Shell {
    /// Creates a shell that opens stores over HTTPS.
    #[must_use]
    pub fn new(builder: StoreConfigBuilder, output: OutputMode) -> Self {
        Self::with_opener(builder, output, Box::new(KvStore::open))
    }

    /// Creates a shell with a custom store opener.
    #[must_use]
    pub fn with_opener(builder: StoreConfigBuilder, output: OutputMode, opener: StoreOpener) -> Self {
        Self {
            builder,
            store: None,
            opener,
            output,
        }
    }

    /// Opens the store if a host and token are known.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be opened.
    pub fn connect(&mut self) -> Result<()> {
        if !self.builder.has_connection() {
            return Ok(());
        }
        let config = self.builder.clone().build()?;
        self.store = Some((self.opener)(config)?);
        Ok(())
    }

    /// Opens the store, failing if the host or token is missing.
    ///
    /// # Errors
    ///
    /// Returns the configuration error explaining what is missing.
    pub fn require_connection(&mut self) -> Result<()> {
        if self.store.is_none() {
            let config = self.builder.clone().build()?;
            self.store = Some((self.opener)(config)?);
        }
        Ok(())
    }

    /// The open store, if any.
    #[must_use]
    pub const fn store(&self) -> Option<&KvStore> {
        self.store.as_ref()
    }

    /// Parses and executes one line.
    ///
    /// Statements run in order; the first failure stops the line.
    ///
    /// # Errors
    ///
    /// Returns the parse error or the first failing statement's error.
    pub fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        for command in parse_line(line)? {
            if self.execute(command, out)? == Flow::Exit {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Executes one statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not configured or the operation
    /// fails.
    pub fn execute<W: Write>(&mut self, command: ShellCommand, out: &mut W) -> Result<Flow> {
        let started = Instant::now();
        let timed = match command {
            ShellCommand::Exit => {
                write_line(out, "Thanks for using gitkv")?;
                return Ok(Flow::Exit);
            },
            ShellCommand::Config { item, value } => {
                self.configure(item, &value)?;
                false
            },
            ShellCommand::Use { db } => {
                self.connected()?.set_namespace(&db)?;
                self.builder = self.builder.clone().with_namespace(db.as_str());
                false
            },
            ShellCommand::Set { key, value } => {
                let record = self.connected()?.set(&key, &value)?;
                write_record(out, &record, self.output)?;
                true
            },
            ShellCommand::Append { key, value } => {
                let record = self.connected()?.append(&key, &value)?;
                write_record(out, &record, self.output)?;
                true
            },
            ShellCommand::Get { key } => {
                let record = self.connected()?.get(&key)?;
                if record.exists() {
                    write_record(out, &record, self.output)?;
                } else {
                    write_not_found(out, &key)?;
                }
                true
            },
            ShellCommand::Delete { key } => {
                let record = self.connected()?.delete(&key)?;
                if record.commit.is_empty() {
                    write_not_found(out, &key)?;
                } else {
                    write_record(out, &record, self.output)?;
                }
                true
            },
            ShellCommand::Keys => {
                let records = self.connected()?.list()?;
                write_list(out, &records, self.output)?;
                true
            },
            ShellCommand::Exists { key } => {
                let exists = self.connected()?.exists(&key)?;
                write_line(out, if exists { "true" } else { "false" })?;
                true
            },
        };

        if timed && self.output.shows_elapsed() {
            write_elapsed(out, started.elapsed().as_millis())?;
        }
        Ok(Flow::Continue)
    }

    /// Runs the interactive loop until `EXIT` or end of input.
    ///
    /// Statement errors are printed and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if input cannot be read or output cannot be
    /// written.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        write_line(
            out,
            &format!("gitkv shell version v{}", env!("CARGO_PKG_VERSION")),
        )?;
        prompt(out)?;

        for line in input.lines() {
            let line = line.map_err(|e| Error::OperationFailed {
                operation: "read_input".to_string(),
                cause: e.to_string(),
            })?;
            match self.execute_line(&line, out) {
                Ok(Flow::Exit) => return Ok(()),
                Ok(Flow::Continue) => {},
                Err(e) => {
                    tracing::debug!(error = %e, "Shell statement failed");
                    write_line(out, &format!("Error: {e}"))?;
                },
            }
            prompt(out)?;
        }
        Ok(())
    }

    fn connected(&self) -> Result<&KvStore> {
        self.store.as_ref().ok_or_else(|| {
            Error::Configuration("no host configured; run CONFIG HOST <clone link>".to_string())
        })
    }

    fn configure(&mut self, item: ConfigItem, value: &str) -> Result<()> {
        let builder = self.builder.clone();
        let builder = match item {
            ConfigItem::Host => builder.with_host(value),
            ConfigItem::Token => builder.with_token(value),
            ConfigItem::Db => builder.with_namespace(value),
            ConfigItem::Branch => builder.with_branch(value),
            ConfigItem::Cache => builder.with_cache(parse_bool(value)?),
        };

        if builder.has_connection() {
            let config = builder.clone().build()?;
            self.store = Some((self.opener)(config)?);
        }
        self.builder = builder;
        tracing::debug!(category = "kv", item = %item, "Configuration changed");
        Ok(())
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("store", &self.store)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

fn prompt<W: Write>(out: &mut W) -> Result<()> {
    write!(out, "{PROMPT}")
        .and_then(|()| out.flush())
        .map_err(|e| Error::OperationFailed {
            operation: "write_output".to_string(),
            cause: e.to_string(),
        })
}
