//! Shell command language.
//!
//! One line holds one or more `;`-separated statements. Each statement is a
//! case-insensitive command word followed by a fixed number of
//! whitespace-separated arguments:
//!
//! | Command | Arguments | Effect |
//! |---------|-----------|--------|
//! | `SET` | key value | Create or overwrite a key |
//! | `GET` | key | Read a key |
//! | `APPEND` | key value | Append to a key's value |
//! | `DELETE` | key | Delete a key |
//! | `KEYS` | | List keys in the current db |
//! | `EXISTS` | key | Report whether a key exists |
//! | `USE` | db | Switch db (namespace) |
//! | `CONFIG` | item value | Change `HOST`, `TOKEN`, `DB`, `BRANCH` or `CACHE` |
//! | `EXIT` | | Leave the shell |

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Setting changed by `CONFIG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigItem {
    /// Connection string.
    Host,
    /// Access token.
    Token,
    /// Namespace.
    Db,
    /// Branch.
    Branch,
    /// Read and listing caches.
    Cache,
}

impl FromStr for ConfigItem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "HOST" => Ok(Self::Host),
            "TOKEN" => Ok(Self::Token),
            "DB" => Ok(Self::Db),
            "BRANCH" => Ok(Self::Branch),
            "CACHE" => Ok(Self::Cache),
            other => Err(Error::InvalidInput(format!(
                "CONFIG does not recognize '{other}' (expected HOST, TOKEN, DB, BRANCH or CACHE)"
            ))),
        }
    }
}

impl fmt::Display for ConfigItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Host => "HOST",
            Self::Token => "TOKEN",
            Self::Db => "DB",
            Self::Branch => "BRANCH",
            Self::Cache => "CACHE",
        };
        f.write_str(name)
    }
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// `SET key value`
    Set {
        /// Key.
        key: String,
        /// Value.
        value: String,
    },
    /// `GET key`
    Get {
        /// Key.
        key: String,
    },
    /// `APPEND key value`
    Append {
        /// Key.
        key: String,
        /// Suffix.
        value: String,
    },
    /// `DELETE key`
    Delete {
        /// Key.
        key: String,
    },
    /// `KEYS`
    Keys,
    /// `EXISTS key`
    Exists {
        /// Key.
        key: String,
    },
    /// `USE db`
    Use {
        /// Namespace.
        db: String,
    },
    /// `CONFIG item value`
    Config {
        /// Setting.
        item: ConfigItem,
        /// New value.
        value: String,
    },
    /// `EXIT`
    Exit,
}

/// Command words and their argument counts.
const ARITY: &[(&str, usize)] = &[
    ("SET", 2),
    ("GET", 1),
    ("APPEND", 2),
    ("DELETE", 1),
    ("KEYS", 0),
    ("EXISTS", 1),
    ("USE", 1),
    ("CONFIG", 2),
    ("EXIT", 0),
];

/// Parses a line into statements.
///
/// Blank statements are skipped. The whole line is rejected if any
/// statement is malformed, so nothing runs from a half-valid line.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an unknown command, a wrong argument
/// count, an unknown `CONFIG` item or a non-boolean `CONFIG CACHE` value.
///
/// # Examples
///
/// ```rust
/// use gitkv::cli::{ShellCommand, parse_line};
///
/// let commands = parse_line("set alpha v1; GET alpha").unwrap();
/// assert_eq!(commands.len(), 2);
/// assert_eq!(commands[1], ShellCommand::Get { key: "alpha".to_string() });
/// ```
pub fn parse_line(line: &str) -> Result<Vec<ShellCommand>> {
    line.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(parse_statement)
        .collect()
}

fn parse_statement(statement: &str) -> Result<ShellCommand> {
    let mut fields = statement.split_whitespace();
    let word = fields.next().unwrap_or_default().to_uppercase();
    let args: Vec<String> = fields.map(ToString::to_string).collect();

    let expected = ARITY
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, arity)| *arity)
        .ok_or_else(|| Error::InvalidInput(format!("invalid command '{word}'")))?;
    if args.len() != expected {
        return Err(Error::InvalidInput(format!(
            "command \"{word}\" expects {expected} arguments, but {} arguments got",
            args.len()
        )));
    }

    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or_default();

    let command = match word.as_str() {
        "SET" => ShellCommand::Set {
            key: next(),
            value: next(),
        },
        "GET" => ShellCommand::Get { key: next() },
        "APPEND" => ShellCommand::Append {
            key: next(),
            value: next(),
        },
        "DELETE" => ShellCommand::Delete { key: next() },
        "KEYS" => ShellCommand::Keys,
        "EXISTS" => ShellCommand::Exists { key: next() },
        "USE" => ShellCommand::Use { db: next() },
        "CONFIG" => {
            let item: ConfigItem = next().parse()?;
            let value = next();
            if item == ConfigItem::Cache {
                parse_bool(&value)?;
            }
            ShellCommand::Config { item, value }
        },
        _ => ShellCommand::Exit,
    };
    Ok(command)
}

/// Parses a `CONFIG CACHE` value.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless the value is `true` or `false`.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::InvalidInput(format!(
            "expected true or false, got '{other}'"
        ))),
    }
}
