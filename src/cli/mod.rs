//! Command-line interface.
//!
//! The `gitkv` binary runs either one command and exits or an interactive
//! shell. Both go through [`Shell`], which executes the line language parsed
//! by [`parse_line`].
//!
//! # Example Usage
//!
//! ```bash
//! # One-shot commands
//! gitkv -H git@github.com:octocat/kv-data.git -t "$TOKEN" set alpha v1
//! gitkv -H git@github.com:octocat/kv-data.git -t "$TOKEN" -s get alpha
//!
//! # Several statements in one call
//! gitkv -H https://github.com/octocat/kv-data.git exec "USE sessions; KEYS"
//!
//! # Interactive shell
//! gitkv shell
//! gitkv> CONFIG HOST git@github.com:octocat/kv-data.git
//! gitkv> GET alpha
//! ```

mod command;
mod output;
mod shell;

pub use command::{ConfigItem, ShellCommand, parse_bool, parse_line};
pub use output::{OutputMode, write_list, write_record};
pub use shell::{Flow, PROMPT, Shell, StoreOpener};
