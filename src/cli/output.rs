//! Command output formatting.

use crate::models::Record;
use crate::{Error, Result};
use std::io::Write;

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Pretty JSON records followed by the elapsed time.
    #[default]
    Json,
    /// Only values or key names.
    Short,
}

impl OutputMode {
    /// Picks the mode from the `--short-output` flag.
    #[must_use]
    pub const fn from_short_flag(short: bool) -> Self {
        if short { Self::Short } else { Self::Json }
    }

    /// Whether elapsed time is printed after each command.
    #[must_use]
    pub const fn shows_elapsed(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Prints one record.
pub fn write_record<W: Write>(out: &mut W, record: &Record, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Short => write_line(out, &record.content),
        OutputMode::Json => write_line(out, &to_pretty_json(record)?),
    }
}

/// Prints a listing: full records, or a JSON array of names in short mode.
pub fn write_list<W: Write>(out: &mut W, records: &[Record], mode: OutputMode) -> Result<()> {
    if records.is_empty() {
        return write_line(out, "[]");
    }
    let rendered = match mode {
        OutputMode::Short => {
            let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
            to_pretty_json(&names)?
        },
        OutputMode::Json => to_pretty_json(records)?,
    };
    write_line(out, &rendered)
}

/// Prints the message for an absent key.
pub fn write_not_found<W: Write>(out: &mut W, key: &str) -> Result<()> {
    write_line(out, &format!("Key \"{key}\" not found"))
}

/// Prints the elapsed time of a command.
pub fn write_elapsed<W: Write>(out: &mut W, elapsed_ms: u128) -> Result<()> {
    write_line(out, &format!("({elapsed_ms} ms)"))
}

/// Prints one line.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{line}").map_err(|e| Error::OperationFailed {
        operation: "write_output".to_string(),
        cause: e.to_string(),
    })
}

fn to_pretty_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_output".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, content: &str) -> Record {
        let mut record = Record {
            name: name.to_string(),
            ..Record::missing()
        };
        record.set_content(content.to_string());
        record
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_short_record_is_value_only() {
        let text = render(|out| write_record(out, &record("k", "v1"), OutputMode::Short));
        assert_eq!(text, "v1\n");
    }

    #[test]
    fn test_json_record() {
        let text = render(|out| write_record(out, &record("k", "v1"), OutputMode::Json));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["name"], "k");
        assert_eq!(value["size"], 2);
    }

    #[test]
    fn test_lists() {
        let records = vec![record("a", ""), record("b", "")];
        let short = render(|out| write_list(out, &records, OutputMode::Short));
        let names: Vec<String> = serde_json::from_str(&short).unwrap();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(render(|out| write_list(out, &[], OutputMode::Json)), "[]\n");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            render(|out| write_not_found(out, "alpha")),
            "Key \"alpha\" not found\n"
        );
        assert_eq!(render(|out| write_elapsed(out, 12)), "(12 ms)\n");
    }
}
