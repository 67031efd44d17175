//! CSV row writer
//!
//! One row per dispatched element, one field per immediate child holding
//! the child's text. Fields are separated by `;`, quoted with `"` only when
//! they contain the delimiter, the quote or a line break, and rows end with
//! `\r\n`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

use crate::error::HandlerError;
use crate::handler::{DispatchContext, Handler};

const DELIMITER: u8 = b';';
const QUOTE: u8 = b'"';
const TERMINATOR: &[u8] = b"\r\n";

/// Appends one CSV row per element
pub struct CsvRowWriter<W: Write = File> {
    out: W,
    /// Row being assembled; reused between rows
    line: Vec<u8>,
    /// Child path logged at debug level for every row
    probe: Option<String>,
    rows: u64,
}

impl CsvRowWriter<File> {
    /// Open `path` for appending, creating it if needed
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(out: W) -> Self {
        CsvRowWriter {
            out,
            line: Vec::with_capacity(256),
            probe: None,
            rows: 0,
        }
    }

    /// Log the text at `path` (e.g. `ns:c1`) for every row
    pub fn with_probe(mut self, path: impl Into<String>) -> Self {
        self.probe = Some(path.into());
        self
    }

    /// Write and flush one row
    pub fn write_row<I, S>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.line.clear();
        let mut count = 0;
        for field in fields {
            if count > 0 {
                self.line.push(DELIMITER);
            }
            write_field(&mut self.line, field.as_ref().as_bytes());
            count += 1;
        }
        // A lone empty field would read back as an empty line
        if count == 1 && self.line.is_empty() {
            self.line.extend_from_slice(&[QUOTE, QUOTE]);
        }
        self.line.extend_from_slice(TERMINATOR);

        self.out.write_all(&self.line)?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn needs_quotes(field: &[u8]) -> bool {
    field
        .iter()
        .any(|&b| matches!(b, DELIMITER | QUOTE | b'\r' | b'\n'))
}

fn write_field(line: &mut Vec<u8>, field: &[u8]) {
    if !needs_quotes(field) {
        line.extend_from_slice(field);
        return;
    }
    line.push(QUOTE);
    for &b in field {
        if b == QUOTE {
            line.push(QUOTE);
        }
        line.push(b);
    }
    line.push(QUOTE);
}

impl<W: Write> Handler for CsvRowWriter<W> {
    fn handle(&mut self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError> {
        if let Some(probe) = &self.probe {
            let value = ctx.element.find_text(probe, ctx.namespace_map());
            debug!(probe = %probe, value = ?value, "row probe");
        }
        let fields = ctx.element.children().map(|child| child.text().unwrap_or(""));
        self.write_row(fields)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(rows: &[&[&str]]) -> String {
        let mut writer = CsvRowWriter::new(Vec::new());
        for row in rows {
            writer.write_row(row.iter()).unwrap();
        }
        assert_eq!(writer.rows_written(), rows.len() as u64);
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_rows() {
        assert_eq!(render(&[&["A", "B"], &["C", "D"]]), "A;B\r\nC;D\r\n");
    }

    #[test]
    fn test_minimal_quoting() {
        assert_eq!(render(&[&["a;b", "say \"hi\"", "x\ny", "plain"]]), "\"a;b\";\"say \"\"hi\"\"\";\"x\ny\";plain\r\n");
    }

    #[test]
    fn test_empty_fields() {
        assert_eq!(render(&[&["", "B", ""]]), ";B;\r\n");
        assert_eq!(render(&[&[""]]), "\"\"\r\n");
        assert_eq!(render(&[&[]]), "\r\n");
    }

    #[test]
    fn test_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvRowWriter::append(&path).unwrap().write_row(["1"]).unwrap();
        CsvRowWriter::append(&path).unwrap().write_row(["2"]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\r\n2\r\n");
    }
}
