//! Offset to line/column resolution
//!
//! The event source only tracks byte offsets. Line and column are computed
//! when an error is reported, by re-reading the input up to the offset.

use crate::error::Location;
use memchr::memchr_iter;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Resolve a byte offset in the file at `path` into a full [`Location`]
///
/// Falls back to an offset-only location when the file cannot be read.
pub fn resolve(path: &Path, offset: u64) -> Location {
    match File::open(path) {
        Ok(file) => resolve_in(BufReader::new(file), offset),
        Err(_) => Location::at(offset),
    }
}

/// Resolve a byte offset against any buffered reader
pub fn resolve_in<R: BufRead>(mut reader: R, offset: u64) -> Location {
    let mut line: u64 = 1;
    // Offset of the first byte of the current line
    let mut line_start: u64 = 0;
    let mut consumed: u64 = 0;

    while consumed < offset {
        let buf = match reader.fill_buf() {
            Ok(buf) if !buf.is_empty() => buf,
            _ => break,
        };
        let take = buf.len().min((offset - consumed) as usize);
        for nl in memchr_iter(b'\n', &buf[..take]) {
            line += 1;
            line_start = consumed + nl as u64 + 1;
        }
        consumed += take as u64;
        reader.consume(take);
    }

    Location {
        offset,
        line: Some(line),
        column: Some(offset - line_start + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_first_line() {
        let loc = resolve_in(Cursor::new(b"<root>".to_vec()), 3);
        assert_eq!(loc.line, Some(1));
        assert_eq!(loc.column, Some(4));
    }

    #[test]
    fn test_later_line() {
        let input = b"<root>\n  <a>\n  <b>".to_vec();
        // offset of '<b'
        let loc = resolve_in(Cursor::new(input), 15);
        assert_eq!(loc.line, Some(3));
        assert_eq!(loc.column, Some(3));
    }

    #[test]
    fn test_offset_past_end() {
        let loc = resolve_in(Cursor::new(b"a\nb".to_vec()), 100);
        assert_eq!(loc.line, Some(2));
        assert_eq!(loc.offset, 100);
    }

    #[test]
    fn test_missing_file() {
        let loc = resolve(Path::new("/nonexistent/xmlwalk/input.xml"), 7);
        assert_eq!(loc, Location::at(7));
    }
}
