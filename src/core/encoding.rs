//! XML Encoding Detection
//!
//! The walker only accepts UTF-8 input. Encoding is detected from the
//! byte order mark or the first bytes of the document; a UTF-8 BOM is
//! skipped, anything UTF-16 is rejected before tokenizing starts.

use std::io::BufRead;

/// UTF-8 byte order mark
pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Detected encoding of XML input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl XmlEncoding {
    /// Detect encoding from byte order mark or initial bytes
    pub fn detect(input: &[u8]) -> Self {
        if input.len() < 2 {
            return XmlEncoding::Utf8;
        }

        match (input[0], input[1]) {
            // UTF-16 LE BOM: 0xFF 0xFE
            (0xFF, 0xFE) => XmlEncoding::Utf16Le,
            // UTF-16 BE BOM: 0xFE 0xFF
            (0xFE, 0xFF) => XmlEncoding::Utf16Be,
            // No BOM - check for UTF-16 pattern (< followed by null or null followed by <)
            (0x00, b'<') => XmlEncoding::Utf16Be,
            (b'<', 0x00) => XmlEncoding::Utf16Le,
            _ => XmlEncoding::Utf8,
        }
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            XmlEncoding::Utf8 => "UTF-8",
            XmlEncoding::Utf16Le => "UTF-16LE",
            XmlEncoding::Utf16Be => "UTF-16BE",
        }
    }
}

/// Check the head of `reader` and consume a UTF-8 BOM if present
///
/// Returns the number of bytes consumed (0 or 3). Fails with a message when
/// the input is not UTF-8. I/O errors are passed through unchanged.
pub fn require_utf8<R: BufRead>(reader: &mut R) -> std::io::Result<Result<usize, String>> {
    let head = reader.fill_buf()?;
    match XmlEncoding::detect(head) {
        XmlEncoding::Utf8 => {
            if head.starts_with(UTF8_BOM) {
                reader.consume(UTF8_BOM.len());
                Ok(Ok(UTF8_BOM.len()))
            } else {
                Ok(Ok(0))
            }
        }
        other => Ok(Err(format!(
            "input must be UTF-8, found {} encoded data",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_detect_utf8() {
        assert_eq!(XmlEncoding::detect(b"<root/>"), XmlEncoding::Utf8);
        assert_eq!(XmlEncoding::detect(b"<?xml"), XmlEncoding::Utf8);
    }

    #[test]
    fn test_detect_utf8_bom() {
        assert_eq!(XmlEncoding::detect(&[0xEF, 0xBB, 0xBF, b'<']), XmlEncoding::Utf8);
    }

    #[test]
    fn test_detect_utf16_le_bom() {
        assert_eq!(XmlEncoding::detect(&[0xFF, 0xFE, b'<', 0x00]), XmlEncoding::Utf16Le);
    }

    #[test]
    fn test_detect_utf16_be_pattern() {
        assert_eq!(XmlEncoding::detect(&[0x00, b'<', 0x00, b'r']), XmlEncoding::Utf16Be);
    }

    #[test]
    fn test_require_utf8_skips_bom() {
        let mut reader = Cursor::new(vec![0xEF, 0xBB, 0xBF, b'<', b'r', b'/', b'>']);
        assert_eq!(require_utf8(&mut reader).unwrap(), Ok(3));
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"<r/>");
    }

    #[test]
    fn test_require_utf8_plain() {
        let mut reader = Cursor::new(b"<r/>".to_vec());
        assert_eq!(require_utf8(&mut reader).unwrap(), Ok(0));
    }

    #[test]
    fn test_require_utf8_rejects_utf16() {
        let mut reader = Cursor::new(vec![0xFF, 0xFE, b'<', 0x00]);
        let err = require_utf8(&mut reader).unwrap().unwrap_err();
        assert!(err.contains("UTF-16LE"));
    }
}
