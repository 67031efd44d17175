//! Validation backends
//!
//! Both validators consume the same event stream the walker sees and keep
//! state per open element only, so validation is as memory-bounded as the
//! walk itself. A session runs validation as a complete pass before the
//! first handler dispatch.

pub mod content_model;
pub mod dtd;
pub mod xsd;

use std::io::BufRead;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Location, Result};
use crate::reader::{EventSource, SourceEvent, StartTag};

pub use dtd::DtdValidator;
pub use xsd::{Schema, SchemaValidator};

/// Streaming document validator
///
/// Callbacks return a plain message; the driver attaches path and position.
pub trait DocumentValidator {
    fn doctype(&mut self, _raw: &str) -> std::result::Result<(), String> {
        Ok(())
    }

    /// An `xmlns` or `xmlns:prefix` attribute of the next started element
    fn namespace_declaration(&mut self, _prefix: &str, _uri: &str) -> std::result::Result<(), String> {
        Ok(())
    }

    fn start_element(&mut self, tag: &StartTag) -> std::result::Result<(), String>;

    fn text(&mut self, text: &str) -> std::result::Result<(), String>;

    fn end_element(&mut self) -> std::result::Result<(), String>;

    /// Document-level checks once the root has closed
    fn finish(&mut self) -> std::result::Result<(), String>;
}

/// Which error a violation is reported as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Dtd,
    Schema,
}

impl ValidationKind {
    fn violation(self, path: &Path, offset: u64, message: String) -> Error {
        let path = path.to_path_buf();
        let location = Location::at(offset);
        match self {
            ValidationKind::Dtd => Error::DtdViolation {
                path,
                location,
                message,
            },
            ValidationKind::Schema => Error::SchemaViolation {
                path,
                location,
                message,
            },
        }
    }
}

/// Drive `validator` over every event of `source`
///
/// Malformed input still surfaces as `MalformedDocument`.
pub fn validate_document<R: BufRead>(
    source: &mut EventSource<R>,
    validator: &mut dyn DocumentValidator,
    kind: ValidationKind,
) -> Result<()> {
    let mut elements = 0usize;
    while let Some(event) = source.next_event()? {
        let outcome = match &event {
            SourceEvent::NamespaceStart { prefix, uri } => validator.namespace_declaration(prefix, uri),
            SourceEvent::DocType(raw) => validator.doctype(raw),
            SourceEvent::StartElement(tag) => {
                elements += 1;
                validator.start_element(tag)
            }
            SourceEvent::Text(text) => validator.text(text),
            SourceEvent::EndElement => validator.end_element(),
        };
        if let Err(message) = outcome {
            return Err(kind.violation(source.path(), source.position(), message));
        }
    }
    validator
        .finish()
        .map_err(|message| kind.violation(source.path(), source.position(), message))?;
    debug!(kind = ?kind, elements, "document is valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SourceOptions;
    use std::io::Cursor;

    fn source(xml: &str) -> EventSource<Cursor<Vec<u8>>> {
        let options = SourceOptions { keep_blank_text: true };
        EventSource::from_reader(Cursor::new(xml.as_bytes().to_vec()), "doc.xml", options).unwrap()
    }

    #[test]
    fn test_undeclared_xmlns_is_dtd_violation() {
        let xml = r#"<!DOCTYPE root [<!ELEMENT root EMPTY>]><root xmlns="urn:x"/>"#;
        let mut validator = DtdValidator::new(None);
        let err = validate_document(&mut source(xml), &mut validator, ValidationKind::Dtd).unwrap_err();
        assert!(matches!(err, Error::DtdViolation { .. }));
        assert!(err.to_string().contains("xmlns"), "{}", err);
    }

    #[test]
    fn test_dtd_violation_carries_position() {
        let xml = "<!DOCTYPE r [<!ELEMENT r (a)><!ELEMENT a EMPTY>]>\n<r><b/></r>";
        let mut validator = DtdValidator::new(None);
        let err = validate_document(&mut source(xml), &mut validator, ValidationKind::Dtd).unwrap_err();
        match err {
            Error::DtdViolation { location, message, .. } => {
                assert!(location.offset > 0);
                assert!(message.contains('b'), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_schema_pass() {
        let schema = Schema::from_bytes(
            br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                  <xs:element name="root">
                    <xs:complexType><xs:sequence>
                      <xs:element name="n" type="xs:int" maxOccurs="unbounded"/>
                    </xs:sequence></xs:complexType>
                  </xs:element>
                </xs:schema>"#,
        )
        .unwrap();

        let mut ok = schema.validator();
        validate_document(&mut source("<root>\n <n>1</n>\n <n>2</n>\n</root>"), &mut ok, ValidationKind::Schema).unwrap();

        let mut bad = schema.validator();
        let err = validate_document(&mut source("<root><n>x</n></root>"), &mut bad, ValidationKind::Schema)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));
    }

    #[test]
    fn test_malformed_is_not_a_violation() {
        let mut validator = DtdValidator::new(None);
        let err = validate_document(&mut source("<r><a></r>"), &mut validator, ValidationKind::Dtd).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
    }
}
