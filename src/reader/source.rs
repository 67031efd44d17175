//! Event Source
//!
//! Pull-based, forward-only event stream over a UTF-8 document, built on
//! `quick_xml::NsReader`. Element names are resolved with proper namespace
//! scoping; every `xmlns` declaration is additionally reported as a
//! [`SourceEvent::NamespaceStart`] ahead of the start tag carrying it.
//!
//! Empty elements are expanded into a start and an end event. Comments,
//! processing instructions and the XML declaration are skipped.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, PrefixDeclaration, ResolveResult};
use quick_xml::NsReader;
use tracing::debug;

use super::events::{SourceEvent, StartTag};
use crate::core::encoding::require_utf8;
use crate::core::qname::QName;
use crate::error::{Error, Location, Result};
use crate::validate::dtd::Doctype;

/// Read buffer size for file input
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Entity replacement bytes allowed regardless of input size
const ENTITY_EXPANSION_ALLOWANCE: u64 = 1_000_000;

/// Largest ratio of entity replacement bytes to input bytes read
const ENTITY_AMPLIFICATION_FACTOR: u64 = 5;

/// Options controlling what the source reports
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceOptions {
    /// Report whitespace-only character data instead of dropping it
    pub keep_blank_text: bool,
}

/// Streaming event source over any buffered reader
pub struct EventSource<R: BufRead> {
    reader: NsReader<R>,
    path: PathBuf,
    buf: Vec<u8>,
    /// Events decoded from the last raw event but not yet handed out
    pending: VecDeque<SourceEvent>,
    /// Internal-subset general entities, fully expanded
    entities: HashMap<String, String>,
    entity_budget: EntityBudget,
    keep_blank_text: bool,
    /// Bytes consumed before the reader saw the input (BOM)
    skipped: u64,
    depth: usize,
    root_seen: bool,
    done: bool,
}

impl EventSource<BufReader<File>> {
    /// Open a file for streaming
    pub fn open(path: impl AsRef<Path>, options: SourceOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file), path, options)
    }
}

impl<R: BufRead> EventSource<R> {
    /// Wrap a buffered reader; `path` is only used for error reporting
    pub fn from_reader(mut input: R, path: impl Into<PathBuf>, options: SourceOptions) -> Result<Self> {
        let path = path.into();
        let skipped = match require_utf8(&mut input) {
            Ok(Ok(n)) => n as u64,
            Ok(Err(message)) => {
                return Err(Error::MalformedDocument {
                    path,
                    location: Location::at(0),
                    message,
                })
            }
            Err(source) => return Err(Error::Io { path, source }),
        };

        let mut reader = NsReader::from_reader(input);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Ok(EventSource {
            reader,
            path,
            buf: Vec::with_capacity(1024),
            pending: VecDeque::new(),
            entities: HashMap::new(),
            entity_budget: EntityBudget::default(),
            keep_blank_text: options.keep_blank_text,
            skipped,
            depth: 0,
            root_seen: false,
            done: false,
        })
    }

    /// Input path used in error reports
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last event read
    #[inline]
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64 + self.skipped
    }

    /// Number of elements currently open
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Next event, or `None` once the document element has been closed and
    /// the input is exhausted
    pub fn next_event(&mut self) -> Result<Option<SourceEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            let mut buf = std::mem::take(&mut self.buf);
            buf.clear();
            let result = self.read_raw(&mut buf);
            self.buf = buf;
            result?;
        }
    }

    fn read_raw(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let event = match self.reader.read_event_into(buf) {
            Ok(event) => event,
            Err(quick_xml::Error::Io(err)) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source: std::io::Error::new(err.kind(), err.to_string()),
                })
            }
            Err(err) => {
                let offset = self.reader.error_position() as u64 + self.skipped;
                return Err(self.malformed_at(offset, err.to_string()));
            }
        };

        match event {
            Event::Start(start) => self.start_element(&start),
            Event::Empty(start) => {
                self.start_element(&start)?;
                self.end_element();
                Ok(())
            }
            Event::End(_) => {
                self.end_element();
                Ok(())
            }
            Event::Text(text) => {
                if self.depth == 0 {
                    return self.outside_root(&text);
                }
                let limit = self.entity_limit();
                let entities = &self.entities;
                let budget = &mut self.entity_budget;
                let decoded = text
                    .unescape_with(|name| budget.expand(entities, name, limit))
                    .map_err(|err| self.entity_error(limit, err.to_string()))?
                    .into_owned();
                self.push_text(decoded);
                Ok(())
            }
            Event::CData(cdata) => {
                if self.depth == 0 {
                    return Err(self.malformed("CDATA section outside the document element"));
                }
                let decoded = std::str::from_utf8(&cdata)
                    .map_err(|err| self.malformed(format!("invalid UTF-8 in CDATA section: {}", err)))?
                    .to_string();
                self.push_text(decoded);
                Ok(())
            }
            Event::DocType(doctype) => {
                let raw = String::from_utf8(doctype.into_inner().into_owned())
                    .map_err(|err| self.malformed(format!("invalid UTF-8 in DOCTYPE: {}", err)))?;
                let parsed = Doctype::parse(&raw)
                    .map_err(|message| self.malformed(format!("invalid DOCTYPE: {}", message)))?;
                self.entities = parsed
                    .declarations
                    .expanded_entities()
                    .map_err(|message| self.malformed(format!("invalid DOCTYPE: {}", message)))?;
                if !self.entities.is_empty() {
                    debug!(count = self.entities.len(), "internal entities declared");
                }
                self.pending.push_back(SourceEvent::DocType(raw));
                Ok(())
            }
            Event::Eof => {
                if self.depth > 0 {
                    return Err(self.malformed(format!(
                        "unexpected end of document: {} unclosed element(s)",
                        self.depth
                    )));
                }
                if !self.root_seen {
                    return Err(self.malformed("document has no root element"));
                }
                self.done = true;
                Ok(())
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => Ok(()),
        }
    }

    fn start_element(&mut self, start: &BytesStart<'_>) -> Result<()> {
        if self.depth == 0 && self.root_seen {
            return Err(self.malformed("extra content at the end of the document"));
        }

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| self.malformed(err.to_string()))?;
            let limit = self.entity_limit();
            let entities = &self.entities;
            let budget = &mut self.entity_budget;
            let value = attr
                .unescape_value_with(|name| budget.expand(entities, name, limit))
                .map_err(|err| self.entity_error(limit, err.to_string()))?
                .into_owned();

            match attr.key.as_namespace_binding() {
                Some(PrefixDeclaration::Default) => {
                    self.pending.push_back(SourceEvent::NamespaceStart {
                        prefix: String::new(),
                        uri: value,
                    });
                }
                Some(PrefixDeclaration::Named(prefix)) => {
                    let prefix = utf8_name(prefix).map_err(|m| self.malformed(m))?;
                    self.pending.push_back(SourceEvent::NamespaceStart { prefix, uri: value });
                }
                None => {
                    let (resolved, local) = self.reader.resolve_attribute(attr.key);
                    let prefix = attr.key.prefix().map(|p| p.into_inner());
                    let name = build_qname(resolved, local.into_inner(), prefix)
                        .map_err(|m| self.malformed(m))?;
                    attributes.push((name, value));
                }
            }
        }

        let (resolved, local) = self.reader.resolve_element(start.name());
        let prefix = start.name().prefix().map(|p| p.into_inner());
        let name = build_qname(resolved, local.into_inner(), prefix).map_err(|m| self.malformed(m))?;

        self.depth += 1;
        self.root_seen = true;
        self.pending
            .push_back(SourceEvent::StartElement(StartTag { name, attributes }));
        Ok(())
    }

    fn end_element(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.pending.push_back(SourceEvent::EndElement);
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() || (!self.keep_blank_text && is_blank(&text)) {
            return;
        }
        self.pending.push_back(SourceEvent::Text(text));
    }

    /// Character data in the prolog or epilog: only whitespace is allowed
    fn outside_root(&self, raw: &[u8]) -> Result<()> {
        if raw.iter().all(|&b| is_xml_whitespace(b)) {
            Ok(())
        } else if self.root_seen {
            Err(self.malformed("extra content at the end of the document"))
        } else {
            Err(self.malformed("character data before the document element"))
        }
    }

    /// Entity bytes the document may expand to at the current position
    fn entity_limit(&self) -> u64 {
        ENTITY_EXPANSION_ALLOWANCE.max(self.position().saturating_mul(ENTITY_AMPLIFICATION_FACTOR))
    }

    fn entity_error(&self, limit: u64, message: String) -> Error {
        if self.entity_budget.exhausted {
            self.malformed(format!(
                "entity amplification limit exceeded: more than {} bytes of entity text",
                limit
            ))
        } else {
            self.malformed(message)
        }
    }

    fn malformed(&self, message: impl Into<String>) -> Error {
        self.malformed_at(self.position(), message)
    }

    fn malformed_at(&self, offset: u64, message: impl Into<String>) -> Error {
        Error::MalformedDocument {
            path: self.path.clone(),
            location: Location::at(offset),
            message: message.into(),
        }
    }
}

/// Entity replacement text produced from document content so far
#[derive(Debug, Default)]
struct EntityBudget {
    used: u64,
    exhausted: bool,
}

impl EntityBudget {
    /// Replacement text for `name`: declared entities first, then the
    /// predefined ones. Declared text beyond `limit` resolves to nothing.
    fn expand<'e>(&mut self, entities: &'e HashMap<String, String>, name: &str, limit: u64) -> Option<&'e str> {
        let Some(value) = entities.get(name) else {
            return resolve_predefined_entity(name);
        };
        let used = self.used + value.len() as u64;
        if used > limit {
            self.exhausted = true;
            return None;
        }
        self.used = used;
        Some(value)
    }
}

#[inline]
fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

#[inline]
fn is_blank(text: &str) -> bool {
    text.bytes().all(is_xml_whitespace)
}

fn utf8_name(bytes: &[u8]) -> std::result::Result<String, String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| format!("invalid UTF-8 in name '{}'", String::from_utf8_lossy(bytes)))
}

/// Build an owned name from a quick-xml resolution result
fn build_qname(
    resolved: ResolveResult<'_>,
    local: &[u8],
    prefix: Option<&[u8]>,
) -> std::result::Result<QName, String> {
    let namespace = match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(utf8_name(uri)?),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(format!(
                "namespace prefix '{}' is not declared",
                String::from_utf8_lossy(&prefix)
            ))
        }
    };
    Ok(QName {
        namespace,
        local: utf8_name(local)?,
        prefix: prefix.map(utf8_name).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(xml: &str, keep_blank_text: bool) -> EventSource<Cursor<Vec<u8>>> {
        EventSource::from_reader(
            Cursor::new(xml.as_bytes().to_vec()),
            "test.xml",
            SourceOptions { keep_blank_text },
        )
        .unwrap()
    }

    fn collect(xml: &str) -> Result<Vec<SourceEvent>> {
        let mut src = source(xml, false);
        let mut events = Vec::new();
        while let Some(event) = src.next_event()? {
            events.push(event);
        }
        Ok(events)
    }

    #[test]
    fn test_simple_document() {
        let events = collect("<root><r><c1>A</c1></r></root>").unwrap();
        assert_eq!(events.len(), 7);
        match &events[2] {
            SourceEvent::StartElement(tag) => assert_eq!(tag.name, QName::local("c1")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[3], SourceEvent::Text("A".into()));
        assert!(events[6].is_end_element());
    }

    #[test]
    fn test_namespace_start_precedes_element() {
        let events = collect(r#"<root xmlns="urn:d" xmlns:p="urn:p"><p:a p:x="1" y="2"/></root>"#).unwrap();
        assert_eq!(
            events[0],
            SourceEvent::NamespaceStart {
                prefix: String::new(),
                uri: "urn:d".into()
            }
        );
        assert_eq!(
            events[1],
            SourceEvent::NamespaceStart {
                prefix: "p".into(),
                uri: "urn:p".into()
            }
        );
        match &events[2] {
            SourceEvent::StartElement(tag) => {
                assert!(tag.name.is(Some("urn:d"), "root"));
                assert!(tag.attributes.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        match &events[3] {
            SourceEvent::StartElement(tag) => {
                assert!(tag.name.is(Some("urn:p"), "a"));
                assert_eq!(tag.name.prefix.as_deref(), Some("p"));
                assert_eq!(tag.attribute(Some("urn:p"), "x"), Some("1"));
                // Unprefixed attributes are in no namespace
                assert_eq!(tag.attribute(None, "y"), Some("2"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(events[4].is_end_element());
    }

    #[test]
    fn test_blank_text_policy() {
        let xml = "<root>\n  <a> x </a>\n</root>";
        let dropped = collect(xml).unwrap();
        assert_eq!(dropped.iter().filter(|e| e.as_text().is_some()).count(), 1);

        let mut src = source(xml, true);
        let mut texts = 0;
        while let Some(event) = src.next_event().unwrap() {
            if event.as_text().is_some() {
                texts += 1;
            }
        }
        assert_eq!(texts, 3);
    }

    #[test]
    fn test_entities_and_cdata() {
        let xml = r#"<!DOCTYPE root [<!ENTITY co "ACME &amp; Sons">]><root a="&co;">&lt;&co;<![CDATA[<raw>]]></root>"#;
        let events = collect(xml).unwrap();
        assert!(matches!(events[0], SourceEvent::DocType(_)));
        match &events[1] {
            SourceEvent::StartElement(tag) => assert_eq!(tag.attribute(None, "a"), Some("ACME & Sons")),
            other => panic!("unexpected {:?}", other),
        }
        let text: String = events.iter().filter_map(|e| e.as_text()).collect();
        assert_eq!(text, "<ACME & Sons<raw>");
    }

    #[test]
    fn test_predefined_entities_without_doctype() {
        let events = collect(r#"<root a="x&amp;y">&lt;&#65;&gt;</root>"#).unwrap();
        match &events[0] {
            SourceEvent::StartElement(tag) => assert_eq!(tag.attribute(None, "a"), Some("x&y")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1], SourceEvent::Text("<A>".into()));
    }

    #[test]
    fn test_undeclared_entity() {
        let err = collect("<root>&nope;</root>").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
    }

    #[test]
    fn test_recursive_parameter_entity_is_malformed() {
        let err = collect(r#"<!DOCTYPE r [<!ENTITY % a "%a;"> %a;]><r/>"#).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
        assert!(err.to_string().contains("references itself"), "{}", err);
    }

    #[test]
    fn test_nested_entity_expansion_rejected() {
        let mut subset = String::from(r#"<!ENTITY e0 "0123456789">"#);
        for level in 1..=6 {
            subset.push_str(&format!(r#"<!ENTITY e{} "{}">"#, level, format!("&e{};", level - 1).repeat(10)));
        }
        let xml = format!("<!DOCTYPE r [{}]><r>&e6;</r>", subset);
        let err = collect(&xml).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
        assert!(err.to_string().contains("limit"), "{}", err);
    }

    #[test]
    fn test_repeated_entity_references_rejected() {
        let big = "x".repeat(100_000);
        let refs = "&big;".repeat(20);
        let xml = format!(r#"<!DOCTYPE r [<!ENTITY big "{}">]><r>{}</r>"#, big, refs);
        let err = collect(&xml).unwrap_err();
        assert!(err.to_string().contains("amplification"), "{}", err);

        // A few references stay well inside the allowance
        let xml = format!(r#"<!DOCTYPE r [<!ENTITY big "{}">]><r>&big;&big;</r>"#, big);
        let text: usize = collect(&xml).unwrap().iter().filter_map(|e| e.as_text()).map(str::len).sum();
        assert_eq!(text, 200_000);
    }

    #[test]
    fn test_comments_and_pis_skipped() {
        let events = collect("<?xml version=\"1.0\"?><!-- c --><root><?pi x?><a/></root>").unwrap();
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_bom_skipped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<root/>");
        let mut src =
            EventSource::from_reader(Cursor::new(bytes), "bom.xml", SourceOptions::default()).unwrap();
        assert!(src.next_event().unwrap().unwrap().is_start_element());
    }

    #[test]
    fn test_utf16_rejected() {
        let err = EventSource::from_reader(
            Cursor::new(vec![0xFF, 0xFE, b'<', 0x00]),
            "wide.xml",
            SourceOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::MalformedDocument { .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = collect("<root><a></b></root>").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument { .. }));
    }

    #[test]
    fn test_unclosed_document() {
        let err = collect("<root><a>").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_unbound_prefix() {
        let err = collect("<root><x:a/></root>").unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn test_second_root_rejected() {
        let err = collect("<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("extra content"));
    }

    #[test]
    fn test_empty_document() {
        let err = collect("  ").unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn test_position_advances() {
        let mut src = source("<root><a/></root>", false);
        src.next_event().unwrap();
        assert_eq!(src.position(), 6);
        assert_eq!(src.depth(), 1);
    }
}
