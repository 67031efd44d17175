//! Event Types
//!
//! Owned events produced by the event source and consumed by the walker
//! and the validators.

use crate::core::qname::QName;

/// Streaming parse event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A namespace declaration, emitted before the start tag that carries it.
    /// The default namespace has an empty prefix.
    NamespaceStart { prefix: String, uri: String },
    /// Start of an element (empty elements produce a start and an end)
    StartElement(StartTag),
    /// Character data with entities resolved; CDATA sections included
    Text(String),
    /// End of the innermost open element
    EndElement,
    /// Raw DOCTYPE body (everything between `<!DOCTYPE` and the final `>`)
    DocType(String),
}

/// Start element event data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    /// Resolved element name
    pub name: QName,
    /// Attributes other than namespace declarations, values entity-decoded
    pub attributes: Vec<(QName, String)>,
}

impl StartTag {
    /// Create a start tag without attributes
    pub fn new(name: QName) -> Self {
        StartTag {
            name,
            attributes: Vec::new(),
        }
    }

    /// Get an attribute value by namespace and local name
    pub fn attribute(&self, namespace: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name.is(namespace, local))
            .map(|(_, value)| value.as_str())
    }
}

impl SourceEvent {
    /// Check if this is a start element event
    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, SourceEvent::StartElement(_))
    }

    /// Check if this is an end element event
    #[inline]
    pub fn is_end_element(&self) -> bool {
        matches!(self, SourceEvent::EndElement)
    }

    /// Get text content if applicable
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SourceEvent::Text(t) => Some(t),
            _ => None,
        }
    }
}
