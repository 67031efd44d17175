//! Read-only element views handed to handlers
//!
//! An `ElementRef` borrows the live document for the duration of one
//! dispatch. It only looks downward (children, text, attributes): siblings
//! and ancestors may already be pruned and are not exposed.

use super::document::LiveDocument;
use super::namespace::NamespaceMap;
use super::node::{NameIds, NodeId, XmlAttribute, XmlNode};
use crate::core::qname::{parse_clark, split_qualified, QName};

/// View of one live element
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a LiveDocument,
    id: NodeId,
    node: &'a XmlNode,
}

impl<'a> ElementRef<'a> {
    /// View over a live node; `None` if the id was released
    pub(crate) fn new(doc: &'a LiveDocument, id: NodeId) -> Option<Self> {
        doc.get(id).map(|node| ElementRef { doc, id, node })
    }

    #[inline]
    fn node(&self) -> &'a XmlNode {
        self.node
    }

    /// Arena id of the element
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Local name (after the colon)
    pub fn local_name(&self) -> &'a str {
        self.doc.strings.get(self.node().name.local)
    }

    /// Namespace URI, if any
    pub fn namespace(&self) -> Option<&'a str> {
        self.doc.strings.get_opt(self.node().name.namespace)
    }

    /// Prefix used in the document, if any
    pub fn prefix(&self) -> Option<&'a str> {
        self.doc.strings.get_opt(self.node().name.prefix)
    }

    /// Owned resolved name
    pub fn qname(&self) -> QName {
        resolve(self.doc, self.node().name)
    }

    /// Name in Clark notation: `{uri}local` or `local`
    pub fn name(&self) -> String {
        self.qname().clark()
    }

    /// Name as written in the document: `prefix:local` or `local`
    pub fn qualified_name(&self) -> String {
        self.qname().qualified()
    }

    /// Check the element's namespace URI and local name
    pub fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local_name() == local && self.namespace() == namespace
    }

    /// Character data before the first child
    pub fn text(&self) -> Option<&'a str> {
        self.node().text.as_deref()
    }

    /// Character data after the element's end tag
    pub fn tail(&self) -> Option<&'a str> {
        self.node().tail.as_deref()
    }

    /// Depth in the document (document element = 1)
    pub fn depth(&self) -> u32 {
        self.node().depth
    }

    /// Attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = AttributeRef<'a>> + 'a {
        let doc = self.doc;
        self.node()
            .attributes
            .iter()
            .map(move |attr| AttributeRef { doc, attr })
    }

    /// Attribute value by name: Clark notation for namespaced attributes,
    /// bare local name for attributes in no namespace
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        let (namespace, local) = parse_clark(name).ok()?;
        let namespace = namespace.filter(|ns| !ns.is_empty());
        self.attributes()
            .find(|a| a.local_name() == local && a.namespace() == namespace)
            .map(|a| a.value())
    }

    /// Child elements still alive, in document order
    pub fn children(&self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let doc = self.doc;
        self.node()
            .children
            .iter()
            .filter_map(move |&id| ElementRef::new(doc, id))
    }

    /// Number of live children
    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    /// True when the element has no children, no text and no attributes
    pub fn is_empty(&self) -> bool {
        let node = self.node();
        node.children.is_empty() && node.text.is_none() && node.attributes.is_empty()
    }

    /// Follow a `/`-separated path of child names
    ///
    /// Each step is `prefix:local` (prefix looked up in `namespaces`),
    /// a bare `local` (no namespace), or `*` (any child). Returns the first
    /// match in document order; an unknown prefix matches nothing.
    pub fn find(&self, path: &str, namespaces: Option<&NamespaceMap>) -> Option<ElementRef<'a>> {
        let mut steps = Vec::new();
        for step in path.split('/').filter(|s| !s.is_empty()) {
            steps.push(PathStep::parse(step, namespaces)?);
        }
        find_steps(*self, &steps)
    }

    /// Text of the first element matching `path`
    pub fn find_text(&self, path: &str, namespaces: Option<&NamespaceMap>) -> Option<&'a str> {
        self.find(path, namespaces).and_then(|e| e.text())
    }
}

impl std::fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRef")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("children", &self.child_count())
            .finish()
    }
}

/// View of one attribute
#[derive(Clone, Copy)]
pub struct AttributeRef<'a> {
    doc: &'a LiveDocument,
    attr: &'a XmlAttribute,
}

impl<'a> AttributeRef<'a> {
    pub fn local_name(&self) -> &'a str {
        self.doc.strings.get(self.attr.name.local)
    }

    pub fn namespace(&self) -> Option<&'a str> {
        self.doc.strings.get_opt(self.attr.name.namespace)
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.doc.strings.get_opt(self.attr.name.prefix)
    }

    pub fn value(&self) -> &'a str {
        &self.attr.value
    }

    pub fn qname(&self) -> QName {
        resolve(self.doc, self.attr.name)
    }
}

fn resolve(doc: &LiveDocument, ids: NameIds) -> QName {
    QName {
        namespace: doc.strings.get_opt(ids.namespace).map(str::to_string),
        local: doc.strings.get(ids.local).to_string(),
        prefix: doc.strings.get_opt(ids.prefix).map(str::to_string),
    }
}

/// One step of a child path
enum PathStep<'p> {
    Any,
    Named(Option<&'p str>, &'p str),
}

impl<'p> PathStep<'p> {
    fn parse(step: &'p str, namespaces: Option<&'p NamespaceMap>) -> Option<Self> {
        if step == "*" {
            return Some(PathStep::Any);
        }
        match split_qualified(step) {
            (Some(prefix), local) => {
                let uri = namespaces?.get(prefix)?;
                Some(PathStep::Named(Some(uri.as_str()), local))
            }
            (None, local) => Some(PathStep::Named(None, local)),
        }
    }

    fn matches(&self, element: &ElementRef<'_>) -> bool {
        match self {
            PathStep::Any => true,
            PathStep::Named(ns, local) => element.is(*ns, local),
        }
    }
}

fn find_steps<'a>(from: ElementRef<'a>, steps: &[PathStep<'_>]) -> Option<ElementRef<'a>> {
    let (first, rest) = match steps.split_first() {
        Some(split) => split,
        None => return Some(from),
    };
    from.children()
        .filter(|child| first.matches(child))
        .find_map(|child| find_steps(child, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (LiveDocument, NodeId) {
        let mut doc = LiveDocument::new();
        let row = doc.open_element(
            &QName::namespaced("urn:t", "r"),
            &[
                (QName::local("id"), "7".to_string()),
                (QName::namespaced("urn:x", "flag"), "yes".to_string()),
            ],
            None,
        );
        let c1 = doc.open_element(&QName::namespaced("urn:t", "c1"), &[], Some(row));
        doc.append_text(c1, "A");
        let c2 = doc.open_element(&QName::namespaced("urn:t", "c2"), &[], Some(row));
        doc.append_text(c2, "B");
        doc.append_text(row, "tail-of-c2");
        (doc, row)
    }

    #[test]
    fn test_names() {
        let (doc, row) = sample();
        let el = doc.element(row).unwrap();
        assert_eq!(el.local_name(), "r");
        assert_eq!(el.namespace(), Some("urn:t"));
        assert_eq!(el.name(), "{urn:t}r");
        assert_eq!(el.qualified_name(), "r");
        assert_eq!(el.depth(), 1);
    }

    #[test]
    fn test_children_and_text() {
        let (doc, row) = sample();
        let el = doc.element(row).unwrap();
        let texts: Vec<_> = el.children().map(|c| c.text().unwrap_or("")).collect();
        assert_eq!(texts, vec!["A", "B"]);
        assert_eq!(el.child_count(), 2);
        assert_eq!(el.children().nth(1).unwrap().tail(), Some("tail-of-c2"));
    }

    #[test]
    fn test_attributes() {
        let (doc, row) = sample();
        let el = doc.element(row).unwrap();
        assert_eq!(el.attribute("id"), Some("7"));
        assert_eq!(el.attribute("{urn:x}flag"), Some("yes"));
        assert_eq!(el.attribute("flag"), None);
        assert_eq!(el.attributes().count(), 2);
    }

    #[test]
    fn test_find_with_prefix() {
        let (doc, row) = sample();
        let el = doc.element(row).unwrap();
        let mut ns = NamespaceMap::new();
        ns.insert("ns".to_string(), "urn:t".to_string());
        assert_eq!(el.find_text("ns:c1", Some(&ns)), Some("A"));
        assert_eq!(el.find_text("ns:c2", Some(&ns)), Some("B"));
        assert_eq!(el.find_text("*", None), Some("A"));
        // No namespace on the bare name
        assert!(el.find("c1", Some(&ns)).is_none());
        // Unknown prefix
        assert!(el.find("zz:c1", Some(&ns)).is_none());
        assert!(el.find("ns:c1", None).is_none());
    }
}
