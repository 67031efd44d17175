//! XML Node representation
//!
//! Uses NodeId (u32) for compact node references into the live document
//! arena. Names are interned ids into the document's string pool.

use super::strings::StrId;

/// Compact node identifier (index into arena)
pub type NodeId = u32;

/// Interned parts of a namespace-resolved name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NameIds {
    /// Namespace URI id, or 0 for no namespace
    pub namespace: StrId,
    /// Local name id
    pub local: StrId,
    /// Document prefix id, or 0 when unprefixed
    pub prefix: StrId,
}

/// Stored attribute
#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub name: NameIds,
    /// Attribute value (entities decoded)
    pub value: String,
}

/// An element node in the arena
///
/// A parent exclusively owns the ids in `children`; releasing a node
/// releases its whole subtree.
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: NameIds,
    /// Parent node (None for the document element)
    pub parent: Option<NodeId>,
    /// Children still held in the arena, in document order
    pub children: Vec<NodeId>,
    /// Character data before the first child
    pub text: Option<String>,
    /// Character data after this element's end tag
    pub tail: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    /// Depth in document tree (document element = 1)
    pub depth: u32,
}

impl XmlNode {
    /// Create a new element node
    pub fn element(name: NameIds, parent: Option<NodeId>, depth: u32) -> Self {
        XmlNode {
            name,
            parent,
            children: Vec::new(),
            text: None,
            tail: None,
            attributes: Vec::new(),
            depth,
        }
    }

    /// Check if this node has children
    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Check if this node has attributes
    #[inline]
    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Append character data: to `text` before the first child,
    /// otherwise the caller must route it to the last child's tail
    pub fn push_text(slot: &mut Option<String>, data: &str) {
        match slot {
            Some(existing) => existing.push_str(data),
            None => *slot = Some(data.to_string()),
        }
    }

    /// Reset the element: drop text, tail and attributes, and hand back the
    /// child ids so the caller can release them
    pub fn clear(&mut self) -> Vec<NodeId> {
        self.text = None;
        self.tail = None;
        self.attributes = Vec::new();
        std::mem::take(&mut self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_node() {
        let name = NameIds {
            namespace: 0,
            local: 1,
            prefix: 0,
        };
        let elem = XmlNode::element(name, Some(0), 2);
        assert_eq!(elem.parent, Some(0));
        assert_eq!(elem.name.local, 1);
        assert_eq!(elem.depth, 2);
        assert!(!elem.has_children());
        assert!(!elem.has_attributes());
    }

    #[test]
    fn test_push_text_appends() {
        let mut slot = None;
        XmlNode::push_text(&mut slot, "a");
        XmlNode::push_text(&mut slot, "b");
        assert_eq!(slot.as_deref(), Some("ab"));
    }

    #[test]
    fn test_clear() {
        let mut elem = XmlNode::element(NameIds::default(), None, 1);
        elem.text = Some("x".into());
        elem.tail = Some("y".into());
        elem.children = vec![3, 4];
        elem.attributes.push(XmlAttribute {
            name: NameIds::default(),
            value: "v".into(),
        });
        let children = elem.clear();
        assert_eq!(children, vec![3, 4]);
        assert!(elem.text.is_none() && elem.tail.is_none());
        assert!(!elem.has_children() && !elem.has_attributes());
    }
}
