//! Live Document - frontier-owning arena
//!
//! Holds only the part of the document the walker still needs:
//! - the chain of currently-open elements
//! - completed children of those elements that were not pruned yet
//!
//! Nodes live in slots addressed by NodeId. Releasing a node returns its
//! slot (and the slots of its whole subtree) to a free list, so the arena
//! size follows the live frontier instead of the document size.

use super::element::ElementRef;
use super::node::{NameIds, NodeId, XmlAttribute, XmlNode};
use super::strings::StringPool;
use crate::core::qname::QName;

/// Arena of live element nodes
#[derive(Debug, Default)]
pub struct LiveDocument {
    /// Node slots; `None` marks a released slot
    slots: Vec<Option<XmlNode>>,
    /// Released slot ids available for reuse
    free: Vec<NodeId>,
    /// Interned names
    pub strings: StringPool,
    /// Document element, while it is alive
    root: Option<NodeId>,
    /// Nodes currently allocated
    live: usize,
    /// High-water mark of `live`
    peak_live: usize,
}

impl LiveDocument {
    /// Create an empty live document
    pub fn new() -> Self {
        LiveDocument {
            slots: Vec::with_capacity(64),
            free: Vec::with_capacity(64),
            strings: StringPool::new(),
            root: None,
            live: 0,
            peak_live: 0,
        }
    }

    /// Intern a resolved name
    pub fn intern_name(&mut self, name: &QName) -> NameIds {
        NameIds {
            namespace: self.strings.intern_opt(name.namespace.as_deref()),
            local: self.strings.intern(&name.local),
            prefix: self.strings.intern_opt(name.prefix.as_deref()),
        }
    }

    /// Allocate an element and attach it as the last child of `parent`,
    /// or as the document element when `parent` is None
    pub fn open_element(
        &mut self,
        name: &QName,
        attributes: &[(QName, String)],
        parent: Option<NodeId>,
    ) -> NodeId {
        let ids = self.intern_name(name);
        let attributes = attributes
            .iter()
            .map(|(attr_name, value)| XmlAttribute {
                name: self.intern_name(attr_name),
                value: value.clone(),
            })
            .collect();
        self.attach(ids, attributes, parent)
    }

    /// Allocate a placeholder element that keeps the tree shape but no name
    ///
    /// Used for elements no handler can ever see, so their names never
    /// reach the string pool.
    pub fn open_placeholder(&mut self, parent: Option<NodeId>) -> NodeId {
        self.attach(NameIds::default(), Vec::new(), parent)
    }

    fn attach(&mut self, ids: NameIds, attributes: Vec<XmlAttribute>, parent: Option<NodeId>) -> NodeId {
        let depth = parent
            .and_then(|p| self.get(p))
            .map_or(1, |p| p.depth + 1);
        let mut node = XmlNode::element(ids, parent, depth);
        node.attributes = attributes;

        let id = self.alloc(node);
        match parent {
            Some(p) => {
                if let Some(parent_node) = self.get_mut(p) {
                    parent_node.children.push(id);
                }
            }
            None => self.root = Some(id),
        }
        id
    }

    /// Store a node in a free slot
    fn alloc(&mut self, node: XmlNode) -> NodeId {
        self.live += 1;
        self.peak_live = self.peak_live.max(self.live);
        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                id
            }
            None => {
                let id = self.slots.len() as NodeId;
                self.slots.push(Some(node));
                id
            }
        }
    }

    /// Get a node by ID
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&XmlNode> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    /// Get a mutable node by ID
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut XmlNode> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    /// Read-only view of a live element
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        ElementRef::new(self, id)
    }

    /// Document element id, while it is alive
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Append character data to the innermost open element: to its text
    /// before it has children, to its last child's tail afterwards
    pub fn append_text(&mut self, open: NodeId, data: &str) {
        let last_child = match self.get(open) {
            Some(node) => node.children.last().copied(),
            None => return,
        };
        let target = last_child.unwrap_or(open);
        if let Some(node) = self.get_mut(target) {
            if last_child.is_some() {
                XmlNode::push_text(&mut node.tail, data);
            } else {
                XmlNode::push_text(&mut node.text, data);
            }
        }
    }

    /// Release a node and its whole subtree. Returns the number of nodes freed.
    ///
    /// The caller must already have removed `id` from its parent's children.
    pub fn release(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.slots.get_mut(current as usize).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(current);
                freed += 1;
            }
        }
        self.live -= freed;
        if self.root == Some(id) {
            self.root = None;
        }
        freed
    }

    /// Detach a node from its parent and release its subtree
    pub fn remove(&mut self, id: NodeId) -> usize {
        let parent = self.get(id).and_then(|n| n.parent);
        if let Some(parent_node) = parent.and_then(|p| self.get_mut(p)) {
            // Usually the last child: search from the back
            if let Some(pos) = parent_node.children.iter().rposition(|&c| c == id) {
                parent_node.children.remove(pos);
            }
        }
        self.release(id)
    }

    /// Clear an element: release all of its children, drop its text, tail
    /// and attributes. The element itself stays in place as a husk.
    pub fn clear(&mut self, id: NodeId) -> usize {
        let children = match self.get_mut(id) {
            Some(node) => node.clear(),
            None => return 0,
        };
        children.into_iter().map(|c| self.release(c)).sum()
    }

    /// Release every child of `parent` that precedes `child`
    ///
    /// Repeatedly drops the parent's first child while `child` still has an
    /// earlier sibling.
    pub fn prune_before(&mut self, parent: NodeId, child: NodeId) -> usize {
        let dropped: Vec<NodeId> = match self.get_mut(parent) {
            Some(node) => match node.children.iter().position(|&c| c == child) {
                Some(pos) => node.children.drain(..pos).collect(),
                None => return 0,
            },
            None => return 0,
        };
        dropped.into_iter().map(|c| self.release(c)).sum()
    }

    /// Release everything still alive
    pub fn release_all(&mut self) -> usize {
        match self.root {
            Some(root) => self.release(root),
            None => 0,
        }
    }

    /// Nodes currently allocated
    pub fn live_nodes(&self) -> usize {
        self.live
    }

    /// Highest number of nodes allocated at once
    pub fn peak_live_nodes(&self) -> usize {
        self.peak_live
    }

    /// Number of slots ever created (live or free)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
