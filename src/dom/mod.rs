//! DOM Module - live frontier of the document
//!
//! Arena-based storage for the part of the tree the walker still holds:
//! - Arena allocation for nodes, released as subtrees are pruned
//! - NodeId (u32) indices instead of pointers
//! - String interning for element/attribute names and namespace URIs
//! - Flat namespace registry exposed to handlers

pub mod document;
pub mod element;
pub mod namespace;
pub mod node;
pub mod strings;

pub use document::LiveDocument;
pub use element::{AttributeRef, ElementRef};
pub use namespace::{NamespaceMap, NamespaceRegistry, NamespaceSnapshot};
pub use node::{NameIds, NodeId, XmlAttribute, XmlNode};
pub use strings::StringPool;
