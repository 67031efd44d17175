//! Namespace Registry
//!
//! Flat, ever-growing prefix -> URI map handed to handlers.
//!
//! This is deliberately not a scoped resolver: every binding observed so far
//! stays visible for the rest of the session, even outside the element that
//! declared it. A redeclared prefix takes the most recent URI. Element names
//! themselves are still resolved with proper scoping by the event source.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known namespace URIs
pub mod ns {
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
    pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
}

/// Prefix substituted for the default (empty) prefix
pub const DEFAULT_PREFIX: &str = "ns";

/// Prefix -> URI mapping, ordered by prefix
pub type NamespaceMap = BTreeMap<String, String>;

/// Immutable view of the registry at one point of the traversal
///
/// Cheap to clone; later `observe` calls never change an existing snapshot.
pub type NamespaceSnapshot = Arc<NamespaceMap>;

/// Accumulates namespace declarations seen during the parse
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    map: Arc<NamespaceMap>,
}

impl NamespaceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration. The empty prefix is stored as `ns`.
    pub fn observe(&mut self, prefix: &str, uri: &str) {
        let prefix = if prefix.is_empty() { DEFAULT_PREFIX } else { prefix };
        // Copy-on-write: outstanding snapshots keep the old map
        Arc::make_mut(&mut self.map).insert(prefix.to_string(), uri.to_string());
    }

    /// Current mapping by value
    pub fn snapshot(&self) -> NamespaceSnapshot {
        Arc::clone(&self.map)
    }

    /// Look up a prefix in the current mapping
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.map.get(prefix).map(String::as_str)
    }

    /// Number of distinct prefixes observed
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True until the first declaration is observed
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
