//! String Interning Pool
//!
//! Deduplicated storage for element names, attribute names, prefixes and
//! namespace URIs. Names repeat on every row of a table-like document, so
//! arena nodes carry `u32` ids instead of owned strings.
//!
//! The pool only grows. Only elements a handler can see are interned, so
//! its size follows the vocabulary of matched regions. Generated names
//! inside matched elements (`<item_1>`, `<item_2>`, ...) still grow it
//! with every distinct name.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Id of an interned string. 0 is reserved for "no string".
pub type StrId = u32;

/// String interning pool
///
/// Memory layout:
/// - `spans`: (offset, len) into `data` for each id
/// - `data`: concatenated string bytes
/// - `hash_index`: hash -> list of ids (handles rare collisions)
#[derive(Debug)]
pub struct StringPool {
    spans: Vec<(u32, u32)>,
    data: String,
    hash_index: HashMap<u64, Vec<StrId>>,
}

impl StringPool {
    /// Create a new empty string pool
    pub fn new() -> Self {
        let mut pool = StringPool {
            spans: Vec::with_capacity(64),
            data: String::with_capacity(1024),
            hash_index: HashMap::new(),
        };
        // Entry 0 is reserved for "no string"
        pool.spans.push((0, 0));
        pool
    }

    #[inline]
    fn compute_hash(s: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Intern a string, returning its id
    pub fn intern(&mut self, s: &str) -> StrId {
        if s.is_empty() {
            return 0;
        }

        let hash = Self::compute_hash(s);
        if let Some(ids) = self.hash_index.get(&hash) {
            for &id in ids {
                if self.get(id) == s {
                    return id;
                }
            }
        }

        let offset = self.data.len() as u32;
        self.data.push_str(s);
        let id = self.spans.len() as StrId;
        self.spans.push((offset, s.len() as u32));
        self.hash_index.entry(hash).or_default().push(id);
        id
    }

    /// Intern an optional string; `None` maps to id 0
    #[inline]
    pub fn intern_opt(&mut self, s: Option<&str>) -> StrId {
        s.map_or(0, |s| self.intern(s))
    }

    /// Get a string by id. Unknown ids resolve to the empty string.
    #[inline]
    pub fn get(&self, id: StrId) -> &str {
        match self.spans.get(id as usize) {
            Some(&(offset, len)) => &self.data[offset as usize..(offset + len) as usize],
            None => "",
        }
    }

    /// Get a string by id, mapping id 0 to `None`
    #[inline]
    pub fn get_opt(&self, id: StrId) -> Option<&str> {
        if id == 0 {
            None
        } else {
            Some(self.get(id))
        }
    }

    /// Get the number of unique strings stored
    pub fn len(&self) -> usize {
        self.spans.len() - 1
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.spans.len() <= 1
    }

    /// Get total bytes used for string storage
    pub fn bytes_used(&self) -> usize {
        self.data.len()
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}
