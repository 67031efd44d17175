//! Tag filter
//!
//! Patterns use Clark notation. A bare `local` name only matches elements
//! in no namespace; use `{*}local` to match it in any namespace.
//!
//! | pattern      | matches                                 |
//! |--------------|-----------------------------------------|
//! | `*`          | every element                           |
//! | `row`        | `row` in no namespace                   |
//! | `{}row`      | `row` in no namespace                   |
//! | `{urn:a}row` | `row` in namespace `urn:a`              |
//! | `{*}row`     | `row` in any namespace, or none         |
//! | `{urn:a}*`   | every element in namespace `urn:a`      |

use std::fmt;

use crate::core::qname::{is_ncname, parse_clark};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum NamespacePattern {
    Any,
    Unqualified,
    Uri(String),
}

/// One parsed tag pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    namespace: NamespacePattern,
    /// `None` for `*`
    local: Option<String>,
}

impl TagPattern {
    /// Parse a single pattern
    pub fn parse(tag: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTagFilter {
            tag: tag.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty tag"));
        }
        if trimmed == "*" {
            return Ok(TagPattern {
                namespace: NamespacePattern::Any,
                local: None,
            });
        }

        let (namespace, local) = parse_clark(trimmed).map_err(invalid)?;
        let namespace = match namespace {
            None | Some("") => NamespacePattern::Unqualified,
            Some("*") => NamespacePattern::Any,
            Some(uri) => NamespacePattern::Uri(uri.to_string()),
        };
        let local = match local {
            "*" => None,
            name if is_ncname(name) => Some(name.to_string()),
            _ => return Err(invalid("local name is not a valid XML name")),
        };
        Ok(TagPattern { namespace, local })
    }

    /// Test an expanded element name
    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        let namespace_ok = match &self.namespace {
            NamespacePattern::Any => true,
            NamespacePattern::Unqualified => namespace.is_none(),
            NamespacePattern::Uri(uri) => namespace == Some(uri.as_str()),
        };
        namespace_ok && self.local.as_deref().is_none_or(|l| l == local)
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.local.as_deref().unwrap_or("*");
        match &self.namespace {
            NamespacePattern::Any if self.local.is_none() => f.write_str("*"),
            NamespacePattern::Any => write!(f, "{{*}}{}", local),
            NamespacePattern::Unqualified => f.write_str(local),
            NamespacePattern::Uri(uri) => write!(f, "{{{}}}{}", uri, local),
        }
    }
}

/// Set of tag patterns; an element matches if any pattern does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    patterns: Vec<TagPattern>,
}

impl TagFilter {
    /// Filter from a single pattern
    pub fn parse(tag: &str) -> Result<Self> {
        Ok(TagFilter {
            patterns: vec![TagPattern::parse(tag)?],
        })
    }

    /// Filter from several patterns. An empty list is rejected; use no
    /// filter at all to match every element.
    pub fn from_patterns<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = tags
            .into_iter()
            .map(|s| TagPattern::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if patterns.is_empty() {
            return Err(Error::InvalidTagFilter {
                tag: String::new(),
                reason: "no patterns given".to_string(),
            });
        }
        Ok(TagFilter { patterns })
    }

    pub fn patterns(&self) -> &[TagPattern] {
        &self.patterns
    }

    #[inline]
    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(namespace, local))
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", pattern)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_is_unqualified() {
        let filter = TagFilter::parse("r").unwrap();
        assert!(filter.matches(None, "r"));
        assert!(!filter.matches(Some("urn:a"), "r"));
        assert!(!filter.matches(None, "row"));
    }

    #[test]
    fn test_clark_name() {
        let filter = TagFilter::parse("{urn:a}r").unwrap();
        assert!(filter.matches(Some("urn:a"), "r"));
        assert!(!filter.matches(None, "r"));
        assert!(!filter.matches(Some("urn:b"), "r"));
    }

    #[test]
    fn test_wildcards() {
        assert!(TagFilter::parse("*").unwrap().matches(Some("urn:x"), "anything"));

        let any_ns = TagFilter::parse("{*}r").unwrap();
        assert!(any_ns.matches(None, "r"));
        assert!(any_ns.matches(Some("urn:x"), "r"));
        assert!(!any_ns.matches(None, "s"));

        let in_ns = TagFilter::parse("{urn:a}*").unwrap();
        assert!(in_ns.matches(Some("urn:a"), "s"));
        assert!(!in_ns.matches(None, "s"));

        let explicit = TagFilter::parse("{}r").unwrap();
        assert!(explicit.matches(None, "r"));
        assert!(!explicit.matches(Some("urn:a"), "r"));
    }

    #[test]
    fn test_several_patterns() {
        let filter = TagFilter::from_patterns(["a", "{urn:x}b"]).unwrap();
        assert!(filter.matches(None, "a"));
        assert!(filter.matches(Some("urn:x"), "b"));
        assert!(!filter.matches(None, "b"));
        assert_eq!(filter.to_string(), "a | {urn:x}b");
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "{urn:a", "{urn:a}", "a}b", "1abc", "p:local"] {
            assert!(
                matches!(TagFilter::parse(bad), Err(Error::InvalidTagFilter { .. })),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(TagFilter::from_patterns(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for text in ["*", "r", "{*}r", "{urn:a}*", "{urn:a}r"] {
            assert_eq!(TagPattern::parse(text).unwrap().to_string(), text);
        }
    }
}
