//! Qualified names
//!
//! Namespace-aware element and attribute names, Clark notation
//! (`{uri}local`) parsing and the XML name character classes.

use memchr::memchr;
use std::fmt;

/// A namespace-resolved name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace URI, if the name is in a namespace
    pub namespace: Option<String>,
    /// Local part (after the colon)
    pub local: String,
    /// Prefix used in the document, if any
    pub prefix: Option<String>,
}

impl QName {
    /// Name in no namespace
    pub fn local(local: impl Into<String>) -> Self {
        QName {
            namespace: None,
            local: local.into(),
            prefix: None,
        }
    }

    /// Name in the given namespace, without a prefix
    pub fn namespaced(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        QName {
            namespace: Some(namespace.into()),
            local: local.into(),
            prefix: None,
        }
    }

    /// Clark notation: `{uri}local`, or just `local` without a namespace
    pub fn clark(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, self.local),
            None => self.local.clone(),
        }
    }

    /// Name as written in the document: `prefix:local` or `local`
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    /// Compare namespace URI and local name, ignoring the prefix
    #[inline]
    pub fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Split a name into prefix and local name at the colon
#[inline]
pub fn split_name(name: &[u8]) -> (Option<&[u8]>, &[u8]) {
    if let Some(pos) = memchr(b':', name) {
        (Some(&name[..pos]), &name[pos + 1..])
    } else {
        (None, name)
    }
}

/// Split a `prefix:local` string
#[inline]
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.find(':') {
        Some(pos) => (Some(&name[..pos]), &name[pos + 1..]),
        None => (None, name),
    }
}

/// Parse Clark notation into (namespace, local)
///
/// `{uri}local` yields `Some(uri)`; `{}local` yields `Some("")`; a bare
/// `local` yields `None`.
pub fn parse_clark(text: &str) -> Result<(Option<&str>, &str), &'static str> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'{') {
        if memchr(b'}', bytes).is_some() {
            return Err("unbalanced '}' in tag");
        }
        return Ok((None, text));
    }
    match memchr(b'}', bytes) {
        Some(close) => {
            let local = &text[close + 1..];
            if local.is_empty() {
                return Err("missing local name after '}'");
            }
            Ok((Some(&text[1..close]), local))
        }
        None => Err("missing closing '}' in tag"),
    }
}

/// Check if a character is a valid XML NameStartChar
/// Non-ASCII bytes (>= 0x80) are allowed as they may be UTF-8 encoded Unicode letters
#[inline]
pub fn is_name_start_char(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b':' || c >= 0x80
}

/// Check if a character is a valid XML NameChar
#[inline]
pub fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'.' || c == b'-' || c == b'_' || c == b':' || c >= 0x80
}

/// XML `Name` production (byte-level approximation)
pub fn is_name(s: &str) -> bool {
    let b = s.as_bytes();
    !b.is_empty() && is_name_start_char(b[0]) && b[1..].iter().all(|&c| is_name_char(c))
}

/// XML `NCName`: a Name without colons
pub fn is_ncname(s: &str) -> bool {
    is_name(s) && memchr(b':', s.as_bytes()).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clark_roundtrip_text() {
        let name = QName::namespaced("urn:a", "row");
        assert_eq!(name.clark(), "{urn:a}row");
        assert_eq!(QName::local("row").clark(), "row");
    }

    #[test]
    fn test_qualified() {
        let mut name = QName::namespaced("http://www.w3.org/2000/svg", "rect");
        name.prefix = Some("svg".to_string());
        assert_eq!(name.qualified(), "svg:rect");
        assert!(name.is(Some("http://www.w3.org/2000/svg"), "rect"));
        assert!(!name.is(None, "rect"));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name(b"svg:rect"), (Some(&b"svg"[..]), &b"rect"[..]));
        assert_eq!(split_name(b"div"), (None, &b"div"[..]));
        assert_eq!(split_qualified("ns:c1"), (Some("ns"), "c1"));
    }

    #[test]
    fn test_parse_clark() {
        assert_eq!(parse_clark("{urn:x}r"), Ok((Some("urn:x"), "r")));
        assert_eq!(parse_clark("{}r"), Ok((Some(""), "r")));
        assert_eq!(parse_clark("r"), Ok((None, "r")));
        assert!(parse_clark("{urn:x").is_err());
        assert!(parse_clark("{urn:x}").is_err());
        assert!(parse_clark("a}b").is_err());
    }

    #[test]
    fn test_names() {
        assert!(is_name("a:b"));
        assert!(is_ncname("row_1"));
        assert!(!is_ncname("a:b"));
        assert!(!is_name("1abc"));
        assert!(!is_name(""));
    }
}
