//! Compiled schema components

use super::builtin::{Builtin, WhiteSpace};
use crate::core::qname::QName;
use crate::validate::content_model::{ContentModel, Particle, Term};

pub type SimpleTypeId = usize;
pub type ComplexTypeId = usize;
pub type ElementId = usize;

/// Complex type used for `xs:anyType` and untyped elements
pub const ANY_TYPE: ComplexTypeId = 0;

/// Type of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Simple(SimpleTypeId),
    Complex(ComplexTypeId),
}

#[derive(Debug, Clone)]
pub enum Variety {
    Atomic(Builtin),
    List(SimpleTypeId),
    Union(Vec<SimpleTypeId>),
}

/// Constraining facets of one derivation step
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub whitespace: Option<WhiteSpace>,
}

#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<String>,
    pub variety: Variety,
    /// Type this one restricts; its checks apply first
    pub base: Option<SimpleTypeId>,
    pub facets: Facets,
}

#[derive(Debug, Clone)]
pub enum Content {
    /// No children, no character data (unless mixed)
    Empty,
    /// Character data of a simple type
    Simple(SimpleTypeId),
    /// Child elements
    Elements {
        particle: Particle<XsdTerm>,
        model: ContentModel<XsdTerm>,
    },
    /// `xs:anyType`: anything, children validated laxly
    Any,
}

#[derive(Debug, Clone)]
pub struct ComplexType {
    pub name: Option<String>,
    pub mixed: bool,
    pub content: Content,
    pub attributes: Vec<AttributeUse>,
    pub any_attribute: Option<Wildcard>,
}

impl ComplexType {
    pub fn placeholder(name: Option<String>) -> Self {
        ComplexType {
            name,
            mixed: false,
            content: Content::Empty,
            attributes: Vec::new(),
            any_attribute: None,
        }
    }

    pub fn find_attribute(&self, namespace: Option<&str>, local: &str) -> Option<&AttributeUse> {
        self.attributes
            .iter()
            .find(|a| a.local == local && a.namespace.as_deref() == namespace)
    }
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub namespace: Option<String>,
    pub local: String,
    pub simple: SimpleTypeId,
    pub required: bool,
    pub fixed: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub namespace: Option<String>,
    pub local: String,
    pub type_ref: TypeRef,
    pub fixed: Option<String>,
}

impl ElementDecl {
    pub fn clark(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, self.local),
            None => self.local.clone(),
        }
    }
}

/// Which namespaces a wildcard accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceConstraint {
    Any,
    /// Any namespace other than the given target, and not unqualified
    Other(Option<String>),
    List(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    pub constraint: NamespaceConstraint,
}

impl Wildcard {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match &self.constraint {
            NamespaceConstraint::Any => true,
            NamespaceConstraint::Other(target) => namespace.is_some() && namespace != target.as_deref(),
            NamespaceConstraint::List(list) => list.iter().any(|ns| ns.as_deref() == namespace),
        }
    }
}

/// Leaf of an XSD content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XsdTerm {
    Element {
        namespace: Option<String>,
        local: String,
        decl: ElementId,
    },
    Wildcard(Wildcard),
}

impl Term for XsdTerm {
    fn matches(&self, name: &QName) -> bool {
        match self {
            XsdTerm::Element { namespace, local, .. } => name.is(namespace.as_deref(), local),
            XsdTerm::Wildcard(wildcard) => wildcard.allows(name.namespace.as_deref()),
        }
    }

    fn describe(&self) -> String {
        match self {
            XsdTerm::Element {
                namespace: Some(ns),
                local,
                ..
            } => format!("{{{}}}{}", ns, local),
            XsdTerm::Element { local, .. } => local.clone(),
            XsdTerm::Wildcard(_) => "any element".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_constraints() {
        let other = Wildcard {
            constraint: NamespaceConstraint::Other(Some("urn:t".into())),
        };
        assert!(other.allows(Some("urn:x")));
        assert!(!other.allows(Some("urn:t")));
        assert!(!other.allows(None));

        let list = Wildcard {
            constraint: NamespaceConstraint::List(vec![None, Some("urn:a".into())]),
        };
        assert!(list.allows(None));
        assert!(list.allows(Some("urn:a")));
        assert!(!list.allows(Some("urn:b")));
    }

    #[test]
    fn test_element_term() {
        let term = XsdTerm::Element {
            namespace: Some("urn:t".into()),
            local: "r".into(),
            decl: 3,
        };
        assert!(term.matches(&QName::namespaced("urn:t", "r")));
        assert!(!term.matches(&QName::local("r")));
        assert_eq!(term.describe(), "{urn:t}r");
    }
}
