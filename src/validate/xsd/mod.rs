//! XML Schema validation
//!
//! A compiled [`Schema`] is immutable and can back any number of sessions.
//! Validation is streaming: [`SchemaValidator`] keeps one frame per open
//! element and never looks at an element twice.

pub mod builtin;
mod compile;
pub mod types;
mod validator;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use builtin::WhiteSpace;
use types::*;

pub use validator::SchemaValidator;

/// Compiled XML schema
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) target_namespace: Option<String>,
    pub(crate) simple_types: Vec<SimpleType>,
    pub(crate) complex_types: Vec<ComplexType>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) globals: HashMap<(Option<String>, String), ElementId>,
}

impl Schema {
    /// Compile a schema document
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        compile::compile(bytes).map_err(Error::invalid_schema)
    }

    /// Read and compile a schema file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Global element declaration by expanded name
    pub fn global_element(&self, namespace: Option<&str>, local: &str) -> Option<&ElementDecl> {
        self.global_element_id(namespace, local).map(|id| &self.elements[id])
    }

    pub(crate) fn global_element_id(&self, namespace: Option<&str>, local: &str) -> Option<ElementId> {
        self.globals
            .get(&(namespace.map(str::to_string), local.to_string()))
            .copied()
    }

    /// Fresh streaming validator over this schema
    pub fn validator(&self) -> SchemaValidator<'_> {
        SchemaValidator::new(self)
    }

    /// Apply the whitespace rule of a simple type
    pub(crate) fn normalize<'v>(&self, id: SimpleTypeId, value: &'v str) -> Cow<'v, str> {
        self.whitespace_of(id).apply(value)
    }

    /// Check a lexical value against a simple type
    pub(crate) fn check_simple(&self, id: SimpleTypeId, value: &str) -> std::result::Result<(), String> {
        let normalized = self.normalize(id, value);
        self.check_normalized(id, &normalized)
    }

    fn whitespace_of(&self, id: SimpleTypeId) -> WhiteSpace {
        let simple = &self.simple_types[id];
        if let Some(ws) = simple.facets.whitespace {
            return ws;
        }
        match (&simple.variety, simple.base) {
            (_, Some(base)) => self.whitespace_of(base),
            (Variety::Atomic(builtin), None) => builtin.whitespace(),
            (Variety::List(_), None) => WhiteSpace::Collapse,
            // Members normalize on their own
            (Variety::Union(_), None) => WhiteSpace::Preserve,
        }
    }

    fn check_normalized(&self, id: SimpleTypeId, value: &str) -> std::result::Result<(), String> {
        let simple = &self.simple_types[id];
        match (simple.base, &simple.variety) {
            (Some(base), _) => self.check_normalized(base, value)?,
            (None, Variety::Atomic(builtin)) => builtin.check(value)?,
            (None, Variety::List(item)) => {
                for token in value.split_ascii_whitespace() {
                    self.check_simple(*item, token)?;
                }
            }
            (None, Variety::Union(members)) => {
                if !members.iter().any(|&m| self.check_simple(m, value).is_ok()) {
                    return Err(format!("'{}' does not match any member type of the union", value));
                }
            }
        }
        self.check_facets(simple, value)
    }

    fn check_facets(&self, simple: &SimpleType, value: &str) -> std::result::Result<(), String> {
        let facets = &simple.facets;
        let atomic = match simple.variety {
            Variety::Atomic(builtin) => Some(builtin),
            _ => None,
        };

        if !facets.enumeration.is_empty() {
            let listed = facets.enumeration.iter().any(|e| match atomic {
                Some(builtin) => builtin.equal(e, value),
                None => e == value,
            });
            if !listed {
                return Err(format!(
                    "'{}' is not one of the allowed values ({})",
                    value,
                    facets.enumeration.join(", ")
                ));
            }
        }

        let length = match (&simple.variety, atomic) {
            (Variety::List(_), _) => value.split_ascii_whitespace().count(),
            (_, Some(builtin)) => builtin.length_of(value),
            _ => value.chars().count(),
        };
        if let Some(expected) = facets.length {
            if length != expected {
                return Err(format!("'{}' has length {}, expected {}", value, length, expected));
            }
        }
        if let Some(min) = facets.min_length {
            if length < min {
                return Err(format!("'{}' is shorter than the minimum length {}", value, min));
            }
        }
        if let Some(max) = facets.max_length {
            if length > max {
                return Err(format!("'{}' is longer than the maximum length {}", value, max));
            }
        }

        if let Some(builtin) = atomic {
            let bounds = [
                (&facets.min_inclusive, "minInclusive", [Ordering::Greater, Ordering::Equal]),
                (&facets.max_inclusive, "maxInclusive", [Ordering::Less, Ordering::Equal]),
                (&facets.min_exclusive, "minExclusive", [Ordering::Greater, Ordering::Greater]),
                (&facets.max_exclusive, "maxExclusive", [Ordering::Less, Ordering::Less]),
            ];
            for (bound, facet, allowed) in bounds {
                let Some(bound) = bound else { continue };
                match builtin.compare(value, bound) {
                    Some(order) if allowed.contains(&order) => {}
                    Some(_) => return Err(format!("'{}' violates {} {}", value, facet, bound)),
                    None => return Err(format!("'{}' cannot be compared with {} {}", value, facet, bound)),
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn simple_named(&self, name: &str) -> Option<SimpleTypeId> {
        self.simple_types
            .iter()
            .rposition(|s| s.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn schema(body: &str) -> Schema {
        let doc = format!(r#"<xs:schema {}>{}</xs:schema>"#, XS, body);
        Schema::from_bytes(doc.as_bytes()).unwrap()
    }

    fn invalid(body: &str) -> String {
        let doc = format!(r#"<xs:schema {}>{}</xs:schema>"#, XS, body);
        match Schema::from_bytes(doc.as_bytes()) {
            Err(Error::InvalidSchema { message }) => message,
            other => panic!("expected InvalidSchema, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_global_elements() {
        let doc = format!(
            r#"<xs:schema {} targetNamespace="urn:t"><xs:element name="root"/></xs:schema>"#,
            XS
        );
        let schema = Schema::from_bytes(doc.as_bytes()).unwrap();
        assert_eq!(schema.target_namespace(), Some("urn:t"));
        assert!(schema.global_element(Some("urn:t"), "root").is_some());
        assert!(schema.global_element(None, "root").is_none());
    }

    #[test]
    fn test_restriction_facets() {
        let s = schema(
            r#"<xs:simpleType name="small">
                 <xs:restriction base="xs:integer">
                   <xs:minInclusive value="1"/><xs:maxExclusive value="10"/>
                 </xs:restriction>
               </xs:simpleType>"#,
        );
        let id = s.simple_named("small").unwrap();
        assert!(s.check_simple(id, "1").is_ok());
        assert!(s.check_simple(id, " 9 ").is_ok());
        assert!(s.check_simple(id, "10").is_err());
        assert!(s.check_simple(id, "0").is_err());
        assert!(s.check_simple(id, "x").is_err());
    }

    #[test]
    fn test_enumeration_and_length() {
        let s = schema(
            r#"<xs:simpleType name="color">
                 <xs:restriction base="xs:token">
                   <xs:enumeration value="red"/><xs:enumeration value="green"/>
                 </xs:restriction>
               </xs:simpleType>
               <xs:simpleType name="code">
                 <xs:restriction base="xs:string"><xs:length value="3"/></xs:restriction>
               </xs:simpleType>"#,
        );
        let color = s.simple_named("color").unwrap();
        assert!(s.check_simple(color, "  red ").is_ok());
        assert!(s.check_simple(color, "blue").is_err());
        let code = s.simple_named("code").unwrap();
        assert!(s.check_simple(code, "abc").is_ok());
        assert!(s.check_simple(code, "abcd").is_err());
    }

    #[test]
    fn test_list_and_union() {
        let s = schema(
            r#"<xs:simpleType name="ints"><xs:list itemType="xs:int"/></xs:simpleType>
               <xs:simpleType name="few">
                 <xs:restriction base="ints"><xs:maxLength value="2"/></xs:restriction>
               </xs:simpleType>
               <xs:simpleType name="either"><xs:union memberTypes="xs:boolean xs:date"/></xs:simpleType>"#,
        );
        let ints = s.simple_named("ints").unwrap();
        assert!(s.check_simple(ints, "1 2  3").is_ok());
        assert!(s.check_simple(ints, "1 x").is_err());
        let few = s.simple_named("few").unwrap();
        assert!(s.check_simple(few, "1 2").is_ok());
        assert!(s.check_simple(few, "1 2 3").is_err());
        let either = s.simple_named("either").unwrap();
        assert!(s.check_simple(either, "true").is_ok());
        assert!(s.check_simple(either, "2024-02-29").is_ok());
        assert!(s.check_simple(either, "maybe").is_err());
    }

    #[test]
    fn test_forward_references_compile() {
        let s = schema(
            r#"<xs:element name="root" type="rootType"/>
               <xs:complexType name="rootType">
                 <xs:sequence><xs:element ref="leaf" maxOccurs="unbounded"/></xs:sequence>
               </xs:complexType>
               <xs:element name="leaf" type="xs:string"/>"#,
        );
        assert!(s.global_element(None, "root").is_some());
        assert!(s.global_element(None, "leaf").is_some());
    }

    #[test]
    fn test_invalid_schemas() {
        assert!(invalid(r#"<xs:import namespace="urn:x"/>"#).contains("xs:import"));
        assert!(invalid(r#"<xs:element name="a" type="missing"/>"#).contains("unknown type"));
        assert!(invalid(r#"<xs:element name="a"/><xs:element name="a"/>"#).contains("duplicate"));
        assert!(invalid(
            r#"<xs:simpleType name="a"><xs:restriction base="b"/></xs:simpleType>
               <xs:simpleType name="b"><xs:restriction base="a"/></xs:simpleType>"#
        )
        .contains("derived from itself"));
        assert!(invalid(
            r#"<xs:element name="a"><xs:complexType><xs:sequence>
                 <xs:element name="b" minOccurs="2" maxOccurs="1"/>
               </xs:sequence></xs:complexType></xs:element>"#
        )
        .contains("maxOccurs"));
    }

    #[test]
    fn test_not_a_schema() {
        match Schema::from_bytes(b"<root/>") {
            Err(Error::InvalidSchema { message }) => assert!(message.contains("xs:schema")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(matches!(Schema::from_bytes(b"<xs:schema"), Err(Error::InvalidSchema { .. })));
    }
}
