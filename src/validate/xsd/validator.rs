//! Streaming schema validator

use super::types::{ComplexTypeId, Content, ElementId, SimpleTypeId, TypeRef, XsdTerm};
use super::Schema;
use crate::dom::namespace::ns;
use crate::reader::events::StartTag;
use crate::validate::content_model::MatchState;
use crate::validate::DocumentValidator;

/// Per open element state
enum Frame {
    /// Content is not validated (wildcard match, lax `anyType` child, nil)
    Skip,
    Simple {
        name: String,
        simple: SimpleTypeId,
        fixed: Option<String>,
        text: String,
    },
    Complex {
        name: String,
        complex: ComplexTypeId,
        state: Option<MatchState>,
        fixed: Option<String>,
        text: String,
    },
}

/// Validates one document against a [`Schema`]
pub struct SchemaValidator<'s> {
    schema: &'s Schema,
    stack: Vec<Frame>,
}

fn describe_expected(expected: &[String]) -> String {
    if expected.is_empty() {
        "no more elements".to_string()
    } else {
        expected.join(", ")
    }
}

impl<'s> SchemaValidator<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        SchemaValidator {
            schema,
            stack: Vec::new(),
        }
    }

    /// Declaration for a child of the current element, `None` when the
    /// child's content is not validated
    fn child_declaration(&mut self, tag: &StartTag) -> Result<Option<ElementId>, String> {
        let schema = self.schema;
        let name = &tag.name;
        let Some(parent) = self.stack.last_mut() else {
            return schema
                .global_element_id(name.namespace.as_deref(), &name.local)
                .map(Some)
                .ok_or_else(|| format!("no global declaration matches the root element {}", name.clark()));
        };

        match parent {
            Frame::Skip => Ok(None),
            Frame::Simple { name: parent, .. } => Err(format!(
                "element {} is not allowed: {} has simple content",
                name.clark(),
                parent
            )),
            Frame::Complex {
                name: parent,
                complex,
                state,
                ..
            } => match (&schema.complex_types[*complex].content, state) {
                (Content::Elements { model, .. }, Some(state)) => match model.step(state, name) {
                    Ok(XsdTerm::Element { decl, .. }) => Ok(Some(*decl)),
                    Ok(XsdTerm::Wildcard(_)) => Ok(None),
                    Err(expected) => Err(format!(
                        "element {} is not expected in {}; expected {}",
                        name.clark(),
                        parent,
                        describe_expected(&expected)
                    )),
                },
                (Content::Any, _) => Ok(schema.global_element_id(name.namespace.as_deref(), &name.local)),
                _ => Err(format!(
                    "element {} is not allowed: {} has no element content",
                    name.clark(),
                    parent
                )),
            },
        }
    }

    fn check_attributes(&self, complex: Option<ComplexTypeId>, tag: &StartTag) -> Result<(), String> {
        let element = tag.name.clark();
        let complex = complex.map(|id| &self.schema.complex_types[id]);

        for (name, value) in &tag.attributes {
            if name.namespace.as_deref() == Some(ns::XSI) {
                continue;
            }
            let declared = complex.and_then(|c| c.find_attribute(name.namespace.as_deref(), &name.local));
            match declared {
                Some(attribute) => {
                    self.schema
                        .check_simple(attribute.simple, value)
                        .map_err(|e| format!("attribute {} of {}: {}", name.clark(), element, e))?;
                    if let Some(fixed) = &attribute.fixed {
                        if self.schema.normalize(attribute.simple, value) != self.schema.normalize(attribute.simple, fixed) {
                            return Err(format!(
                                "attribute {} of {} must have the fixed value '{}'",
                                name.clark(),
                                element,
                                fixed
                            ));
                        }
                    }
                }
                None => {
                    let wildcard = complex.and_then(|c| c.any_attribute.as_ref());
                    if !wildcard.is_some_and(|w| w.allows(name.namespace.as_deref())) {
                        return Err(format!("attribute {} is not allowed on {}", name.clark(), element));
                    }
                }
            }
        }

        if let Some(complex) = complex {
            for required in complex.attributes.iter().filter(|a| a.required) {
                if tag.attribute(required.namespace.as_deref(), &required.local).is_none() {
                    return Err(format!("missing required attribute {} on {}", required.local, element));
                }
            }
        }
        Ok(())
    }

    fn check_text(&self, simple: SimpleTypeId, name: &str, text: &str, fixed: Option<&str>) -> Result<(), String> {
        // An empty element takes the fixed value
        if text.is_empty() && fixed.is_some() {
            return Ok(());
        }
        self.schema
            .check_simple(simple, text)
            .map_err(|e| format!("element {}: {}", name, e))?;
        if let Some(fixed) = fixed {
            if self.schema.normalize(simple, text) != self.schema.normalize(simple, fixed) {
                return Err(format!("element {} must have the fixed value '{}'", name, fixed));
            }
        }
        Ok(())
    }
}

impl DocumentValidator for SchemaValidator<'_> {
    fn start_element(&mut self, tag: &StartTag) -> Result<(), String> {
        let Some(decl) = self.child_declaration(tag)? else {
            self.stack.push(Frame::Skip);
            return Ok(());
        };
        let decl = &self.schema.elements[decl];
        let nil = tag
            .attribute(Some(ns::XSI), "nil")
            .is_some_and(|v| matches!(v.trim(), "true" | "1"));

        let frame = match decl.type_ref {
            TypeRef::Simple(simple) => {
                self.check_attributes(None, tag)?;
                Frame::Simple {
                    name: tag.name.clark(),
                    simple,
                    fixed: decl.fixed.clone(),
                    text: String::new(),
                }
            }
            TypeRef::Complex(complex) => {
                self.check_attributes(Some(complex), tag)?;
                let state = match &self.schema.complex_types[complex].content {
                    Content::Elements { model, .. } => Some(model.start()),
                    _ => None,
                };
                Frame::Complex {
                    name: tag.name.clark(),
                    complex,
                    state,
                    fixed: decl.fixed.clone(),
                    text: String::new(),
                }
            }
        };
        self.stack.push(if nil { Frame::Skip } else { frame });
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), String> {
        let schema = self.schema;
        match self.stack.last_mut() {
            None | Some(Frame::Skip) => Ok(()),
            Some(Frame::Simple { text: buffer, .. }) => {
                buffer.push_str(text);
                Ok(())
            }
            Some(Frame::Complex {
                name,
                complex,
                text: buffer,
                ..
            }) => {
                let complex = &schema.complex_types[*complex];
                match complex.content {
                    Content::Simple(_) => {
                        buffer.push_str(text);
                        Ok(())
                    }
                    Content::Any => Ok(()),
                    _ if complex.mixed => {
                        buffer.push_str(text);
                        Ok(())
                    }
                    _ if text.trim().is_empty() => Ok(()),
                    _ => Err(format!("character data is not allowed in element {}", name)),
                }
            }
        }
    }

    fn end_element(&mut self) -> Result<(), String> {
        match self.stack.pop() {
            None | Some(Frame::Skip) => Ok(()),
            Some(Frame::Simple {
                name,
                simple,
                fixed,
                text,
            }) => self.check_text(simple, &name, &text, fixed.as_deref()),
            Some(Frame::Complex {
                name,
                complex,
                state,
                fixed,
                text,
            }) => match (&self.schema.complex_types[complex].content, state) {
                (Content::Elements { model, .. }, Some(state)) => {
                    if !model.accepts(&state) {
                        return Err(format!(
                            "element {} is incomplete; expected {}",
                            name,
                            describe_expected(&model.expected(&state))
                        ));
                    }
                    match fixed {
                        Some(fixed) if !text.is_empty() && text != fixed => {
                            Err(format!("element {} must have the fixed value '{}'", name, fixed))
                        }
                        _ => Ok(()),
                    }
                }
                (Content::Simple(simple), _) => self.check_text(*simple, &name, &text, fixed.as_deref()),
                _ => Ok(()),
            },
        }
    }

    fn finish(&mut self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::qname::QName;

    const SCHEMA: &str = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            targetNamespace="urn:t" elementFormDefault="qualified">
          <xs:element name="root">
            <xs:complexType>
              <xs:sequence>
                <xs:element name="r" type="rowType" maxOccurs="unbounded"/>
                <xs:any namespace="##other" processContents="skip" minOccurs="0"/>
              </xs:sequence>
              <xs:attribute name="version" type="xs:int" use="required"/>
            </xs:complexType>
          </xs:element>
          <xs:complexType name="rowType">
            <xs:sequence>
              <xs:element name="c1" type="xs:string"/>
              <xs:element name="c2" type="xs:decimal" minOccurs="0"/>
            </xs:sequence>
          </xs:complexType>
        </xs:schema>"###;

    fn tag(local: &str) -> StartTag {
        StartTag::new(QName::namespaced("urn:t", local))
    }

    fn root() -> StartTag {
        let mut root = tag("root");
        root.attributes.push((QName::local("version"), "2".into()));
        root
    }

    fn leaf(v: &mut SchemaValidator<'_>, local: &str, text: &str) -> Result<(), String> {
        v.start_element(&tag(local))?;
        v.text(text)?;
        v.end_element()
    }

    #[test]
    fn test_valid_document() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        v.start_element(&root()).unwrap();
        for _ in 0..3 {
            v.start_element(&tag("r")).unwrap();
            leaf(&mut v, "c1", "A").unwrap();
            leaf(&mut v, "c2", " 1.5 ").unwrap();
            v.end_element().unwrap();
        }
        v.start_element(&StartTag::new(QName::namespaced("urn:other", "ext"))).unwrap();
        v.start_element(&StartTag::new(QName::local("anything"))).unwrap();
        v.end_element().unwrap();
        v.end_element().unwrap();
        v.end_element().unwrap();
        v.finish().unwrap();
    }

    #[test]
    fn test_unknown_root() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        let err = v.start_element(&StartTag::new(QName::local("root"))).unwrap_err();
        assert!(err.contains("no global declaration"));
    }

    #[test]
    fn test_missing_required_attribute() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let err = schema.validator().start_element(&tag("root")).unwrap_err();
        assert!(err.contains("missing required attribute version"));
    }

    #[test]
    fn test_undeclared_attribute() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut root = root();
        root.attributes.push((QName::local("extra"), "1".into()));
        let err = schema.validator().start_element(&root).unwrap_err();
        assert!(err.contains("attribute extra is not allowed"));
    }

    #[test]
    fn test_unexpected_child() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        v.start_element(&root()).unwrap();
        v.start_element(&tag("r")).unwrap();
        let err = v.start_element(&tag("c2")).unwrap_err();
        assert!(err.contains("expected {urn:t}c1"), "{}", err);
    }

    #[test]
    fn test_incomplete_content() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        v.start_element(&root()).unwrap();
        let err = v.end_element().unwrap_err();
        assert!(err.contains("incomplete"));
    }

    #[test]
    fn test_bad_simple_value() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        v.start_element(&root()).unwrap();
        v.start_element(&tag("r")).unwrap();
        leaf(&mut v, "c1", "A").unwrap();
        let err = leaf(&mut v, "c2", "abc").unwrap_err();
        assert!(err.contains("{urn:t}c2"));
    }

    #[test]
    fn test_text_in_element_only_content() {
        let schema = Schema::from_bytes(SCHEMA.as_bytes()).unwrap();
        let mut v = schema.validator();
        v.start_element(&root()).unwrap();
        v.text("\n  ").unwrap();
        assert!(v.text("loose").is_err());
    }

    #[test]
    fn test_simple_content_extension() {
        let schema = Schema::from_bytes(
            br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                  <xs:element name="price">
                    <xs:complexType>
                      <xs:simpleContent>
                        <xs:extension base="xs:decimal">
                          <xs:attribute name="currency" type="xs:string" fixed="EUR"/>
                        </xs:extension>
                      </xs:simpleContent>
                    </xs:complexType>
                  </xs:element>
                </xs:schema>"#,
        )
        .unwrap();

        let mut price = StartTag::new(QName::local("price"));
        price.attributes.push((QName::local("currency"), "EUR".into()));
        let mut v = schema.validator();
        v.start_element(&price).unwrap();
        v.text("9.99").unwrap();
        v.end_element().unwrap();

        let mut v = schema.validator();
        v.start_element(&price).unwrap();
        v.text("cheap").unwrap();
        assert!(v.end_element().is_err());

        price.attributes[0].1 = "USD".into();
        assert!(schema.validator().start_element(&price).unwrap_err().contains("fixed value"));
    }
}
