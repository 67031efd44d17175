//! Schema compiler
//!
//! Reads the schema document into a small in-memory tree (schemas are
//! tiny next to the documents they validate), then compiles global and
//! local declarations into the component arenas of [`Schema`]. Named
//! components are compiled on first reference, so declaration order in
//! the schema document does not matter.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::rc::Rc;

use super::builtin::{Builtin, WhiteSpace};
use super::types::*;
use super::Schema;
use crate::core::qname::{split_qualified, QName};
use crate::dom::namespace::ns;
use crate::reader::{EventSource, SourceEvent, SourceOptions};
use crate::validate::content_model::{ContentModel, Particle, ParticleKind};

type CompileResult<T> = std::result::Result<T, String>;

// ============================================================================
// Schema document tree
// ============================================================================

struct SchemaNode {
    name: QName,
    attrs: Vec<(QName, String)>,
    children: Vec<SchemaNode>,
    /// In-scope prefix -> URI bindings, default namespace under ""
    scope: Rc<BTreeMap<String, String>>,
}

impl SchemaNode {
    fn local(&self) -> &str {
        &self.name.local
    }

    fn is_xsd(&self) -> bool {
        self.name.namespace.as_deref() == Some(ns::XSD)
    }

    /// Unqualified attribute value
    fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name.is(None, local))
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, local: &str) -> CompileResult<&str> {
        self.attr(local)
            .ok_or_else(|| format!("xs:{} requires a '{}' attribute", self.local(), local))
    }

    /// Schema children, annotations skipped
    fn children(&self) -> impl Iterator<Item = &SchemaNode> {
        self.children.iter().filter(|c| !(c.is_xsd() && c.local() == "annotation"))
    }

    fn child(&self, local: &str) -> Option<&SchemaNode> {
        self.children().find(|c| c.local() == local)
    }

    /// Resolve a QName-valued attribute against the in-scope namespaces
    fn resolve(&self, value: &str) -> CompileResult<(Option<String>, String)> {
        let (prefix, local) = split_qualified(value.trim());
        let uri = self.scope.get(prefix.unwrap_or(""));
        match (prefix, uri) {
            (Some(p), None) => Err(format!("prefix '{}' in '{}' is not declared", p, value)),
            (_, uri) => Ok((uri.filter(|u| !u.is_empty()).cloned(), local.to_string())),
        }
    }
}

fn parse_tree(bytes: &[u8]) -> CompileResult<SchemaNode> {
    let mut source = EventSource::from_reader(Cursor::new(bytes), "<schema>", SourceOptions::default())
        .map_err(|e| e.to_string())?;

    let mut base = BTreeMap::new();
    base.insert("xml".to_string(), ns::XML.to_string());
    let base = Rc::new(base);

    let mut stack: Vec<SchemaNode> = Vec::new();
    let mut declared: Vec<(String, String)> = Vec::new();
    let mut root = None;

    while let Some(event) = source.next_event().map_err(|e| e.to_string())? {
        match event {
            SourceEvent::NamespaceStart { prefix, uri } => declared.push((prefix, uri)),
            SourceEvent::StartElement(tag) => {
                let parent = stack.last().map_or_else(|| Rc::clone(&base), |n| Rc::clone(&n.scope));
                let scope = if declared.is_empty() {
                    parent
                } else {
                    let mut map = (*parent).clone();
                    map.extend(declared.drain(..));
                    Rc::new(map)
                };
                stack.push(SchemaNode {
                    name: tag.name,
                    attrs: tag.attributes,
                    children: Vec::new(),
                    scope,
                });
            }
            SourceEvent::EndElement => {
                if let Some(node) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
            }
            SourceEvent::Text(_) | SourceEvent::DocType(_) => {}
        }
    }
    root.ok_or_else(|| "empty schema document".to_string())
}

// ============================================================================
// Compiler
// ============================================================================

/// Pieces collected from the children of a type definition
#[derive(Default)]
struct Parts {
    particle: Option<Particle<XsdTerm>>,
    attributes: Vec<AttributeUse>,
    prohibited: Vec<(Option<String>, String)>,
    any_attribute: Option<Wildcard>,
}

struct Compiler<'d> {
    target: Option<String>,
    element_qualified: bool,
    attribute_qualified: bool,

    global_elements: HashMap<String, &'d SchemaNode>,
    global_complex: HashMap<String, &'d SchemaNode>,
    global_simple: HashMap<String, &'d SchemaNode>,
    global_attributes: HashMap<String, &'d SchemaNode>,

    element_ids: HashMap<String, ElementId>,
    complex_ids: HashMap<String, ComplexTypeId>,
    simple_ids: HashMap<String, SimpleTypeId>,
    attribute_decls: HashMap<String, AttributeUse>,
    simple_in_progress: HashSet<String>,
    complex_ready: Vec<bool>,

    simple_types: Vec<SimpleType>,
    complex_types: Vec<ComplexType>,
    elements: Vec<ElementDecl>,
}

/// Compile a schema document
pub(super) fn compile(bytes: &[u8]) -> CompileResult<Schema> {
    let tree = parse_tree(bytes)?;
    if !(tree.is_xsd() && tree.local() == "schema") {
        return Err(format!("root element {} is not xs:schema", tree.name.clark()));
    }

    let mut compiler = Compiler::new(&tree);
    compiler.register_globals(&tree)?;
    compiler.compile_globals()?;

    let globals = compiler
        .element_ids
        .iter()
        .map(|(name, &id)| ((compiler.target.clone(), name.clone()), id))
        .collect();
    Ok(Schema {
        target_namespace: compiler.target,
        simple_types: compiler.simple_types,
        complex_types: compiler.complex_types,
        elements: compiler.elements,
        globals,
    })
}

#[inline]
fn builtin_id(builtin: Builtin) -> SimpleTypeId {
    builtin as usize
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "1"))
}

impl<'d> Compiler<'d> {
    fn new(root: &'d SchemaNode) -> Self {
        let target = root.attr("targetNamespace").filter(|t| !t.is_empty()).map(str::to_string);
        let simple_types = Builtin::ALL
            .iter()
            .map(|&b| SimpleType {
                name: Some(b.name().to_string()),
                variety: Variety::Atomic(b),
                base: None,
                facets: Facets::default(),
            })
            .collect();
        let any_type = ComplexType {
            name: Some("anyType".to_string()),
            mixed: true,
            content: Content::Any,
            attributes: Vec::new(),
            any_attribute: Some(Wildcard {
                constraint: NamespaceConstraint::Any,
            }),
        };

        Compiler {
            target,
            element_qualified: root.attr("elementFormDefault") == Some("qualified"),
            attribute_qualified: root.attr("attributeFormDefault") == Some("qualified"),
            global_elements: HashMap::new(),
            global_complex: HashMap::new(),
            global_simple: HashMap::new(),
            global_attributes: HashMap::new(),
            element_ids: HashMap::new(),
            complex_ids: HashMap::new(),
            simple_ids: HashMap::new(),
            attribute_decls: HashMap::new(),
            simple_in_progress: HashSet::new(),
            complex_ready: vec![true],
            simple_types,
            complex_types: vec![any_type],
            elements: Vec::new(),
        }
    }

    fn register_globals(&mut self, root: &'d SchemaNode) -> CompileResult<()> {
        for child in root.children() {
            if !child.is_xsd() {
                return Err(format!("unexpected element {} in schema", child.name.clark()));
            }
            let table = match child.local() {
                "element" => &mut self.global_elements,
                "complexType" => &mut self.global_complex,
                "simpleType" => &mut self.global_simple,
                "attribute" => &mut self.global_attributes,
                "notation" => continue,
                unsupported @ ("include" | "import" | "redefine" | "group" | "attributeGroup") => {
                    return Err(format!("xs:{} is not supported", unsupported))
                }
                other => return Err(format!("unexpected xs:{} in schema", other)),
            };
            let name = child.required("name")?;
            if table.insert(name.to_string(), child).is_some() {
                return Err(format!("duplicate global xs:{} '{}'", child.local(), name));
            }
        }
        if self.global_complex.keys().any(|k| self.global_simple.contains_key(k)) {
            return Err("a simple and a complex type share a name".to_string());
        }
        Ok(())
    }

    fn compile_globals(&mut self) -> CompileResult<()> {
        let mut names: Vec<String> = self.global_simple.keys().cloned().collect();
        names.sort();
        for name in names {
            self.simple_named(&name)?;
        }
        let mut names: Vec<String> = self.global_complex.keys().cloned().collect();
        names.sort();
        for name in names {
            self.complex_named(&name)?;
        }
        let mut names: Vec<String> = self.global_attributes.keys().cloned().collect();
        names.sort();
        for name in names {
            self.global_attribute(&name)?;
        }
        let mut names: Vec<String> = self.global_elements.keys().cloned().collect();
        names.sort();
        for name in names {
            self.global_element(&name)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Type references
    // ------------------------------------------------------------------------

    fn type_ref(&mut self, node: &'d SchemaNode, value: &str) -> CompileResult<TypeRef> {
        let (namespace, local) = node.resolve(value)?;
        if namespace.as_deref() == Some(ns::XSD) {
            if local == "anyType" {
                return Ok(TypeRef::Complex(ANY_TYPE));
            }
            return Builtin::from_local(&local)
                .map(|b| TypeRef::Simple(builtin_id(b)))
                .ok_or_else(|| format!("unsupported built-in type xs:{}", local));
        }
        if namespace != self.target {
            return Err(format!("type '{}' is not defined in this schema", value));
        }
        if self.global_complex.contains_key(&local) {
            return self.complex_named(&local).map(TypeRef::Complex);
        }
        if self.global_simple.contains_key(&local) {
            return self.simple_named(&local).map(TypeRef::Simple);
        }
        Err(format!("unknown type '{}'", value))
    }

    fn simple_ref(&mut self, node: &'d SchemaNode, value: &str) -> CompileResult<SimpleTypeId> {
        match self.type_ref(node, value)? {
            TypeRef::Simple(id) => Ok(id),
            TypeRef::Complex(_) => Err(format!("'{}' is not a simple type", value)),
        }
    }

    // ------------------------------------------------------------------------
    // Simple types
    // ------------------------------------------------------------------------

    fn simple_named(&mut self, name: &str) -> CompileResult<SimpleTypeId> {
        if let Some(&id) = self.simple_ids.get(name) {
            return Ok(id);
        }
        if !self.simple_in_progress.insert(name.to_string()) {
            return Err(format!("simple type '{}' is derived from itself", name));
        }
        let node = self
            .global_simple
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown simple type '{}'", name))?;
        let id = self.simple_body(node, Some(name.to_string()))?;
        self.simple_in_progress.remove(name);
        self.simple_ids.insert(name.to_string(), id);
        Ok(id)
    }

    fn push_simple(&mut self, simple: SimpleType) -> SimpleTypeId {
        self.simple_types.push(simple);
        self.simple_types.len() - 1
    }

    fn simple_body(&mut self, node: &'d SchemaNode, name: Option<String>) -> CompileResult<SimpleTypeId> {
        let derivation = node
            .children()
            .find(|c| matches!(c.local(), "restriction" | "list" | "union"))
            .ok_or("xs:simpleType requires xs:restriction, xs:list or xs:union")?;

        match derivation.local() {
            "restriction" => {
                let base = match (derivation.attr("base"), derivation.child("simpleType")) {
                    (Some(base), _) => self.simple_ref(derivation, base)?,
                    (None, Some(inline)) => self.simple_body(inline, None)?,
                    (None, None) => return Err("xs:restriction requires a base type".to_string()),
                };
                self.restricted(derivation, base, name)
            }
            "list" => {
                let item = match (derivation.attr("itemType"), derivation.child("simpleType")) {
                    (Some(item), _) => self.simple_ref(derivation, item)?,
                    (None, Some(inline)) => self.simple_body(inline, None)?,
                    (None, None) => return Err("xs:list requires an item type".to_string()),
                };
                Ok(self.push_simple(SimpleType {
                    name,
                    variety: Variety::List(item),
                    base: None,
                    facets: Facets::default(),
                }))
            }
            _ => {
                let mut members = Vec::new();
                if let Some(list) = derivation.attr("memberTypes") {
                    for member in list.split_ascii_whitespace() {
                        members.push(self.simple_ref(derivation, member)?);
                    }
                }
                for inline in derivation.children().filter(|c| c.local() == "simpleType") {
                    members.push(self.simple_body(inline, None)?);
                }
                if members.is_empty() {
                    return Err("xs:union requires member types".to_string());
                }
                Ok(self.push_simple(SimpleType {
                    name,
                    variety: Variety::Union(members),
                    base: None,
                    facets: Facets::default(),
                }))
            }
        }
    }

    /// New simple type restricting `base` with the facets under `node`
    fn restricted(&mut self, node: &'d SchemaNode, base: SimpleTypeId, name: Option<String>) -> CompileResult<SimpleTypeId> {
        let facets = facets(node)?;
        let variety = self.simple_types[base].variety.clone();
        Ok(self.push_simple(SimpleType {
            name,
            variety,
            base: Some(base),
            facets,
        }))
    }

    // ------------------------------------------------------------------------
    // Complex types
    // ------------------------------------------------------------------------

    fn complex_named(&mut self, name: &str) -> CompileResult<ComplexTypeId> {
        if let Some(&id) = self.complex_ids.get(name) {
            return Ok(id);
        }
        let node = self
            .global_complex
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown complex type '{}'", name))?;
        let id = self.alloc_complex(Some(name.to_string()));
        self.complex_ids.insert(name.to_string(), id);
        self.fill_complex(id, node)?;
        Ok(id)
    }

    fn alloc_complex(&mut self, name: Option<String>) -> ComplexTypeId {
        self.complex_types.push(ComplexType::placeholder(name));
        self.complex_ready.push(false);
        self.complex_types.len() - 1
    }

    fn anonymous_complex(&mut self, node: &'d SchemaNode) -> CompileResult<ComplexTypeId> {
        let id = self.alloc_complex(None);
        self.fill_complex(id, node)?;
        Ok(id)
    }

    /// Base type of a derivation, which must be fully compiled
    fn ready_base(&mut self, node: &'d SchemaNode) -> CompileResult<TypeRef> {
        let base = node.required("base")?;
        let base_ref = self.type_ref(node, base)?;
        if let TypeRef::Complex(id) = base_ref {
            if !self.complex_ready[id] {
                return Err(format!("type '{}' is derived from itself", base));
            }
        }
        Ok(base_ref)
    }

    fn fill_complex(&mut self, id: ComplexTypeId, node: &'d SchemaNode) -> CompileResult<()> {
        let name = self.complex_types[id].name.clone();
        let mixed = is_true(node.attr("mixed"));

        let complex = if let Some(simple) = node.child("simpleContent") {
            self.simple_content(simple, name)?
        } else if let Some(complex) = node.child("complexContent") {
            self.complex_content(complex, name, mixed)?
        } else {
            let parts = self.parts(node)?;
            ComplexType {
                name,
                mixed,
                content: content_from(parts.particle, mixed)?,
                attributes: parts.attributes,
                any_attribute: parts.any_attribute,
            }
        };
        self.complex_types[id] = complex;
        self.complex_ready[id] = true;
        Ok(())
    }

    fn simple_content(&mut self, node: &'d SchemaNode, name: Option<String>) -> CompileResult<ComplexType> {
        let derivation = derivation_of(node)?;
        let (base_simple, base_attributes, base_any) = match self.ready_base(derivation)? {
            TypeRef::Simple(id) => (id, Vec::new(), None),
            TypeRef::Complex(id) => {
                let base = &self.complex_types[id];
                match base.content {
                    Content::Simple(simple) => (simple, base.attributes.clone(), base.any_attribute.clone()),
                    _ => return Err("the base of xs:simpleContent must have simple content".to_string()),
                }
            }
        };

        let simple = if derivation.local() == "restriction" {
            let base = match derivation.child("simpleType") {
                Some(inline) => self.simple_body(inline, None)?,
                None => base_simple,
            };
            self.restricted(derivation, base, None)?
        } else {
            base_simple
        };

        let parts = self.parts(derivation)?;
        if parts.particle.is_some() {
            return Err("xs:simpleContent cannot declare child elements".to_string());
        }
        Ok(ComplexType {
            name,
            mixed: false,
            content: Content::Simple(simple),
            attributes: merge_attributes(base_attributes, parts.attributes, &parts.prohibited),
            any_attribute: parts.any_attribute.or(base_any),
        })
    }

    fn complex_content(&mut self, node: &'d SchemaNode, name: Option<String>, mixed: bool) -> CompileResult<ComplexType> {
        let mixed = node.attr("mixed").map_or(mixed, |m| is_true(Some(m)));
        let derivation = derivation_of(node)?;
        let base_id = match self.ready_base(derivation)? {
            TypeRef::Complex(id) => id,
            TypeRef::Simple(_) => return Err("the base of xs:complexContent must be a complex type".to_string()),
        };
        let parts = self.parts(derivation)?;
        let base = &self.complex_types[base_id];

        if derivation.local() == "extension" {
            let base_particle = match &base.content {
                Content::Elements { particle, .. } => Some(particle.clone()),
                Content::Empty | Content::Any => None,
                Content::Simple(_) => {
                    return Err("cannot extend a type with simple content using xs:complexContent".to_string())
                }
            };
            let particle = match (base_particle, parts.particle) {
                (Some(b), Some(own)) => Some(Particle::once(ParticleKind::Sequence(vec![b, own]))),
                (b, own) => b.or(own),
            };
            let mixed = mixed || base.mixed;
            Ok(ComplexType {
                name,
                mixed,
                attributes: merge_attributes(base.attributes.clone(), parts.attributes, &parts.prohibited),
                any_attribute: parts.any_attribute.or_else(|| base.any_attribute.clone()),
                content: content_from(particle, mixed)?,
            })
        } else {
            Ok(ComplexType {
                name,
                mixed,
                attributes: merge_attributes(base.attributes.clone(), parts.attributes, &parts.prohibited),
                any_attribute: parts.any_attribute,
                content: content_from(parts.particle, mixed)?,
            })
        }
    }

    /// Model group and attribute children of a type or derivation
    fn parts(&mut self, node: &'d SchemaNode) -> CompileResult<Parts> {
        let mut parts = Parts::default();
        for child in node.children() {
            match child.local() {
                "sequence" | "choice" | "all" => {
                    if parts.particle.is_some() {
                        return Err(format!("xs:{} has more than one model group", node.local()));
                    }
                    parts.particle = Some(self.model_group(child)?);
                }
                "attribute" => {
                    let (attribute, prohibited) = self.attribute_use(child)?;
                    if prohibited {
                        parts.prohibited.push((attribute.namespace, attribute.local));
                    } else {
                        parts.attributes.push(attribute);
                    }
                }
                "anyAttribute" => parts.any_attribute = Some(self.wildcard(child)),
                unsupported @ ("group" | "attributeGroup") => {
                    return Err(format!("xs:{} is not supported", unsupported))
                }
                // Facets and inline base types of a simpleContent restriction
                _ if node.local() == "restriction" => {}
                other => return Err(format!("unexpected xs:{} in xs:{}", other, node.local())),
            }
        }
        Ok(parts)
    }

    // ------------------------------------------------------------------------
    // Particles
    // ------------------------------------------------------------------------

    fn model_group(&mut self, node: &'d SchemaNode) -> CompileResult<Particle<XsdTerm>> {
        let (min, max) = occurs(node)?;
        let mut items = Vec::new();
        for child in node.children() {
            let item = match child.local() {
                "element" => self.element_particle(child)?,
                "sequence" | "choice" | "all" => self.model_group(child)?,
                "any" => {
                    let (min, max) = occurs(child)?;
                    Particle::term(XsdTerm::Wildcard(self.wildcard(child))).with_occurs(min, max)
                }
                "group" => return Err("xs:group is not supported".to_string()),
                other => return Err(format!("unexpected xs:{} in xs:{}", other, node.local())),
            };
            items.push(item);
        }
        let kind = match node.local() {
            "choice" => ParticleKind::Choice(items),
            "all" => ParticleKind::All(items),
            _ => ParticleKind::Sequence(items),
        };
        Ok(Particle::once(kind).with_occurs(min, max))
    }

    fn element_particle(&mut self, node: &'d SchemaNode) -> CompileResult<Particle<XsdTerm>> {
        let (min, max) = occurs(node)?;
        let decl = self.local_element(node)?;
        let element = &self.elements[decl];
        let term = XsdTerm::Element {
            namespace: element.namespace.clone(),
            local: element.local.clone(),
            decl,
        };
        Ok(Particle::term(term).with_occurs(min, max))
    }

    fn wildcard(&self, node: &SchemaNode) -> Wildcard {
        let spec = node.attr("namespace").unwrap_or("##any").trim();
        let constraint = match spec {
            "##any" => NamespaceConstraint::Any,
            "##other" => NamespaceConstraint::Other(self.target.clone()),
            list => NamespaceConstraint::List(
                list.split_ascii_whitespace()
                    .map(|token| match token {
                        "##local" => None,
                        "##targetNamespace" => self.target.clone(),
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        Wildcard { constraint }
    }

    // ------------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------------

    fn global_element(&mut self, name: &str) -> CompileResult<ElementId> {
        if let Some(&id) = self.element_ids.get(name) {
            return Ok(id);
        }
        let node = self
            .global_elements
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown global element '{}'", name))?;
        let target = self.target.clone();
        self.element_decl(node, target, name.to_string(), true)
    }

    fn local_element(&mut self, node: &'d SchemaNode) -> CompileResult<ElementId> {
        if let Some(reference) = node.attr("ref") {
            let (namespace, local) = node.resolve(reference)?;
            if namespace != self.target {
                return Err(format!("element reference '{}' is not in the target namespace", reference));
            }
            return self.global_element(&local);
        }
        let name = node.required("name")?.to_string();
        let qualified = match node.attr("form") {
            Some(form) => form == "qualified",
            None => self.element_qualified,
        };
        let namespace = if qualified { self.target.clone() } else { None };
        self.element_decl(node, namespace, name, false)
    }

    fn element_decl(
        &mut self,
        node: &'d SchemaNode,
        namespace: Option<String>,
        local: String,
        global: bool,
    ) -> CompileResult<ElementId> {
        self.elements.push(ElementDecl {
            namespace,
            local: local.clone(),
            type_ref: TypeRef::Complex(ANY_TYPE),
            fixed: node.attr("fixed").map(str::to_string),
        });
        let id = self.elements.len() - 1;
        if global {
            self.element_ids.insert(local, id);
        }

        let type_ref = match (node.attr("type"), node.child("complexType"), node.child("simpleType")) {
            (Some(name), _, _) => self.type_ref(node, name)?,
            (None, Some(inline), _) => TypeRef::Complex(self.anonymous_complex(inline)?),
            (None, None, Some(inline)) => TypeRef::Simple(self.simple_body(inline, None)?),
            (None, None, None) => TypeRef::Complex(ANY_TYPE),
        };
        self.elements[id].type_ref = type_ref;
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    fn global_attribute(&mut self, name: &str) -> CompileResult<AttributeUse> {
        if let Some(decl) = self.attribute_decls.get(name) {
            return Ok(decl.clone());
        }
        let node = self
            .global_attributes
            .get(name)
            .copied()
            .ok_or_else(|| format!("unknown global attribute '{}'", name))?;
        let target = self.target.clone();
        let decl = self.attribute_decl(node, target, name.to_string())?;
        self.attribute_decls.insert(name.to_string(), decl.clone());
        Ok(decl)
    }

    fn attribute_decl(&mut self, node: &'d SchemaNode, namespace: Option<String>, local: String) -> CompileResult<AttributeUse> {
        let simple = match (node.attr("type"), node.child("simpleType")) {
            (Some(name), _) => self.simple_ref(node, name)?,
            (None, Some(inline)) => self.simple_body(inline, None)?,
            (None, None) => builtin_id(Builtin::AnySimpleType),
        };
        Ok(AttributeUse {
            namespace,
            local,
            simple,
            required: false,
            fixed: node.attr("fixed").map(str::to_string),
            default: node.attr("default").map(str::to_string),
        })
    }

    /// Local attribute use; the flag is set for `use="prohibited"`
    fn attribute_use(&mut self, node: &'d SchemaNode) -> CompileResult<(AttributeUse, bool)> {
        let mut attribute = if let Some(reference) = node.attr("ref") {
            let (namespace, local) = node.resolve(reference)?;
            if namespace.as_deref() == Some(ns::XML) {
                AttributeUse {
                    namespace,
                    local,
                    simple: builtin_id(Builtin::AnySimpleType),
                    required: false,
                    fixed: None,
                    default: None,
                }
            } else if namespace == self.target {
                self.global_attribute(&local)?
            } else {
                return Err(format!("attribute reference '{}' cannot be resolved", reference));
            }
        } else {
            let name = node.required("name")?.to_string();
            let qualified = match node.attr("form") {
                Some(form) => form == "qualified",
                None => self.attribute_qualified,
            };
            let namespace = if qualified { self.target.clone() } else { None };
            self.attribute_decl(node, namespace, name)?
        };

        if let Some(fixed) = node.attr("fixed") {
            attribute.fixed = Some(fixed.to_string());
        }
        if let Some(default) = node.attr("default") {
            attribute.default = Some(default.to_string());
        }
        let prohibited = match node.attr("use").unwrap_or("optional") {
            "required" => {
                attribute.required = true;
                false
            }
            "optional" => false,
            "prohibited" => true,
            other => return Err(format!("invalid attribute use '{}'", other)),
        };
        Ok((attribute, prohibited))
    }
}

fn derivation_of(node: &SchemaNode) -> CompileResult<&SchemaNode> {
    node.children()
        .find(|c| matches!(c.local(), "extension" | "restriction"))
        .ok_or_else(|| format!("xs:{} requires xs:extension or xs:restriction", node.local()))
}

fn content_from(particle: Option<Particle<XsdTerm>>, mixed: bool) -> CompileResult<Content> {
    let particle = match particle {
        Some(p) => p,
        None if mixed => Particle::empty(),
        None => return Ok(Content::Empty),
    };
    let model = ContentModel::compile(&particle)?;
    Ok(Content::Elements { particle, model })
}

fn merge_attributes(
    base: Vec<AttributeUse>,
    own: Vec<AttributeUse>,
    prohibited: &[(Option<String>, String)],
) -> Vec<AttributeUse> {
    let mut merged: Vec<AttributeUse> = base
        .into_iter()
        .filter(|a| !prohibited.iter().any(|(ns, local)| *ns == a.namespace && *local == a.local))
        .collect();
    for attribute in own {
        match merged
            .iter_mut()
            .find(|a| a.namespace == attribute.namespace && a.local == attribute.local)
        {
            Some(existing) => *existing = attribute,
            None => merged.push(attribute),
        }
    }
    merged
}

fn occurs(node: &SchemaNode) -> CompileResult<(u32, Option<u32>)> {
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid occurrence bound '{}'", value))
    };
    let min = node.attr("minOccurs").map_or(Ok(1), parse)?;
    let max = match node.attr("maxOccurs") {
        Some("unbounded") => None,
        Some(value) => Some(parse(value)?),
        None => Some(1),
    };
    if let Some(max) = max {
        if max < min {
            return Err(format!("maxOccurs ({}) is less than minOccurs ({})", max, min));
        }
    }
    Ok((min, max))
}

fn facets(node: &SchemaNode) -> CompileResult<Facets> {
    let mut facets = Facets::default();
    for child in node.children() {
        let name = child.local();
        if matches!(name, "simpleType" | "attribute" | "anyAttribute" | "attributeGroup") {
            continue;
        }
        let value = child.required("value")?;
        let length = || {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid xs:{} value '{}'", name, value))
        };
        match name {
            "enumeration" => facets.enumeration.push(value.to_string()),
            "length" => facets.length = Some(length()?),
            "minLength" => facets.min_length = Some(length()?),
            "maxLength" => facets.max_length = Some(length()?),
            "minInclusive" => facets.min_inclusive = Some(value.trim().to_string()),
            "maxInclusive" => facets.max_inclusive = Some(value.trim().to_string()),
            "minExclusive" => facets.min_exclusive = Some(value.trim().to_string()),
            "maxExclusive" => facets.max_exclusive = Some(value.trim().to_string()),
            "whiteSpace" => {
                facets.whitespace =
                    Some(WhiteSpace::parse(value.trim()).ok_or_else(|| format!("invalid whiteSpace '{}'", value))?)
            }
            "pattern" | "totalDigits" | "fractionDigits" | "assertion" | "explicitTimezone" => {}
            other => return Err(format!("unsupported facet xs:{}", other)),
        }
    }
    Ok(facets)
}
