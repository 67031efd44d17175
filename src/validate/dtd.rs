//! DTD Declaration Store and Validation
//!
//! Parses the DOCTYPE (internal subset plus an optional external `SYSTEM`
//! subset), checks the declarations themselves, then validates the element
//! stream against them one event at a time.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use tracing::debug;

use super::content_model::{ContentModel, MatchState, Particle, ParticleKind};
use super::DocumentValidator;
use crate::core::qname::{is_name, is_name_char};
use crate::reader::events::StartTag;

/// Upper bound on entity replacement text built while reading a DTD
pub const MAX_EXPANDED_ENTITY_BYTES: usize = 1 << 20;

/// Parsed DOCTYPE declaration
#[derive(Debug, Default)]
pub struct Doctype {
    /// Declared document element name
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Declarations from the internal subset
    pub declarations: DtdDeclarations,
}

impl Doctype {
    /// Parse the body of a `<!DOCTYPE ...>` declaration
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut cur = Cursor::new(raw);
        cur.skip_ws();
        let name = cur.name().ok_or("DOCTYPE declaration requires a name")?;
        cur.skip_ws();
        let (public_id, system_id) = cur.external_id(true)?;
        cur.skip_ws();

        let mut declarations = DtdDeclarations::new();
        if cur.eat("[") {
            let close = raw.rfind(']').filter(|&end| end >= cur.pos).ok_or("unterminated internal subset")?;
            declarations.parse_subset(&raw[cur.pos..close])?;
            cur.pos = close + 1;
            cur.skip_ws();
        }
        if !cur.at_end() {
            return Err(format!("unexpected content in DOCTYPE: '{}'", cur.rest().trim()));
        }
        Ok(Doctype {
            name,
            public_id,
            system_id,
            declarations,
        })
    }
}

/// Collected DTD declarations
#[derive(Debug, Default)]
pub struct DtdDeclarations {
    /// Element declarations: name -> content spec
    pub elements: HashMap<String, ElementDecl>,
    /// Attribute lists: element name -> attributes
    pub attlists: HashMap<String, Vec<AttDef>>,
    /// General entities: name -> definition
    pub entities: HashMap<String, EntityDecl>,
    /// Parameter entities: name -> definition
    pub pe_entities: HashMap<String, EntityDecl>,
    /// Notations: name -> definition
    pub notations: HashMap<String, NotationDecl>,
}

#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub content_spec: ContentSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA|a|b)*`: allowed element names
    Mixed(Vec<String>),
    /// Element-only content model
    Children(Particle<String>),
}

#[derive(Debug, Clone)]
pub struct AttDef {
    pub name: String,
    pub att_type: AttType,
    pub default: AttDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

#[derive(Debug, Clone, Default)]
pub struct EntityDecl {
    pub is_external: bool,
    /// For internal entities
    pub value: Option<String>,
    /// For external entities
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    /// For unparsed entities
    pub ndata: Option<String>,
    /// Entities referenced in value
    pub references: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NotationDecl {
    pub system_id: Option<String>,
    pub public_id: Option<String>,
}

impl DtdDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element declaration
    pub fn add_element(&mut self, name: String, content_spec: ContentSpec) -> Result<(), String> {
        if self.elements.contains_key(&name) {
            return Err(format!("element type '{}' declared more than once", name));
        }
        self.elements.insert(name, ElementDecl { content_spec });
        Ok(())
    }

    /// Add attribute definitions; the first definition of an attribute wins
    pub fn add_attributes(&mut self, element: String, defs: Vec<AttDef>) {
        let list = self.attlists.entry(element).or_default();
        for def in defs {
            if !list.iter().any(|d| d.name == def.name) {
                list.push(def);
            }
        }
    }

    /// Add an entity declaration
    pub fn add_entity(&mut self, name: String, decl: EntityDecl, is_pe: bool) {
        let map = if is_pe { &mut self.pe_entities } else { &mut self.entities };
        // First declaration wins
        map.entry(name).or_insert(decl);
    }

    /// Add a notation declaration
    pub fn add_notation(&mut self, name: String, decl: NotationDecl) -> Result<(), String> {
        if self.notations.contains_key(&name) {
            return Err(format!("notation '{}' declared more than once", name));
        }
        self.notations.insert(name, decl);
        Ok(())
    }

    /// Merge declarations from a later subset (the external one)
    pub fn merge(&mut self, other: DtdDeclarations) -> Result<(), String> {
        for (name, decl) in other.elements {
            self.add_element(name, decl.content_spec)?;
        }
        for (element, defs) in other.attlists {
            self.add_attributes(element, defs);
        }
        for (name, decl) in other.entities {
            self.add_entity(name, decl, false);
        }
        for (name, decl) in other.pe_entities {
            self.add_entity(name, decl, true);
        }
        for (name, decl) in other.notations {
            self.add_notation(name, decl)?;
        }
        Ok(())
    }

    /// Validate the declarations themselves
    pub fn validate(&self) -> Result<(), String> {
        // Check for entity recursion
        self.check_entity_recursion()?;

        // Check NOTATION attribute types reference declared notations
        self.check_notation_references()?;

        // Check ENTITY attribute defaults name unparsed entities
        self.check_entity_attributes()?;

        Ok(())
    }

    /// Check for circular entity references
    fn check_entity_recursion(&self) -> Result<(), String> {
        for name in self.entities.keys() {
            let mut visited = HashSet::new();
            let mut stack: Vec<&str> = self.entities[name].references.iter().map(String::as_str).collect();

            while let Some(current) = stack.pop() {
                if current == name.as_str() {
                    return Err(format!(
                        "entity '{}' references itself (directly or indirectly)",
                        name
                    ));
                }
                if !visited.insert(current) {
                    continue;
                }
                if let Some(decl) = self.entities.get(current) {
                    stack.extend(decl.references.iter().map(String::as_str));
                }
            }
        }
        Ok(())
    }

    /// Check NOTATION attributes reference declared notations
    fn check_notation_references(&self) -> Result<(), String> {
        for attrs in self.attlists.values() {
            for attr in attrs {
                if let AttType::Notation(names) = &attr.att_type {
                    for name in names {
                        if !self.notations.contains_key(name) {
                            return Err(format!("notation '{}' used in attribute but not declared", name));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Check ENTITY attribute defaults reference unparsed entities
    fn check_entity_attributes(&self) -> Result<(), String> {
        for attrs in self.attlists.values() {
            for attr in attrs {
                let value = match (&attr.att_type, &attr.default) {
                    (AttType::Entity | AttType::Entities, AttDefault::Default(v) | AttDefault::Fixed(v)) => v,
                    _ => continue,
                };
                for name in value.split_ascii_whitespace() {
                    let unparsed = self.entities.get(name).map_or(false, |e| e.ndata.is_some());
                    if !unparsed {
                        return Err(format!(
                            "default of ENTITY attribute '{}' does not name an unparsed entity",
                            attr.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Internal general entities with their replacement text fully expanded
    ///
    /// Entities that cannot be expanded (undefined or recursive references)
    /// are left out, so using them fails as an undefined entity. Fails when
    /// the expanded texts together would exceed [`MAX_EXPANDED_ENTITY_BYTES`].
    pub fn expanded_entities(&self) -> Result<HashMap<String, String>, String> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut pending: Vec<(&String, &String)> = self
            .entities
            .iter()
            .filter_map(|(name, decl)| decl.value.as_ref().map(|v| (name, v)))
            .collect();
        let mut total = 0usize;

        while !pending.is_empty() {
            let mut progress = Vec::new();
            let mut oversized = None;
            pending.retain(|(name, value)| {
                let ready = self.entities[*name]
                    .references
                    .iter()
                    .all(|r| resolved.contains_key(r) || is_predefined(r));
                if !ready || oversized.is_some() {
                    return true;
                }
                // Upper bound of the replacement text, checked before building it
                let estimate = value.len()
                    + extract_entity_references(value)
                        .iter()
                        .filter_map(|r| resolved.get(r))
                        .map(String::len)
                        .sum::<usize>();
                if total + estimate > MAX_EXPANDED_ENTITY_BYTES {
                    oversized = Some((*name).clone());
                    return true;
                }
                let text = unescape_with(value, |n| {
                    resolved.get(n).map(String::as_str).or_else(|| resolve_predefined_entity(n))
                });
                if let Ok(text) = text {
                    total += text.len();
                    progress.push(((*name).clone(), text.into_owned()));
                }
                false
            });
            if let Some(name) = oversized {
                return Err(format!(
                    "entity '{}' expands beyond the limit of {} bytes of entity text",
                    name, MAX_EXPANDED_ENTITY_BYTES
                ));
            }
            if progress.is_empty() {
                break;
            }
            resolved.extend(progress);
        }
        Ok(resolved)
    }

    /// Parse an internal or external subset
    pub fn parse_subset(&mut self, text: &str) -> Result<(), String> {
        self.parse_subset_in(text, &mut PeExpansion::default())
    }

    fn parse_subset_in(&mut self, text: &str, pe: &mut PeExpansion) -> Result<(), String> {
        let mut cur = Cursor::new(text);
        loop {
            cur.skip_ws();
            if cur.at_end() {
                return Ok(());
            }
            if cur.eat("<!--") {
                cur.skip_past("-->").ok_or("unterminated comment in DTD")?;
            } else if cur.eat("<?") {
                cur.skip_past("?>").ok_or("unterminated processing instruction in DTD")?;
            } else if cur.eat("%") {
                let name = cur.name().ok_or("invalid parameter entity reference")?;
                if !cur.eat(";") {
                    return Err(format!("parameter entity reference '%{}' missing ';'", name));
                }
                if pe.open.contains(&name) {
                    return Err(format!("parameter entity '%{};' references itself", name));
                }
                let replacement = self.pe_value(&name, pe)?;
                pe.open.push(name);
                self.parse_subset_in(&replacement, pe)?;
                pe.open.pop();
            } else if cur.eat("<!ELEMENT") {
                let body = self.expand_pe(cur.declaration()?, pe)?;
                self.parse_element(&body)?;
            } else if cur.eat("<!ATTLIST") {
                let body = self.expand_pe(cur.declaration()?, pe)?;
                self.parse_attlist(&body)?;
            } else if cur.eat("<!ENTITY") {
                let body = cur.declaration()?;
                self.parse_entity(body)?;
            } else if cur.eat("<!NOTATION") {
                let body = self.expand_pe(cur.declaration()?, pe)?;
                self.parse_notation(&body)?;
            } else if cur.eat("<![") {
                return Err("conditional sections are not supported".to_string());
            } else {
                return Err(format!("unexpected content in DTD: '{}'", cur.snippet()));
            }
        }
    }

    /// Replacement text of a parameter entity, charged to the expansion budget
    fn pe_value(&self, name: &str, pe: &mut PeExpansion) -> Result<String, String> {
        let value = match self.pe_entities.get(name) {
            Some(EntityDecl { value: Some(value), .. }) => value.clone(),
            Some(_) => String::new(),
            None => return Err(format!("undeclared parameter entity '%{};'", name)),
        };
        pe.expanded += value.len();
        if pe.expanded > MAX_EXPANDED_ENTITY_BYTES {
            return Err(format!(
                "parameter entities expand beyond the limit of {} bytes",
                MAX_EXPANDED_ENTITY_BYTES
            ));
        }
        Ok(value)
    }

    /// Replace `%name;` references inside a declaration
    ///
    /// A `%` not followed by `name;` is kept as-is.
    fn expand_pe(&self, body: &str, pe: &mut PeExpansion) -> Result<String, String> {
        let mut out = String::with_capacity(body.len());
        let mut rest = body;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let len = after.bytes().take_while(|&b| is_name_char(b)).count();
            if len > 0 && after[len..].starts_with(';') && is_name(&after[..len]) {
                let value = self.pe_value(&after[..len], pe)?;
                out.push(' ');
                out.push_str(&value);
                out.push(' ');
                rest = &after[len + 1..];
            } else {
                out.push('%');
                rest = after;
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn parse_element(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        cur.skip_ws();
        let name = cur.name().ok_or("ELEMENT declaration requires a name")?;
        let spec = parse_content_spec(cur.rest())?;
        self.add_element(name, spec)
    }

    fn parse_attlist(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        cur.skip_ws();
        let element = cur.name().ok_or("ATTLIST declaration requires an element name")?;
        let mut defs = Vec::new();
        loop {
            cur.skip_ws();
            if cur.at_end() {
                break;
            }
            let name = cur.name().ok_or_else(|| format!("invalid attribute definition in ATTLIST '{}'", element))?;
            cur.skip_ws();
            let att_type = if cur.peek() == Some(b'(') {
                AttType::Enumeration(cur.name_group()?)
            } else {
                let keyword = cur.name().ok_or_else(|| format!("missing type for attribute '{}'", name))?;
                match keyword.as_str() {
                    "CDATA" => AttType::CData,
                    "ID" => AttType::Id,
                    "IDREF" => AttType::IdRef,
                    "IDREFS" => AttType::IdRefs,
                    "ENTITY" => AttType::Entity,
                    "ENTITIES" => AttType::Entities,
                    "NMTOKEN" => AttType::NmToken,
                    "NMTOKENS" => AttType::NmTokens,
                    "NOTATION" => {
                        cur.skip_ws();
                        AttType::Notation(cur.name_group()?)
                    }
                    other => return Err(format!("unknown attribute type '{}'", other)),
                }
            };
            cur.skip_ws();
            let default = if cur.eat("#REQUIRED") {
                AttDefault::Required
            } else if cur.eat("#IMPLIED") {
                AttDefault::Implied
            } else if cur.eat("#FIXED") {
                cur.skip_ws();
                AttDefault::Fixed(cur.quoted()?)
            } else {
                AttDefault::Default(cur.quoted()?)
            };
            defs.push(AttDef { name, att_type, default });
        }
        self.add_attributes(element, defs);
        Ok(())
    }

    fn parse_entity(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        cur.skip_ws();
        let is_pe = cur.eat("%");
        cur.skip_ws();
        let name = cur.name().ok_or("ENTITY declaration requires a name")?;
        cur.skip_ws();

        let decl = if matches!(cur.peek(), Some(b'"' | b'\'')) {
            let value = cur.quoted()?;
            EntityDecl {
                references: extract_entity_references(&value),
                value: Some(value),
                ..EntityDecl::default()
            }
        } else {
            let (public_id, system_id) = cur.external_id(false)?;
            if system_id.is_none() {
                return Err(format!("entity '{}' has neither a value nor an external id", name));
            }
            cur.skip_ws();
            let ndata = if cur.eat("NDATA") {
                cur.skip_ws();
                Some(cur.name().ok_or("NDATA requires a notation name")?)
            } else {
                None
            };
            EntityDecl {
                is_external: true,
                system_id,
                public_id,
                ndata,
                ..EntityDecl::default()
            }
        };
        cur.skip_ws();
        if !cur.at_end() {
            return Err(format!("unexpected content in ENTITY '{}': '{}'", name, cur.snippet()));
        }
        self.add_entity(name, decl, is_pe);
        Ok(())
    }

    fn parse_notation(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        cur.skip_ws();
        let name = cur.name().ok_or("NOTATION declaration requires a name")?;
        cur.skip_ws();
        let (public_id, system_id) = cur.external_id(true)?;
        self.add_notation(name, NotationDecl { system_id, public_id })
    }
}

/// Parameter entities being expanded while a subset is parsed
#[derive(Debug, Default)]
struct PeExpansion {
    /// Names whose replacement text is currently being parsed
    open: Vec<String>,
    /// Replacement bytes produced so far
    expanded: usize,
}

fn is_predefined(name: &str) -> bool {
    matches!(name, "lt" | "gt" | "amp" | "apos" | "quot")
}

/// Parse entity value and extract entity references
pub fn extract_entity_references(value: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        rest = &rest[start + 1..];
        if rest.starts_with('#') {
            continue;
        }
        if let Some(end) = rest.find(';') {
            refs.push(rest[..end].to_string());
            rest = &rest[end + 1..];
        }
    }
    refs
}

/// Parse content spec from DTD ELEMENT declaration
pub fn parse_content_spec(content: &str) -> Result<ContentSpec, String> {
    let content = content.trim();
    match content {
        "EMPTY" => return Ok(ContentSpec::Empty),
        "ANY" => return Ok(ContentSpec::Any),
        _ => {}
    }
    if !content.starts_with('(') {
        return Err(format!("invalid content specification '{}'", content));
    }
    if content[1..].trim_start().starts_with("#PCDATA") {
        return parse_mixed(content);
    }
    let mut cur = Cursor::new(content);
    let particle = cur.content_particle()?;
    cur.skip_ws();
    if !cur.at_end() {
        return Err(format!("unexpected '{}' after content model", cur.snippet()));
    }
    Ok(ContentSpec::Children(particle))
}

/// Mixed content: `(#PCDATA)` or `(#PCDATA|a|b)*`
fn parse_mixed(content: &str) -> Result<ContentSpec, String> {
    let close = content.rfind(')').ok_or("unterminated mixed content model")?;
    let suffix = content[close + 1..].trim();
    let inner = &content[1..close];
    let names: Vec<String> = inner
        .split('|')
        .skip(1)
        .map(|n| n.trim().to_string())
        .collect();
    if names.iter().any(|n| !is_name(n)) {
        return Err(format!("invalid name in mixed content model '{}'", content));
    }
    match suffix {
        "*" => Ok(ContentSpec::Mixed(names)),
        "" if names.is_empty() => Ok(ContentSpec::Mixed(names)),
        _ => Err("mixed content with element names must end in ')*'".to_string()),
    }
}

// ============================================================================
// Declaration scanner
// ============================================================================

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { text, pos: 0 }
    }

    #[inline]
    fn bytes(&self) -> &'a [u8] {
        &self.text.as_bytes()[self.pos..]
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes().first().copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn snippet(&self) -> &'a str {
        let rest = self.rest();
        let end = rest.char_indices().nth(24).map_or(rest.len(), |(i, _)| i);
        &rest[..end]
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_past(&mut self, token: &str) -> Option<()> {
        let at = self.rest().find(token)?;
        self.pos += at + token.len();
        Some(())
    }

    fn name(&mut self) -> Option<String> {
        let len = self.bytes().iter().take_while(|&&b| is_name_char(b)).count();
        let name = &self.text[self.pos..self.pos + len];
        if is_name(name) {
            self.pos += len;
            Some(name.to_string())
        } else {
            None
        }
    }

    fn quoted(&mut self) -> Result<String, String> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q as char,
            _ => return Err(format!("expected a quoted literal at '{}'", self.snippet())),
        };
        let body = &self.rest()[1..];
        let end = body.find(quote).ok_or("unterminated literal")?;
        let value = body[..end].to_string();
        self.pos += end + 2;
        Ok(value)
    }

    /// Rest of a markup declaration up to its closing `>`, quotes respected
    fn declaration(&mut self) -> Result<&'a str, String> {
        let start = self.pos;
        let mut quote = None;
        for (i, b) in self.bytes().iter().enumerate() {
            match (quote, *b) {
                (None, b'"' | b'\'') => quote = Some(*b),
                (Some(q), c) if q == c => quote = None,
                (None, b'>') => {
                    self.pos += i + 1;
                    return Ok(&self.text[start..start + i]);
                }
                _ => {}
            }
        }
        Err("unterminated markup declaration".to_string())
    }

    /// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`; absent ids are allowed
    fn external_id(&mut self, system_optional: bool) -> Result<(Option<String>, Option<String>), String> {
        if self.eat("SYSTEM") {
            self.skip_ws();
            Ok((None, Some(self.quoted()?)))
        } else if self.eat("PUBLIC") {
            self.skip_ws();
            let public = self.quoted()?;
            self.skip_ws();
            let system = if matches!(self.peek(), Some(b'"' | b'\'')) {
                Some(self.quoted()?)
            } else if system_optional {
                None
            } else {
                return Err("PUBLIC identifier requires a system literal".to_string());
            };
            Ok((Some(public), system))
        } else {
            Ok((None, None))
        }
    }

    /// `(a|b|c)` as used by enumerated attribute types
    fn name_group(&mut self) -> Result<Vec<String>, String> {
        if !self.eat("(") {
            return Err("expected '('".to_string());
        }
        let mut names = Vec::new();
        loop {
            self.skip_ws();
            let len = self.bytes().iter().take_while(|&&b| is_name_char(b)).count();
            if len == 0 {
                return Err(format!("invalid enumeration at '{}'", self.snippet()));
            }
            names.push(self.text[self.pos..self.pos + len].to_string());
            self.pos += len;
            self.skip_ws();
            if self.eat(")") {
                return Ok(names);
            }
            if !self.eat("|") {
                return Err(format!("expected '|' or ')' at '{}'", self.snippet()));
            }
        }
    }

    fn occurrence(&mut self) -> (u32, Option<u32>) {
        if self.eat("?") {
            (0, Some(1))
        } else if self.eat("*") {
            (0, None)
        } else if self.eat("+") {
            (1, None)
        } else {
            (1, Some(1))
        }
    }

    /// cp ::= (Name | choice | seq) ('?' | '*' | '+')?
    fn content_particle(&mut self) -> Result<Particle<String>, String> {
        self.skip_ws();
        let particle = if self.eat("(") {
            let mut items = vec![self.content_particle()?];
            let mut separator = None;
            loop {
                self.skip_ws();
                if self.eat(")") {
                    break;
                }
                let sep = match self.peek() {
                    Some(c @ (b',' | b'|')) => c,
                    _ => return Err(format!("expected ',', '|' or ')' at '{}'", self.snippet())),
                };
                if separator.map_or(false, |s| s != sep) {
                    return Err("mixed ',' and '|' in one content group".to_string());
                }
                separator = Some(sep);
                self.pos += 1;
                items.push(self.content_particle()?);
            }
            let kind = match separator {
                Some(b'|') => ParticleKind::Choice(items),
                _ => ParticleKind::Sequence(items),
            };
            Particle::once(kind)
        } else {
            let name = self
                .name()
                .ok_or_else(|| format!("expected an element name at '{}'", self.snippet()))?;
            Particle::term(name)
        };
        let (min, max) = self.occurrence();
        Ok(particle.with_occurs(min, max))
    }
}

// ============================================================================
// Streaming validator
// ============================================================================

/// Compiled content rule for one element type
#[derive(Debug)]
enum ElementRule {
    Empty,
    Any,
    Mixed(HashSet<String>),
    Children(ContentModel<String>),
}

#[derive(Debug)]
struct OpenElement {
    name: String,
    state: Option<MatchState>,
}

/// Validates an event stream against the document's DTD
#[derive(Debug, Default)]
pub struct DtdValidator {
    /// Directory external subsets are resolved against
    base_dir: Option<PathBuf>,
    root_name: Option<String>,
    declarations: DtdDeclarations,
    rules: HashMap<String, ElementRule>,
    stack: Vec<OpenElement>,
    ids: HashSet<String>,
    idrefs: Vec<String>,
    /// `xmlns` / `xmlns:p` attributes of the element about to start
    namespace_attributes: Vec<(String, String)>,
}

impl DtdValidator {
    /// Validator resolving external subsets relative to `base_dir`
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        DtdValidator {
            base_dir,
            ..Self::default()
        }
    }

    fn load(&mut self, doctype: Doctype) -> Result<(), String> {
        let mut declarations = doctype.declarations;
        if let (Some(system_id), Some(base)) = (&doctype.system_id, &self.base_dir) {
            let path = base.join(system_id);
            if path.is_file() {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read external DTD {}: {}", path.display(), e))?;
                let mut external = DtdDeclarations::new();
                // Internal parameter entities are visible in the external subset
                external.pe_entities = declarations.pe_entities.clone();
                external.parse_subset(&text)?;
                external.pe_entities.retain(|k, _| !declarations.pe_entities.contains_key(k));
                declarations.merge(external)?;
                debug!(path = %path.display(), "loaded external DTD subset");
            }
        }
        declarations.validate()?;

        for (name, decl) in &declarations.elements {
            let rule = match &decl.content_spec {
                ContentSpec::Empty => ElementRule::Empty,
                ContentSpec::Any => ElementRule::Any,
                ContentSpec::Mixed(names) => ElementRule::Mixed(names.iter().cloned().collect()),
                ContentSpec::Children(particle) => ElementRule::Children(ContentModel::compile(particle)?),
            };
            self.rules.insert(name.clone(), rule);
        }
        self.root_name = Some(doctype.name);
        self.declarations = declarations;
        Ok(())
    }

    fn check_attributes(&mut self, element: &str, tag: &StartTag) -> Result<(), String> {
        let namespace_attributes = std::mem::take(&mut self.namespace_attributes);
        let empty = Vec::new();
        let defs = self.declarations.attlists.get(element).unwrap_or(&empty);

        let attributes = tag
            .attributes
            .iter()
            .map(|(name, raw)| (name.qualified(), raw.as_str()))
            .chain(namespace_attributes.iter().map(|(name, raw)| (name.clone(), raw.as_str())));
        let mut present = Vec::new();
        for (qualified, raw) in attributes {
            let def = defs
                .iter()
                .find(|d| d.name == qualified)
                .ok_or_else(|| format!("no declaration for attribute '{}' of element '{}'", qualified, element))?;
            let value = if def.att_type == AttType::CData {
                raw.to_string()
            } else {
                raw.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
            };
            check_attribute_value(def, &value, &self.declarations)?;
            match def.att_type {
                AttType::Id => {
                    if !self.ids.insert(value.clone()) {
                        return Err(format!("ID '{}' already defined", value));
                    }
                }
                AttType::IdRef | AttType::IdRefs => {
                    self.idrefs.extend(value.split(' ').map(str::to_string));
                }
                _ => {}
            }
            if let AttDefault::Fixed(fixed) = &def.default {
                if *fixed != value {
                    return Err(format!(
                        "attribute '{}' of element '{}' must have the fixed value '{}'",
                        qualified, element, fixed
                    ));
                }
            }
            present.push(qualified);
        }

        for def in defs {
            if def.default == AttDefault::Required && !present.contains(&def.name) {
                return Err(format!(
                    "required attribute '{}' missing on element '{}'",
                    def.name, element
                ));
            }
        }
        Ok(())
    }
}

fn check_attribute_value(def: &AttDef, value: &str, decls: &DtdDeclarations) -> Result<(), String> {
    let ok = match &def.att_type {
        AttType::CData => true,
        AttType::Id | AttType::IdRef | AttType::Entity => is_name(value),
        AttType::IdRefs | AttType::Entities => !value.is_empty() && value.split(' ').all(is_name),
        AttType::NmToken => is_nmtoken(value),
        AttType::NmTokens => !value.is_empty() && value.split(' ').all(is_nmtoken),
        AttType::Notation(names) | AttType::Enumeration(names) => names.iter().any(|n| n == value),
    };
    if !ok {
        return Err(format!("value '{}' of attribute '{}' is not valid", value, def.name));
    }
    if matches!(def.att_type, AttType::Entity | AttType::Entities) {
        for name in value.split(' ') {
            if !decls.entities.get(name).map_or(false, |e| e.ndata.is_some()) {
                return Err(format!("attribute '{}' names '{}', which is not an unparsed entity", def.name, name));
            }
        }
    }
    Ok(())
}

fn is_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_name_char)
}

fn describe_expected(expected: &[String]) -> String {
    if expected.is_empty() {
        "nothing".to_string()
    } else {
        expected.join(", ")
    }
}

impl DocumentValidator for DtdValidator {
    fn doctype(&mut self, raw: &str) -> Result<(), String> {
        self.load(Doctype::parse(raw)?)
    }

    fn namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<(), String> {
        let name = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{}", prefix)
        };
        self.namespace_attributes.push((name, uri.to_string()));
        Ok(())
    }

    fn start_element(&mut self, tag: &StartTag) -> Result<(), String> {
        let name = tag.name.qualified();

        match self.stack.last_mut() {
            None => {
                let root = self.root_name.as_deref().ok_or("no DTD found")?;
                if root != name {
                    return Err(format!(
                        "root element '{}' does not match the DOCTYPE name '{}'",
                        name, root
                    ));
                }
            }
            Some(parent) => match self.rules.get(&parent.name) {
                Some(ElementRule::Empty) => {
                    return Err(format!(
                        "element '{}' is declared EMPTY but contains '{}'",
                        parent.name, name
                    ))
                }
                Some(ElementRule::Mixed(allowed)) if !allowed.contains(&name) => {
                    return Err(format!("element '{}' is not allowed in '{}'", name, parent.name))
                }
                Some(ElementRule::Children(model)) => {
                    if let Some(state) = parent.state.as_mut() {
                        model.step(state, &tag.name).map_err(|expected| {
                            format!(
                                "element '{}' is not expected in '{}'; expected {}",
                                name,
                                parent.name,
                                describe_expected(&expected)
                            )
                        })?;
                    }
                }
                _ => {}
            },
        }

        let state = match self.rules.get(&name) {
            Some(ElementRule::Children(model)) => Some(model.start()),
            Some(_) => None,
            None => return Err(format!("no declaration for element '{}'", name)),
        };
        self.check_attributes(&name, tag)?;
        self.stack.push(OpenElement { name, state });
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), String> {
        let open = match self.stack.last() {
            Some(open) => open,
            None => return Ok(()),
        };
        let blank = text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
        match self.rules.get(&open.name) {
            Some(ElementRule::Empty) => Err(format!("element '{}' is declared EMPTY but has content", open.name)),
            Some(ElementRule::Children(_)) if !blank => Err(format!(
                "character data is not allowed in element-only content of '{}'",
                open.name
            )),
            _ => Ok(()),
        }
    }

    fn end_element(&mut self) -> Result<(), String> {
        let open = match self.stack.pop() {
            Some(open) => open,
            None => return Ok(()),
        };
        if let (Some(ElementRule::Children(model)), Some(state)) = (self.rules.get(&open.name), &open.state) {
            if !model.accepts(state) {
                return Err(format!(
                    "content of element '{}' is incomplete; expected {}",
                    open.name,
                    describe_expected(&model.expected(state))
                ));
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
        if self.root_name.is_none() {
            return Err("no DTD found".to_string());
        }
        match self.idrefs.iter().find(|r| !self.ids.contains(*r)) {
            Some(missing) => Err(format!("IDREF '{}' does not match any ID", missing)),
            None => Ok(()),
        }
    }
}
