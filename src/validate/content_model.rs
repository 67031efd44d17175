//! Content-model automaton
//!
//! Particle trees from DTD `<!ELEMENT>` declarations and XSD model groups are
//! compiled into an epsilon-NFA. Validation keeps one [`MatchState`] per open
//! element and steps it once per child, so memory per element is bounded by
//! the automaton size rather than the number of children.
//!
//! `xs:all` groups are not expressible as a compact NFA; they get their own
//! matcher tracking which members were already seen.

use crate::core::qname::QName;

/// Occurrence bounds above this are treated as unbounded
pub const MAX_EXPANDED_OCCURS: u32 = 512;

/// Leaf of a content model
pub trait Term {
    /// Does a child element with this name match the term?
    fn matches(&self, name: &QName) -> bool;
    /// Human readable form used in error messages
    fn describe(&self) -> String;
}

/// Element name as written in a DTD (prefix included, not namespace-aware)
impl Term for String {
    fn matches(&self, name: &QName) -> bool {
        match &name.prefix {
            Some(prefix) => {
                self.len() == prefix.len() + 1 + name.local.len()
                    && self.starts_with(prefix.as_str())
                    && self[prefix.len()..].starts_with(':')
                    && self.ends_with(name.local.as_str())
            }
            None => *self == name.local,
        }
    }

    fn describe(&self) -> String {
        self.clone()
    }
}

/// Node of a particle tree
#[derive(Debug, Clone, PartialEq)]
pub struct Particle<T> {
    pub kind: ParticleKind<T>,
    pub min: u32,
    /// `None` means unbounded
    pub max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParticleKind<T> {
    Term(T),
    Sequence(Vec<Particle<T>>),
    Choice(Vec<Particle<T>>),
    All(Vec<Particle<T>>),
}

impl<T> Particle<T> {
    /// Exactly once
    pub fn once(kind: ParticleKind<T>) -> Self {
        Particle { kind, min: 1, max: Some(1) }
    }

    pub fn term(term: T) -> Self {
        Self::once(ParticleKind::Term(term))
    }

    pub fn with_occurs(mut self, min: u32, max: Option<u32>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Empty sequence: matches no children
    pub fn empty() -> Self {
        Self::once(ParticleKind::Sequence(Vec::new()))
    }
}

/// Compiled content model
#[derive(Debug, Clone)]
pub enum ContentModel<T> {
    Nfa(Nfa<T>),
    All(AllGroup<T>),
}

/// Per-element matching state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    /// Current NFA state set, epsilon-closed and sorted
    Nfa(Vec<usize>),
    /// Members of an `all` group already matched
    All(Vec<bool>),
}

impl<T: Term + Clone> ContentModel<T> {
    /// Compile a particle tree
    pub fn compile(particle: &Particle<T>) -> Result<Self, String> {
        match &particle.kind {
            ParticleKind::All(members) => AllGroup::new(members, particle.min == 0).map(ContentModel::All),
            _ => Nfa::compile(particle).map(ContentModel::Nfa),
        }
    }

    /// State before the first child
    pub fn start(&self) -> MatchState {
        match self {
            ContentModel::Nfa(nfa) => MatchState::Nfa(nfa.closure(&[nfa.start])),
            ContentModel::All(group) => MatchState::All(vec![false; group.members.len()]),
        }
    }

    /// Advance over one child. Returns the matching term, or the terms that
    /// would have been accepted here.
    pub fn step<'m>(&'m self, state: &mut MatchState, name: &QName) -> Result<&'m T, Vec<String>> {
        match (self, state) {
            (ContentModel::Nfa(nfa), MatchState::Nfa(states)) => nfa.step(states, name),
            (ContentModel::All(group), MatchState::All(seen)) => group.step(seen, name),
            _ => Err(Vec::new()),
        }
    }

    /// Can the element end in this state?
    pub fn accepts(&self, state: &MatchState) -> bool {
        match (self, state) {
            (ContentModel::Nfa(nfa), MatchState::Nfa(states)) => states.binary_search(&nfa.accept).is_ok(),
            (ContentModel::All(group), MatchState::All(seen)) => group.accepts(seen),
            _ => false,
        }
    }

    /// Terms that could come next
    pub fn expected(&self, state: &MatchState) -> Vec<String> {
        match (self, state) {
            (ContentModel::Nfa(nfa), MatchState::Nfa(states)) => nfa.expected(states),
            (ContentModel::All(group), MatchState::All(seen)) => group.expected(seen),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Epsilon-NFA
// ============================================================================

#[derive(Debug, Clone, Default)]
struct NfaState {
    epsilon: Vec<usize>,
    /// (term index, target state)
    edges: Vec<(usize, usize)>,
}

/// Thompson-style automaton over terms
#[derive(Debug, Clone)]
pub struct Nfa<T> {
    states: Vec<NfaState>,
    terms: Vec<T>,
    start: usize,
    accept: usize,
}

impl<T: Term + Clone> Nfa<T> {
    pub fn compile(particle: &Particle<T>) -> Result<Self, String> {
        let mut nfa = Nfa {
            states: vec![NfaState::default()],
            terms: Vec::new(),
            start: 0,
            accept: 0,
        };
        nfa.accept = nfa.particle(particle, 0)?;
        Ok(nfa)
    }

    /// Number of states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn add_state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    /// Add `particle` starting at `from`; returns its end state
    fn particle(&mut self, particle: &Particle<T>, from: usize) -> Result<usize, String> {
        let min = particle.min.min(MAX_EXPANDED_OCCURS);
        let max = particle.max.filter(|&m| m <= MAX_EXPANDED_OCCURS);
        if let Some(max) = max {
            if max < min {
                return Err(format!("maxOccurs ({}) is less than minOccurs ({})", max, min));
            }
        }

        let mut current = from;
        for _ in 0..min {
            current = self.body(&particle.kind, current)?;
        }
        match max {
            None => {
                let hub = self.add_state();
                self.epsilon(current, hub);
                let end = self.body(&particle.kind, hub)?;
                self.epsilon(end, hub);
                Ok(hub)
            }
            Some(max) => {
                for _ in min..max {
                    let end = self.body(&particle.kind, current)?;
                    let join = self.add_state();
                    self.epsilon(current, join);
                    self.epsilon(end, join);
                    current = join;
                }
                Ok(current)
            }
        }
    }

    fn body(&mut self, kind: &ParticleKind<T>, from: usize) -> Result<usize, String> {
        match kind {
            ParticleKind::Term(term) => {
                let index = self.terms.len();
                self.terms.push(term.clone());
                let to = self.add_state();
                self.states[from].edges.push((index, to));
                Ok(to)
            }
            ParticleKind::Sequence(items) => {
                let mut current = from;
                for item in items {
                    current = self.particle(item, current)?;
                }
                Ok(current)
            }
            ParticleKind::Choice(items) => {
                let join = self.add_state();
                for item in items {
                    let end = self.particle(item, from)?;
                    self.epsilon(end, join);
                }
                Ok(join)
            }
            ParticleKind::All(_) => Err("an 'all' group must be the whole content model".to_string()),
        }
    }

    /// Epsilon closure of a state set, sorted
    fn closure(&self, seeds: &[usize]) -> Vec<usize> {
        let mut seen = vec![false; self.states.len()];
        let mut stack: Vec<usize> = seeds.to_vec();
        let mut out = Vec::new();
        while let Some(s) = stack.pop() {
            if seen[s] {
                continue;
            }
            seen[s] = true;
            out.push(s);
            stack.extend(self.states[s].epsilon.iter().copied());
        }
        out.sort_unstable();
        out
    }

    fn step<'m>(&'m self, states: &mut Vec<usize>, name: &QName) -> Result<&'m T, Vec<String>> {
        let mut matched = None;
        let mut targets = Vec::new();
        for &s in states.iter() {
            for &(term, to) in &self.states[s].edges {
                if self.terms[term].matches(name) {
                    matched.get_or_insert(term);
                    targets.push(to);
                }
            }
        }
        match matched {
            Some(term) => {
                *states = self.closure(&targets);
                Ok(&self.terms[term])
            }
            None => Err(self.expected(states)),
        }
    }

    fn expected(&self, states: &[usize]) -> Vec<String> {
        let mut out: Vec<String> = states
            .iter()
            .flat_map(|&s| self.states[s].edges.iter())
            .map(|&(term, _)| self.terms[term].describe())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

// ============================================================================
// All groups
// ============================================================================

/// Unordered group: each member at most once
#[derive(Debug, Clone)]
pub struct AllGroup<T> {
    members: Vec<(T, bool)>,
    /// The whole group may be absent
    optional: bool,
}

impl<T: Term + Clone> AllGroup<T> {
    fn new(members: &[Particle<T>], optional: bool) -> Result<Self, String> {
        let mut out = Vec::with_capacity(members.len());
        for member in members {
            match &member.kind {
                ParticleKind::Term(term) if member.max.map_or(false, |m| m <= 1) => {
                    out.push((term.clone(), member.min > 0));
                }
                ParticleKind::Term(_) => {
                    return Err("members of an 'all' group may occur at most once".to_string())
                }
                _ => return Err("an 'all' group may only contain element declarations".to_string()),
            }
        }
        Ok(AllGroup { members: out, optional })
    }

    fn step<'m>(&'m self, seen: &mut [bool], name: &QName) -> Result<&'m T, Vec<String>> {
        for (i, (term, _)) in self.members.iter().enumerate() {
            if !seen[i] && term.matches(name) {
                seen[i] = true;
                return Ok(term);
            }
        }
        Err(self.expected(seen))
    }

    fn accepts(&self, seen: &[bool]) -> bool {
        let none_seen = !seen.iter().any(|&s| s);
        if none_seen && self.optional {
            return true;
        }
        self.members
            .iter()
            .zip(seen)
            .all(|((_, required), &s)| s || !required)
    }

    fn expected(&self, seen: &[bool]) -> Vec<String> {
        self.members
            .iter()
            .zip(seen)
            .filter(|(_, &s)| !s)
            .map(|((term, _), _)| term.describe())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> Particle<String> {
        Particle::term(name.to_string())
    }

    fn seq(items: Vec<Particle<String>>) -> Particle<String> {
        Particle::once(ParticleKind::Sequence(items))
    }

    fn choice(items: Vec<Particle<String>>) -> Particle<String> {
        Particle::once(ParticleKind::Choice(items))
    }

    fn run(model: &ContentModel<String>, names: &[&str]) -> Result<bool, Vec<String>> {
        let mut state = model.start();
        for name in names {
            model.step(&mut state, &QName::local(*name))?;
        }
        Ok(model.accepts(&state))
    }

    #[test]
    fn test_sequence() {
        let model = ContentModel::compile(&seq(vec![t("a"), t("b")])).unwrap();
        assert_eq!(run(&model, &["a", "b"]), Ok(true));
        assert_eq!(run(&model, &["a"]), Ok(false));
        assert_eq!(run(&model, &["b"]), Err(vec!["a".to_string()]));
    }

    #[test]
    fn test_occurrence_suffixes() {
        // (a?, b*, c+)
        let p = seq(vec![
            t("a").with_occurs(0, Some(1)),
            t("b").with_occurs(0, None),
            t("c").with_occurs(1, None),
        ]);
        let model = ContentModel::compile(&p).unwrap();
        assert_eq!(run(&model, &["c"]), Ok(true));
        assert_eq!(run(&model, &["a", "b", "b", "c", "c"]), Ok(true));
        assert_eq!(run(&model, &["a", "a"]).is_err(), true);
        assert_eq!(run(&model, &["a", "b"]), Ok(false));
    }

    #[test]
    fn test_choice_repeated() {
        let p = choice(vec![t("x"), t("y")]).with_occurs(2, Some(3));
        let model = ContentModel::compile(&p).unwrap();
        assert_eq!(run(&model, &["x"]), Ok(false));
        assert_eq!(run(&model, &["x", "y"]), Ok(true));
        assert_eq!(run(&model, &["y", "y", "x"]), Ok(true));
        assert!(run(&model, &["x", "x", "x", "x"]).is_err());
    }

    #[test]
    fn test_nested_star_with_empty_body() {
        // ((a?)*) must not loop forever
        let p = seq(vec![t("a").with_occurs(0, Some(1))]).with_occurs(0, None);
        let model = ContentModel::compile(&p).unwrap();
        assert_eq!(run(&model, &[]), Ok(true));
        assert_eq!(run(&model, &["a", "a", "a"]), Ok(true));
    }

    #[test]
    fn test_large_bound_relaxed() {
        let p = t("a").with_occurs(1, Some(100_000));
        let model = ContentModel::compile(&p).unwrap();
        if let ContentModel::Nfa(nfa) = &model {
            assert!(nfa.len() < 16);
        }
        assert_eq!(run(&model, &["a"; 600]), Ok(true));
    }

    #[test]
    fn test_state_set_stays_bounded() {
        let model = ContentModel::compile(&t("a").with_occurs(0, None)).unwrap();
        let mut state = model.start();
        for _ in 0..10_000 {
            model.step(&mut state, &QName::local("a")).unwrap();
        }
        match state {
            MatchState::Nfa(states) => assert!(states.len() <= 3),
            MatchState::All(_) => unreachable!(),
        }
    }

    #[test]
    fn test_all_group() {
        let p = Particle::once(ParticleKind::All(vec![t("a"), t("b").with_occurs(0, Some(1))]));
        let model = ContentModel::compile(&p).unwrap();
        assert_eq!(run(&model, &["b", "a"]), Ok(true));
        assert_eq!(run(&model, &["a"]), Ok(true));
        assert_eq!(run(&model, &["b"]), Ok(false));
        assert!(run(&model, &["a", "a"]).is_err());
    }

    #[test]
    fn test_nested_all_rejected() {
        let inner = Particle::once(ParticleKind::All(vec![t("a")]));
        assert!(ContentModel::compile(&seq(vec![inner])).is_err());
    }

    #[test]
    fn test_prefixed_dtd_term() {
        let term = "x:item".to_string();
        let mut name = QName::namespaced("urn:x", "item");
        name.prefix = Some("x".to_string());
        assert!(term.matches(&name));
        assert!(!term.matches(&QName::local("item")));
    }
}
