//! Pruning tree walker
//!
//! Builds the live part of the document from source events, dispatches
//! matching elements at their end tag, and drops everything that no future
//! dispatch can reach.
//!
//! After a matching element is dispatched it is cleared down to a husk and
//! every already-completed left sibling on the path from the root to it is
//! released. A non-matching element that ends with no matching element
//! open above it is released immediately, subtree and all. Together this
//! keeps the arena proportional to depth times the unpruned sibling
//! frontier.

use std::io::BufRead;
use std::path::Path;

use tracing::{debug, trace};

use crate::dom::{LiveDocument, NamespaceRegistry, NodeId};
use crate::error::{Error, Location, Result};
use crate::handler::{DispatchContext, Handler, HandlerBinding};
use crate::reader::{EventSource, SourceEvent, StartTag};

/// Walker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Idle,
    Traversing,
    Done,
}

/// Summary of one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Elements opened
    pub elements_seen: u64,
    /// Handler invocations
    pub elements_dispatched: u64,
    /// Highest number of nodes alive at once
    pub peak_live_nodes: usize,
    /// Distinct prefixes in the namespace registry at the end
    pub namespaces_observed: usize,
}

struct OpenElement {
    id: NodeId,
    matched: bool,
}

/// Streaming walker driving a [`HandlerBinding`]
pub struct PruningWalker<H> {
    binding: HandlerBinding<H>,
    doc: LiveDocument,
    registry: NamespaceRegistry,
    open: Vec<OpenElement>,
    /// Number of entries in `open` that match the filter
    open_matches: usize,
    state: WalkState,
    stats: WalkStats,
}

impl<H: Handler> PruningWalker<H> {
    pub fn new(binding: HandlerBinding<H>) -> Self {
        PruningWalker {
            binding,
            doc: LiveDocument::new(),
            registry: NamespaceRegistry::new(),
            open: Vec::with_capacity(32),
            open_matches: 0,
            state: WalkState::Idle,
            stats: WalkStats::default(),
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Nodes currently held in the arena
    pub fn live_nodes(&self) -> usize {
        self.doc.live_nodes()
    }

    pub fn into_binding(self) -> HandlerBinding<H> {
        self.binding
    }

    /// Consume `source` to the end
    pub fn run<R: BufRead>(&mut self, source: &mut EventSource<R>) -> Result<WalkStats> {
        debug!(
            path = %source.path().display(),
            filter = %self.binding.filter().map_or_else(|| "*".to_string(), |f| f.to_string()),
            "walk started"
        );
        while let Some(event) = source.next_event()? {
            self.step(event, source.path(), source.position())?;
        }
        Ok(self.finish())
    }

    /// Apply one event. `path` and `offset` locate handler failures.
    pub fn step(&mut self, event: SourceEvent, path: &Path, offset: u64) -> Result<()> {
        match self.state {
            WalkState::Done => return Ok(()),
            WalkState::Idle => self.state = WalkState::Traversing,
            WalkState::Traversing => {}
        }

        match event {
            SourceEvent::NamespaceStart { prefix, uri } => self.registry.observe(&prefix, &uri),
            SourceEvent::StartElement(tag) => self.start_element(&tag),
            SourceEvent::Text(text) => self.text(&text),
            SourceEvent::EndElement => self.end_element(path, offset)?,
            SourceEvent::DocType(_) => {}
        }
        Ok(())
    }

    /// Release what is left and report
    pub fn finish(&mut self) -> WalkStats {
        self.doc.release_all();
        self.open.clear();
        self.open_matches = 0;
        self.state = WalkState::Done;
        self.stats.peak_live_nodes = self.doc.peak_live_nodes();
        self.stats.namespaces_observed = self.registry.len();
        debug!(
            seen = self.stats.elements_seen,
            dispatched = self.stats.elements_dispatched,
            peak_live_nodes = self.stats.peak_live_nodes,
            "walk finished"
        );
        self.stats
    }

    /// Whether anything stored now can still reach a handler
    #[inline]
    fn retaining(&self) -> bool {
        self.open_matches > 0
    }

    fn start_element(&mut self, tag: &StartTag) {
        let matched = self.binding.accepts(tag.name.namespace.as_deref(), &tag.name.local);
        let parent = self.open.last().map(|o| o.id);
        // Elements no handler will see keep only their place in the tree
        let id = if matched || self.retaining() {
            self.doc.open_element(&tag.name, &tag.attributes, parent)
        } else {
            self.doc.open_placeholder(parent)
        };
        self.open.push(OpenElement { id, matched });
        if matched {
            self.open_matches += 1;
        }
        self.stats.elements_seen += 1;
    }

    fn text(&mut self, text: &str) {
        // Outside matching elements text lands on a node no handler can see
        if !self.retaining() {
            return;
        }
        if let Some(open) = self.open.last() {
            self.doc.append_text(open.id, text);
        }
    }

    fn end_element(&mut self, path: &Path, offset: u64) -> Result<()> {
        let Some(open) = self.open.pop() else {
            return Ok(());
        };

        if open.matched {
            self.open_matches -= 1;
            self.dispatch(open.id, path, offset)?;
            self.stats.elements_dispatched += 1;
            self.doc.clear(open.id);
            let mut child = open.id;
            for ancestor in self.open.iter().rev() {
                self.doc.prune_before(ancestor.id, child);
                child = ancestor.id;
            }
        } else if !self.retaining() {
            self.doc.remove(open.id);
        }
        Ok(())
    }

    fn dispatch(&mut self, id: NodeId, path: &Path, offset: u64) -> Result<()> {
        let Some(element) = self.doc.element(id) else {
            return Ok(());
        };
        let snapshot = (!self.registry.is_empty()).then(|| self.registry.snapshot());
        let ctx = DispatchContext {
            element,
            namespaces: snapshot.as_ref(),
        };
        trace!(element = %element.name(), children = element.child_count(), "dispatch");
        self.binding.dispatch(&ctx).map_err(|source| Error::HandlerFailed {
            path: path.to_path_buf(),
            element: element.name(),
            location: Location::at(offset),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::qname::QName;
    use crate::dom::NamespaceMap;
    use crate::error::HandlerError;
    use crate::filter::TagFilter;
    use crate::reader::SourceOptions;
    use std::io::Cursor;

    fn source(xml: &str) -> EventSource<Cursor<Vec<u8>>> {
        EventSource::from_reader(Cursor::new(xml.as_bytes().to_vec()), "doc.xml", SourceOptions::default()).unwrap()
    }

    /// Run a walk collecting `f(ctx)` per dispatch
    fn collect<T>(
        xml: &str,
        tag: Option<&str>,
        mut f: impl FnMut(&DispatchContext<'_>) -> T,
    ) -> (Vec<T>, WalkStats) {
        let mut out = Vec::new();
        let filter = tag.map(|t| TagFilter::parse(t).unwrap());
        let handler = |ctx: &DispatchContext<'_>| {
            out.push(f(ctx));
            Ok::<_, HandlerError>(())
        };
        let mut walker = PruningWalker::new(HandlerBinding::new(filter, handler));
        let stats = walker.run(&mut source(xml)).unwrap();
        drop(walker);
        (out, stats)
    }

    fn row(ctx: &DispatchContext<'_>) -> String {
        ctx.element
            .children()
            .map(|c| c.text().unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    #[test]
    fn test_rows_in_document_order() {
        let xml = "<root><r><c1>A</c1><c2>B</c2></r><r><c1>C</c1><c2>D</c2></r></root>";
        let (rows, stats) = collect(xml, Some("r"), row);
        assert_eq!(rows, vec!["A;B", "C;D"]);
        assert_eq!(stats.elements_seen, 7);
        assert_eq!(stats.elements_dispatched, 2);
    }

    #[test]
    fn test_no_filter_dispatches_every_end_tag() {
        let (names, stats) = collect("<a><b><c/></b><d/></a>", None, |ctx| ctx.element.name());
        assert_eq!(names, vec!["c", "b", "d", "a"]);
        assert_eq!(stats.elements_dispatched, 4);
    }

    #[test]
    fn test_children_are_husks_for_parent_dispatch() {
        let (counts, _) = collect("<a><b>x</b><c>y</c></a>", None, |ctx| {
            let texts: Vec<_> = ctx.element.children().map(|c| c.text().map(str::to_string)).collect();
            (ctx.element.name(), texts)
        });
        // c is cleared after dispatch; b was pruned as c's left sibling
        assert_eq!(counts.last().unwrap(), &("a".to_string(), vec![None]));
    }

    #[test]
    fn test_nested_matches() {
        let xml = "<root><item id='1'><item id='2'/></item></root>";
        let (ids, _) = collect(xml, Some("item"), |ctx| {
            (ctx.element.attribute("id").map(str::to_string), ctx.element.child_count())
        });
        assert_eq!(ids, vec![(Some("2".to_string()), 0), (Some("1".to_string()), 1)]);
    }

    #[test]
    fn test_namespace_snapshot_timing() {
        let xml = r#"<root><r>1</r><x:r xmlns:x="urn:x">2</x:r><r xmlns="urn:d">3</r></root>"#;
        let (maps, stats) = collect(xml, Some("{*}r"), |ctx| ctx.namespaces.map(|m| NamespaceMap::clone(m)));
        assert_eq!(maps[0], None);
        let second = maps[1].as_ref().unwrap();
        assert_eq!(second.get("x").map(String::as_str), Some("urn:x"));
        assert!(second.get("ns").is_none());
        let third = maps[2].as_ref().unwrap();
        assert_eq!(third.get("ns").map(String::as_str), Some("urn:d"));
        assert_eq!(stats.namespaces_observed, 2);
    }

    #[test]
    fn test_namespaced_filter_and_find() {
        let xml = r#"<root xmlns="urn:a"><r><c1>A</c1></r></root>"#;
        let (found, _) = collect(xml, Some("{urn:a}r"), |ctx| {
            ctx.element.find_text("ns:c1", ctx.namespace_map()).map(str::to_string)
        });
        assert_eq!(found, vec![Some("A".to_string())]);
    }

    #[test]
    fn test_text_and_tail() {
        let xml = "<root><r>head<b>bold</b>tail</r></root>";
        let (parts, _) = collect(xml, Some("r"), |ctx| {
            let b = ctx.element.children().next().unwrap();
            (ctx.element.text().map(str::to_string), b.tail().map(str::to_string))
        });
        assert_eq!(parts, vec![(Some("head".to_string()), Some("tail".to_string()))]);
    }

    #[test]
    fn test_peak_independent_of_width() {
        let wide = format!("<root>{}</root>", "<r><c>v</c></r>".repeat(5000));
        let narrow = format!("<root>{}</root>", "<r><c>v</c></r>".repeat(5));
        let (_, wide_stats) = collect(&wide, Some("r"), |_| ());
        let (_, narrow_stats) = collect(&narrow, Some("r"), |_| ());
        assert_eq!(wide_stats.elements_dispatched, 5000);
        assert_eq!(wide_stats.peak_live_nodes, narrow_stats.peak_live_nodes);
        assert!(wide_stats.peak_live_nodes <= 4);
    }

    #[test]
    fn test_peak_follows_depth() {
        let depth = 200;
        let deep = format!("{}{}", "<n>".repeat(depth), "</n>".repeat(depth));
        let (_, stats) = collect(&deep, Some("n"), |_| ());
        assert_eq!(stats.elements_dispatched, depth as u64);
        assert_eq!(stats.peak_live_nodes, depth);
    }

    #[test]
    fn test_unmatched_regions_released() {
        let noise = "<skip><a>1</a><b>2</b></skip>".repeat(1000);
        let xml = format!("<root>{}<r><c>x</c></r></root>", noise);
        let (rows, stats) = collect(&xml, Some("r"), row);
        assert_eq!(rows, vec!["x"]);
        assert!(stats.peak_live_nodes <= 3, "peak {}", stats.peak_live_nodes);
    }

    #[test]
    fn test_unmatched_names_not_interned() {
        let noise: String = (0..2000).map(|i| format!("<item_{i} k{i}=\"v\"/>")).collect();
        let xml = format!("<root>{}<r><c>x</c></r></root>", noise);
        let filter = TagFilter::parse("r").ok();
        let mut walker = PruningWalker::new(HandlerBinding::new(filter, |_: &DispatchContext<'_>| {
            Ok::<_, HandlerError>(())
        }));
        let stats = walker.run(&mut source(&xml)).unwrap();
        assert_eq!(stats.elements_dispatched, 1);
        // Only the matched row and its child were named
        assert!(walker.doc.strings.len() <= 3, "pool {}", walker.doc.strings.len());
    }

    #[test]
    fn test_handler_error_stops_walk() {
        let mut calls = 0;
        let handler = |_: &DispatchContext<'_>| {
            calls += 1;
            if calls == 2 {
                Err("stop")
            } else {
                Ok(())
            }
        };
        let filter = TagFilter::parse("r").ok();
        let mut walker = PruningWalker::new(HandlerBinding::new(filter, handler));
        let err = walker.run(&mut source("<root><r/><r/><r/></root>")).unwrap_err();
        drop(walker);
        assert_eq!(calls, 2);
        match err {
            Error::HandlerFailed { element, source, .. } => {
                assert_eq!(element, "r");
                assert_eq!(source.to_string(), "stop");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut walker = PruningWalker::new(HandlerBinding::new(None, |_: &DispatchContext<'_>| {
            Ok::<_, HandlerError>(())
        }));
        assert_eq!(walker.state(), WalkState::Idle);
        walker
            .step(SourceEvent::StartElement(StartTag::new(QName::local("a"))), Path::new("x"), 0)
            .unwrap();
        assert_eq!(walker.state(), WalkState::Traversing);
        assert_eq!(walker.live_nodes(), 1);
        walker.step(SourceEvent::EndElement, Path::new("x"), 4).unwrap();
        walker.finish();
        assert_eq!(walker.state(), WalkState::Done);
        assert_eq!(walker.live_nodes(), 0);
    }
}
