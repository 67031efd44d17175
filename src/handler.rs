//! Handler binding
//!
//! A [`Handler`] is called once per matching element, synchronously and in
//! document order. Fixed configuration lives in the handler value itself;
//! the namespaces observed so far arrive in the [`DispatchContext`].

use crate::dom::{ElementRef, NamespaceMap, NamespaceSnapshot};
use crate::error::HandlerError;
use crate::filter::TagFilter;

/// What a handler sees for one dispatched element
pub struct DispatchContext<'a> {
    /// The completed element; children and text are intact
    pub element: ElementRef<'a>,
    /// Every namespace observed up to this end tag, `None` while there are none
    pub namespaces: Option<&'a NamespaceSnapshot>,
}

impl<'a> DispatchContext<'a> {
    /// Namespace map suitable for [`ElementRef::find`]
    pub fn namespace_map(&self) -> Option<&'a NamespaceMap> {
        self.namespaces.map(|snapshot| snapshot.as_ref())
    }
}

/// Per-element callback
pub trait Handler {
    /// Handle one element. An error aborts the session.
    fn handle(&mut self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError>;
}

impl<F, E> Handler for F
where
    F: FnMut(&DispatchContext<'_>) -> Result<(), E>,
    E: Into<HandlerError>,
{
    fn handle(&mut self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError> {
        self(ctx).map_err(Into::into)
    }
}

/// A handler together with the filter deciding when it runs
pub struct HandlerBinding<H> {
    filter: Option<TagFilter>,
    handler: H,
}

impl<H: Handler> HandlerBinding<H> {
    /// Bind `handler` to the elements matching `filter`; `None` matches all
    pub fn new(filter: Option<TagFilter>, handler: H) -> Self {
        HandlerBinding { filter, handler }
    }

    pub fn filter(&self) -> Option<&TagFilter> {
        self.filter.as_ref()
    }

    /// Whether an element with this name qualifies for dispatch
    #[inline]
    pub fn accepts(&self, namespace: Option<&str>, local: &str) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(namespace, local))
    }

    /// Invoke the handler
    #[inline]
    pub fn dispatch(&mut self, ctx: &DispatchContext<'_>) -> Result<(), HandlerError> {
        self.handler.handle(ctx)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}
