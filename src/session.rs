//! Parse session
//!
//! One session is one pass over one input: guard, optional validation,
//! walk. Nothing is kept between sessions; running again means reading
//! the input again.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::filter::TagFilter;
use crate::handler::{Handler, HandlerBinding};
use crate::lifecycle::ensure_input_readable;
use crate::reader::{EventSource, SourceOptions};
use crate::strategy::{PruningWalker, WalkStats};
use crate::validate::{validate_document, DtdValidator, Schema, ValidationKind};

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    input: PathBuf,
    tag: Option<TagFilter>,
    dtd_validation: bool,
    schema: Option<Schema>,
    keep_blank_text: bool,
}

impl SessionConfig {
    /// Settings for `input` with no filter and no validation
    pub fn new(input: impl Into<PathBuf>) -> Self {
        SessionConfig {
            input: input.into(),
            tag: None,
            dtd_validation: false,
            schema: None,
            keep_blank_text: false,
        }
    }

    /// Only dispatch elements matching `filter`
    pub fn tag(mut self, filter: TagFilter) -> Self {
        self.tag = Some(filter);
        self
    }

    /// Validate against the document's DTD before walking
    pub fn dtd_validation(mut self, enabled: bool) -> Self {
        self.dtd_validation = enabled;
        self
    }

    /// Validate against `schema` before walking
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Keep whitespace-only text nodes
    pub fn keep_blank_text(mut self, keep: bool) -> Self {
        self.keep_blank_text = keep;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn tag_filter(&self) -> Option<&TagFilter> {
        self.tag.as_ref()
    }

    fn validates(&self) -> bool {
        self.dtd_validation || self.schema.is_some()
    }
}

/// Runs sessions
pub struct Session;

impl Session {
    /// Run one session, calling `handler` for every matching element
    ///
    /// Validation, when requested, covers the whole document before the
    /// first dispatch, so an invalid document never reaches the handler.
    /// Positional errors come back with line and column filled in.
    pub fn run<H: Handler>(config: &SessionConfig, handler: H) -> Result<WalkStats> {
        Self::run_inner(config, handler).map_err(Error::with_resolved_location)
    }

    fn run_inner<H: Handler>(config: &SessionConfig, handler: H) -> Result<WalkStats> {
        let started = Instant::now();
        let size = ensure_input_readable(&config.input)?;
        debug!(path = %config.input.display(), bytes = size, "session started");

        if config.validates() {
            validate(config)?;
        }

        let options = SourceOptions {
            keep_blank_text: config.keep_blank_text,
        };
        let mut source = EventSource::open(&config.input, options)?;
        let mut walker = PruningWalker::new(HandlerBinding::new(config.tag.clone(), handler));
        let stats = walker.run(&mut source)?;

        info!(
            path = %config.input.display(),
            dispatched = stats.elements_dispatched,
            seen = stats.elements_seen,
            peak_live_nodes = stats.peak_live_nodes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session finished"
        );
        Ok(stats)
    }
}

/// Validation pass over a fresh event source; DTD first
fn validate(config: &SessionConfig) -> Result<()> {
    // Validators need every text node to judge content
    let options = SourceOptions { keep_blank_text: true };

    if config.dtd_validation {
        debug!("dtd validation");
        let mut source = EventSource::open(&config.input, options)?;
        let mut validator = DtdValidator::new(config.input.parent().map(Path::to_path_buf));
        validate_document(&mut source, &mut validator, ValidationKind::Dtd)?;
    }
    if let Some(schema) = &config.schema {
        debug!(target_namespace = schema.target_namespace().unwrap_or(""), "schema validation");
        let mut source = EventSource::open(&config.input, options)?;
        let mut validator = schema.validator();
        validate_document(&mut source, &mut validator, ValidationKind::Schema)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::DispatchContext;
    use std::io::Write;

    fn input(xml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new("in.xml")
            .tag(TagFilter::parse("r").unwrap())
            .dtd_validation(true)
            .keep_blank_text(true);
        assert_eq!(config.input(), Path::new("in.xml"));
        assert_eq!(config.tag_filter().map(|f| f.to_string()), Some("r".to_string()));
        assert!(config.validates());
    }

    #[test]
    fn test_malformed_reports_line() {
        let file = input("<root>\n  <r>\n  </x>\n</root>");
        let err = Session::run(&SessionConfig::new(file.path()), |_: &DispatchContext<'_>| {
            Ok::<_, HandlerError>(())
        })
        .unwrap_err();
        match err {
            Error::MalformedDocument { location, .. } => assert_eq!(location.line, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_blank_text_policy() {
        let file = input("<root><r> </r></root>");
        let mut texts = Vec::new();
        let config = SessionConfig::new(file.path()).tag(TagFilter::parse("r").unwrap());
        Session::run(&config, |ctx: &DispatchContext<'_>| {
            texts.push(ctx.element.text().map(str::to_string));
            Ok::<_, HandlerError>(())
        })
        .unwrap();
        Session::run(&config.clone().keep_blank_text(true), |ctx: &DispatchContext<'_>| {
            texts.push(ctx.element.text().map(str::to_string));
            Ok::<_, HandlerError>(())
        })
        .unwrap();
        assert_eq!(texts, vec![None, Some(" ".to_string())]);
    }
}
