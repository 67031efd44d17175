//! Error Types
//!
//! One error enum for the whole session. Every variant except the two
//! configuration errors ([`Error::InvalidSchema`], [`Error::InvalidTagFilter`])
//! carries the input path so a fatal error can be reported without extra
//! context; positional variants carry a [`Location`].

use std::fmt;
use std::path::PathBuf;

/// Error returned by a [`Handler`](crate::handler::Handler) to abort the run
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Position of an event in the input document
///
/// `offset` is always known. Line and column are filled in when the input
/// can be re-read to compute them (see [`crate::core::location`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// Byte offset from the start of the input
    pub offset: u64,
    /// 1-based line number
    pub line: Option<u64>,
    /// 1-based column, counted in bytes
    pub column: Option<u64>,
}

impl Location {
    /// Location known only by byte offset
    pub fn at(offset: u64) -> Self {
        Location {
            offset,
            line: None,
            column: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {}, column {} (byte {})", line, column, self.offset)
            }
            _ => write!(f, "byte {}", self.offset),
        }
    }
}

/// Fatal session error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input missing, not a regular file, or empty. The session never started.
    #[error("{}: input unavailable: {reason}", .path.display())]
    InputUnavailable { path: PathBuf, reason: String },

    /// The tokenizer rejected the document
    #[error("{}: malformed document at {location}: {message}", .path.display())]
    MalformedDocument {
        path: PathBuf,
        location: Location,
        message: String,
    },

    /// The document does not satisfy its DTD
    #[error("{}: DTD validation failed at {location}: {message}", .path.display())]
    DtdViolation {
        path: PathBuf,
        location: Location,
        message: String,
    },

    /// The document does not satisfy the supplied XML schema
    #[error("{}: schema validation failed at {location}: {message}", .path.display())]
    SchemaViolation {
        path: PathBuf,
        location: Location,
        message: String,
    },

    /// The supplied XML schema could not be compiled
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// A tag filter pattern could not be parsed
    #[error("invalid tag filter '{tag}': {reason}")]
    InvalidTagFilter { tag: String, reason: String },

    /// A dispatched handler returned an error
    #[error("{}: handler failed on <{element}> at {location}: {source}", .path.display())]
    HandlerFailed {
        path: PathBuf,
        element: String,
        location: Location,
        #[source]
        source: HandlerError,
    },

    /// Any other I/O failure while reading the input
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build an `InvalidSchema` error
    pub(crate) fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Location of the failure, when the error has one
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::MalformedDocument { location, .. }
            | Error::DtdViolation { location, .. }
            | Error::SchemaViolation { location, .. }
            | Error::HandlerFailed { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// Fill in line and column for positional errors by re-reading the input
    pub(crate) fn with_resolved_location(mut self) -> Self {
        let path = match &self {
            Error::MalformedDocument { path, .. }
            | Error::DtdViolation { path, .. }
            | Error::SchemaViolation { path, .. }
            | Error::HandlerFailed { path, .. } => path.clone(),
            _ => return self,
        };
        match &mut self {
            Error::MalformedDocument { location, .. }
            | Error::DtdViolation { location, .. }
            | Error::SchemaViolation { location, .. }
            | Error::HandlerFailed { location, .. } => {
                *location = crate::core::location::resolve(&path, location.offset);
            }
            _ => {}
        }
        self
    }
}
