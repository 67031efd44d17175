//! XML Reader Module
//!
//! - EventSource: forward-only event stream over a buffered input
//! - Events: owned event types shared by the walker and the validators

pub mod events;
pub mod source;

pub use events::{SourceEvent, StartTag};
pub use source::{EventSource, SourceOptions};
