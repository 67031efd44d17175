//! Core XML primitives
//!
//! - Encoding: UTF-8 gate and BOM handling
//! - Location: byte offset to line/column resolution for error reports
//! - QName: namespace-aware names and Clark notation

pub mod encoding;
pub mod location;
pub mod qname;
