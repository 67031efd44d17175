//! Output sinks implementing [`Handler`](crate::handler::Handler)

pub mod csv;

pub use csv::CsvRowWriter;
