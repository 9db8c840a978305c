//! Renderers for parsed containers.

pub mod csv;

pub use csv::{escape_csv, CsvOptions, TimeFormat};
