//! Vital File Tools (VFT) Library
//!
//! A Rust library for parsing, resampling, and re-encoding VITA
//! physiological recording containers.

pub mod config;
pub mod export;
pub mod stream;
pub mod vital;

pub use config::Config;
pub use stream::{ByteReader, ByteView, ByteWriter, FieldRead, StreamError};
pub use vital::{
    Catalog, CatalogBuilder, CellPolicy, DataPass, Grid, GridOptions, RawPacket, TrackSelector,
    VitalError,
};
