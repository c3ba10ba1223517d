//! Shared fixtures for Kestrel decoder testing.
//!
//! This crate provides the building blocks the cross-crate tests (and the
//! fuzz targets) use: a word-oriented packet buffer writer mirroring the
//! decoder's wire conventions, and programmatic schema documents covering
//! the field kinds and structures the decoder supports.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod words;

pub use fixtures::{build_schema, signal_schema_doc};
pub use words::WordWriter;
