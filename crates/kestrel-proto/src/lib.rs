//! # Kestrel protocol: schema-driven wire decoding
//!
//! This crate interprets indicator-field packet payloads against a schema
//! built by `kestrel-schema`. Unlike a fixed-layout dissector, nothing here
//! knows any field offsets at compile time: a payload opens with 32-bit
//! indicator words whose set bits select which fields follow, fields can be
//! fixed-width bit spans, length-prefixed blobs, or recursively nested
//! arrays of records, and the schema decides all of it at run time.
//!
//! ## Decoding model
//!
//! 1. [`decode_payload`] resolves the packet's class against the schema's
//!    masked registration table.
//! 2. The [`walker`] drains CIF 0 and any linked indicator words into an
//!    ordered worklist of enabled field groups.
//! 3. The [`fields`] codec executes the worklist, each group consuming some
//!    number of words; array fields recurse through [`records`].
//! 4. Whatever is left is reported as an unparsed remainder.
//!
//! ## Security Properties
//!
//! - **Untrusted input**: every length, offset, and width is bounds-checked
//!   before use. There is no panic path for wire data and no `unsafe`
//!   anywhere in the crate.
//!
//! - **Best-effort degradation**: malformed data truncates the affected
//!   field, attaches a [`Diagnostic`], and decoding continues at a
//!   well-defined word boundary. A hostile packet can waste its own bytes,
//!   not the rest of the capture.
//!
//! - **Authoritative outer lengths**: self-described structures (arrays)
//!   advance the outer cursor by their leading length word regardless of
//!   what their internal sizes claim, so a malformed inner length cannot
//!   desynchronize subsequent fields.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cursor;
pub mod decoder;
pub mod errors;
pub mod fields;
pub mod records;
pub mod tree;
pub mod walker;

pub use cursor::WordCursor;
pub use decoder::{
    decode_payload, AckFlags, AckValidation, DecodeOptions, PacketContext, PacketType,
};
pub use errors::{DecodeError, Result};
pub use tree::{DecodedNode, DecodedTree, Diagnostic, Severity, Value};
pub use walker::{walk, EnabledGroup, WalkOutcome};
