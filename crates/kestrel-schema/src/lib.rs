//! # Kestrel schema: model and builder
//!
//! This crate owns the schema side of the Kestrel decoder: the immutable
//! model describing protocol classes, indicator-word maps, field layouts,
//! and nested record arrays, plus the builder that constructs the model
//! from a generic hierarchical markup document.
//!
//! ## Lifecycle
//!
//! A schema is built once at configuration load and shared read-only via
//! [`SchemaHandle`] for the life of the process. Decoding never mutates the
//! model; hosts that support hot reload build a new handle and swap the
//! reference, so in-flight decodes always see a consistent schema.
//!
//! ## Failure discipline
//!
//! The builder recovers from malformed schema entries locally (substitute a
//! default, record a [`SchemaDiagnostic`], continue) and fails the whole
//! build only when no usable schema can come out of the document. Wire-data
//! failure handling lives in `kestrel-proto`, not here.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod diagnostics;
pub mod errors;
pub mod markup;
pub mod model;
mod resolver;

pub use builder::SchemaBuilder;
pub use diagnostics::SchemaDiagnostic;
pub use errors::{Result, SchemaError};
pub use markup::MarkupNode;
pub use model::{
    Annotation, CifMap, ClassId, ClassSpec, EnableBit, EnumEntry, EnumTable, ExtensionArea,
    FieldGroup, FieldKind, FieldSpec, NoteLevel, RecordArraySpec, RecordSection, Registration,
    Schema, SchemaHandle, WarnErrBit, CIF_BITS,
};
