//! Error types for schema construction.
//!
//! Almost every problem in a schema document is recovered locally and
//! recorded as a [`SchemaDiagnostic`](crate::diagnostics::SchemaDiagnostic);
//! `SchemaError` is reserved for documents the builder cannot produce a
//! usable schema from at all.

use thiserror::Error;

/// Fatal schema construction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The markup root is not a schema document.
    #[error("markup root element `{0}` is not a schema document")]
    NotASchema(String),

    /// No class declaration survived soft-failure recovery.
    #[error("schema document contains no usable class definitions")]
    NoClasses,
}

/// Convenient Result type alias for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
