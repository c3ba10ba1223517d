//! Build-time diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One soft failure recovered during schema construction.
///
/// The builder never aborts on a malformed entry; it substitutes a default,
/// records one of these, and keeps going. Hosts decide whether to surface
/// them, log them, or refuse the configuration outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiagnostic {
    /// Document location, e.g. `class 0x12a4/cifMap 1/bit 33`.
    pub path: String,
    /// What was wrong and what was substituted.
    pub message: String,
}

impl SchemaDiagnostic {
    /// Create a diagnostic for the given document location.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl fmt::Display for SchemaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
