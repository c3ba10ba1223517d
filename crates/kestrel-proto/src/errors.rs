//! Error types for the decode path.
//!
//! Wire-level problems in untrusted packets are not errors here: they
//! degrade to diagnostics attached to the decoded tree so that one bad
//! field never costs the caller the rest of the packet. `DecodeError`
//! covers the remaining hard failures inside the codec, all of which the
//! entry point converts into diagnostics before returning.

use thiserror::Error;

/// Internal decode failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field or structure needs more words than the remaining budget.
    #[error("insufficient words: needed {needed}, remaining {remaining}")]
    Insufficient {
        /// Words the structure declared or required.
        needed: usize,
        /// Words actually left in the budget.
        remaining: usize,
    },

    /// A `Link` pseudo-field reached the field codec.
    ///
    /// Links are walk instructions for the indicator walker; a schema that
    /// routes one into a field group is inconsistent.
    #[error("link pseudo-field reached the field codec")]
    LinkInCodec,
}

/// Convenient Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
