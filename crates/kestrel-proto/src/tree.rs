//! Decoded output tree.
//!
//! Decoding produces a generic ordered tree of labeled values with byte
//! ranges and attached diagnostics. The tree is intentionally decoupled
//! from any display or reporting library: hosts walk it, render it, filter
//! on it, or serialize it as they see fit.

use std::ops::Range;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A decoded scalar or span value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// No value; branch nodes and truncated fields.
    Empty,
    /// Boolean flag.
    Bool(bool),
    /// Unsigned integer, including hex-displayed fields.
    Unsigned(u64),
    /// Signed integer.
    Signed(i64),
    /// Fixed-point fields converted to a real number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque byte span.
    Bytes(Bytes),
    /// Enumerated value with an optional display label.
    ///
    /// `label` is `None` for codes the schema table does not define;
    /// unknown codes are normal data, not a protocol violation.
    EnumLabel {
        /// Raw wire value.
        code: u64,
        /// Display label, when the table defines one.
        label: Option<String>,
    },
}

/// Diagnostic severity, mirroring the decode failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Schema-author annotation or advisory.
    Note,
    /// Suspicious but decodable, e.g. fixed-point precision loss.
    Warning,
    /// Protocol violation; decoding continued on a best-effort basis.
    Violation,
    /// Declared length exceeded the buffer; the field was truncated.
    Truncation,
}

/// One diagnostic attached to a node or to the packet as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Diagnostic {
    /// Severity class.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Offending byte range within the packet payload.
    pub byte_range: Range<usize>,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(severity: Severity, message: impl Into<String>, byte_range: Range<usize>) -> Self {
        Self { severity, message: message.into(), byte_range }
    }
}

/// One node of the decoded tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedNode {
    /// Display label.
    pub label: String,
    /// Hierarchical display key from the schema, empty for synthetic nodes
    /// (remainders, per-record containers).
    pub path_id: String,
    /// Decoded value; `Empty` for branch nodes.
    pub value: Value,
    /// Byte range this node covers within the packet payload.
    pub byte_range: Range<usize>,
    /// Diagnostics attached to this node.
    pub diagnostics: Vec<Diagnostic>,
    /// Child nodes in decode order.
    pub children: Vec<DecodedNode>,
}

impl DecodedNode {
    /// Create a leaf node.
    pub fn leaf(
        label: impl Into<String>,
        path_id: impl Into<String>,
        value: Value,
        byte_range: Range<usize>,
    ) -> Self {
        Self {
            label: label.into(),
            path_id: path_id.into(),
            value,
            byte_range,
            diagnostics: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create a branch node; the value stays `Empty`.
    pub fn branch(
        label: impl Into<String>,
        path_id: impl Into<String>,
        byte_range: Range<usize>,
    ) -> Self {
        Self::leaf(label, path_id, Value::Empty, byte_range)
    }

    /// Attach a diagnostic, builder style.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Append a diagnostic.
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Depth-first iterator over this node and all descendants.
    pub fn iter(&self) -> impl Iterator<Item = &DecodedNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            // Reverse so children come out in decode order.
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// A fully decoded packet payload.
///
/// `diagnostics` holds packet-level findings (unresolved class, walker
/// findings, acknowledge flag violations); per-field findings live on the
/// nodes they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTree {
    /// Top-level nodes in decode order.
    pub nodes: Vec<DecodedNode>,
    /// Packet-level diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Words the decode consumed, including indicator words.
    pub words_consumed: usize,
}

impl DecodedTree {
    /// Depth-first iterator over every node in the tree.
    pub fn iter(&self) -> impl Iterator<Item = &DecodedNode> {
        self.nodes.iter().flat_map(DecodedNode::iter)
    }

    /// First node with the given path id, searching depth-first.
    pub fn find(&self, path_id: &str) -> Option<&DecodedNode> {
        self.iter().find(|node| node.path_id == path_id)
    }

    /// All diagnostics in the tree, packet-level first, then per-node in
    /// decode order.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().chain(self.iter().flat_map(|node| node.diagnostics.iter()))
    }

    /// Highest severity present anywhere in the tree.
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.all_diagnostics().map(|d| d.severity).max()
    }
}
