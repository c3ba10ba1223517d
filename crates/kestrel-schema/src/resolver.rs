//! Run-time class resolution.
//!
//! A packet carries a numeric class identifier; the schema carries masked
//! registrations. Resolution is a linear scan in authoring order: schemas
//! register a handful of classes, so a lookup structure would buy nothing.

use crate::model::{ClassSpec, Schema};

impl Schema {
    /// Resolve a packet's class identifier against the registration table.
    ///
    /// A registration matches when `(id & mask) == (base & mask)`; the first
    /// match in authoring order wins, making resolution deterministic.
    ///
    /// Misses are returned as `None` rather than silently falling back to
    /// the default class: a caller that wants wildcard behavior opts in via
    /// [`Schema::default_class_spec`], because an unresolved class can mean
    /// a genuinely unknown protocol and should usually be loud.
    pub fn resolve_class(&self, class_id: u64) -> Option<&ClassSpec> {
        self.registrations
            .iter()
            .find(|reg| (class_id & reg.mask) == (reg.base & reg.mask))
            .map(|reg| &self.classes[reg.class])
    }

    /// The designated wildcard fallback class, if the schema declares one.
    pub fn default_class_spec(&self) -> Option<&ClassSpec> {
        self.default_class.map(|index| &self.classes[index])
    }
}
