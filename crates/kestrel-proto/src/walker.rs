//! Indicator-word walker.
//!
//! A packet payload opens with the CIF 0 indicator word; set bits either
//! enable a field group later in the payload or chain to a further
//! indicator word. The walker drains that graph into a flat, ordered
//! worklist of enabled field groups for the field codec to execute.
//!
//! # Bit-order asymmetry
//!
//! Within one indicator word, links are discovered in ascending bit order
//! (the chained CIF words appear on the wire in ascending indicator order)
//! while field groups are queued in descending bit order (fields are laid
//! out from the highest enable bit down). Both orders are wire
//! compatibility rules and are regression-tested; do not "simplify" them
//! into one loop.

use kestrel_schema::{ClassSpec, EnableBit, FieldGroup, CIF_BITS};

use crate::{
    cursor::WordCursor,
    tree::{Diagnostic, Severity},
};

/// One field group enabled by an indicator bit.
#[derive(Debug, Clone, Copy)]
pub struct EnabledGroup<'s> {
    /// Index of the CIF map whose bit enabled this group.
    pub cif_index: u8,
    /// Bit position within that indicator word.
    pub bit: u8,
    /// The schema binding.
    pub group: &'s FieldGroup,
}

/// Result of draining a class's indicator words.
#[derive(Debug, Default)]
pub struct WalkOutcome<'s> {
    /// Enabled field groups in decode order.
    pub groups: Vec<EnabledGroup<'s>>,
    /// Indicator words consumed.
    pub words_consumed: usize,
    /// Walk-level diagnostics (undefined bits, cycles, truncation).
    pub diagnostics: Vec<Diagnostic>,
}

/// Drain the indicator words at the cursor into an ordered group worklist.
///
/// Consumes exactly one word per CIF map visited. The worklist is FIFO and
/// seeded with CIF 0; link targets are visited in discovery order. A link
/// to an already-visited CIF index is a protocol violation (a crafted
/// packet could otherwise walk the chain forever) and is not followed.
pub fn walk<'s>(class: &'s ClassSpec, cursor: &mut WordCursor<'_>) -> WalkOutcome<'s> {
    let mut outcome = WalkOutcome::default();
    let mut worklist = std::collections::VecDeque::from([0u8]);
    let mut visited = [false; 256];
    visited[0] = true;

    while let Some(cif_index) = worklist.pop_front() {
        let word_pos = cursor.position();
        let word_range = cursor.byte_range(word_pos, 1);

        let Some(word) = cursor.read_word() else {
            outcome.diagnostics.push(Diagnostic::new(
                Severity::Truncation,
                format!("payload ends before indicator word for CIF {cif_index}"),
                word_range,
            ));
            break;
        };
        outcome.words_consumed += 1;

        let Some(map) = class.cif_map(cif_index) else {
            // The word is on the wire regardless; without a map definition
            // its bits cannot be interpreted.
            outcome.diagnostics.push(Diagnostic::new(
                Severity::Violation,
                format!("class defines no CIF map with index {cif_index}"),
                word_range,
            ));
            continue;
        };

        // Ascending pass: chain discovery plus undefined-bit reporting.
        for bit in 0..CIF_BITS as u8 {
            if word & (1 << bit) == 0 {
                continue;
            }
            match map.enable(bit) {
                EnableBit::Link(target) => {
                    if visited[*target as usize] {
                        outcome.diagnostics.push(Diagnostic::new(
                            Severity::Violation,
                            format!(
                                "CIF {cif_index} bit {bit} links to CIF {target}, which was already visited; link ignored"
                            ),
                            word_range.clone(),
                        ));
                    } else {
                        visited[*target as usize] = true;
                        worklist.push_back(*target);
                    }
                },
                EnableBit::Empty => {
                    outcome.diagnostics.push(Diagnostic::new(
                        Severity::Violation,
                        format!("undefined indicator bit {bit} set in CIF {cif_index}"),
                        word_range.clone(),
                    ));
                },
                EnableBit::Group(_) => {},
            }
        }

        // Descending pass: field decode order.
        for bit in (0..CIF_BITS as u8).rev() {
            if word & (1 << bit) == 0 {
                continue;
            }
            if let EnableBit::Group(group) = map.enable(bit) {
                outcome.groups.push(EnabledGroup { cif_index, bit, group });
            }
        }
    }

    tracing::debug!(
        groups = outcome.groups.len(),
        indicator_words = outcome.words_consumed,
        diagnostics = outcome.diagnostics.len(),
        "indicator walk complete"
    );
    outcome
}
