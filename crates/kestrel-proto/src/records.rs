//! Array-of-records decoder.
//!
//! Array fields carry a self-describing nested structure: a leading total
//! length word, a packed size word, indicator bitmaps selecting optional
//! header and record sections, then header fields and `record_count`
//! fixed-stride records.
//!
//! The leading total-length word is authoritative for the outer cursor.
//! Internally computed sizes (header size, record stride, record count)
//! are validated against it and any disagreement is reported, but they are
//! never allowed to move the outer cursor: a malformed inner length must
//! not desynchronize the rest of the packet.

use kestrel_schema::{FieldSpec, RecordArraySpec, RecordSection, CIF_BITS};

use crate::{
    cursor::{read_bits, word_at, WORD_BYTES},
    fields::GroupDecoder,
    tree::{DecodedNode, Diagnostic, Severity},
};

/// Decode one array structure starting at `start_word`.
///
/// Returns the array node and the words consumed, which is always the
/// leading total-length word clamped to `budget` (never the internal sum).
pub fn decode_array(
    bytes: &[u8],
    spec: &RecordArraySpec,
    label: &str,
    path_id: &str,
    start_word: usize,
    budget: usize,
) -> (DecodedNode, usize) {
    let mut node = DecodedNode::branch(label, path_id, byte_range(bytes, start_word, 1));

    if budget == 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            "payload ends before array length word",
            node.byte_range.clone(),
        ));
        return (node, 0);
    }
    let Some(total_word) = word_at(bytes, start_word) else {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            "payload ends before array length word",
            node.byte_range.clone(),
        ));
        return (node, 0);
    };

    let total = total_word as usize;
    if total == 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Violation,
            "array declares a total length of zero words",
            node.byte_range.clone(),
        ));
        return (node, 1);
    }

    let consumed = total.min(budget);
    if total > budget {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            format!("array declares {total} words but only {budget} remain; truncated"),
            node.byte_range.clone(),
        ));
    }
    node.byte_range = byte_range(bytes, start_word, consumed);

    // Packed size word: header size (8) | record size (12) | record count (12).
    let Some(size_word) = (consumed >= 2).then(|| word_at(bytes, start_word + 1)).flatten() else {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            "array ends before its packed size word",
            node.byte_range.clone(),
        ));
        return (node, consumed);
    };
    let header_size = (size_word >> 24) as usize;
    let record_size = ((size_word >> 12) & 0xFFF) as usize;
    let record_count = (size_word & 0xFFF) as usize;

    let prefix = if spec.has_header_bitmap() { 4 } else { 3 };

    let record_bitmap = read_bitmap(bytes, start_word + 2, consumed, 3, &mut node);
    let header_bitmap = if spec.has_header_bitmap() {
        read_bitmap(bytes, start_word + 3, consumed, 4, &mut node)
    } else {
        0
    };

    if total != header_size + record_count * record_size {
        node.push_diagnostic(Diagnostic::new(
            Severity::Violation,
            format!(
                "array total {total} disagrees with header {header_size} + {record_count} x {record_size}; trusting the total"
            ),
            byte_range(bytes, start_word + 1, 1),
        ));
    }

    report_undefined_bits(header_bitmap, spec.header_mask, "header", &mut node);
    report_undefined_bits(record_bitmap, spec.record_mask, "record", &mut node);

    // Header fields occupy [prefix, header_size) relative to the array
    // start; `header_size` counts the prefix words.
    if header_size < prefix && header_size != 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Violation,
            format!("array header size {header_size} is smaller than its {prefix}-word prefix"),
            byte_range(bytes, start_word + 1, 1),
        ));
    }
    // `consumed` can be smaller than the prefix on truncated arrays, so
    // this is not a `clamp`.
    let header_end = header_size.max(prefix).min(consumed);
    decode_section_run(
        bytes,
        start_word + prefix,
        header_end.saturating_sub(prefix),
        header_bitmap & spec.header_mask,
        &spec.header_sections,
        &spec.required_header,
        &mut node,
    );

    // Records run from the end of the header to the authoritative total,
    // each at a fixed `record_size` stride.
    if record_count > 0 && record_size == 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Violation,
            format!("array declares {record_count} records of zero words; records skipped"),
            byte_range(bytes, start_word + 1, 1),
        ));
    } else {
        for index in 0..record_count {
            let record_start = start_word + header_end + index * record_size;
            if header_end + (index + 1) * record_size > consumed {
                node.push_diagnostic(Diagnostic::new(
                    Severity::Truncation,
                    format!("record {index} of {record_count} runs past the array; remaining records skipped"),
                    byte_range(bytes, record_start, record_size),
                ));
                break;
            }
            let record = decode_record(
                bytes,
                spec,
                record_bitmap & spec.record_mask,
                record_start,
                record_size,
                index,
            );
            node.children.push(record);
        }
    }

    (node, consumed)
}

fn decode_record(
    bytes: &[u8],
    spec: &RecordArraySpec,
    bitmap: u32,
    record_start: usize,
    record_size: usize,
    position: usize,
) -> DecodedNode {
    // Records are identified by their index field when the schema defines
    // one, by position otherwise.
    let label = match spec.index_offset {
        Some(offset) => {
            match read_bits(bytes, record_start, offset as usize, spec.index_width) {
                Some(index) => format!("record {index}"),
                None => format!("record {position}"),
            }
        },
        None => format!("record {position}"),
    };

    let mut node = DecodedNode::branch(label, "", byte_range(bytes, record_start, record_size));
    decode_section_run(
        bytes,
        record_start,
        record_size,
        bitmap,
        &spec.record_sections,
        &spec.required_record,
        &mut node,
    );
    node
}

/// Decode a required field list followed by the selected optional sections
/// in ascending bit order, laid out back to back within `region_words`.
fn decode_section_run(
    bytes: &[u8],
    base_word: usize,
    region_words: usize,
    bitmap: u32,
    sections: &[Option<RecordSection>; CIF_BITS],
    required: &[FieldSpec],
    parent: &mut DecodedNode,
) {
    let mut used = 0usize;

    if !required.is_empty() {
        let mut decoder = GroupDecoder::new(bytes, base_word, region_words);
        for field in required {
            parent.children.push(decoder.decode_field(field));
        }
        used = decoder.words_used();
    }

    for bit in 0..CIF_BITS as u8 {
        if bitmap & (1 << bit) == 0 {
            continue;
        }
        let Some(section) = &sections[bit as usize] else {
            // Undefined set bits were reported by the caller.
            continue;
        };
        let mut decoder =
            GroupDecoder::new(bytes, base_word + used, region_words.saturating_sub(used));
        let mut section_node = DecodedNode::branch(
            &section.name,
            &section.path_id,
            byte_range(bytes, base_word + used, 0),
        );
        for field in &section.fields {
            section_node.children.push(decoder.decode_field(field));
        }
        let section_words = decoder.words_used();
        section_node.byte_range = byte_range(bytes, base_word + used, section_words);
        used += section_words;
        parent.children.push(section_node);
    }
}

/// Read an indicator bitmap word at `word`, or report truncation and treat
/// it as empty.
fn read_bitmap(
    bytes: &[u8],
    word: usize,
    consumed: usize,
    needed: usize,
    node: &mut DecodedNode,
) -> u32 {
    if consumed >= needed {
        if let Some(bitmap) = word_at(bytes, word) {
            return bitmap;
        }
    }
    node.push_diagnostic(Diagnostic::new(
        Severity::Truncation,
        "array ends before its indicator bitmap",
        byte_range(bytes, word, 1),
    ));
    0
}

fn report_undefined_bits(bitmap: u32, mask: u32, side: &str, node: &mut DecodedNode) {
    let undefined = bitmap & !mask;
    if undefined != 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Violation,
            format!("{side} bitmap asserts undefined section bits {undefined:#010x}"),
            node.byte_range.clone(),
        ));
    }
}

fn byte_range(bytes: &[u8], start_word: usize, words: usize) -> std::ops::Range<usize> {
    let start = (start_word * WORD_BYTES).min(bytes.len());
    let end = start_word
        .saturating_add(words)
        .saturating_mul(WORD_BYTES)
        .min(bytes.len());
    start..end
}

#[cfg(test)]
mod tests {
    use kestrel_schema::{FieldKind, FieldSpec, RecordArraySpec, RecordSection, CIF_BITS};

    use super::*;
    use crate::tree::Value;

    fn field(name: &str, offset: u16, kind: FieldKind) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            path_id: format!("kestrel.arr.{}", name.to_lowercase()),
            bit_offset: offset,
            relative: false,
            kind,
            units: None,
            note: None,
        }
    }

    fn words(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    fn packed(header: u32, record: u32, count: u32) -> u32 {
        (header << 24) | (record << 12) | count
    }

    fn simple_spec() -> RecordArraySpec {
        RecordArraySpec {
            required_record: vec![field("Value", 0, FieldKind::UInt { width: 32 })],
            ..Default::default()
        }
    }

    #[test]
    fn decodes_fixed_records() {
        let spec = simple_spec();
        // total 5 = header 3 (prefix only) + 2 records of 1 word.
        let bytes = words(&[5, packed(3, 1, 2), 0, 0x0000_0011, 0x0000_0022]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 5);

        assert_eq!(consumed, 5);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].label, "record 0");
        assert_eq!(node.children[0].children[0].value, Value::Unsigned(0x11));
        assert_eq!(node.children[1].children[0].value, Value::Unsigned(0x22));
        assert!(node.diagnostics.is_empty());
    }

    #[test]
    fn total_word_is_authoritative_over_internal_sizes() {
        let spec = simple_spec();
        // Internal sum says 3 + 4 * 1 = 7, but the total word says 5. The
        // cursor must advance 5 and the mismatch must be reported.
        let bytes = words(&[5, packed(3, 1, 4), 0, 0x1, 0x2, 0xDEAD, 0xBEEF]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 7);

        assert_eq!(consumed, 5);
        assert!(node
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Violation && d.message.contains("trusting the total")));
        // Only the records that fit inside the authoritative total decode.
        assert_eq!(node.children.len(), 2);
        assert!(node
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Truncation && d.message.contains("record 2")));
    }

    #[test]
    fn total_clamped_to_budget() {
        let spec = simple_spec();
        let bytes = words(&[100, packed(3, 1, 97), 0, 0x1]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 4);
        assert_eq!(consumed, 4);
        assert!(node.diagnostics.iter().any(|d| d.severity == Severity::Truncation));
    }

    #[test]
    fn record_index_field_names_records() {
        let spec = RecordArraySpec {
            index_offset: Some(0),
            index_width: 8,
            required_record: vec![field("Value", 8, FieldKind::UInt { width: 8 })],
            ..Default::default()
        };
        let bytes = words(&[5, packed(3, 1, 2), 0, 0x2A11_0000, 0x0722_0000]);
        let (node, _) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 5);
        assert_eq!(node.children[0].label, "record 42");
        assert_eq!(node.children[1].label, "record 7");
        assert_eq!(node.children[0].children[0].value, Value::Unsigned(0x11));
    }

    #[test]
    fn optional_record_sections_in_ascending_order() {
        let mut record_sections: [Option<RecordSection>; CIF_BITS] = Default::default();
        record_sections[1] = Some(RecordSection {
            name: "One".into(),
            path_id: "kestrel.arr.rec.one".into(),
            fields: vec![field("A", 0, FieldKind::UInt { width: 32 })],
        });
        record_sections[4] = Some(RecordSection {
            name: "Four".into(),
            path_id: "kestrel.arr.rec.four".into(),
            fields: vec![field("B", 0, FieldKind::UInt { width: 32 })],
        });
        let spec = RecordArraySpec {
            record_sections,
            record_mask: (1 << 1) | (1 << 4),
            ..Default::default()
        };

        // One record of 2 words: section 1 then section 4.
        let bytes = words(&[5, packed(3, 2, 1), (1 << 1) | (1 << 4), 0xAAAA_0001, 0xBBBB_0004]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 5);

        assert_eq!(consumed, 5);
        let record = &node.children[0];
        assert_eq!(record.children.len(), 2);
        assert_eq!(record.children[0].label, "One");
        assert_eq!(record.children[0].children[0].value, Value::Unsigned(0xAAAA_0001));
        assert_eq!(record.children[1].label, "Four");
        assert_eq!(record.children[1].children[0].value, Value::Unsigned(0xBBBB_0004));
    }

    #[test]
    fn header_bitmap_word_present_only_when_sections_defined() {
        let mut header_sections: [Option<RecordSection>; CIF_BITS] = Default::default();
        header_sections[0] = Some(RecordSection {
            name: "Span".into(),
            path_id: "kestrel.arr.hdr.span".into(),
            fields: vec![field("Span", 0, FieldKind::UInt { width: 32 })],
        });
        let spec = RecordArraySpec {
            header_sections,
            header_mask: 1,
            required_record: vec![field("Value", 0, FieldKind::UInt { width: 32 })],
            ..Default::default()
        };

        // Prefix is 4 words (header bitmap present); header size 5 covers
        // prefix + one section word; one record of 1 word; total 6.
        let bytes = words(&[6, packed(5, 1, 1), 0, 1, 0x0000_0FFF, 0x0000_0001]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 6);

        assert_eq!(consumed, 6);
        assert_eq!(node.children[0].label, "Span");
        assert_eq!(node.children[0].children[0].value, Value::Unsigned(0xFFF));
        assert_eq!(node.children[1].label, "record 0");
        assert_eq!(node.children[1].children[0].value, Value::Unsigned(1));
        assert!(node.diagnostics.is_empty());
    }

    #[test]
    fn undefined_section_bits_are_reported() {
        let spec = simple_spec();
        let bytes = words(&[4, packed(3, 1, 1), 1 << 9, 0x1]);
        let (node, _) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 4);
        assert!(node
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Violation && d.message.contains("record bitmap")));
    }

    #[test]
    fn zero_total_is_a_violation_consuming_one_word() {
        let spec = simple_spec();
        let bytes = words(&[0, 0, 0]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 3);
        assert_eq!(consumed, 1);
        assert!(node.diagnostics.iter().any(|d| d.severity == Severity::Violation));
    }

    #[test]
    fn zero_record_size_with_records_is_refused() {
        let spec = simple_spec();
        let bytes = words(&[3, packed(3, 0, 5), 0]);
        let (node, consumed) = decode_array(&bytes, &spec, "Table", "kestrel.arr", 0, 3);
        assert_eq!(consumed, 3);
        assert!(node.children.is_empty());
        assert!(node
            .diagnostics
            .iter()
            .any(|d| d.message.contains("records of zero words")));
    }
}
