//! Field codec.
//!
//! Decodes one schema-described field at a time against a word budget.
//! All fields of one enable bit share a [`GroupDecoder`], whose
//! accumulator implements relative-offset chaining: a field marked
//! `relative` starts where the previous variable-length field of the same
//! group ended.
//!
//! The codec never reads out of bounds and never panics on wire data.
//! When a declared length or width runs past the budget the field is
//! truncated, a diagnostic is attached, and the group still reports a
//! well-defined word consumption so the outer cursor stays consistent.

use bytes::Bytes;
use kestrel_schema::{Annotation, FieldGroup, FieldKind, FieldSpec, NoteLevel};

use crate::{
    cursor::{read_bits, sign_extend, WORD_BITS, WORD_BYTES},
    errors::DecodeError,
    records,
    tree::{DecodedNode, Diagnostic, Severity, Value},
};

/// Mantissa bits of an `f64`; raw fixed-point values needing more
/// significant bits than this cannot be represented exactly.
const F64_EXACT_BITS: u32 = 52;

/// Per-group decode state.
///
/// `budget` is fixed at construction; `words_used` is a high-water mark
/// and never exceeds it. Several narrow fields can share one word (two
/// 16-bit fields at offsets 0 and 16), so consumption is the maximum word
/// any field touched, not a running sum.
#[derive(Debug)]
pub struct GroupDecoder<'a> {
    bytes: &'a [u8],
    start_word: usize,
    budget: usize,
    words_used: usize,
    bits_consumed: usize,
}

impl<'a> GroupDecoder<'a> {
    /// Decoder for a group starting at `start_word` with at most `budget`
    /// words available.
    #[must_use]
    pub fn new(bytes: &'a [u8], start_word: usize, budget: usize) -> Self {
        Self { bytes, start_word, budget, words_used: 0, bits_consumed: 0 }
    }

    /// Words consumed so far (high-water mark).
    #[must_use]
    pub fn words_used(&self) -> usize {
        self.words_used
    }

    /// Decode one field and return its tree node.
    pub fn decode_field(&mut self, field: &FieldSpec) -> DecodedNode {
        let offset = if field.relative {
            field.bit_offset as usize + self.bits_consumed
        } else {
            field.bit_offset as usize
        };

        let label = match &field.units {
            Some(units) => format!("{} ({units})", field.name),
            None => field.name.clone(),
        };

        let mut node = match &field.kind {
            FieldKind::Bool => self.scalar(field, &label, offset, 1, |raw, _| Value::Bool(raw != 0)),
            FieldKind::UInt { width } | FieldKind::Hex { width } => {
                self.scalar(field, &label, offset, *width, |raw, _| Value::Unsigned(raw))
            },
            FieldKind::Int { width } => self.scalar(field, &label, offset, *width, |raw, _| {
                Value::Signed(sign_extend(raw, *width))
            }),
            FieldKind::Enum { width, table } => {
                self.scalar(field, &label, offset, *width, |raw, _| Value::EnumLabel {
                    code: raw,
                    label: table.label(raw).map(str::to_string),
                })
            },
            FieldKind::Fixed { width, point, scale } => {
                let (point, scale) = (*point, *scale);
                self.scalar(field, &label, offset, *width, |raw, node| {
                    let signed = sign_extend(raw, *width);
                    check_precision(signed.unsigned_abs(), node);
                    Value::Real(signed as f64 * scale / 2f64.powi(i32::from(point)))
                })
            },
            FieldKind::UFixed { width, point, scale } => {
                let (point, scale) = (*point, *scale);
                self.scalar(field, &label, offset, *width, |raw, node| {
                    check_precision(raw, node);
                    Value::Real(raw as f64 * scale / 2f64.powi(i32::from(point)))
                })
            },
            FieldKind::Raw { width } => self.raw(field, &label, offset, *width),
            FieldKind::Dynamic { length_width } => {
                self.length_prefixed(field, &label, offset, *length_width, false)
            },
            FieldKind::Utf8 { length_width } => {
                self.length_prefixed(field, &label, offset, *length_width, true)
            },
            FieldKind::Array(spec) => {
                let first_word = offset / WORD_BITS;
                let mut pre_diag = None;
                if offset % WORD_BITS != 0 {
                    pre_diag = Some(Diagnostic::new(
                        Severity::Violation,
                        format!("array `{}` is not word aligned; aligned down", field.name),
                        self.bit_byte_range(offset, 1),
                    ));
                }
                let (mut node, consumed) = records::decode_array(
                    self.bytes,
                    spec,
                    &label,
                    &field.path_id,
                    self.start_word + first_word,
                    self.budget.saturating_sub(first_word),
                );
                if let Some(diag) = pre_diag {
                    node.push_diagnostic(diag);
                }
                self.words_used = self.words_used.max(first_word + consumed);
                self.bits_consumed = self.bits_consumed.max((first_word + consumed) * WORD_BITS);
                node
            },
            FieldKind::Link { target } => {
                // Walk instruction, not wire data; reaching it here means
                // the schema routed a link into a field group.
                let err = DecodeError::LinkInCodec;
                DecodedNode::leaf(&label, &field.path_id, Value::Empty, self.bit_byte_range(offset, 0))
                    .with_diagnostic(Diagnostic::new(
                        Severity::Violation,
                        format!("{err} (link target CIF {target})"),
                        self.bit_byte_range(offset, 0),
                    ))
            },
        };

        if let Some(note) = &field.note {
            node.push_diagnostic(annotation_diag(note, node.byte_range.clone()));
        }
        node
    }

    /// Decode a fixed-width scalar positioned within one or two words.
    fn scalar(
        &mut self,
        field: &FieldSpec,
        label: &str,
        offset: usize,
        width: u8,
        convert: impl FnOnce(u64, &mut DecodedNode) -> Value,
    ) -> DecodedNode {
        let end_bit = offset + width as usize;
        let needed = end_bit.div_ceil(WORD_BITS);
        let range = self.bit_byte_range(offset, width as usize);
        let mut node = DecodedNode::leaf(label, &field.path_id, Value::Empty, range.clone());

        if needed > self.budget {
            self.truncate(&mut node, DecodeError::Insufficient {
                needed,
                remaining: self.budget,
            });
            return node;
        }
        let Some(raw) = read_bits(self.bytes, self.start_word, offset, width) else {
            self.truncate(&mut node, DecodeError::Insufficient {
                needed,
                remaining: self.budget,
            });
            return node;
        };

        self.words_used = self.words_used.max(needed);
        self.bits_consumed = self.bits_consumed.max(end_bit);
        let value = convert(raw, &mut node);
        node.value = value;
        node
    }

    /// Decode an opaque fixed-width span, rounded out to whole words.
    fn raw(&mut self, field: &FieldSpec, label: &str, offset: usize, width: u16) -> DecodedNode {
        let first_word = offset / WORD_BITS;
        let end_word = (offset + width as usize).div_ceil(WORD_BITS);
        let range = self.word_range(first_word, end_word);
        let mut node = DecodedNode::leaf(label, &field.path_id, Value::Empty, range);

        let clamped_end = if end_word > self.budget {
            self.truncate(&mut node, DecodeError::Insufficient {
                needed: end_word,
                remaining: self.budget,
            });
            self.budget
        } else {
            self.words_used = self.words_used.max(end_word);
            self.bits_consumed = self.bits_consumed.max(end_word * WORD_BITS);
            end_word
        };

        if clamped_end > first_word {
            node.value = Value::Bytes(self.copy_words(first_word, clamped_end));
        }
        node
    }

    /// Decode a length-prefixed blob or string. The prefix counts payload
    /// words; the payload begins at the next word boundary after the
    /// prefix field.
    fn length_prefixed(
        &mut self,
        field: &FieldSpec,
        label: &str,
        offset: usize,
        length_width: u8,
        text: bool,
    ) -> DecodedNode {
        let prefix_end = offset + length_width as usize;
        let payload_start = prefix_end.div_ceil(WORD_BITS);
        let mut node = DecodedNode::leaf(
            label,
            &field.path_id,
            Value::Empty,
            self.bit_byte_range(offset, length_width as usize),
        );

        if payload_start > self.budget {
            self.truncate(&mut node, DecodeError::Insufficient {
                needed: payload_start,
                remaining: self.budget,
            });
            return node;
        }
        let Some(declared) = read_bits(self.bytes, self.start_word, offset, length_width) else {
            self.truncate(&mut node, DecodeError::Insufficient {
                needed: payload_start,
                remaining: self.budget,
            });
            return node;
        };

        // The prefix is attacker-controlled; clamp before any arithmetic
        // that could overflow or run the payload past the buffer.
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        let total = payload_start.saturating_add(declared);
        let payload_words = if total > self.budget {
            node.push_diagnostic(Diagnostic::new(
                Severity::Truncation,
                format!(
                    "declared length {declared} words exceeds remaining budget; payload truncated"
                ),
                self.bit_byte_range(offset, length_width as usize),
            ));
            self.budget - payload_start
        } else {
            declared
        };

        let end_word = payload_start + payload_words;
        self.words_used = self.words_used.max(end_word);
        self.bits_consumed = self.bits_consumed.max(end_word * WORD_BITS);
        node.byte_range = self.word_range_bits(offset, end_word);

        let payload = self.copy_words(payload_start, end_word);
        node.value = if text {
            // Strings are NUL padded out to the word boundary.
            let trimmed: &[u8] = {
                let mut slice = payload.as_ref();
                while let [rest @ .., 0] = slice {
                    slice = rest;
                }
                slice
            };
            match std::str::from_utf8(trimmed) {
                Ok(text) => Value::Text(text.to_string()),
                Err(_) => {
                    node.push_diagnostic(Diagnostic::new(
                        Severity::Violation,
                        "string payload is not valid UTF-8; decoded lossily",
                        node.byte_range.clone(),
                    ));
                    Value::Text(String::from_utf8_lossy(trimmed).into_owned())
                },
            }
        } else {
            Value::Bytes(payload)
        };
        node
    }

    /// Record a truncation: the remaining budget is consumed so the caller
    /// advances to a well-defined boundary.
    fn truncate(&mut self, node: &mut DecodedNode, err: DecodeError) {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            err.to_string(),
            node.byte_range.clone(),
        ));
        self.words_used = self.budget;
        self.bits_consumed = self.bits_consumed.max(self.budget * WORD_BITS);
    }

    fn copy_words(&self, first_word: usize, end_word: usize) -> Bytes {
        Bytes::copy_from_slice(&self.bytes[self.word_range(first_word, end_word)])
    }

    /// Byte range of whole group-relative words, clamped to the buffer.
    fn word_range(&self, first_word: usize, end_word: usize) -> std::ops::Range<usize> {
        let base = self.start_word * WORD_BYTES;
        let start = (base + first_word * WORD_BYTES).min(self.bytes.len());
        let end = (base + end_word * WORD_BYTES).min(self.bytes.len());
        start..end
    }

    /// Byte range from a bit offset through the end of `end_word`.
    fn word_range_bits(&self, bit_offset: usize, end_word: usize) -> std::ops::Range<usize> {
        let base = self.start_word * WORD_BYTES;
        let start = (base + bit_offset / 8).min(self.bytes.len());
        let end = (base + end_word * WORD_BYTES).min(self.bytes.len());
        start..end
    }

    /// Byte range covering a bit span, clamped to the buffer.
    fn bit_byte_range(&self, bit_offset: usize, bits: usize) -> std::ops::Range<usize> {
        let base = self.start_word * WORD_BYTES;
        let start = (base + bit_offset / 8).min(self.bytes.len());
        let end = (base + (bit_offset + bits).div_ceil(8)).min(self.bytes.len());
        start..end
    }
}

/// Decode a whole enable-bit group as one branch node.
///
/// Returns the node and the words the group consumed; consumption is at
/// least one word for any group that decoded at all, because fields occupy
/// whole words on the wire.
pub fn decode_group(
    bytes: &[u8],
    group: &FieldGroup,
    start_word: usize,
    budget: usize,
) -> (DecodedNode, usize) {
    let mut decoder = GroupDecoder::new(bytes, start_word, budget);
    let mut node = DecodedNode::branch(
        &group.name,
        &group.path_id,
        decoder.word_range(0, budget.max(1)),
    );
    if let Some(note) = &group.note {
        node.push_diagnostic(annotation_diag(note, node.byte_range.clone()));
    }

    if budget == 0 {
        node.push_diagnostic(Diagnostic::new(
            Severity::Truncation,
            format!("payload ends before group `{}`", group.name),
            node.byte_range.clone(),
        ));
        return (node, 0);
    }

    for field in &group.fields {
        let child = decoder.decode_field(field);
        node.children.push(child);
    }

    let consumed = decoder.words_used().clamp(1, budget);
    node.byte_range = decoder.word_range(0, consumed);
    (node, consumed)
}

/// Attach a precision warning when a raw magnitude cannot be represented
/// exactly in an `f64`.
fn check_precision(magnitude: u64, node: &mut DecodedNode) {
    let significant = u64::BITS - magnitude.leading_zeros();
    if significant >= F64_EXACT_BITS {
        node.push_diagnostic(Diagnostic::new(
            Severity::Warning,
            format!("fixed-point value needs {significant} significant bits; decoded value is inexact"),
            node.byte_range.clone(),
        ));
    }
}

/// Convert a schema annotation into a tree diagnostic.
pub fn annotation_diag(note: &Annotation, range: std::ops::Range<usize>) -> Diagnostic {
    let severity = match note.level {
        NoteLevel::Note => Severity::Note,
        NoteLevel::Warn => Severity::Warning,
        NoteLevel::Error => Severity::Violation,
    };
    Diagnostic::new(severity, note.text.clone(), range)
}
