//! Packet entry point.
//!
//! Ties the pieces together: resolve the packet's class, drain the
//! indicator words, execute the enabled field groups in walker order, and
//! report whatever is left as an unparsed remainder. Acknowledge packets
//! reporting warnings or errors take a different field path: each enabled
//! group stands for a 32-bit status bitmap labeled from the class catalog
//! rather than a field value.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use kestrel_schema::{ClassId, ClassSpec, Schema};

use crate::{
    cursor::WordCursor,
    fields::{annotation_diag, decode_group, GroupDecoder},
    tree::{DecodedNode, DecodedTree, Diagnostic, Severity, Value},
    walker,
};

/// Packet type of the payload being decoded.
///
/// The numeric values are the wire packet-type codes; only the
/// indicator-field packet types are decodable by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum PacketType {
    /// Context packet.
    Context = 4,
    /// Extension context packet.
    ExtensionContext = 5,
    /// Command packet.
    Command = 6,
    /// Extension command packet.
    ExtensionCommand = 7,
}

impl PacketType {
    /// Convert from the raw wire code.
    ///
    /// Returns `None` for packet types this decoder does not handle;
    /// callers route those to their fixed-layout dissectors instead.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            4 => Some(Self::Context),
            5 => Some(Self::ExtensionContext),
            6 => Some(Self::Command),
            7 => Some(Self::ExtensionCommand),
            _ => None,
        }
    }

    /// Raw wire code.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this is a command-family packet (plain or extension).
    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self, Self::Command | Self::ExtensionCommand)
    }
}

bitflags! {
    /// Acknowledge subtype and report flags.
    ///
    /// The low nibble selects the acknowledge subtype; `WARNINGS` and
    /// `ERRORS` mark that the payload carries status bitmaps instead of
    /// field values. Unknown bits are preserved but never checked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AckFlags: u8 {
        /// Validation acknowledge.
        const VALIDATION = 0b0000_0001;

        /// Execution acknowledge.
        const EXECUTION = 0b0000_0010;

        /// State/query acknowledge.
        const STATE = 0b0000_0100;

        /// Unsolicited acknowledge.
        const UNSOLICITED = 0b0000_1000;

        /// Payload carries warning bitmaps.
        const WARNINGS = 0b0001_0000;

        /// Payload carries error bitmaps.
        const ERRORS = 0b0010_0000;
    }
}

impl AckFlags {
    /// Create flags from a raw byte, preserving unknown bits.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    /// Raw byte value.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.bits()
    }

    /// How many subtype selector bits are asserted.
    #[must_use]
    pub fn subtype_count(self) -> u32 {
        (self & (Self::VALIDATION | Self::EXECUTION | Self::STATE | Self::UNSOLICITED))
            .bits()
            .count_ones()
    }

    /// Whether the payload carries status bitmaps instead of field values.
    #[must_use]
    pub fn reports_status(self) -> bool {
        self.intersects(Self::WARNINGS | Self::ERRORS)
    }
}

/// How strictly acknowledge subtype flags are validated.
///
/// The underlying format rule ("exactly one subtype, and a state
/// acknowledge never carries reports") is not clearly a protocol
/// requirement everywhere it appears in the wild, so the check is
/// configurable instead of hard-wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckValidation {
    /// Flag violations are protocol violations.
    #[default]
    Strict,
    /// Flag violations are demoted to notes.
    Lenient,
}

/// Caller-selected decode policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Retry an unresolved class against the default class instead of
    /// reporting the payload as opaque. Off by default: silently falling
    /// back can mask a genuinely unknown protocol class.
    pub fallback_to_default: bool,
    /// Acknowledge flag validation mode.
    pub ack_validation: AckValidation,
}

/// Per-packet context supplied by the outer framing dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketContext {
    /// Packet type from the outer header.
    pub packet_type: PacketType,
    /// Class identifier, when the outer header carried one.
    pub class_id: Option<ClassId>,
    /// Acknowledge flags, for acknowledge command packets.
    pub ack: Option<AckFlags>,
}

/// Decode one packet payload against a schema.
///
/// Never fails: malformed wire data degrades to diagnostics in the
/// returned tree, and an unresolvable class produces an opaque payload
/// node plus a violation. The payload is the packet body after the outer
/// framing header, starting at the CIF 0 indicator word.
pub fn decode_payload(
    schema: &Schema,
    bytes: &[u8],
    packet: &PacketContext,
    options: &DecodeOptions,
) -> DecodedTree {
    let mut diagnostics = Vec::new();

    let Some(class) = resolve(schema, packet, options, &mut diagnostics) else {
        diagnostics.push(Diagnostic::new(
            Severity::Violation,
            match packet.class_id {
                Some(id) => format!(
                    "no registered class matches identifier {:#016x} and no default applies",
                    id.to_u64()
                ),
                None => "packet carries no class identifier and the schema has no default class"
                    .to_string(),
            },
            0..bytes.len(),
        ));
        return DecodedTree {
            nodes: vec![DecodedNode::leaf(
                "payload",
                "",
                Value::Bytes(Bytes::copy_from_slice(bytes)),
                0..bytes.len(),
            )],
            diagnostics,
            words_consumed: 0,
        };
    };

    if let Some(note) = &class.note {
        diagnostics.push(annotation_diag(note, 0..bytes.len()));
    }
    if let Some(ack) = packet.ack {
        validate_ack(ack, options.ack_validation, bytes.len(), &mut diagnostics);
    }

    let mut cursor = WordCursor::new(bytes);
    let walk = walker::walk(class, &mut cursor);
    diagnostics.extend(walk.diagnostics);

    let status = packet.ack.filter(|ack| ack.reports_status());
    let mut nodes = Vec::with_capacity(walk.groups.len() + 1);

    for enabled in &walk.groups {
        if let Some(ack) = status {
            decode_status_group(class, enabled, ack, &mut cursor, &mut nodes);
        } else {
            let (node, consumed) =
                decode_group(cursor.bytes(), enabled.group, cursor.position(), cursor.remaining());
            cursor.advance(consumed);
            nodes.push(node);
        }
    }

    if packet.packet_type.is_command() {
        decode_extension(class, &mut cursor, &mut nodes, &mut diagnostics);
    }

    let words_consumed = cursor.position();
    if cursor.remaining() > 0 || cursor.trailing_bytes() > 0 {
        let range = words_consumed * 4..bytes.len();
        nodes.push(DecodedNode::leaf(
            "unparsed",
            "",
            Value::Bytes(Bytes::copy_from_slice(&bytes[range.clone()])),
            range,
        ));
    }

    tracing::debug!(
        class_id = class.class_id,
        groups = walk.groups.len(),
        words_consumed,
        diagnostics = diagnostics.len(),
        "payload decoded"
    );

    DecodedTree { nodes, diagnostics, words_consumed }
}

/// Class resolution with the caller-selected default fallback policy.
fn resolve<'s>(
    schema: &'s Schema,
    packet: &PacketContext,
    options: &DecodeOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<&'s ClassSpec> {
    match packet.class_id {
        Some(id) => {
            let resolved = schema.resolve_class(id.to_u64());
            if resolved.is_some() {
                return resolved;
            }
            if options.fallback_to_default {
                let fallback = schema.default_class_spec();
                if fallback.is_some() {
                    diagnostics.push(Diagnostic::new(
                        Severity::Note,
                        format!(
                            "class identifier {:#016x} is unregistered; decoding with the default class",
                            id.to_u64()
                        ),
                        0..0,
                    ));
                }
                return fallback;
            }
            None
        },
        // A packet without a class identifier can only mean the wildcard
        // class.
        None => schema.default_class_spec(),
    }
}

fn validate_ack(
    ack: AckFlags,
    mode: AckValidation,
    payload_len: usize,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let severity = match mode {
        AckValidation::Strict => Severity::Violation,
        AckValidation::Lenient => Severity::Note,
    };
    if ack.subtype_count() != 1 {
        diagnostics.push(Diagnostic::new(
            severity,
            format!(
                "acknowledge flags {:#04x} must assert exactly one subtype (validation, execution, state, unsolicited)",
                ack.to_byte()
            ),
            0..payload_len,
        ));
    }
    if ack.contains(AckFlags::STATE) && ack.reports_status() {
        diagnostics.push(Diagnostic::new(
            severity,
            "state acknowledge must not carry warning or error reports",
            0..payload_len,
        ));
    }
}

/// Decode the status bitmaps an acknowledge packet carries in place of one
/// enabled field group: one word per asserted report flag, warnings first.
fn decode_status_group(
    class: &ClassSpec,
    enabled: &walker::EnabledGroup<'_>,
    ack: AckFlags,
    cursor: &mut WordCursor<'_>,
    nodes: &mut Vec<DecodedNode>,
) {
    let kinds: [(AckFlags, &str); 2] =
        [(AckFlags::WARNINGS, "warnings"), (AckFlags::ERRORS, "errors")];

    for (flag, kind) in kinds {
        if !ack.contains(flag) {
            continue;
        }
        let range = cursor.byte_range(cursor.position(), 1);
        let label = format!("{} {kind}", enabled.group.name);
        let path_id = format!("{}.{kind}", enabled.group.path_id);

        let Some(word) = cursor.read_word() else {
            nodes.push(
                DecodedNode::leaf(label, path_id, Value::Empty, range.clone()).with_diagnostic(
                    Diagnostic::new(
                        Severity::Truncation,
                        format!("payload ends before {kind} bitmap"),
                        range,
                    ),
                ),
            );
            continue;
        };

        let mut node = DecodedNode::leaf(label, path_id, Value::Unsigned(u64::from(word)), range.clone());
        for bit in (0..32u8).rev() {
            if word & (1 << bit) == 0 {
                continue;
            }
            let child = match class.warn_err_bits.get(&bit) {
                Some(entry) => {
                    let mut child =
                        DecodedNode::leaf(&entry.name, "", Value::Bool(true), range.clone());
                    if !entry.description.is_empty() {
                        child.push_diagnostic(Diagnostic::new(
                            Severity::Note,
                            entry.description.clone(),
                            range.clone(),
                        ));
                    }
                    child
                },
                None => DecodedNode::leaf(format!("bit {bit}"), "", Value::Bool(true), range.clone()),
            };
            node.children.push(child);
        }
        nodes.push(node);
    }
}

/// Decode class-defined extension fields at the tail of command payloads.
fn decode_extension(
    class: &ClassSpec,
    cursor: &mut WordCursor<'_>,
    nodes: &mut Vec<DecodedNode>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(ext) = &class.extension else {
        return;
    };
    if ext.fields.is_empty() {
        return;
    }

    if cursor.remaining() == 0 {
        diagnostics.push(Diagnostic::new(
            if ext.required { Severity::Violation } else { Severity::Note },
            "payload ends before the class extension fields",
            cursor.byte_range(cursor.position(), 0),
        ));
        return;
    }

    let start = cursor.position();
    let mut decoder = GroupDecoder::new(cursor.bytes(), start, cursor.remaining());
    let mut node = DecodedNode::branch("extension", "kestrel.ext", cursor.byte_range(start, 0));
    for field in &ext.fields {
        node.children.push(decoder.decode_field(field));
    }
    let consumed = decoder.words_used();
    node.byte_range = cursor.byte_range(start, consumed);
    cursor.advance(consumed);
    nodes.push(node);
}
