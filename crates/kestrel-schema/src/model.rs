//! Immutable schema model.
//!
//! Everything in this module is built once by the [`builder`](crate::builder)
//! at configuration load and never mutated afterwards. Decoders hold a
//! [`SchemaHandle`] and treat the model as read-only shared data; reloading a
//! schema means building a fresh handle and swapping the reference, never
//! editing a live one.

use std::{collections::BTreeMap, ops::Deref, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::diagnostics::SchemaDiagnostic;

/// Number of enable bits in one indicator word.
pub const CIF_BITS: usize = 32;

/// Severity of a schema-attached annotation (`info` element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLevel {
    /// Informational, surfaced verbatim when the node is decoded.
    Note,
    /// Something the schema author wants flagged on every decode.
    Warn,
    /// A known defect or hazard in the described format.
    Error,
}

/// Human-readable annotation attached to a schema entity.
///
/// Annotations travel with the model and are emitted as diagnostics on the
/// decoded tree whenever the annotated entity is visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation severity.
    pub level: NoteLevel,
    /// Verbatim annotation text.
    pub text: String,
}

/// One entry of an enumeration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    /// Raw wire value.
    pub value: u64,
    /// Display label.
    pub label: String,
}

/// Ordered enumeration table for `Enum` fields.
///
/// Lookup is linear; tables are authored with a handful of entries and the
/// authoring order is preserved for display purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumTable(pub Vec<EnumEntry>);

impl EnumTable {
    /// Label for a raw value, if the table defines one.
    ///
    /// Unknown codes are not an error anywhere in Kestrel; callers fall back
    /// to displaying the raw number.
    pub fn label(&self, value: u64) -> Option<&str> {
        self.0.iter().find(|e| e.value == value).map(|e| e.label.as_str())
    }
}

/// Wire interpretation of a single field.
///
/// This is the dispatch point of the whole decoder: every field carries one
/// `FieldKind`, and the field codec matches on it exhaustively. Adding a
/// variant is a compile error in the codec until it is handled, which is
/// exactly the property we want for wire-format code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-bit flag.
    Bool,
    /// Two's-complement signed integer, `width` bits, sign-extended.
    Int {
        /// Field width in bits, at most 64.
        width: u8,
    },
    /// Unsigned integer, `width` bits.
    UInt {
        /// Field width in bits, at most 64.
        width: u8,
    },
    /// Unsigned integer displayed in hexadecimal.
    Hex {
        /// Field width in bits, at most 64.
        width: u8,
    },
    /// Signed fixed-point number.
    ///
    /// Decoded as `sign(raw) * (|raw| / 2^point) * scale`.
    Fixed {
        /// Field width in bits, at most 64.
        width: u8,
        /// Binary point position (fractional bits).
        point: u8,
        /// Post-conversion scale factor.
        scale: f64,
    },
    /// Unsigned fixed-point number.
    UFixed {
        /// Field width in bits, at most 64.
        width: u8,
        /// Binary point position (fractional bits).
        point: u8,
        /// Post-conversion scale factor.
        scale: f64,
    },
    /// Fixed-width opaque bit span, rounded up to whole words on the wire.
    Raw {
        /// Span width in bits.
        width: u16,
    },
    /// Length-prefixed opaque blob; the prefix counts payload words.
    Dynamic {
        /// Width in bits of the length prefix.
        length_width: u8,
    },
    /// Length-prefixed UTF-8 text with the same prefix convention as
    /// `Dynamic`.
    Utf8 {
        /// Width in bits of the length prefix.
        length_width: u8,
    },
    /// Unsigned integer with a display label table.
    Enum {
        /// Field width in bits, at most 64.
        width: u8,
        /// Value-to-label table.
        table: EnumTable,
    },
    /// Nested array-of-records structure.
    Array(Box<RecordArraySpec>),
    /// Pseudo-field: chains the indicator walk to another CIF word.
    ///
    /// Links contribute no wire bytes and must never reach the field codec.
    Link {
        /// Index of the chained CIF map.
        target: u8,
    },
}

/// One decodable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Display name.
    pub name: String,
    /// Hierarchical display key, e.g. `kestrel.cif1.bandwidth`.
    pub path_id: String,
    /// Bit offset from the MSB of the enclosing field group's first word.
    pub bit_offset: u16,
    /// When set, `bit_offset` is re-based on the bits already consumed by
    /// earlier fields of the same group, letting one enable bit own several
    /// variable-length fields packed back to back.
    pub relative: bool,
    /// Wire interpretation.
    pub kind: FieldKind,
    /// Optional unit label for display.
    pub units: Option<String>,
    /// Optional schema-author annotation.
    pub note: Option<Annotation>,
}

/// Named group of fields owned by one enable bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    /// Display name, taken from the enable declaration.
    pub name: String,
    /// Hierarchical display key.
    pub path_id: String,
    /// Fields in decode order; usually one, several when the bit owns
    /// back-to-back packed fields.
    pub fields: Vec<FieldSpec>,
    /// Optional schema-author annotation.
    pub note: Option<Annotation>,
}

/// Binding of one indicator-word bit position.
///
/// # Invariants
///
/// A bit carries at most one meaning. `Empty` bits are undefined: a packet
/// asserting one is a schema-mismatch signal reported by the walker, not an
/// error that stops decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableBit {
    /// Undefined position.
    #[default]
    Empty,
    /// Fields decoded when this bit is asserted.
    Group(FieldGroup),
    /// Chains the walk to another CIF map when asserted.
    Link(u8),
}

/// One 32-bit indicator word and its bit bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CifMap {
    /// CIF index; index 0 is always walked first.
    pub index: u8,
    /// Display name.
    pub name: String,
    /// Mask of bit positions the schema defines.
    pub defined: u32,
    /// Per-bit bindings, indexed by bit position (bit 0 = LSB).
    pub enables: [EnableBit; CIF_BITS],
}

impl CifMap {
    /// Binding for a bit position.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= 32`. The builder never stores out-of-range bits, so
    /// in-tree callers index with walker-produced positions only.
    pub fn enable(&self, bit: u8) -> &EnableBit {
        &self.enables[bit as usize]
    }

    /// Whether the schema defines this bit position.
    pub fn is_defined(&self, bit: u8) -> bool {
        self.defined & (1 << bit) != 0
    }
}

/// Fields of one optional header or record sub-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSection {
    /// Display name.
    pub name: String,
    /// Hierarchical display key.
    pub path_id: String,
    /// Fields decoded when this section's indicator bit is set.
    pub fields: Vec<FieldSpec>,
}

/// Layout description for an array-of-records field.
///
/// Records reuse the [`FieldSpec`] machinery recursively: sub-sections are
/// plain field lists selected by the array's own header and record bitmaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordArraySpec {
    /// Header fields present in every instance.
    pub required_header: Vec<FieldSpec>,
    /// Optional header sections by bitmap position.
    pub header_sections: [Option<RecordSection>; CIF_BITS],
    /// Mask of defined optional header section bits.
    pub header_mask: u32,
    /// Record fields present in every record.
    pub required_record: Vec<FieldSpec>,
    /// Optional record sections by bitmap position.
    pub record_sections: [Option<RecordSection>; CIF_BITS],
    /// Mask of defined optional record section bits.
    pub record_mask: u32,
    /// Bit offset of the per-record index field, when the format carries one.
    pub index_offset: Option<u16>,
    /// Width in bits of the per-record index field.
    pub index_width: u8,
}

impl RecordArraySpec {
    /// Whether the wire format includes a header-section bitmap word.
    ///
    /// The word is present only when the schema defines at least one
    /// optional header section.
    pub fn has_header_bitmap(&self) -> bool {
        self.header_mask != 0
    }
}

/// Catalog entry labeling one acknowledge warning/error bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnErrBit {
    /// Display name.
    pub name: String,
    /// Longer description, surfaced as a note.
    pub description: String,
}

/// Class-defined extension fields for the user area of command packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionArea {
    /// Extension fields in decode order.
    pub fields: Vec<FieldSpec>,
    /// When set, a payload too short to carry the area is a violation
    /// rather than a note.
    pub required: bool,
}

/// One protocol class: a bundle of CIF maps and field definitions selected
/// per packet by a numeric class identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    /// Base class identifier for mask matching.
    pub class_id: u64,
    /// Identifier mask; a packet matches when
    /// `(packet_id & mask) == (class_id & mask)`.
    pub id_mask: u64,
    /// Whether this class is the designated wildcard fallback.
    pub is_default: bool,
    /// Indicator maps, CIF 0 first by convention.
    pub cif_maps: Vec<CifMap>,
    /// Labels for acknowledge warning/error bitmap bits.
    pub warn_err_bits: BTreeMap<u8, WarnErrBit>,
    /// Optional extension field area for command packets.
    pub extension: Option<ExtensionArea>,
    /// Optional schema-author annotation.
    pub note: Option<Annotation>,
}

impl ClassSpec {
    /// CIF map with the given index, if the class defines it.
    pub fn cif_map(&self, index: u8) -> Option<&CifMap> {
        self.cif_maps.iter().find(|m| m.index == index)
    }
}

/// Packet class identifier: organizationally-unique id plus information and
/// packet class codes, packed into the low 56 bits of a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId {
    /// 24-bit organizationally unique identifier.
    pub oui: u32,
    /// Information class code.
    pub info: u16,
    /// Packet class code.
    pub pkt: u16,
}

impl ClassId {
    /// Pack into the `u64` form the resolver matches against:
    /// `oui << 32 | info << 16 | pkt`.
    #[must_use]
    pub const fn to_u64(self) -> u64 {
        ((self.oui as u64 & 0x00FF_FFFF) << 32) | ((self.info as u64) << 16) | self.pkt as u64
    }
}

/// Registration table entry mapping a masked identifier range to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Base identifier.
    pub base: u64,
    /// Match mask.
    pub mask: u64,
    /// Index into [`Schema::classes`].
    pub class: usize,
}

/// A complete, validated schema.
///
/// # Invariants
///
/// - Every `Registration::class` indexes into `classes`.
/// - `default_class`, when present, indexes into `classes` and that class
///   has `is_default` set.
/// - `node_count`/`leaf_count` equal [`Schema::recount`] of the built model;
///   the harness verifies this so the single-pass builder projection can be
///   trusted to size display tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// All classes, including alias-free bodies only (aliases share these
    /// through extra registrations).
    pub classes: Vec<ClassSpec>,
    /// Identifier-to-class registrations in authoring order.
    pub registrations: Vec<Registration>,
    /// Index of the wildcard fallback class, if one was declared.
    pub default_class: Option<usize>,
    /// Builder projection of tree-producing entities (groups, arrays,
    /// sections).
    pub node_count: usize,
    /// Builder projection of scalar display fields.
    pub leaf_count: usize,
    /// Soft-failure diagnostics collected while building.
    pub diagnostics: Vec<SchemaDiagnostic>,
}

impl Schema {
    /// Recount nodes and leaves by walking the built model.
    ///
    /// Returns `(nodes, leaves)`. Links count as neither: they are walk
    /// instructions, not display entities.
    pub fn recount(&self) -> (usize, usize) {
        let mut nodes = 0usize;
        let mut leaves = 0usize;
        for class in &self.classes {
            for map in &class.cif_maps {
                for enable in &map.enables {
                    if let EnableBit::Group(group) = enable {
                        nodes += 1;
                        count_fields(&group.fields, &mut nodes, &mut leaves);
                    }
                }
            }
            if let Some(ext) = &class.extension {
                nodes += 1;
                count_fields(&ext.fields, &mut nodes, &mut leaves);
            }
        }
        (nodes, leaves)
    }
}

fn count_fields(fields: &[FieldSpec], nodes: &mut usize, leaves: &mut usize) {
    for field in fields {
        match &field.kind {
            FieldKind::Link { .. } => {},
            FieldKind::Array(spec) => {
                *nodes += 1;
                count_fields(&spec.required_header, nodes, leaves);
                for section in spec.header_sections.iter().flatten() {
                    *nodes += 1;
                    count_fields(&section.fields, nodes, leaves);
                }
                count_fields(&spec.required_record, nodes, leaves);
                for section in spec.record_sections.iter().flatten() {
                    *nodes += 1;
                    count_fields(&section.fields, nodes, leaves);
                }
            },
            _ => *leaves += 1,
        }
    }
}

/// Shared, immutable handle to a built schema.
///
/// Cloning is cheap (one `Arc` bump). Hosts that hot-swap configurations
/// build a new handle and replace their reference; in-flight decodes keep
/// the handle they started with, so a reload is never visible mid-packet.
#[derive(Debug, Clone)]
pub struct SchemaHandle(Arc<Schema>);

impl SchemaHandle {
    /// Wrap a built schema for sharing.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self(Arc::new(schema))
    }
}

impl Deref for SchemaHandle {
    type Target = Schema;

    fn deref(&self) -> &Schema {
        &self.0
    }
}

impl From<Schema> for SchemaHandle {
    fn from(schema: Schema) -> Self {
        Self::new(schema)
    }
}
