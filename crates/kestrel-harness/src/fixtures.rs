//! Programmatic schema fixtures.
//!
//! The documents here are built from [`MarkupNode`] constructors so tests
//! stay independent of any on-disk markup syntax. `signal_schema_doc`
//! covers the structures the decoder supports: masked classes, an alias,
//! a wildcard default, a linked second indicator word, fixed-point and
//! length-prefixed fields, a record array, a warning/error catalog, and a
//! class extension area.

use kestrel_schema::{MarkupNode, Schema, SchemaBuilder};

/// Build a schema from a document, panicking on fatal errors.
///
/// # Panics
///
/// Panics if the document is structurally unusable; fixture documents
/// never are.
#[must_use]
pub fn build_schema(doc: &MarkupNode) -> Schema {
    SchemaBuilder::build(doc).expect("fixture schema should build")
}

/// Representative signal-analyzer style schema.
///
/// Classes:
/// - `0x0100` (mask `0xFF00`): the full-featured class described below.
/// - `0x0200` (mask `0xFF00`): alias of `0x0100`.
/// - `0xFFFF` (default): one dynamic blob field on CIF 0 bit 0.
///
/// Class `0x0100` layout:
/// - CIF 0 bit 0: `Stream Id`, hex 32.
/// - CIF 0 bit 1: `Bandwidth`, signed fixed point, 64 bits, point 20, Hz.
/// - CIF 0 bit 3: link to CIF 1.
/// - CIF 0 bit 7: `Spectrum Table` record array (8-bit record index, one
///   optional header section `Reference`, records carry a 16-bit fixed
///   `Level` at bit offset 8).
/// - CIF 1 bit 2: `Gain`, signed fixed point, 16 bits, point 7, dB.
/// - CIF 1 bit 5: `Device Name`, length-prefixed UTF-8.
/// - Warning/error catalog: bit 31 `Field not executed`, bit 30
///   `Device failure`.
/// - Extension area (optional): `User Bits`, hex 8 at bit offset 24.
#[must_use]
pub fn signal_schema_doc() -> MarkupNode {
    let spectrum_table = MarkupNode::new("field")
        .with_attr("name", "Spectrum Table")
        .with_attr("type", "array")
        .with_child(
            MarkupNode::new("recordIndex").with_attr("offset", "0").with_attr("width", "8"),
        )
        .with_child(
            MarkupNode::new("headerEnable")
                .with_attr("name", "Reference")
                .with_attr("index", "0")
                .with_child(
                    MarkupNode::new("field")
                        .with_attr("name", "Reference")
                        .with_attr("type", "uint")
                        .with_attr("width", "32"),
                ),
        )
        .with_child(
            MarkupNode::new("recordEnable").with_attr("name", "Levels").with_child(
                MarkupNode::new("field")
                    .with_attr("name", "Level")
                    .with_attr("type", "fixed")
                    .with_attr("width", "16")
                    .with_attr("point", "8")
                    .with_attr("offset", "8")
                    .with_attr("units", "dBm"),
            ),
        );

    let cif1 = MarkupNode::new("cifMap")
        .with_attr("index", "1")
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "2")
                .with_attr("name", "Gain")
                .with_child(
                    MarkupNode::new("field")
                        .with_attr("name", "Gain")
                        .with_attr("type", "fixed")
                        .with_attr("width", "16")
                        .with_attr("point", "7")
                        .with_attr("units", "dB"),
                ),
        )
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "5")
                .with_attr("name", "Device Name")
                .with_child(
                    MarkupNode::new("field")
                        .with_attr("name", "Device Name")
                        .with_attr("type", "string")
                        .with_attr("width", "32"),
                ),
        );

    let cif0 = MarkupNode::new("cifMap")
        .with_attr("index", "0")
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "0")
                .with_attr("name", "Stream Id")
                .with_child(
                    MarkupNode::new("field")
                        .with_attr("name", "Stream Id")
                        .with_attr("type", "hex")
                        .with_attr("width", "32"),
                ),
        )
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "1")
                .with_attr("name", "Bandwidth")
                .with_child(
                    MarkupNode::new("field")
                        .with_attr("name", "Bandwidth")
                        .with_attr("type", "fixed")
                        .with_attr("width", "64")
                        .with_attr("point", "20")
                        .with_attr("units", "Hz"),
                ),
        )
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "3")
                .with_attr("name", "More Context")
                .with_child(cif1),
        )
        .with_child(
            MarkupNode::new("cifEnable")
                .with_attr("index", "7")
                .with_attr("name", "Spectrum Table")
                .with_child(spectrum_table),
        );

    let signal_class = MarkupNode::new("class")
        .with_attr("id", "0x0100")
        .with_attr("idMask", "0xFF00")
        .with_child(cif0)
        .with_child(
            MarkupNode::new("warnErrMap")
                .with_child(
                    MarkupNode::new("bit")
                        .with_attr("index", "31")
                        .with_attr("name", "Field not executed")
                        .with_attr("descript", "the device ignored the controlled field"),
                )
                .with_child(
                    MarkupNode::new("bit")
                        .with_attr("index", "30")
                        .with_attr("name", "Device failure")
                        .with_attr("descript", "hardware reported a fault for this field"),
                ),
        )
        .with_child(
            MarkupNode::new("extensionCamFields").with_child(
                MarkupNode::new("field")
                    .with_attr("name", "User Bits")
                    .with_attr("type", "hex")
                    .with_attr("width", "8")
                    .with_attr("offset", "24"),
            ),
        );

    let alias_class = MarkupNode::new("class")
        .with_attr("id", "0x0200")
        .with_attr("idMask", "0xFF00")
        .with_attr("alias", "0x0100");

    let default_class = MarkupNode::new("class")
        .with_attr("id", "0xFFFF")
        .with_attr("idMask", "0xFFFF")
        .with_attr("default", "true")
        .with_child(
            MarkupNode::new("cifMap").with_attr("index", "0").with_child(
                MarkupNode::new("cifEnable")
                    .with_attr("index", "0")
                    .with_attr("name", "Payload")
                    .with_child(
                        MarkupNode::new("field")
                            .with_attr("name", "Payload")
                            .with_attr("type", "dynamic")
                            .with_attr("width", "32"),
                    ),
            ),
        );

    MarkupNode::new("schema")
        .with_child(signal_class)
        .with_child(alias_class)
        .with_child(default_class)
}

#[cfg(test)]
mod tests {
    use kestrel_schema::{EnableBit, FieldKind};

    use super::*;

    #[test]
    fn fixture_schema_builds_clean() {
        let schema = build_schema(&signal_schema_doc());
        assert!(schema.diagnostics.is_empty(), "{:?}", schema.diagnostics);
        assert_eq!(schema.classes.len(), 2);
        assert_eq!(schema.registrations.len(), 3);
        assert_eq!((schema.node_count, schema.leaf_count), schema.recount());
    }

    #[test]
    fn fixture_wires_the_link() {
        let schema = build_schema(&signal_schema_doc());
        let class = schema.resolve_class(0x0105).unwrap();
        assert_eq!(class.cif_map(0).unwrap().enable(3), &EnableBit::Link(1));
        let EnableBit::Group(gain) = class.cif_map(1).unwrap().enable(2) else {
            panic!("CIF1 bit 2 should be the gain group");
        };
        assert_eq!(gain.fields[0].kind, FieldKind::Fixed { width: 16, point: 7, scale: 1.0 });
    }
}
