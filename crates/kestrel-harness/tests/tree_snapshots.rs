//! Snapshot tests for decode output stability.
//!
//! A fixed byte buffer must always produce the same tree: labels, values,
//! byte ranges, and order are all wire/display compatibility surface. The
//! trees are rendered to a compact text form so a diff reads like a
//! protocol trace.

use std::fmt::Write as _;

use insta::assert_snapshot;
use kestrel_harness::{build_schema, signal_schema_doc, WordWriter};
use kestrel_proto::{
    decode_payload, DecodeOptions, DecodedNode, DecodedTree, PacketContext, PacketType, Value,
};
use kestrel_schema::ClassId;

fn render(tree: &DecodedTree) -> String {
    let mut out = String::new();
    for node in &tree.nodes {
        render_node(node, 0, &mut out);
    }
    for diag in &tree.diagnostics {
        let _ = writeln!(out, "! {:?}: {}", diag.severity, diag.message);
    }
    out.trim_end().to_string()
}

fn render_node(node: &DecodedNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{indent}{} = {} [{}..{}]",
        node.label,
        render_value(&node.value),
        node.byte_range.start,
        node.byte_range.end
    );
    for diag in &node.diagnostics {
        let _ = writeln!(out, "{indent}  ! {:?}: {}", diag.severity, diag.message);
    }
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Empty => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Unsigned(n) => format!("{n:#x}"),
        Value::Signed(n) => n.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => format!("{t:?}"),
        Value::Bytes(b) => hex::encode(b),
        Value::EnumLabel { code, label } => match label {
            Some(label) => format!("{label} ({code})"),
            None => code.to_string(),
        },
    }
}

fn context_packet(pkt: u16) -> PacketContext {
    PacketContext {
        packet_type: PacketType::Context,
        class_id: Some(ClassId { oui: 0, info: 0, pkt }),
        ack: None,
    }
}

#[test]
fn snapshot_linked_cif_scenario() {
    let schema = build_schema(&signal_schema_doc());
    let bytes = WordWriter::new()
        .word(0x0000_000B)
        .word(0x0000_0024)
        .words(&[0x0000_0000, 0x0028_0000])
        .word(0xDEAD_BEEF)
        .word(2)
        .padded_str("kestrel")
        .word(0x00C0_0000)
        .into_bytes();

    let tree =
        decode_payload(&schema, &bytes, &context_packet(0x0105), &DecodeOptions::default());

    assert_snapshot!(render(&tree), @r#"
    Bandwidth = - [8..16]
      Bandwidth (Hz) = 2.5 [8..16]
    Stream Id = - [16..20]
      Stream Id = 0xdeadbeef [16..20]
    Device Name = - [20..32]
      Device Name = "kestrel" [20..32]
    Gain = - [32..36]
      Gain (dB) = 1.5 [32..34]
    "#);
}

#[test]
fn snapshot_record_array_scenario() {
    let schema = build_schema(&signal_schema_doc());
    let bytes = WordWriter::new()
        .word(0x0000_0080)
        .word(7)
        .word((5 << 24) | (1 << 12) | 2)
        .word(0)
        .word(1)
        .word(100)
        .word(0x0101_8000)
        .word(0x0202_0000)
        .into_bytes();

    let tree =
        decode_payload(&schema, &bytes, &context_packet(0x0100), &DecodeOptions::default());

    assert_snapshot!(render(&tree), @r#"
    Spectrum Table = - [4..32]
      Spectrum Table = - [4..32]
        Reference = - [20..24]
          Reference = 0x64 [20..24]
        record 1 = - [24..28]
          Level (dBm) = 1.5 [25..27]
        record 2 = - [28..32]
          Level (dBm) = 2 [29..31]
    "#);
}

#[test]
fn snapshot_truncated_bandwidth() {
    let schema = build_schema(&signal_schema_doc());
    let bytes = WordWriter::new().words(&[0x0000_0002, 0x0028_0000]).into_bytes();

    let tree =
        decode_payload(&schema, &bytes, &context_packet(0x0100), &DecodeOptions::default());

    assert_snapshot!(render(&tree), @r"
    Bandwidth = - [4..8]
      Bandwidth (Hz) = - [4..8]
        ! Truncation: insufficient words: needed 2, remaining 1
    ");
}

#[test]
fn decoded_tree_serializes_to_json() {
    // The tree is a serde surface for hosts; make sure a representative
    // decode survives a JSON round trip.
    let schema = build_schema(&signal_schema_doc());
    let bytes = WordWriter::new().words(&[0x0000_0001, 0x1234_5678]).into_bytes();
    let tree =
        decode_payload(&schema, &bytes, &context_packet(0x0100), &DecodeOptions::default());

    let json = serde_json::to_string(&tree).expect("tree should serialize");
    let back: DecodedTree = serde_json::from_str(&json).expect("tree should deserialize");
    assert_eq!(tree, back);
}
