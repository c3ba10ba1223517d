//! Guided decode fuzzer for the schema-driven payload pipeline.
//!
//! The first input bytes select a combination of packet type, class
//! identifier, acknowledge flags, and decode options from edge-case
//! tables; the rest of the input is the payload handed to the decoder
//! verbatim. This keeps libFuzzer exploring the positive space (packets
//! that resolve to a real class and reach the walker and field codec)
//! while still mutating every length prefix, indicator word, and size
//! word the decoder trusts least.

#![no_main]

use kestrel_harness::{build_schema, signal_schema_doc};
use kestrel_proto::{decode_payload, AckFlags, DecodeOptions, PacketContext, PacketType};
use kestrel_schema::ClassId;
use libfuzzer_sys::fuzz_target;

// Class identifiers to test: registered, alias range, default, unknown.
const CLASS_IDS: &[Option<ClassId>] = &[
    Some(ClassId { oui: 0, info: 0, pkt: 0x0100 }),
    Some(ClassId { oui: 0, info: 0, pkt: 0x0105 }),
    Some(ClassId { oui: 0, info: 0, pkt: 0x0205 }),
    Some(ClassId { oui: 0, info: 0, pkt: 0xFFFF }),
    Some(ClassId { oui: 0, info: 0, pkt: 0x0305 }),
    Some(ClassId { oui: 0x00FF_FFFF, info: u16::MAX, pkt: u16::MAX }),
    None,
];

const PACKET_TYPES: &[PacketType] = &[
    PacketType::Context,
    PacketType::ExtensionContext,
    PacketType::Command,
    PacketType::ExtensionCommand,
];

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let schema = build_schema(&signal_schema_doc());

    let packet_type = PACKET_TYPES[data[0] as usize % PACKET_TYPES.len()];
    let class_id = CLASS_IDS[data[1] as usize % CLASS_IDS.len()];
    // Byte 2 drives the acknowledge flags directly, including unknown
    // high bits and invalid subtype combinations; 0 means no flags.
    let ack = (data[2] != 0).then(|| AckFlags::from_byte(data[2]));
    let options = DecodeOptions {
        fallback_to_default: data[3] & 1 != 0,
        ack_validation: if data[3] & 2 != 0 {
            kestrel_proto::AckValidation::Lenient
        } else {
            kestrel_proto::AckValidation::Strict
        },
    };

    let payload = &data[4..];
    let packet = PacketContext { packet_type, class_id, ack };

    let tree = decode_payload(&schema, payload, &packet, &options);

    // INVARIANT 1: consumption never exceeds the words available.
    assert!(
        tree.words_consumed <= payload.len() / 4,
        "consumed {} words from a {}-byte payload",
        tree.words_consumed,
        payload.len()
    );

    // INVARIANT 2: every reported byte range stays inside the payload.
    for node in tree.iter() {
        assert!(node.byte_range.start <= node.byte_range.end, "inverted range");
        assert!(
            node.byte_range.end <= payload.len(),
            "range {:?} outside a {}-byte payload",
            node.byte_range,
            payload.len()
        );
        for diag in &node.diagnostics {
            assert!(diag.byte_range.end <= payload.len());
        }
    }

    // INVARIANT 3: serialization of the result never fails; hosts are
    // allowed to persist any decode outcome.
    let _ = serde_json::to_string(&tree).expect("decoded tree must serialize");
});
