use wpan_cat::{FrameParser, ParseError};
use wpan_frame::{
    emit_beacon_payload, Address, AssociationStatus, BeaconOrder, CommandRepr, FrameBuilder,
    SuperframeOrder,
};

use strip_ansi_escapes::strip;

fn dissect(frame: &[u8]) -> String {
    String::from_utf8(strip(FrameParser::parse(frame).unwrap())).unwrap()
}

#[test]
fn data_frame() {
    let input = "41d801cdabffffc7d9b514004b12002b000000";
    let output = String::from_utf8(strip(FrameParser::parse_hex(input).unwrap())).unwrap();
    assert_eq!(
        output,
        "Frame Control
  frame type: Data
  security: 0
  frame pending: 0
  ack request: 0
  pan id compression: 1
  sequence number suppression: 0
  information elements present: 0
  dst addressing mode: Short
  src addressing mode: Extended
  frame version: 1 (Ieee802154_2006)
Sequence Number
  sequence number: 1
Addressing
  dst pan id: abcd
  dst addr: ff:ff (broadcast)
  src addr: 00:12:4b:00:14:b5:d9:c7
Payload
  [2b, 0, 0, 0]
"
    );
}

#[test]
fn imm_ack() {
    let output = String::from_utf8(strip(FrameParser::parse_hex("021007").unwrap())).unwrap();
    assert!(output.starts_with("Frame Control\n  frame type: Ack\n"));
    assert!(output.ends_with("Sequence Number\n  sequence number: 7\n"));
    assert!(!output.contains("Addressing"));
}

#[test]
fn beacon() {
    let mut payload = [0u8; 4];
    emit_beacon_payload(
        &mut payload,
        BeaconOrder::OnDemand,
        SuperframeOrder::Inactive,
        true,
        true,
    )
    .unwrap();
    let frame = FrameBuilder::new_beacon(&payload)
        .set_sequence_number(0x42)
        .set_src_pan_id(0xabcd)
        .set_src_address(Address::Short([0x00, 0x00]))
        .finalize()
        .unwrap();
    let mut buffer = [0u8; 127];
    let len = frame.emit(&mut buffer).unwrap();

    let output = dissect(&buffer[..len]);
    assert!(output.contains("  frame type: Beacon\n"));
    assert!(output.contains("  sequence number: 66\n"));
    assert!(output.contains("  src pan id: abcd\n  src addr: 00:00\n"));
    assert!(output.contains(
        "Superframe Specification
  beacon order: OnDemand
  superframe order: Inactive
  final cap slot: 15
  battery life extension: 0
  pan coordinator: 1
  association permit: 1
GTS
  permit: 0
"
    ));
    assert!(!output.contains("Pending Addresses"));
}

#[test]
fn association_response() {
    let mut cmd = [0u8; 4];
    CommandRepr::AssociationResponse {
        short_address: 0x0002,
        status: AssociationStatus::PanAtCapacity,
    }
    .emit(&mut cmd);
    let frame = FrameBuilder::new_mac_command(&cmd)
        .set_sequence_number(9)
        .set_ack_request(true)
        .set_dst_pan_id(0xabcd)
        .set_dst_address(Address::Extended([0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02]))
        .set_src_pan_id(0xabcd)
        .set_src_address(Address::Extended([0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7]))
        .finalize()
        .unwrap();
    let mut buffer = [0u8; 127];
    let len = frame.emit(&mut buffer).unwrap();

    let output = dissect(&buffer[..len]);
    assert!(output.contains("  ack request: 1\n"));
    assert!(output.ends_with(
        "MAC Command
  id: AssociationResponse
  short address: 0002
  status: PanAtCapacity
"
    ));
}

#[test]
fn invalid_input() {
    assert!(matches!(
        FrameParser::parse_hex("41d8zz"),
        Err(ParseError::Hex(_))
    ));
    // Reserved frame version.
    assert!(matches!(
        FrameParser::parse_hex("41f801cdabffffc7d9b514004b12002b000000"),
        Err(ParseError::Frame(_))
    ));
    assert!(matches!(
        FrameParser::parse(&[0x02, 0x10]),
        Err(ParseError::Frame(_))
    ));
}
