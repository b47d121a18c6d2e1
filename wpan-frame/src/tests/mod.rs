use crate::*;


const EXT_A: Address = Address::Extended([0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7]);
const EXT_B: Address = Address::Extended([0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02]);

fn emit(frame: &FrameRepr<'_>) -> std::vec::Vec<u8> {
    let mut buffer = vec![0; frame.buffer_len()];
    let len = frame.emit(&mut buffer).unwrap();
    assert_eq!(len, buffer.len());
    buffer
}

#[test]
fn emit_imm_ack() {
    let imm_ack = FrameBuilder::new_imm_ack(1).finalize().unwrap();
    assert_eq!(emit(&imm_ack), [0x02, 0x10, 0x01]);
}

#[test]
fn emit_data_frame() {
    let frame = FrameBuilder::new_data(&[0x2b, 0x00, 0x00, 0x00])
        .set_sequence_number(1)
        .set_dst_pan_id(0xabcd)
        .set_dst_address(Address::BROADCAST)
        .set_src_pan_id(0xabcd)
        .set_src_address(EXT_A)
        .finalize()
        .unwrap();

    assert_eq!(
        emit(&frame),
        [
            0x41, 0xd8, 0x01, 0xcd, 0xab, 0xff, 0xff, 0xc7, 0xd9, 0xb5, 0x14, 0x00, 0x4b, 0x12,
            0x00, 0x2b, 0x00, 0x00, 0x00,
        ]
    );
}

#[test]
fn different_pan_ids_are_not_compressed() {
    let frame = FrameBuilder::new_data(&[0x2b, 0x00, 0x00, 0x00])
        .set_sequence_number(1)
        .set_dst_pan_id(0xabce)
        .set_dst_address(Address::Short([0x02, 0x04]))
        .set_src_pan_id(0xabcd)
        .set_src_address(EXT_A)
        .finalize()
        .unwrap();

    assert!(!frame.frame_control.pan_id_compression);

    let buffer = emit(&frame);
    let mpdu = validate_frame(&buffer).unwrap();
    assert_eq!(mpdu.addressing().dst_pan_id(), Some(0xabce));
    assert_eq!(mpdu.addressing().src_pan_id(), Some(0xabcd));
    assert_eq!(mpdu.addressing().dst_address(), Address::Short([0x02, 0x04]));
}

#[test]
fn frame_round_trip() {
    let payload = [0xaa; 20];
    let frame = FrameBuilder::new_data(&payload)
        .set_sequence_number(42)
        .set_ack_request(true)
        .set_dst_pan_id(0x1234)
        .set_dst_address(EXT_B)
        .set_src_pan_id(0x1234)
        .set_src_address(Address::from_short(0x0001))
        .finalize()
        .unwrap();

    let buffer = emit(&frame);
    let reader = Frame::new(&buffer[..]).unwrap();
    let parsed = FrameRepr::parse(&reader).unwrap();

    assert_eq!(parsed.frame_control, frame.frame_control);
    assert_eq!(parsed.sequence_number, Some(42));
    assert_eq!(parsed.addressing_fields, frame.addressing_fields);
    assert_eq!(parsed.payload, Some(&payload[..]));
}

fn finish<'p, T>(
    builder: FrameBuilder<'p, T>,
    dst: Address,
    src: Address,
    security: Option<AuxSecurityHeaderRepr>,
) -> FrameRepr<'p> {
    let mut builder = builder.set_sequence_number(5);
    if !dst.is_empty() {
        builder = builder.set_dst_pan_id(0xabcd).set_dst_address(dst);
    }
    if !src.is_empty() {
        builder = builder.set_src_pan_id(0xabcd).set_src_address(src);
    }
    if let Some(aux) = security {
        builder = builder.set_security(aux);
    }
    builder.finalize().unwrap()
}

#[test]
fn round_trip_every_layout() {
    let payload = [0xde, 0xad, 0xbe, 0xef];
    let addresses = [Address::Absent, Address::from_short(0x0002), EXT_B];
    let levels = [
        SecurityLevel::None,
        SecurityLevel::Mic32,
        SecurityLevel::Mic64,
        SecurityLevel::Mic128,
        SecurityLevel::Enc,
        SecurityLevel::EncMic32,
        SecurityLevel::EncMic64,
        SecurityLevel::EncMic128,
    ];

    for frame_type in [FrameType::Beacon, FrameType::Data, FrameType::MacCommand] {
        for dst in addresses {
            for src in addresses {
                if dst.is_empty() && src.is_empty() {
                    continue;
                }
                for level in levels {
                    let security = (level != SecurityLevel::None).then_some(AuxSecurityHeaderRepr {
                        security_level: level,
                        frame_counter: Some(0x0102_0304),
                        key_identifier: KeyIdentifier::Index(1),
                    });
                    let frame = match frame_type {
                        FrameType::Beacon => {
                            finish(FrameBuilder::new_beacon(&payload), dst, src, security)
                        }
                        FrameType::Data => {
                            finish(FrameBuilder::new_data(&payload), dst, src, security)
                        }
                        _ => finish(FrameBuilder::new_mac_command(&payload), dst, src, security),
                    };

                    let buffer = emit(&frame);
                    let reader = Frame::new(&buffer[..]).unwrap();
                    let parsed = FrameRepr::parse(&reader).unwrap();

                    let case = (frame_type, dst, src, level);
                    assert_eq!(parsed.frame_control, frame.frame_control, "{case:?}");
                    assert_eq!(parsed.sequence_number, Some(5), "{case:?}");
                    assert_eq!(parsed.addressing_fields, frame.addressing_fields, "{case:?}");
                    assert_eq!(parsed.aux_security_header, security, "{case:?}");
                    assert_eq!(parsed.payload, Some(&payload[..]), "{case:?}");
                    assert_eq!(reader.mic_len(), level.mic_length(), "{case:?}");
                }
            }
        }
    }
}

#[test]
fn secured_frame_reserves_mic() {
    let frame = FrameBuilder::new_data(&[1, 2, 3])
        .set_sequence_number(7)
        .set_dst_pan_id(0xabcd)
        .set_dst_address(EXT_B)
        .set_src_pan_id(0xabcd)
        .set_src_address(EXT_A)
        .set_security(AuxSecurityHeaderRepr {
            security_level: SecurityLevel::EncMic64,
            frame_counter: Some(5),
            key_identifier: KeyIdentifier::Implicit,
        })
        .finalize()
        .unwrap();

    assert_eq!(frame.header_len(), 3 + 2 + 8 + 8 + 5);
    assert_eq!(frame.buffer_len(), frame.header_len() + 3 + 8);

    let buffer = emit(&frame);
    assert_eq!(&buffer[buffer.len() - 8..], &[0; 8]);

    let reader = Frame::new(&buffer[..]).unwrap();
    assert!(reader.frame_control().security_enabled());
    assert_eq!(reader.header_len(), frame.header_len());
    assert_eq!(reader.mic_len(), 8);

    let parsed = FrameRepr::parse(&reader).unwrap();
    assert_eq!(parsed.aux_security_header, frame.aux_security_header);
    assert_eq!(parsed.payload, Some(&[1, 2, 3][..]));
}

#[test]
fn oversized_frame_is_refused() {
    let payload = [0u8; 120];
    assert!(FrameBuilder::new_data(&payload)
        .set_sequence_number(1)
        .set_dst_pan_id(0xabcd)
        .set_dst_address(EXT_B)
        .set_src_address(EXT_A)
        .finalize()
        .is_err());
}

#[test]
fn data_frame_needs_an_address() {
    assert!(FrameBuilder::new_data(&[1]).set_sequence_number(1).finalize().is_err());
}

#[test]
fn beacon_request_header() {
    let mut cmd = [0u8; 1];
    CommandRepr::BeaconRequest.emit(&mut cmd);

    let frame = FrameBuilder::new_mac_command(&cmd)
        .set_sequence_number(3)
        .set_dst_pan_id(0xffff)
        .set_dst_address(Address::BROADCAST)
        .finalize()
        .unwrap();

    let buffer = emit(&frame);
    assert_eq!(buffer, [0x03, 0x18, 0x03, 0xff, 0xff, 0xff, 0xff, 0x07]);

    let mpdu = validate_frame(&buffer).unwrap();
    let Payload::Command(cmd) = mpdu.payload() else {
        panic!("not a command");
    };
    assert_eq!(cmd.id(), CommandId::BeaconRequest);
}
