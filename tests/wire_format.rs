use amberlink::error::ProtocolError;
use amberlink::uart::frame::{self, Frame, FRAME_LEN, OPCODE_SET_CHANNEL, PAYLOAD_LEN};
use amberlink::uart::serial::HEADER_USER_DATA;
use amberlink::uart::SerialChannel;

#[test]
fn every_short_buffer_is_rejected() {
    let bytes = [4u8, 1, 0, 2, 9];
    for len in 0..FRAME_LEN {
        assert_eq!(
            frame::decode(&bytes[..len]),
            Err(ProtocolError::ShortBuffer {
                needed: FRAME_LEN,
                available: len,
            })
        );
    }
}

#[test]
fn encode_canonicalizes_hand_built_frames() {
    let odd = Frame {
        length: 9,
        opcode: 0xBEEF,
        channel: 3,
        value: 42,
    };
    let wire = frame::encode(&odd);
    assert_eq!(wire, [PAYLOAD_LEN, 0x01, 0x00, 3, 42]);
    let back = frame::decode(&wire).unwrap();
    assert_eq!(back, Frame::set_channel(3, 42));
    assert_eq!(back.opcode, OPCODE_SET_CHANNEL);
}

#[test]
fn malformed_frames_are_rejected_not_coerced() {
    assert_eq!(
        frame::decode(&[5, 1, 0, 0, 0]),
        Err(ProtocolError::LengthMismatch {
            expected: PAYLOAD_LEN,
            found: 5,
        })
    );
    // Opcode is little-endian: [0x00, 0x01] is 0x0100.
    assert_eq!(
        frame::decode(&[4, 0, 1, 0, 0]),
        Err(ProtocolError::UnsupportedOpcode(0x0100))
    );
}

#[test]
fn decode_all_drops_the_incomplete_tail() {
    let buf = [4u8, 1, 0, 1, 200, 4, 1, 0, 2];
    let frames = frame::decode_all(&buf);
    assert_eq!(frames, vec![Frame::set_channel(1, 200)]);
}

#[test]
fn decode_all_skips_bad_frames_in_the_middle() {
    let buf = [4u8, 1, 0, 0, 1, 4, 7, 0, 1, 2, 4, 1, 0, 2, 3];
    let frames = frame::decode_all(&buf);
    assert_eq!(
        frames,
        vec![Frame::set_channel(0, 1), Frame::set_channel(2, 3)]
    );
}

#[test]
fn header_wrap_and_unwrap() {
    let serial = SerialChannel::new(20);
    assert_eq!(HEADER_USER_DATA, 0x01);
    assert_eq!(&serial.wrap_outbound(&[0xAA, 0xBB])[..], &[0x01, 0xAA, 0xBB]);
    assert_eq!(
        serial.unwrap_inbound(&[0x01, 0xAA, 0xBB]),
        Some(&[0xAA, 0xBB][..])
    );
    assert_eq!(serial.unwrap_inbound(&[0x02, 0xAA]), None);
    assert_eq!(serial.unwrap_inbound(&[]), None);
}

#[test]
fn oversize_payload_is_not_fragmented() {
    let serial = SerialChannel::new(4);
    let wrapped = serial.wrap_outbound(&[1, 2, 3, 4, 5]);
    assert_eq!(wrapped.len(), 6);
    assert!(!serial.fits(&[1, 2, 3, 4, 5]));
}
