//! Fixed-size application frames carried inside UART notifications.
//!
//! Wire layout (5 bytes):
//!
//!   `[length=4][opcode_lo][opcode_hi][channel][value]`
//!
//! `length` counts the payload that follows it. There is exactly one supported
//! opcode; anything else is rejected rather than coerced. Decoding never keeps
//! state between calls, so bytes past the last whole frame are discarded.
use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::ProtocolError;
use crate::metrics;

/// Payload bytes following the length byte.
pub const PAYLOAD_LEN: u8 = 4;
/// Total bytes of one frame on the wire.
pub const FRAME_LEN: usize = 1 + PAYLOAD_LEN as usize;
/// The only opcode the light firmware understands ("set channel").
pub const OPCODE_SET_CHANNEL: u16 = 0x0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub length: u8,
    pub opcode: u16,
    pub channel: u8,
    pub value: u8,
}

impl Frame {
    /// Build a canonical set-channel frame.
    pub fn set_channel(channel: u8, value: u8) -> Self {
        Self {
            length: PAYLOAD_LEN,
            opcode: OPCODE_SET_CHANNEL,
            channel,
            value,
        }
    }
}

/// Decode exactly one frame from the head of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < FRAME_LEN {
        return Err(ProtocolError::ShortBuffer {
            needed: FRAME_LEN,
            available: bytes.len(),
        });
    }
    let length = bytes[0];
    if length != PAYLOAD_LEN {
        return Err(ProtocolError::LengthMismatch {
            expected: PAYLOAD_LEN,
            found: length,
        });
    }
    let opcode = u16::from_le_bytes([bytes[1], bytes[2]]);
    if opcode != OPCODE_SET_CHANNEL {
        return Err(ProtocolError::UnsupportedOpcode(opcode));
    }
    Ok(Frame {
        length,
        opcode,
        channel: bytes[3],
        value: bytes[4],
    })
}

/// Split `bytes` into consecutive frames starting at offset 0.
///
/// Malformed frames are dropped (and counted); a trailing partial frame is
/// silently discarded.
pub fn decode_all(bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::with_capacity(bytes.len() / FRAME_LEN);
    for chunk in bytes.chunks_exact(FRAME_LEN) {
        match decode(chunk) {
            Ok(frame) => {
                metrics::inc_frames_decoded();
                frames.push(frame);
            }
            Err(e) => {
                metrics::inc_frames_rejected();
                log::debug!("dropping frame: {}", e);
            }
        }
    }
    let trailing = bytes.len() % FRAME_LEN;
    if trailing != 0 {
        log::trace!("discarding {} trailing bytes", trailing);
    }
    frames
}

/// Serialize one frame, re-stamping length and opcode to their canonical values.
pub fn encode(frame: &Frame) -> [u8; FRAME_LEN] {
    let [lo, hi] = OPCODE_SET_CHANNEL.to_le_bytes();
    [PAYLOAD_LEN, lo, hi, frame.channel, frame.value]
}

/// Append the encoding of every frame to `out`.
pub fn encode_into(frames: &[Frame], out: &mut BytesMut) {
    out.reserve(frames.len() * FRAME_LEN);
    for frame in frames {
        out.put_slice(&encode(frame));
    }
}
