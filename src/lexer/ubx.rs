//! u-blox UBX framing recognizer.
//!
//! `B5 62 class id lenL lenH payload CK_A CK_B`, length little-endian,
//! checksum an 8-bit Fletcher over `class..payload`.

use crate::reader::u16_le;

use super::FrameOutcome;

pub const SYNC0: u8 = 0xB5;
pub const SYNC1: u8 = 0x62;
pub const SYNC: [u8; 2] = [0xB5, 0x62];
const HEADER_LEN: usize = 6; // sync(2) + class(1) + id(1) + len(2)

/// Fletcher-8 checksum over `class..=payload`, per the UBX spec.
pub fn fletcher(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &b in data {
        ck_a = ck_a.wrapping_add(b);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

/// A decoded UBX frame: class, id, and payload bytes (checksum already
/// verified and stripped).
#[derive(Debug, Clone, PartialEq)]
pub struct UbxFrame {
    pub class: u8,
    pub id: u8,
    pub payload: Vec<u8>,
}

pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert_eq!(&buf[..2.min(buf.len())], &SYNC[..2.min(buf.len())]);

    if buf.len() < HEADER_LEN {
        return FrameOutcome::Incomplete;
    }

    let length = u16_le(buf, 4) as usize;
    let total_len = HEADER_LEN + length + 2; // + CK_A, CK_B

    if total_len > max_packet {
        return FrameOutcome::Overflow;
    }

    if buf.len() < total_len {
        return FrameOutcome::Incomplete;
    }

    let (ck_a, ck_b) = fletcher(&buf[2..HEADER_LEN + length]);
    let got_a = buf[HEADER_LEN + length];
    let got_b = buf[HEADER_LEN + length + 1];

    if ck_a != got_a || ck_b != got_b {
        return FrameOutcome::Bad { consumed: total_len };
    }

    let frame = UbxFrame {
        class: buf[2],
        id: buf[3],
        payload: buf[HEADER_LEN..HEADER_LEN + length].to_vec(),
    };

    FrameOutcome::Frame {
        consumed: total_len,
        payload: encode_ubx_marker(&frame),
    }
}

/// UBX frames carry (class, id) alongside the payload; the lexer's
/// `Frame` variant only has a flat payload buffer, so class/id are
/// prepended as two bytes. `drivers::ubx` strips them back off.
fn encode_ubx_marker(frame: &UbxFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + frame.payload.len());
    out.push(frame.class);
    out.push(frame.id);
    out.extend_from_slice(&frame.payload);
    out
}
