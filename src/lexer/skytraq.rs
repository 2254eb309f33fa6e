//! Skytraq binary framing recognizer.
//!
//! `A0 A1 lenH lenL payload CS 0D 0A`, length big-endian over the payload
//! only, checksum a single XOR byte over the payload.

use crate::reader::u16_be;

use super::FrameOutcome;

pub const SYNC0: u8 = 0xA0;
pub const SYNC1: u8 = 0xA1;
pub const SYNC: [u8; 2] = [0xA0, 0xA1];
const TRAILER: [u8; 2] = [0x0D, 0x0A];
const HEADER_LEN: usize = 4; // sync(2) + len(2)

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert_eq!(&buf[..2.min(buf.len())], &SYNC[..2.min(buf.len())]);

    if buf.len() < HEADER_LEN {
        return FrameOutcome::Incomplete;
    }

    let length = u16_be(buf, 2) as usize;
    let total_len = HEADER_LEN + length + 1 + TRAILER.len(); // + CS + trailer

    if total_len > max_packet {
        return FrameOutcome::Overflow;
    }

    if buf.len() < total_len {
        return FrameOutcome::Incomplete;
    }

    let payload = &buf[HEADER_LEN..HEADER_LEN + length];
    let got_cs = buf[HEADER_LEN + length];
    let trailer = &buf[HEADER_LEN + length + 1..total_len];

    if trailer != TRAILER {
        return FrameOutcome::Bad { consumed: total_len };
    }

    if checksum(payload) != got_cs {
        return FrameOutcome::Bad { consumed: total_len };
    }

    FrameOutcome::Frame {
        consumed: total_len,
        payload: payload.to_vec(),
    }
}
