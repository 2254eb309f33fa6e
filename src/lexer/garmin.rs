//! Garmin serial framing recognizer.
//!
//! `93 95 id lenL lenH data... checksum`, little-endian length over
//! `data`, checksum a single XOR byte over `id` followed by `data`. Real
//! Garmin serial devices reuse the same DLE/ETX envelope as TSIP; this
//! crate gives the family its own explicit-length framing instead, so a
//! Garmin frame is told apart from the TSIP/Evermore family by its sync
//! bytes rather than by inspecting an id that could collide with either.

use crate::reader::u16_le;

use super::FrameOutcome;

pub const SYNC0: u8 = 0x93;
pub const SYNC1: u8 = 0x95;
pub const SYNC: [u8; 2] = [SYNC0, SYNC1];
const HEADER_LEN: usize = 2 + 1 + 2; // sync(2) + id(1) + len(2)

fn checksum(id_and_data: &[u8]) -> u8 {
    id_and_data.iter().fold(0u8, |acc, &b| acc ^ b)
}

pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert_eq!(&buf[..2.min(buf.len())], &SYNC[..2.min(buf.len())]);

    if buf.len() < HEADER_LEN {
        return FrameOutcome::Incomplete;
    }

    let length = u16_le(buf, 3) as usize;
    let total_len = HEADER_LEN + length + 1; // + checksum

    if total_len > max_packet {
        return FrameOutcome::Overflow;
    }

    if buf.len() < total_len {
        return FrameOutcome::Incomplete;
    }

    // The id (offset 2) and the data (starting at HEADER_LEN) aren't
    // contiguous on the wire — the length field sits between them — so
    // the payload handed to the driver has to be reassembled rather than
    // sliced directly.
    let mut payload = Vec::with_capacity(1 + length);
    payload.push(buf[2]);
    payload.extend_from_slice(&buf[HEADER_LEN..HEADER_LEN + length]);
    let got_cksum = buf[total_len - 1];

    if checksum(&payload) != got_cksum {
        return FrameOutcome::Bad { consumed: total_len };
    }

    FrameOutcome::Frame {
        consumed: total_len,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(id: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SYNC);
        buf.push(id);
        buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
        buf.extend_from_slice(data);
        let mut id_and_data = vec![id];
        id_and_data.extend_from_slice(data);
        buf.push(checksum(&id_and_data));
        buf
    }

    #[test]
    fn accepts_well_formed_frame() {
        let frame = build_frame(51, &[0x01, 0x02, 0x03]);
        match try_frame(&frame, 8192) {
            FrameOutcome::Frame { consumed, payload } => {
                assert_eq!(consumed, frame.len());
                assert_eq!(payload, vec![51, 0x01, 0x02, 0x03]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut frame = build_frame(114, &[0x00, 0x00]);
        let n = frame.len();
        frame[n - 1] ^= 0xff;
        match try_frame(&frame, 8192) {
            FrameOutcome::Bad { consumed } => assert_eq!(consumed, frame.len()),
            other => panic!("expected bad frame, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_without_full_payload() {
        let frame = build_frame(51, &[0x01, 0x02, 0x03, 0x04]);
        assert!(matches!(
            try_frame(&frame[..6], 8192),
            FrameOutcome::Incomplete
        ));
    }
}
