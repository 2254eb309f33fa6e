//! SiRF binary framing recognizer.
//!
//! `A0 A2 lenH lenL payload CKSUMh CKSUMl B0 B3`, length big-endian over
//! the payload, checksum the big-endian sum of payload bytes masked to 15
//! bits.

use crate::reader::u16_be;

use super::FrameOutcome;

pub const SYNC0: u8 = 0xA0;
pub const SYNC1: u8 = 0xA2;
pub const SYNC: [u8; 2] = [0xA0, 0xA2];
const TRAILER: [u8; 2] = [0xB0, 0xB3];
const HEADER_LEN: usize = 4; // sync(2) + len(2)

fn checksum(payload: &[u8]) -> u16 {
    let sum: u32 = payload.iter().map(|&b| u32::from(b)).sum();
    (sum & 0x7fff) as u16
}

pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert_eq!(&buf[..2.min(buf.len())], &SYNC[..2.min(buf.len())]);

    if buf.len() < HEADER_LEN {
        return FrameOutcome::Incomplete;
    }

    let length = u16_be(buf, 2) as usize;
    let total_len = HEADER_LEN + length + 2 + TRAILER.len();

    if total_len > max_packet {
        return FrameOutcome::Overflow;
    }

    if buf.len() < total_len {
        return FrameOutcome::Incomplete;
    }

    let payload = &buf[HEADER_LEN..HEADER_LEN + length];
    let got_cksum = u16_be(buf, HEADER_LEN + length);
    let trailer = &buf[HEADER_LEN + length + 2..total_len];

    if trailer != TRAILER {
        return FrameOutcome::Bad { consumed: total_len };
    }

    if checksum(payload) != got_cksum {
        return FrameOutcome::Bad { consumed: total_len };
    }

    FrameOutcome::Frame {
        consumed: total_len,
        payload: payload.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SYNC);
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(payload);
        buf.extend_from_slice(&checksum(payload).to_be_bytes());
        buf.extend_from_slice(&TRAILER);
        buf
    }

    #[test]
    fn accepts_well_formed_frame() {
        let payload = vec![0x02, 0x01, 0x02, 0x03, 0x04];
        let frame = build_frame(&payload);
        match try_frame(&frame, 8192) {
            FrameOutcome::Frame { consumed, payload: p } => {
                assert_eq!(consumed, frame.len());
                assert_eq!(p, payload);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn checksum_masked_to_15_bits() {
        // Bytes summing past 0x7fff exercise the mask.
        let payload = vec![0xff; 200];
        let cksum = checksum(&payload);
        assert!(cksum <= 0x7fff);
        assert_eq!(u32::from(cksum), (200u32 * 0xff) & 0x7fff);
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut frame = build_frame(&[0x29, 0x01, 0x02]);
        let cksum_idx = HEADER_LEN + 3;
        frame[cksum_idx] ^= 0xff;
        match try_frame(&frame, 8192) {
            FrameOutcome::Bad { consumed } => assert_eq!(consumed, frame.len()),
            other => panic!("expected bad frame, got {other:?}"),
        }
    }
}
