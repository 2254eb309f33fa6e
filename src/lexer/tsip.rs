//! Trimble TSIP framing recognizer.
//!
//! Both TSIP v0 and v1 share the same `0x10 ... 0x10 0x03` DLE-stuffed
//! envelope; what differs between them is the payload structure (id byte
//! only vs id+subid+explicit length+checksum), which is a driver-level
//! concern (`drivers::tsip`), not a framing concern. The lexer's only job
//! here is to find the terminator and undo byte-stuffing: a literal
//! `0x10` inside the payload is escaped as `0x10 0x10`.

use super::FrameOutcome;

pub const START: u8 = 0x10;
const END: [u8; 2] = [0x10, 0x03];

pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert_eq!(buf[0], START);

    let mut payload = Vec::new();
    let mut i = 1;

    loop {
        if i >= buf.len() {
            if payload.len() > max_packet {
                return FrameOutcome::Overflow;
            }
            return FrameOutcome::Incomplete;
        }

        if buf[i] == START {
            if i + 1 >= buf.len() {
                return FrameOutcome::Incomplete;
            }

            match buf[i + 1] {
                0x03 => {
                    return FrameOutcome::Frame {
                        consumed: i + 2,
                        payload,
                    };
                }
                START => {
                    payload.push(START);
                    i += 2;
                }
                _ => {
                    // An unescaped DLE not followed by ETX or another DLE:
                    // framing desync. Discard through the offending byte.
                    return FrameOutcome::Bad { consumed: i + 1 };
                }
            }
        } else {
            payload.push(buf[i]);
            i += 1;
        }

        if payload.len() > max_packet {
            return FrameOutcome::Overflow;
        }
    }
}

/// Re-applies DLE byte-stuffing to an outgoing TSIP command payload, the
/// inverse of the unstuffing `try_frame` performs on input.
pub fn stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(START);
    for &b in payload {
        out.push(b);
        if b == START {
            out.push(START);
        }
    }
    out.extend_from_slice(&END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstuffs_literal_dle_in_payload() {
        // payload bytes: 0x01 0x10 0x02, stuffed as 0x01 0x10 0x10 0x02
        let mut buf = vec![START, 0x01, 0x10, 0x10, 0x02];
        buf.extend_from_slice(&END);
        match try_frame(&buf, 8192) {
            FrameOutcome::Frame { consumed, payload } => {
                assert_eq!(consumed, buf.len());
                assert_eq!(payload, vec![0x01, 0x10, 0x02]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn stuff_and_unstuff_roundtrip() {
        let original = vec![0x8f, 0x20, 0x10, 0x00, 0x10, 0x10];
        let wire = stuff(&original);
        match try_frame(&wire, 8192) {
            FrameOutcome::Frame { payload, .. } => assert_eq!(payload, original),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_without_terminator() {
        let buf = vec![START, 0x8f, 0x20, 0x00];
        assert!(matches!(try_frame(&buf, 8192), FrameOutcome::Incomplete));
    }

    #[test]
    fn lone_unescaped_dle_is_bad_frame() {
        // 0x10 followed by something that is neither 0x03 nor 0x10.
        let buf = vec![START, 0x01, START, 0x05];
        match try_frame(&buf, 8192) {
            FrameOutcome::Bad { consumed } => assert_eq!(consumed, 3),
            other => panic!("expected bad frame, got {other:?}"),
        }
    }
}
