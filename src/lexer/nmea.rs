//! NMEA-0183 / AIVDM framing recognizer and checksum.
//!
//! Lead: `$` or `!` followed by an uppercase-alphabetic talker. Frame ends
//! at `\r\n` or `\n`. Checksum is `*HH`, hex XOR over the characters
//! between the lead and the `*`.

use super::FrameOutcome;

/// Computes the NMEA checksum: XOR of every byte strictly between the
/// leading `$`/`!` and the trailing `*`.
pub fn checksum(sentence_body: &[u8]) -> u8 {
    sentence_body.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Attempts to recognize one NMEA or AIVDM sentence starting at `buf[0]`.
///
/// `buf[0]` is guaranteed by the caller to be `$` or `!`.
pub fn try_frame(buf: &[u8], max_packet: usize) -> FrameOutcome {
    debug_assert!(buf[0] == b'$' || buf[0] == b'!');

    // Talker must be uppercase alphabetic, else this isn't really NMEA.
    match buf.get(1) {
        Some(&c) if c.is_ascii_uppercase() => {}
        Some(_) => return FrameOutcome::Bad { consumed: 1 },
        None => return FrameOutcome::Incomplete,
    }

    // Find the terminating \n (accepting a preceding \r).
    let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > max_packet {
            return FrameOutcome::Overflow;
        }
        return FrameOutcome::Incomplete;
    };

    if nl + 1 > max_packet {
        return FrameOutcome::Overflow;
    }

    let line_end = if nl > 0 && buf[nl - 1] == b'\r' { nl - 1 } else { nl };
    let line = &buf[..line_end];

    let Some(star) = line.iter().rposition(|&b| b == b'*') else {
        // No checksum field at all: treat the line itself as malformed framing.
        return FrameOutcome::Bad { consumed: nl + 1 };
    };

    if star + 2 >= line.len() {
        return FrameOutcome::Bad { consumed: nl + 1 };
    }

    let hex = &line[star + 1..star + 3];
    let Ok(hex_str) = std::str::from_utf8(hex) else {
        return FrameOutcome::Bad { consumed: nl + 1 };
    };
    let Ok(expected) = u8::from_str_radix(hex_str, 16) else {
        return FrameOutcome::Bad { consumed: nl + 1 };
    };

    let body = &line[1..star];
    let actual = checksum(body);

    if actual != expected {
        return FrameOutcome::Bad { consumed: nl + 1 };
    }

    FrameOutcome::Frame {
        consumed: nl + 1,
        payload: line.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_known_sentence() {
        // $GPGGA,...*75 style sentence from common GPS logs.
        let body = b"GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let sum = checksum(body);
        assert_eq!(format!("{sum:02X}"), "75");
    }

    #[test]
    fn accepts_well_formed_sentence() {
        let body = b"GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let cksum = checksum(body);
        let sentence = format!("${}*{:02X}\r\n", String::from_utf8_lossy(body), cksum);
        match try_frame(sentence.as_bytes(), 1024) {
            FrameOutcome::Frame { consumed, .. } => assert_eq!(consumed, sentence.len()),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_checksum() {
        let sentence = b"$GPGGA,1,2,3*00\r\n";
        match try_frame(sentence, 1024) {
            FrameOutcome::Bad { consumed } => assert_eq!(consumed, sentence.len()),
            other => panic!("expected bad frame, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_without_newline() {
        let sentence = b"$GPGGA,1,2,3*75";
        assert!(matches!(try_frame(sentence, 1024), FrameOutcome::Incomplete));
    }

    #[test]
    fn aivdm_lead_is_accepted() {
        let body = b"AIVDM,1,1,,A,15NPOOPP00o?b=bE9NMeewv00@MS,0";
        let cksum = checksum(body);
        let sentence = format!("!{}*{:02X}\r\n", String::from_utf8_lossy(body), cksum);
        assert!(matches!(
            try_frame(sentence.as_bytes(), 1024),
            FrameOutcome::Frame { .. }
        ));
    }
}
