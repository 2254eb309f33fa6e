//! Protocol-dispatching lexer (C2).
//!
//! Consumes an arbitrary byte stream and emits complete, checksum-validated
//! frames classified by [`PacketType`]. Since the stream is unlabeled on
//! open, every framing recognizer below is tried at once; only the
//! recognizer whose lead byte(s) match even gets a chance to commit.
//!
//! Per-protocol framing lives in the sibling modules (`nmea`, `ubx`,
//! `tsip`, `skytraq`, `sirf`, `rtcm3`); this module owns the ring buffer,
//! the lead-byte dispatch table, the type-mask, and the HTTP chunked-
//! transfer overlay used by the NTRIP client.

use crate::reader::u16_be;

pub mod chunked;
pub mod evermore;
pub mod garmin;
pub mod nmea;
pub mod rtcm3;
pub mod sirf;
pub mod skytraq;
pub mod tsip;
pub mod ubx;

/// Upper bound on a single frame, matching spec §3's "ring buffer ... size
/// >= max packet (~8 KiB)".
pub const MAX_PACKET_SIZE: usize = 8192;

/// Outcome of one framing recognizer's attempt to commit a frame out of
/// the leading bytes of its input slice.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Not enough bytes yet to know either way.
    Incomplete,
    /// A complete, validated frame. `consumed` bytes should be dropped
    /// from the head of the buffer.
    Frame { consumed: usize, payload: Vec<u8> },
    /// A framing attempt failed (bad checksum/trailer/etc). `consumed`
    /// bytes — the entire malformed region — should be dropped.
    Bad { consumed: usize },
    /// The frame-in-progress would exceed `max_packet`; the buffer must
    /// be reset rather than allowed to grow without bound. Protocols with
    /// no declared length field (NMEA, TSIP) only hit this when no
    /// terminator has been found after scanning `max_packet` bytes — a
    /// genuinely unbounded, Fatal condition (§7). Protocols that carry an
    /// explicit length field (UBX, Skytraq, SiRF, RTCM3) instead detect
    /// the bad length immediately from the header; the lexer treats that
    /// case as a one-byte discard-and-resync, not a fatal reset (§4.2:
    /// "a length overflow discards one byte and continues searching").
    Overflow,
}

/// Every packet type the lexer can classify a complete frame as. Mirrors
/// spec §3's tagged-variant list; order is part of the public ABI via
/// [`PacketType::mask_bit`], so new variants must be appended, not
/// inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Bad = 0,
    Comment,
    Nmea,
    Aivdm,
    Ubx,
    Tsip,
    Sirf,
    Skytraq,
    GarminSer,
    GarminUsb,
    Zodiac,
    Evermore,
    Italk,
    Navcom,
    Oncore,
    Superstar2,
    Geostar,
    Greis,
    Casic,
    Allystar,
    Nmea2000,
    Rtcm2,
    Rtcm3,
    Spartn,
    Json,
    Garmintxt,
    Pps,
}

impl PacketType {
    /// The single bit this type occupies in a [`TypeMask`].
    pub fn mask_bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

bitflags::bitflags! {
    /// A bitset of currently acceptable packet types. Higher layers
    /// narrow this once a driver is chosen (spec §4.2, "type-mask");
    /// frames whose type is masked out are silently discarded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeMask: u64 {
        const BAD         = 1 << (PacketType::Bad as u8);
        const COMMENT     = 1 << (PacketType::Comment as u8);
        const NMEA        = 1 << (PacketType::Nmea as u8);
        const AIVDM       = 1 << (PacketType::Aivdm as u8);
        const UBX         = 1 << (PacketType::Ubx as u8);
        const TSIP        = 1 << (PacketType::Tsip as u8);
        const SIRF        = 1 << (PacketType::Sirf as u8);
        const SKYTRAQ     = 1 << (PacketType::Skytraq as u8);
        const GARMIN_SER  = 1 << (PacketType::GarminSer as u8);
        const GARMIN_USB  = 1 << (PacketType::GarminUsb as u8);
        const ZODIAC      = 1 << (PacketType::Zodiac as u8);
        const EVERMORE    = 1 << (PacketType::Evermore as u8);
        const ITALK       = 1 << (PacketType::Italk as u8);
        const NAVCOM      = 1 << (PacketType::Navcom as u8);
        const ONCORE      = 1 << (PacketType::Oncore as u8);
        const SUPERSTAR2  = 1 << (PacketType::Superstar2 as u8);
        const GEOSTAR     = 1 << (PacketType::Geostar as u8);
        const GREIS       = 1 << (PacketType::Greis as u8);
        const CASIC       = 1 << (PacketType::Casic as u8);
        const ALLYSTAR    = 1 << (PacketType::Allystar as u8);
        const NMEA2000    = 1 << (PacketType::Nmea2000 as u8);
        const RTCM2       = 1 << (PacketType::Rtcm2 as u8);
        const RTCM3       = 1 << (PacketType::Rtcm3 as u8);
        const SPARTN      = 1 << (PacketType::Spartn as u8);
        const JSON        = 1 << (PacketType::Json as u8);
        const GARMINTXT   = 1 << (PacketType::Garmintxt as u8);
        const PPS         = 1 << (PacketType::Pps as u8);
    }
}

impl TypeMask {
    /// Every type the lexer can recognize; the default mask before a
    /// driver narrows it (spec §4.3 selection rule 1: "unknown" / fully
    /// NMEA-permissive is really "allow everything until we know better").
    pub fn all_known() -> TypeMask {
        TypeMask::all()
    }

    pub fn allows(self, pt: PacketType) -> bool {
        self.bits() & pt.mask_bit() != 0
    }
}

impl Default for TypeMask {
    fn default() -> Self {
        TypeMask::all_known()
    }
}

/// A complete classified frame as handed up to the driver registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

/// Why a framing attempt was abandoned, for logging at the "io"/"warn"
/// grade (spec §7, "Framing-desync").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadFrameReason {
    Checksum,
    UnknownLead,
    Overflow,
    Malformed,
}

/// One attempt at `next()` that did not yield a usable frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadFrame {
    pub reason: BadFrameReason,
}

/// Result of one `Lexer::next()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum LexResult {
    NoFrameYet,
    Frame(Packet),
    Bad(BadFrame),
}

/// Stateful recognizer that classifies an input byte stream into framed,
/// checksum-validated packets.
///
/// The "ring buffer" of spec §3 is realized here as a growable `Vec<u8>`
/// that is periodically compacted (`drain`) rather than a fixed-capacity
/// ring with wraparound indices — same invariant (`read cursor <= write
/// cursor <= buffer end`, bytes consumed removed from the head), simpler
/// Rust representation. `max_packet` bounds how far `buf` is allowed to
/// grow before a `Fatal`/overflow reset (§7).
pub struct Lexer {
    buf: Vec<u8>,
    max_packet: usize,
    type_mask: TypeMask,
}

impl Default for Lexer {
    fn default() -> Self {
        Lexer::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Lexer {
            buf: Vec::new(),
            max_packet: MAX_PACKET_SIZE,
            type_mask: TypeMask::all_known(),
        }
    }

    pub fn with_max_packet(max_packet: usize) -> Self {
        Lexer {
            buf: Vec::new(),
            max_packet,
            type_mask: TypeMask::all_known(),
        }
    }

    /// Narrows (or widens) the set of packet types this lexer will emit.
    /// Called by the driver registry once a driver is selected (§4.3).
    pub fn set_type_mask(&mut self, mask: TypeMask) {
        self.type_mask = mask;
    }

    pub fn type_mask(&self) -> TypeMask {
        self.type_mask
    }

    /// Appends newly-arrived bytes to the input buffer.
    pub fn advance(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to emit at most one frame. Never blocks; returns
    /// `NoFrameYet` if the buffered bytes don't yet resolve one way or
    /// the other.
    pub fn next(&mut self) -> LexResult {
        if self.buf.is_empty() {
            return LexResult::NoFrameYet;
        }

        match self.try_dispatch() {
            DispatchOutcome::NoFrameYet => LexResult::NoFrameYet,
            DispatchOutcome::Discard(n) => {
                self.buf.drain(..n);
                LexResult::NoFrameYet
            }
            DispatchOutcome::Masked(n) => {
                self.buf.drain(..n);
                LexResult::NoFrameYet
            }
            DispatchOutcome::Emit(kind, consumed, payload) => {
                self.buf.drain(..consumed);
                LexResult::Frame(Packet { kind, payload })
            }
            DispatchOutcome::Bad(reason, consumed) => {
                self.buf.drain(..consumed);
                LexResult::Bad(BadFrame { reason })
            }
            DispatchOutcome::Fatal => {
                // Fatal per §7: no terminator found within max_packet
                // (NMEA/TSIP have no declared length to fail fast on), so
                // the whole buffer is discarded and the lexer resets.
                self.buf.clear();
                LexResult::Bad(BadFrame {
                    reason: BadFrameReason::Overflow,
                })
            }
        }
    }

    fn try_dispatch(&self) -> DispatchOutcome {
        let buf = &self.buf[..];
        let lead = buf[0];

        match lead {
            b'$' | b'!' => self.dispatch_nmea(buf),
            ubx::SYNC0 if buf.len() >= 2 && buf[1] == ubx::SYNC1 => self.wrap(
                PacketType::Ubx,
                TypeMask::UBX,
                ubx::try_frame(buf, self.max_packet),
                DeclaredLength::Yes,
            ),
            ubx::SYNC0 if buf.len() < 2 => DispatchOutcome::NoFrameYet,
            tsip::START => self.dispatch_tsip_family(buf),
            skytraq::SYNC0 if buf.len() >= 2 && buf[1] == skytraq::SYNC1 => self.wrap(
                PacketType::Skytraq,
                TypeMask::SKYTRAQ,
                skytraq::try_frame(buf, self.max_packet),
                DeclaredLength::Yes,
            ),
            sirf::SYNC0 if buf.len() >= 2 && buf[1] == sirf::SYNC1 => self.wrap(
                PacketType::Sirf,
                TypeMask::SIRF,
                sirf::try_frame(buf, self.max_packet),
                DeclaredLength::Yes,
            ),
            b if b == skytraq::SYNC0 && buf.len() < 2 => DispatchOutcome::NoFrameYet,
            garmin::SYNC0 if buf.len() >= 2 && buf[1] == garmin::SYNC1 => self.wrap(
                PacketType::GarminSer,
                TypeMask::GARMIN_SER,
                garmin::try_frame(buf, self.max_packet),
                DeclaredLength::Yes,
            ),
            garmin::SYNC0 if buf.len() < 2 => DispatchOutcome::NoFrameYet,
            rtcm3::PREAMBLE => self.wrap(
                PacketType::Rtcm3,
                TypeMask::RTCM3,
                rtcm3::try_frame(buf, self.max_packet),
                DeclaredLength::Yes,
            ),
            b'#' => self.dispatch_comment(buf),
            b'{' => self.dispatch_json(buf),
            _ => DispatchOutcome::Discard(1),
        }
    }

    /// Wraps a sub-recognizer's [`FrameOutcome`] into a [`DispatchOutcome`].
    ///
    /// `declared_length` distinguishes the two overflow cases in §4.2/§7:
    /// a protocol that carries an explicit length field in its header
    /// (UBX/Skytraq/SiRF/RTCM3) knows its frame is oversized the instant
    /// the header is read, so that's a one-byte discard-and-resync, not a
    /// buffer-wide reset. A protocol with no length field (TSIP, scanning
    /// for its DLE/ETX terminator; NMEA, scanning for `\n`) only overflows
    /// after accumulating `max_packet` bytes with no terminator in sight —
    /// genuinely unbounded growth, so that case is Fatal.
    fn wrap(&self, kind: PacketType, bit: TypeMask, outcome: FrameOutcome, declared_length: DeclaredLength) -> DispatchOutcome {
        match outcome {
            FrameOutcome::Incomplete => DispatchOutcome::NoFrameYet,
            FrameOutcome::Overflow => match declared_length {
                DeclaredLength::Yes => DispatchOutcome::Discard(1),
                DeclaredLength::No => DispatchOutcome::Fatal,
            },
            FrameOutcome::Bad { consumed } => DispatchOutcome::Bad(BadFrameReason::Checksum, consumed),
            FrameOutcome::Frame { consumed, payload } => {
                if self.type_mask.contains(bit) {
                    DispatchOutcome::Emit(kind, consumed, payload)
                } else {
                    DispatchOutcome::Masked(consumed)
                }
            }
        }
    }

    /// TSIP and Evermore share the same DLE/ETX envelope — `tsip::try_frame`
    /// does the unstuffing for both — and are told apart only by the
    /// unstuffed payload's first byte, which Evermore reserves entirely
    /// for its own packet ids (§4.11).
    fn dispatch_tsip_family(&self, buf: &[u8]) -> DispatchOutcome {
        let outcome = tsip::try_frame(buf, self.max_packet);
        match &outcome {
            FrameOutcome::Frame { payload, .. } if evermore::is_evermore(payload) => {
                self.wrap(PacketType::Evermore, TypeMask::EVERMORE, outcome, DeclaredLength::No)
            }
            _ => self.wrap(PacketType::Tsip, TypeMask::TSIP, outcome, DeclaredLength::No),
        }
    }

    fn dispatch_nmea(&self, buf: &[u8]) -> DispatchOutcome {
        let outcome = nmea::try_frame(buf, self.max_packet);
        let kind = if buf.starts_with(b"!AIVDM") || buf.starts_with(b"!AIVDO") {
            PacketType::Aivdm
        } else {
            PacketType::Nmea
        };
        let bit = if kind == PacketType::Aivdm {
            TypeMask::AIVDM
        } else {
            TypeMask::NMEA
        };
        self.wrap(kind, bit, outcome, DeclaredLength::No)
    }

    /// Comment packets: `#...\n`, emitted as a distinct type rather than
    /// discarded (§4.2: "Comment packets (`#…\n`) are recognized and
    /// emitted as a distinct type").
    fn dispatch_comment(&self, buf: &[u8]) -> DispatchOutcome {
        match buf.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                if nl + 1 > self.max_packet {
                    return DispatchOutcome::Fatal;
                }
                if self.type_mask.contains(TypeMask::COMMENT) {
                    DispatchOutcome::Emit(PacketType::Comment, nl + 1, buf[..nl + 1].to_vec())
                } else {
                    DispatchOutcome::Masked(nl + 1)
                }
            }
            None if buf.len() > self.max_packet => DispatchOutcome::Fatal,
            None => DispatchOutcome::NoFrameYet,
        }
    }

    /// JSON passthrough: one object per newline-delimited line, mirroring
    /// the wire shape the NTRIP/driver-registry boundary uses for its own
    /// out-of-band control messages.
    fn dispatch_json(&self, buf: &[u8]) -> DispatchOutcome {
        match buf.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                if nl + 1 > self.max_packet {
                    return DispatchOutcome::Fatal;
                }
                if buf[..nl].iter().filter(|&&b| b == b'{').count()
                    != buf[..nl].iter().filter(|&&b| b == b'}').count()
                {
                    return DispatchOutcome::Bad(BadFrameReason::Malformed, nl + 1);
                }
                if self.type_mask.contains(TypeMask::JSON) {
                    DispatchOutcome::Emit(PacketType::Json, nl + 1, buf[..nl].to_vec())
                } else {
                    DispatchOutcome::Masked(nl + 1)
                }
            }
            None if buf.len() > self.max_packet => DispatchOutcome::Fatal,
            None => DispatchOutcome::NoFrameYet,
        }
    }
}

/// Whether a sub-recognizer's framing carries an explicit length field in
/// its header (see [`Lexer::wrap`]).
enum DeclaredLength {
    Yes,
    No,
}

enum DispatchOutcome {
    NoFrameYet,
    /// Bytes dropped because no framing recognized the lead byte at all
    /// (framing-desync, §7: "discard one byte, retry").
    Discard(usize),
    /// A valid frame was recognized but its type is not in the current
    /// type-mask; dropped silently per §4.2.
    Masked(usize),
    Emit(PacketType, usize, Vec<u8>),
    Bad(BadFrameReason, usize),
    /// No terminator found within `max_packet` bytes (no declared length
    /// field to fail fast on): the whole buffer is discarded and reset.
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nmea_sentence(body: &str) -> String {
        let sum = body.bytes().fold(0u8, |acc, b| acc ^ b);
        format!("${body}*{sum:02X}\r\n")
    }

    #[test]
    fn emits_one_nmea_frame() {
        let mut lex = Lexer::new();
        lex.advance(nmea_sentence("GPGGA,1,2,3").as_bytes());
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Nmea),
            other => panic!("expected frame, got {other:?}"),
        }
        assert_eq!(lex.buffered_len(), 0);
    }

    #[test]
    fn classifies_aivdm_distinctly_from_nmea() {
        let mut lex = Lexer::new();
        let body = "AIVDM,1,1,,A,15NPOOPP00o?b=bE9NMeewv00@MS,0";
        let sum = body.bytes().fold(0u8, |acc, b| acc ^ b);
        lex.advance(format!("!{body}*{sum:02X}\r\n").as_bytes());
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Aivdm),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn unknown_lead_byte_discards_one_and_recovers() {
        // Scenario S6: a stray lead byte must not desync recognition
        // indefinitely.
        let mut lex = Lexer::new();
        lex.advance(&[0xffu8]);
        lex.advance(nmea_sentence("GPGGA,1").as_bytes());
        assert_eq!(lex.next(), LexResult::NoFrameYet);
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Nmea),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn ubx_lead_ambiguous_prefix_then_valid_frame() {
        // Scenario S6: 0xB5 0xB5 0x62 ... — the first 0xB5 must be
        // discarded before the real UBX sync is found.
        let mut lex = Lexer::new();
        lex.advance(&[0xB5]);
        lex.advance(&[0xB5, 0x62, 0x01, 0x07]);
        // length field: absurdly large, forces a declared-length overflow
        // on that attempt, which discards one byte and resyncs rather
        // than wiping the buffer (§4.2).
        lex.advance(&60000u16.to_le_bytes());

        let mut iterations = 0;
        while lex.buffered_len() > 0 {
            assert_eq!(lex.next(), LexResult::NoFrameYet);
            iterations += 1;
            assert!(iterations <= 10, "overflow handling did not converge");
        }

        let payload = vec![0u8; 4];
        let mut frame = ubx::SYNC.to_vec();
        frame.push(0x01);
        frame.push(0x07);
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&payload);
        let (a, b) = ubx::fletcher(&frame[2..]);
        frame.push(a);
        frame.push(b);
        lex.advance(&frame);
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Ubx),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    /// A declared-length overflow never reports `BadFrameReason::Overflow`
    /// or clears bytes beyond the offending header — that reason and the
    /// full-buffer reset are reserved for the Fatal, no-terminator-found
    /// case below.
    #[test]
    fn ubx_declared_length_overflow_discards_one_byte_not_whole_buffer() {
        let mut lex = Lexer::new();
        lex.advance(&ubx::SYNC);
        lex.advance(&[0x01, 0x07]);
        lex.advance(&60000u16.to_le_bytes());
        assert_eq!(lex.buffered_len(), 6);

        assert_eq!(lex.next(), LexResult::NoFrameYet);
        // Only the leading sync byte was discarded, not the whole frame.
        assert_eq!(lex.buffered_len(), 5);
    }

    #[test]
    fn nmea_with_no_terminator_past_max_packet_is_fatal_overflow() {
        let mut lex = Lexer::with_max_packet(16);
        let mut buf = vec![b'$', b'G', b'P'];
        buf.extend(std::iter::repeat(b'A').take(32));
        lex.advance(&buf);
        assert_eq!(
            lex.next(),
            LexResult::Bad(BadFrame {
                reason: BadFrameReason::Overflow
            })
        );
        assert_eq!(lex.buffered_len(), 0);
    }

    #[test]
    fn comment_packets_are_emitted_as_distinct_type() {
        let mut lex = Lexer::new();
        lex.advance(b"# a debug comment\n");
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Comment),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn masked_type_is_silently_dropped() {
        let mut lex = Lexer::new();
        lex.set_type_mask(TypeMask::UBX); // NMEA no longer allowed
        lex.advance(nmea_sentence("GPGGA,1").as_bytes());
        assert_eq!(lex.next(), LexResult::NoFrameYet);
        assert_eq!(lex.buffered_len(), 0);
    }

    #[test]
    fn garmin_serial_frame_is_classified_distinctly_from_skytraq() {
        let mut lex = Lexer::new();
        let data = [0x01, 0x02, 0x03];
        let mut frame = garmin::SYNC.to_vec();
        frame.push(51); // Pvt_Data_Type
        frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
        frame.extend_from_slice(&data);
        let mut id_and_data = vec![51];
        id_and_data.extend_from_slice(&data);
        frame.push(id_and_data.iter().fold(0u8, |acc, &b| acc ^ b));
        lex.advance(&frame);
        match lex.next() {
            LexResult::Frame(p) => {
                assert_eq!(p.kind, PacketType::GarminSer);
                assert_eq!(p.payload, id_and_data);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn evermore_frame_sharing_tsip_envelope_is_classified_as_evermore() {
        let mut lex = Lexer::new();
        lex.advance(&tsip::stuff(&[evermore::FIX_REPORT, 0x01, 0x02]));
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Evermore),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn genuine_tsip_frame_still_classified_as_tsip_not_evermore() {
        let mut lex = Lexer::new();
        lex.advance(&tsip::stuff(&[0x8f, 0x01]));
        match lex.next() {
            LexResult::Frame(p) => assert_eq!(p.kind, PacketType::Tsip),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn idempotent_replays_yield_identical_frame_streams() {
        let mut input = Vec::new();
        input.extend_from_slice(nmea_sentence("GPGGA,1").as_bytes());
        input.extend_from_slice(nmea_sentence("GPRMC,2").as_bytes());

        let run = |input: &[u8]| {
            let mut lex = Lexer::new();
            lex.advance(input);
            let mut out = Vec::new();
            loop {
                match lex.next() {
                    LexResult::NoFrameYet => break,
                    other => out.push(other),
                }
            }
            out
        };

        assert_eq!(run(&input), run(&input));
    }
}
