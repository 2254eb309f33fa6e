//! HTTP/1.1 chunked-transfer overlay (§4.2, "Chunked transfer overlay").
//!
//! When the active driver is NTRIP in chunked mode, raw bytes from the
//! socket must have their chunk framing (hex size line, CRLF, bytes,
//! CRLF) stripped before the inner stream reaches the RTCM recognizers.
//! Chunk boundaries do not align with RTCM frame boundaries, so this is a
//! small state machine of its own, independent from [`super::Lexer`]:
//! its output is fed straight into a `Lexer::advance` call.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a `<hex-size>\r\n` line.
    SizeLine,
    /// Copying `remaining` bytes of chunk data straight through.
    Data { remaining: usize },
    /// A chunk's data has ended; waiting for the trailing `\r\n` before
    /// the next size line.
    TrailingCrlf,
    /// The zero-size chunk has been seen; nothing more to decode (any
    /// trailer headers that follow are not RTCM payload and are dropped).
    Done,
}

/// Strips HTTP chunked-transfer framing from an input byte stream,
/// forwarding only the chunk payload bytes.
pub struct ChunkedDecoder {
    state: State,
    /// Bytes received but not yet resolved into a complete size line or
    /// chunk body (e.g. a partial hex-size line split across two reads).
    pending: Vec<u8>,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        ChunkedDecoder::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        ChunkedDecoder {
            state: State::SizeLine,
            pending: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feeds newly-arrived raw bytes and returns the decoded (unchunked)
    /// payload bytes extracted so far, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            match self.state {
                State::Done => break,
                State::SizeLine => {
                    let Some(nl) = self.pending.iter().position(|&b| b == b'\n') else {
                        break;
                    };
                    let line_end = if nl > 0 && self.pending[nl - 1] == b'\r' { nl - 1 } else { nl };
                    let line = &self.pending[..line_end];
                    // A chunk extension (`;name=value`) may follow the size;
                    // only the hex digits before it matter.
                    let hex_part = line.split(|&b| b == b';').next().unwrap_or(line);
                    let hex_str = String::from_utf8_lossy(hex_part);
                    let Ok(size) = usize::from_str_radix(hex_str.trim(), 16) else {
                        // Malformed chunk framing: stop decoding further.
                        self.pending.drain(..nl + 1);
                        self.state = State::Done;
                        break;
                    };
                    self.pending.drain(..nl + 1);
                    if size == 0 {
                        self.state = State::Done;
                    } else {
                        self.state = State::Data { remaining: size };
                    }
                }
                State::Data { remaining } => {
                    if self.pending.is_empty() {
                        break;
                    }
                    let take = remaining.min(self.pending.len());
                    out.extend(self.pending.drain(..take));
                    let left = remaining - take;
                    if left == 0 {
                        self.state = State::TrailingCrlf;
                    } else {
                        self.state = State::Data { remaining: left };
                        break; // used up all pending bytes
                    }
                }
                State::TrailingCrlf => {
                    if self.pending.len() < 2 {
                        break;
                    }
                    // CRLF after chunk data; tolerate a bare LF too.
                    if self.pending[0] == b'\r' {
                        self.pending.drain(..1);
                    }
                    if self.pending.is_empty() {
                        break;
                    }
                    if self.pending[0] == b'\n' {
                        self.pending.drain(..1);
                    }
                    self.state = State::SizeLine;
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_roundtrips() {
        let mut dec = ChunkedDecoder::new();
        let out = dec.feed(b"5\r\nhello\r\n0\r\n\r\n");
        assert_eq!(out, b"hello");
        assert!(dec.is_done());
    }

    #[test]
    fn chunk_split_across_two_feeds() {
        // Scenario S5: chunk boundaries that don't align with the data
        // the caller happens to read in one go.
        let mut dec = ChunkedDecoder::new();
        let mut out = dec.feed(b"4\r\nab");
        out.extend(dec.feed(b"cd\r\n0\r\n\r\n"));
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn size_line_split_across_feeds() {
        let mut dec = ChunkedDecoder::new();
        let mut out = dec.feed(b"1");
        out.extend(dec.feed(b"0\r\n0123456789\r\n0\r\n\r\n"));
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn multi_chunk_stream_concatenates_in_order() {
        let mut dec = ChunkedDecoder::new();
        let out = dec.feed(b"3\r\nfoo\r\n3\r\nbar\r\n0\r\n\r\n");
        assert_eq!(out, b"foobar");
    }
}
