//! Error types for the GNSS receiver-driver core.
//!
//! Mirrors the taxonomy in the error-handling design: most failure modes
//! never reach this type at all (a bad checksum just yields a `BadFrame`
//! and the lexer keeps going). `GnssError` is reserved for failures an
//! embedder actually needs to observe — I/O, NTRIP session failures, and
//! misuse of the public API.

use std::fmt;

/// Crate-wide error type.
///
/// Built the way the teacher's `GpsdJsonError` is: a plain enum with a
/// hand-written `Display` and `std::error::Error` impl, no derive macro.
#[derive(Debug)]
pub enum GnssError {
    /// I/O error on a device or NTRIP socket.
    Io(std::io::Error),

    /// A write to a device failed short or errored (see "Write-failure").
    ///
    /// Non-fatal: the caller logs it and lets the next poll-clock tick
    /// retry the command.
    WriteFailed(&'static str),

    /// NTRIP-specific failure: auth rejected, mountpoint missing, or the
    /// sourcetable was exhausted without a matching entry.
    Ntrip(crate::ntrip::NtripError),

    /// Caller passed a malformed URL, out-of-range rate, or similar.
    InvalidArgument(&'static str),
}

impl fmt::Display for GnssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GnssError::Io(err) => write!(f, "io error: {err}"),
            GnssError::WriteFailed(msg) => write!(f, "write failed: {msg}"),
            GnssError::Ntrip(err) => write!(f, "ntrip error: {err}"),
            GnssError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for GnssError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GnssError::Io(err) => Some(err),
            GnssError::Ntrip(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GnssError {
    fn from(err: std::io::Error) -> Self {
        GnssError::Io(err)
    }
}

impl From<crate::ntrip::NtripError> for GnssError {
    fn from(err: crate::ntrip::NtripError) -> Self {
        GnssError::Ntrip(err)
    }
}

/// A non-fatal decode issue: a field was present but out of its documented
/// range, so it was forced to `None`/invalid and the packet was still
/// emitted (see "Decode-range").
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeWarning {
    pub driver: &'static str,
    pub field: &'static str,
    pub detail: String,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: field `{}` out of range: {}",
            self.driver, self.field, self.detail
        )
    }
}
