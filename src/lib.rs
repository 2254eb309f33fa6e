//! # gnss-recv-core
//!
//! The receiver-driver core of a multi-device GNSS aggregation service:
//! auto-identifies which of several chipset protocols is arriving on a
//! byte stream, frames and checksum-validates packets for each protocol,
//! decodes them into a unified navigation/satellite/time model, and sends
//! configuration/rate/mode commands back to the device. Alongside this,
//! the crate implements an NTRIP client for pulling differential
//! correction streams from remote casters.
//!
//! ## Layout
//!
//! - [`reader`] — endian-aware byte extraction shared by every decoder.
//! - [`lexer`] — the protocol-dispatching framing recognizer (NMEA, UBX,
//!   TSIP, Skytraq, SiRF, RTCM3, plus an HTTP chunked-transfer overlay for
//!   NTRIP).
//! - [`registry`] — the `Driver` trait and the ordered descriptor catalog
//!   that selects an active driver for a device session.
//! - [`drivers`] — one module per chipset family implementing `Driver`.
//! - [`model`] — the protocol-agnostic unified fix/skyview/raw-measurement
//!   types every driver decodes into.
//! - [`session`] — [`session::DeviceSession`], which wires a lexer, the
//!   driver registry, and the unified model together for one device.
//! - [`ntrip`] — the NTRIP caster client: URL parsing, sourcetable fetch,
//!   HTTP/1.1 request building, and GGA uplink scheduling.
//! - [`nmea_emit`] — synthesizes NMEA sentences from the unified model,
//!   used by the NTRIP GGA uplink.
//! - [`context`] — the explicitly-threaded configuration/leap-second
//!   context, passed by reference wherever state would otherwise be
//!   global.
//! - [`time`] — GPS week/TOW/leap-second resolution shared by every
//!   driver that hands back a raw (week, TOW) pair.
//! - [`error`] — the crate's error and decode-warning types.

pub mod context;
pub mod drivers;
pub mod error;
pub mod lexer;
pub mod model;
pub mod nmea_emit;
pub mod ntrip;
pub mod reader;
pub mod registry;
pub mod session;
pub mod time;

pub use error::GnssError;

/// Convenience type alias for results carrying a [`GnssError`].
pub type Result<T> = core::result::Result<T, GnssError>;
