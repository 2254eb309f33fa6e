//! Per-family driver implementations (C4-C8). See `registry` for the
//! shared `Driver` trait and the descriptor catalog that wires these
//! together.

pub mod nmea;
pub mod nmea_proprietary;
pub mod other;
pub mod skytraq;
pub mod tsip;
pub mod ubx;
pub mod ubx_prn;
