//! Proprietary NMEA-0183 sentence drivers (C4, §4.4): vendor-prefix
//! triggers used purely for chipset-family *discovery*. Each of these
//! shares the generic NMEA lexer framing (`PacketType::Nmea`) but is
//! selected over the plain `nmea0183` driver by the registry's trigger
//! match (§4.3 rule 2) the first time one of its sentences arrives, and
//! then stays active (`sticky`) across re-opens the way a real vendor
//! chip keeps identifying itself the same way every time.
//!
//! None of these carries enough decodable navigation content to justify
//! its own module; each gets a minimal `Driver` impl here, decoding the
//! one or two fields that map onto the unified model and logging the
//! rest, matching the completeness level §4.11 sets for the other C8
//! family drivers.

use crate::context::Context;
use crate::lexer::PacketType;
use crate::model::{DirtyBits, Skyview, UnifiedFix};
use crate::registry::{Driver, DriverPrivate, ParseOutcome};

use super::nmea::body as sentence_body;

fn fields(line: &str) -> Vec<&str> {
    sentence_body(line).split(',').collect()
}

fn field_f64(f: &str) -> Option<f64> {
    if f.is_empty() { None } else { f.parse().ok() }
}

/// Garmin proprietary sentences (`$PGRM*`): `PGRME` (estimated position
/// error) and `PGRMZ` (altitude, with a fix-type letter).
pub struct GarminPgrmDriver;

impl Driver for GarminPgrmDriver {
    fn name(&self) -> &'static str {
        "nmea-pgrm"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PGRM")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        let Ok(line) = std::str::from_utf8(payload) else {
            return ParseOutcome::default();
        };
        let f = fields(line);
        let Some(&id) = f.first() else {
            return ParseOutcome::default();
        };
        match id {
            "PGRME" if f.len() >= 6 => {
                if let Some(eph) = field_f64(f[1]) {
                    fix.err.eph = Some(eph);
                }
                if let Some(epv) = field_f64(f[3]) {
                    fix.err.epv = Some(epv);
                }
                ParseOutcome::default()
            }
            "PGRMZ" if f.len() >= 2 => {
                if let Some(alt_ft) = field_f64(f[1]) {
                    fix.geodetic.alt_msl = Some(alt_ft * 0.3048);
                    fix.dirty.insert(DirtyBits::ALTITUDE);
                }
                ParseOutcome::default()
            }
            other => {
                log::trace!("nmea-pgrm: sentence {other} not decoded");
                ParseOutcome::default()
            }
        }
    }
}

/// MediaTek (`$PMTK*`) command acknowledgements. Carries no navigation
/// fields of its own; present purely so the family is recognized and
/// doesn't fall through to the generic NMEA driver's (non-sticky)
/// handling on every re-open.
pub struct MtkDriver;

impl Driver for MtkDriver {
    fn name(&self) -> &'static str {
        "nmea-pmtk"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PMTK")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        _fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if let Ok(line) = std::str::from_utf8(payload) {
            log::debug!("nmea-pmtk: {}", sentence_body(line));
        }
        ParseOutcome::default()
    }
}

/// Ashtech `$PASHR,RID` receiver-identification response — the probe
/// reply used to discover this family (§4.4). Carries model/firmware
/// text fields, not navigation data.
pub struct AshtechRidDriver;

impl Driver for AshtechRidDriver {
    fn name(&self) -> &'static str {
        "nmea-pashr-rid"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PASHR,RID")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        _fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if let Ok(line) = std::str::from_utf8(payload) {
            log::info!("nmea-pashr-rid: identification {}", sentence_body(line));
        }
        ParseOutcome::default()
    }
}

/// Fastrax/Ashtech-derived `$PFEC,GP*` family sentences.
pub struct FecDriver;

impl Driver for FecDriver {
    fn name(&self) -> &'static str {
        "nmea-pfec"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PFEC,GP")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        _fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if let Ok(line) = std::str::from_utf8(payload) {
            log::trace!("nmea-pfec: {}", sentence_body(line));
        }
        ParseOutcome::default()
    }
}

/// Trimble proprietary `$PTNT*` sentences (compass heading/attitude) —
/// no counterpart field on the unified model, so this is discovery-only.
pub struct TrimbleTntDriver;

impl Driver for TrimbleTntDriver {
    fn name(&self) -> &'static str {
        "nmea-ptnt"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PTNT")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        _fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if let Ok(line) = std::str::from_utf8(payload) {
            log::trace!("nmea-ptnt: {}", sentence_body(line));
        }
        ParseOutcome::default()
    }
}

/// SiRF NMEA-mode proprietary sentences (`$PSRF*`), used to configure or
/// acknowledge a SiRF chip still running in NMEA mode before it's
/// switched to binary.
pub struct SirfNmeaDriver;

impl Driver for SirfNmeaDriver {
    fn name(&self) -> &'static str {
        "nmea-psrf"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn trigger(&self) -> Option<&'static str> {
        Some("PSRF")
    }

    fn sticky(&self) -> bool {
        true
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        _fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<crate::error::DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if let Ok(line) = std::str::from_utf8(payload) {
            log::debug!("nmea-psrf: {}", sentence_body(line));
        }
        ParseOutcome::default()
    }
}
