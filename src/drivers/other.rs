//! The smaller binary families (C8, §4.11): SiRF, Garmin serial, and
//! Evermore. None of them carry enough state to warrant their own module;
//! each gets a minimal `Driver` impl here.

use crate::context::Context;
use crate::error::DecodeWarning;
use crate::lexer::evermore::FIX_REPORT as EVERMORE_FIX_REPORT;
use crate::lexer::PacketType;
use crate::model::{DirtyBits, FixMode, FixStatus, GnssSystem, SatHealth, SatelliteRecord, Skyview, UnifiedFix};
use crate::reader::{i16_be, i32_be, u16_be, u32_be, u8_at};
use crate::registry::{Driver, DriverPrivate, ParseOutcome};

const SIRF_MEASURED_NAV_DATA: u8 = 0x02;
const SIRF_MEASURED_TRACKER_DATA: u8 = 0x04;
const SIRF_GEODETIC_NAV_DATA: u8 = 0x29;

pub struct SirfDriver;

impl Driver for SirfDriver {
    fn name(&self) -> &'static str {
        "sirf"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Sirf
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if payload.is_empty() {
            return ParseOutcome::default();
        }
        match payload[0] {
            SIRF_MEASURED_NAV_DATA => decode_measured_nav_data(fix, &payload[1..]),
            SIRF_MEASURED_TRACKER_DATA => decode_measured_tracker_data(sky, &payload[1..], warnings),
            SIRF_GEODETIC_NAV_DATA => decode_geodetic_nav_data(fix, &payload[1..]),
            other => {
                log::trace!("sirf: message {other:#04x} not decoded");
                ParseOutcome::default()
            }
        }
    }
}

fn decode_measured_nav_data(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 41 {
        return ParseOutcome::default();
    }
    fix.ecef.x = Some(f64::from(i32_be(b, 0)));
    fix.ecef.y = Some(f64::from(i32_be(b, 4)));
    fix.ecef.z = Some(f64::from(i32_be(b, 8)));
    fix.ecef.vx = Some(f64::from(i16_be(b, 12)) / 8.0);
    fix.ecef.vy = Some(f64::from(i16_be(b, 14)) / 8.0);
    fix.ecef.vz = Some(f64::from(i16_be(b, 16)) / 8.0);

    let mode1 = u8_at(b, 19);
    let fix_type = mode1 & 0x07;
    fix.mode = match fix_type {
        0 => FixMode::NoFix,
        1 | 5 => FixMode::Fix2D,
        _ => FixMode::Fix3D,
    };
    fix.status = if fix_type == 0 { FixStatus::Unknown } else { FixStatus::Gps };

    let num_svs = usize::from(u8_at(b, 28));
    let _ = num_svs;

    fix.dirty.insert(DirtyBits::ECEF | DirtyBits::VECEF | DirtyBits::MODE | DirtyBits::STATUS | DirtyBits::REPORT_IS);
    ParseOutcome { cycle_complete: true }
}

fn decode_measured_tracker_data(sky: &mut Skyview, b: &[u8], warnings: &mut Vec<DecodeWarning>) -> ParseOutcome {
    if b.len() < 3 {
        return ParseOutcome::default();
    }
    let num_svs = usize::from(u8_at(b, 2));
    sky.satellites.clear();
    let mut offset = 3;
    for _ in 0..num_svs {
        if offset + 15 > b.len() {
            break;
        }
        let svid = u16::from(u8_at(b, offset));
        let azimuth = f64::from(u8_at(b, offset + 1)) * 1.5;
        let elevation = f64::from(u8_at(b, offset + 2)) * 1.5;
        let mut record = SatelliteRecord {
            gnss: Some(GnssSystem::Gps),
            svid,
            azimuth: Some(azimuth),
            elevation: Some(elevation),
            health: SatHealth::Ok,
            ..Default::default()
        };
        for field in record.sanitize_ranges() {
            warnings.push(DecodeWarning {
                driver: "sirf",
                field,
                detail: format!("tracker data svid {svid} out of documented range"),
            });
        }
        sky.satellites.push(record);
        offset += 15;
    }
    ParseOutcome::default()
}

fn decode_geodetic_nav_data(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 91 {
        return ParseOutcome::default();
    }
    fix.geodetic.lat = Some(f64::from(i32_be(b, 23)) * 1e-7);
    fix.geodetic.lon = Some(f64::from(i32_be(b, 27)) * 1e-7);
    fix.geodetic.alt_hae = Some(f64::from(i32_be(b, 31)) / 100.0);
    fix.geodetic.alt_msl = Some(f64::from(i32_be(b, 35)) / 100.0);
    fix.track = Some(f64::from(u16_be(b, 41)) / 100.0);
    fix.speed = Some(f64::from(u32_be(b, 46)) / 100.0);
    fix.dirty.insert(DirtyBits::LATLON | DirtyBits::ALTITUDE | DirtyBits::TRACK | DirtyBits::SPEED | DirtyBits::REPORT_IS);
    ParseOutcome { cycle_complete: true }
}

/// Garmin proprietary binary-over-serial driver: `Pvt_Data_Type` and
/// `Sat_Data_Type` application packets (§4.11).
pub struct GarminDriver;

const GARMIN_PVT_DATA: u8 = 51;
const GARMIN_SAT_DATA: u8 = 114;

impl Driver for GarminDriver {
    fn name(&self) -> &'static str {
        "garmin"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::GarminSer
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        _private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if payload.is_empty() {
            return ParseOutcome::default();
        }
        match payload[0] {
            GARMIN_PVT_DATA => decode_pvt_data(fix, &payload[1..]),
            GARMIN_SAT_DATA => decode_sat_data(sky, &payload[1..], warnings),
            other => {
                log::trace!("garmin: packet id {other} not decoded");
                ParseOutcome::default()
            }
        }
    }
}

fn decode_pvt_data(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 64 {
        return ParseOutcome::default();
    }
    let fix_type = u8_at(b, 2);
    fix.mode = match fix_type {
        0 | 1 => FixMode::NoFix,
        2 => FixMode::Fix2D,
        _ => FixMode::Fix3D,
    };
    fix.status = if fix_type >= 2 { FixStatus::Gps } else { FixStatus::Unknown };
    fix.dirty.insert(DirtyBits::MODE | DirtyBits::STATUS | DirtyBits::REPORT_IS);
    ParseOutcome { cycle_complete: true }
}

fn decode_sat_data(sky: &mut Skyview, b: &[u8], warnings: &mut Vec<DecodeWarning>) -> ParseOutcome {
    sky.satellites.clear();
    for chunk in b.chunks_exact(15) {
        let svid = u16::from(u8_at(chunk, 0));
        let used = chunk[14] & 0x04 != 0;
        let mut record = SatelliteRecord {
            gnss: Some(GnssSystem::Gps),
            svid,
            used,
            health: SatHealth::Ok,
            ..Default::default()
        };
        for field in record.sanitize_ranges() {
            warnings.push(DecodeWarning {
                driver: "garmin",
                field,
                detail: format!("sat data svid {svid} out of documented range"),
            });
        }
        sky.satellites.push(record);
    }
    ParseOutcome::default()
}

/// Evermore driver: minimal fix-report decode. Evermore's framing shares
/// TSIP's DLE/ETX envelope on the wire (`lexer::evermore` tells the two
/// apart by the unstuffed payload's first byte), so this driver only
/// ever sees payloads already classified as [`PacketType::Evermore`].
pub struct EvermoreDriver;

impl Driver for EvermoreDriver {
    fn name(&self) -> &'static str {
        "evermore"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Evermore
    }

    fn parse(
        &self,
        ctx: &mut Context,
        _private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        _sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        _warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        if payload.is_empty() || payload[0] != EVERMORE_FIX_REPORT {
            return ParseOutcome::default();
        }
        let b = &payload[1..];
        if b.len() < 17 {
            return ParseOutcome::default();
        }
        let fix_mode = u8_at(b, 0);
        fix.mode = match fix_mode {
            0 => FixMode::NoFix,
            1 => FixMode::Fix2D,
            _ => FixMode::Fix3D,
        };
        let week = u16_be(b, 3);
        let tow_ms = u32_be(b, 5);
        fix.time = Some(crate::time::resolve_gps_time(ctx, week, f64::from(tow_ms) / 1000.0, ctx.leap_seconds));
        fix.geodetic.lat = Some(f64::from(i32_be(b, 9)) * 1e-7);
        fix.geodetic.lon = Some(f64::from(i32_be(b, 13)) * 1e-7);
        fix.dirty.insert(DirtyBits::MODE | DirtyBits::TIME | DirtyBits::LATLON | DirtyBits::REPORT_IS);
        ParseOutcome { cycle_complete: true }
    }
}
