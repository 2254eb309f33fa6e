//! u-blox (UBX) driver (C5): message dispatch, configuration writer,
//! protocol-version auto-detect, rate/speed/mode switching.

use chrono::{DateTime, TimeZone, Utc};

use crate::context::Context;
use crate::error::DecodeWarning;
use crate::lexer::PacketType;
use crate::lexer::ubx::fletcher;
use crate::model::{DirtyBits, Ecef, FixMode, FixStatus, GnssSystem, NedVelocity, RawMeasurement, SatHealth, SatelliteRecord, Skyview, UnifiedFix};
use crate::reader::{f32_le, f64_le, i8_at, i16_le, i32_le, u8_at, u16_le, u32_le};
use crate::registry::{Driver, DriverPrivate, LifecycleEvent, ParseOutcome, SerialParams};

use super::ubx_prn::ubx_to_prn;

const CLASS_NAV: u8 = 0x01;
const CLASS_RXM: u8 = 0x02;
const CLASS_ACK: u8 = 0x05;
const CLASS_CFG: u8 = 0x06;
const CLASS_MON: u8 = 0x0A;

const NAV_POSECEF: u8 = 0x01;
const NAV_POSLLH: u8 = 0x02;
const NAV_DOP: u8 = 0x04;
const NAV_SOL: u8 = 0x06;
const NAV_PVT: u8 = 0x07;
const NAV_VELECEF: u8 = 0x11;
const NAV_VELNED: u8 = 0x12;
const NAV_HPPOSECEF: u8 = 0x13;
const NAV_HPPOSLLH: u8 = 0x14;
const NAV_TIMEGPS: u8 = 0x20;
const NAV_TIMEUTC: u8 = 0x21;
const NAV_TIMELS: u8 = 0x26;
const NAV_SVINFO: u8 = 0x30;
const NAV_SAT: u8 = 0x35;
const NAV_RELPOSNED: u8 = 0x3C;
const NAV_EOE: u8 = 0x61;

const RXM_SFRBX: u8 = 0x13;
const RXM_RAWX: u8 = 0x15;

const MON_VER: u8 = 0x04;

const CFG_PRT: u8 = 0x00;
const CFG_RATE: u8 = 0x08;

const ACK_NAK: u8 = 0x00;
const ACK_ACK: u8 = 0x01;

/// A leap-second change the device has warned about but which has not
/// taken effect yet (§4.5 NAV-TIMELS: "pending leap-second warnings to be
/// surfaced for the next <=23 h").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingLeapWarning {
    pub new_leap_seconds: i32,
    pub surfaced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UbxState {
    /// Parsed from `MON-VER`'s `PROTVER=`/`PROTVER ` extension string, or
    /// looked up from the firmware string in [`firmware_protver_table`].
    pub protocol_version: Option<u16>,
    pub firmware: Option<String>,
    pub hardware: Option<String>,
    /// Once a `NAV-EOE` has ever been seen, `NAV-PVT` stops acting as the
    /// cycle ender (§4.5).
    pub has_nav_eoe: bool,
    pub last_tow_ms: Option<u32>,
    pub pending_leap_warning: Option<PendingLeapWarning>,
    /// Set once the version-appropriate `NAV-*` enable-set has been
    /// (re-)issued after `protocol_version` became known (§4.5:
    /// "Once the protocol version becomes known after the first
    /// MON-VER, the enable-set is re-issued with version-appropriate
    /// messages").
    pub enable_set_issued: bool,
}

pub struct UbxDriver;

impl Driver for UbxDriver {
    fn name(&self) -> &'static str {
        "ubx"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Ubx
    }

    fn min_cycle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(50)
    }

    fn new_private(&self) -> DriverPrivate {
        DriverPrivate::Ubx(UbxState::default())
    }

    fn parse(
        &self,
        ctx: &mut Context,
        private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        sky: &mut Skyview,
        raw: &mut Vec<crate::model::RawMeasurement>,
        warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        let DriverPrivate::Ubx(state) = private else {
            return ParseOutcome::default();
        };
        if payload.len() < 2 {
            return ParseOutcome::default();
        }
        let class = payload[0];
        let id = payload[1];
        let body = &payload[2..];

        match (class, id) {
            (CLASS_NAV, NAV_PVT) => decode_nav_pvt(ctx, state, fix, body),
            (CLASS_NAV, NAV_EOE) => {
                state.has_nav_eoe = true;
                fix.dirty.insert(DirtyBits::REPORT_IS);
                ParseOutcome { cycle_complete: true }
            }
            (CLASS_NAV, NAV_DOP) => decode_nav_dop(fix, body),
            (CLASS_NAV, NAV_SAT) => decode_nav_sat(sky, body, warnings),
            (CLASS_NAV, NAV_SVINFO) => decode_nav_svinfo(sky, body, warnings),
            (CLASS_NAV, NAV_POSECEF) => decode_nav_posecef(fix, body),
            (CLASS_NAV, NAV_VELECEF) => decode_nav_velecef(fix, body),
            (CLASS_NAV, NAV_POSLLH) => decode_nav_posllh(fix, body),
            (CLASS_NAV, NAV_VELNED) => decode_nav_velned(fix, body),
            (CLASS_NAV, NAV_HPPOSECEF) => decode_nav_hpposecef(fix, body),
            (CLASS_NAV, NAV_HPPOSLLH) => decode_nav_hpposllh(fix, body),
            (CLASS_NAV, NAV_RELPOSNED) => {
                // Carries relative (not absolute) position between two
                // antennas; no counterpart field on the unified fix, so
                // parsed only far enough to validate framing.
                let _ = body;
                ParseOutcome::default()
            }
            (CLASS_NAV, NAV_TIMEGPS) => decode_nav_timegps(ctx, state, fix, body),
            (CLASS_NAV, NAV_TIMEUTC) => decode_nav_timeutc(fix, body),
            (CLASS_NAV, NAV_TIMELS) => decode_nav_timels(ctx, state, body),
            (CLASS_NAV, NAV_SOL) => ParseOutcome::default(),
            (CLASS_RXM, RXM_RAWX) => decode_rxm_rawx(raw, body),
            (CLASS_RXM, RXM_SFRBX) => {
                fix.dirty.insert(DirtyBits::SUBFRAME);
                ParseOutcome::default()
            }
            (CLASS_MON, MON_VER) => {
                decode_mon_ver(state, body);
                ParseOutcome::default()
            }
            (CLASS_ACK, ACK_ACK) | (CLASS_ACK, ACK_NAK) => {
                log::debug!(
                    "ubx: {} for class {:#04x} id {:#04x}",
                    if id == ACK_ACK { "ACK" } else { "NAK" },
                    body.first().copied().unwrap_or(0),
                    body.get(1).copied().unwrap_or(0)
                );
                ParseOutcome::default()
            }
            _ => ParseOutcome::default(),
        }
    }

    fn event_hook(&self, _ctx: &Context, private: &mut DriverPrivate, event: LifecycleEvent) -> Vec<u8> {
        let DriverPrivate::Ubx(state) = private else {
            return Vec::new();
        };
        match event {
            LifecycleEvent::Identified => poll_mon_ver(),
            LifecycleEvent::Configure(_) => {
                if state.enable_set_issued {
                    return Vec::new();
                }
                let Some(protover) = state.protocol_version else {
                    return Vec::new();
                };
                state.enable_set_issued = true;
                build_nav_enable_set(protover)
            }
            _ => Vec::new(),
        }
    }

    fn set_mode(&self, _ctx: &Context, mode: crate::registry::DeviceMode) -> Option<Vec<u8>> {
        Some(build_cfg_prt(115_200, mode == crate::registry::DeviceMode::Binary))
    }

    fn set_speed(&self, _ctx: &Context, params: SerialParams) -> Option<Vec<u8>> {
        Some(build_cfg_prt(params.baud, true))
    }

    fn set_rate(&self, _ctx: &Context, period: std::time::Duration) -> Option<Vec<u8>> {
        let ms = period.as_millis().clamp(self.min_cycle().as_millis(), 65535) as u16;
        Some(build_cfg_rate(ms))
    }
}

fn frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    let mut core = vec![class, id];
    core.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    core.extend_from_slice(payload);
    let (a, b) = fletcher(&core);
    let mut out = crate::lexer::ubx::SYNC.to_vec();
    out.extend_from_slice(&core);
    out.push(a);
    out.push(b);
    out
}

fn poll_mon_ver() -> Vec<u8> {
    frame(CLASS_MON, MON_VER, &[])
}

/// Builds the fixed 20-byte `CFG-PRT` record for UART port 1 (§4.5
/// "Configuration"): baud rate plus a `binary`/`nmea` protocol-mask mode.
fn build_cfg_prt(baud: u32, binary: bool) -> Vec<u8> {
    let mut p = vec![0u8; 20];
    p[0] = 1; // portID: UART1
    p[1] = 0; // reserved0
    // txReady (bytes 2-3) left at 0 (disabled)
    // mode (bytes 4-7): 8N1, no parity
    let mode: u32 = 0x0000_08D0;
    p[4..8].copy_from_slice(&mode.to_le_bytes());
    p[8..12].copy_from_slice(&baud.to_le_bytes());
    let (in_mask, out_mask): (u16, u16) = if binary {
        (0x0001, 0x0001) // UBX only
    } else {
        (0x0002, 0x0002) // NMEA only
    };
    p[12..14].copy_from_slice(&in_mask.to_le_bytes());
    p[14..16].copy_from_slice(&out_mask.to_le_bytes());
    // flags, reserved5 left at 0
    frame(CLASS_CFG, CFG_PRT, &p)
}

fn build_cfg_rate(meas_rate_ms: u16) -> Vec<u8> {
    let mut p = vec![0u8; 6];
    p[0..2].copy_from_slice(&meas_rate_ms.to_le_bytes());
    p[2..4].copy_from_slice(&1u16.to_le_bytes()); // navRate: every measurement
    p[4..6].copy_from_slice(&0u16.to_le_bytes()); // timeRef: UTC... actually GPS=0
    frame(CLASS_CFG, CFG_RATE, &p)
}

const CFG_MSG: u8 = 0x01;

fn build_cfg_msg(msg_class: u8, msg_id: u8, rate: u8) -> Vec<u8> {
    frame(CLASS_CFG, CFG_MSG, &[msg_class, msg_id, rate])
}

/// Builds the version-appropriate `NAV-*` enable-set (§4.5): on protocol
/// versions >= 15, `NAV-PVT` is the primary fix message; below that,
/// `NAV-SOL` takes its place since `NAV-PVT` doesn't exist yet. Either
/// way `NMEA-*` output is left alone here — this set only concerns the
/// binary `NAV-*` side once the version-aware choice can be made.
fn build_nav_enable_set(protocol_version: u16) -> Vec<u8> {
    let mut out = Vec::new();
    if protocol_version >= 15 {
        out.extend_from_slice(&build_cfg_msg(CLASS_NAV, NAV_PVT, 1));
    } else {
        out.extend_from_slice(&build_cfg_msg(CLASS_NAV, NAV_SOL, 1));
    }
    out.extend_from_slice(&build_cfg_msg(CLASS_NAV, NAV_DOP, 1));
    out.extend_from_slice(&build_cfg_msg(CLASS_NAV, NAV_SAT, 1));
    out
}

fn cm_to_m(v: i32) -> f64 {
    f64::from(v) / 100.0
}

fn mm_to_m(v: i32) -> f64 {
    f64::from(v) / 1000.0
}

fn decode_nav_pvt(ctx: &mut Context, state: &mut UbxState, fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 92 {
        return ParseOutcome::default();
    }
    let itow = u32_le(b, 0);
    let valid = u8_at(b, 11);
    let fix_type = u8_at(b, 20);
    let flags = u8_at(b, 21);
    let num_sv = u8_at(b, 23);

    if valid & 0x03 == 0x03 {
        // validDate | validTime both set: build a calendar timestamp
        // directly rather than routing through GPS-week resolution,
        // since NAV-PVT already hands back a UTC calendar time.
        let year = i32::from(u16_le(b, 4));
        let month = u32::from(u8_at(b, 6));
        let day = u32::from(u8_at(b, 7));
        let hour = u32::from(u8_at(b, 8));
        let min = u32::from(u8_at(b, 9));
        let sec = u32::from(u8_at(b, 10));
        let nano = i32_le(b, 16);
        if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, day) {
            if let Some(time) = chrono::NaiveTime::from_hms_opt(hour, min, sec) {
                let mut dt = chrono::Utc.from_utc_datetime(&date.and_time(time));
                dt += chrono::Duration::nanoseconds(i64::from(nano));
                fix.time = Some(dt);
                fix.dirty.insert(DirtyBits::TIME);
            }
        }
    }

    fix.mode = match fix_type {
        2 => FixMode::Fix2D,
        3 | 4 => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    fix.status = if flags & 0x01 == 0 {
        FixStatus::Unknown
    } else if fix_type == 4 {
        FixStatus::GnssDr
    } else if (flags >> 1) & 0x03 != 0 {
        FixStatus::DGps
    } else {
        FixStatus::Gps
    };
    fix.dirty.insert(DirtyBits::MODE | DirtyBits::STATUS);

    if fix.mode != FixMode::NoFix {
        fix.geodetic.lon = Some(f64::from(i32_le(b, 24)) * 1e-7);
        fix.geodetic.lat = Some(f64::from(i32_le(b, 28)) * 1e-7);
        fix.geodetic.alt_hae = Some(mm_to_m(i32_le(b, 32)));
        fix.geodetic.alt_msl = Some(mm_to_m(i32_le(b, 36)));
        fix.dirty.insert(DirtyBits::LATLON | DirtyBits::ALTITUDE);
    } else {
        fix.set_no_fix();
    }

    fix.err.eph = Some(mm_to_m(u32_le(b, 40) as i32));
    fix.err.epv = Some(mm_to_m(u32_le(b, 44) as i32));

    fix.ned.n = Some(f64::from(i32_le(b, 48)) / 1000.0);
    fix.ned.e = Some(f64::from(i32_le(b, 52)) / 1000.0);
    fix.ned.d = Some(f64::from(i32_le(b, 56)) / 1000.0);
    fix.speed = Some(f64::from(i32_le(b, 60)) / 1000.0);
    fix.track = Some(f64::from(i32_le(b, 64)) * 1e-5);
    fix.dop.p = Some(f64::from(u16_le(b, 76)) * 0.01);
    fix.dirty.insert(DirtyBits::SPEED | DirtyBits::TRACK | DirtyBits::NED | DirtyBits::DOP);

    let _ = num_sv;
    state.last_tow_ms = Some(itow);

    // Cycle-ender heuristic per DESIGN NOTES "Cycle-ender ambiguity":
    // only act as the cycle ender when this device has never shown us an
    // explicit NAV-EOE.
    let cycle_complete = !state.has_nav_eoe;
    if cycle_complete {
        fix.dirty.insert(DirtyBits::REPORT_IS);
    }
    let _ = ctx;
    ParseOutcome { cycle_complete }
}

fn decode_nav_dop(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 18 {
        return ParseOutcome::default();
    }
    let scale = |v: u16| f64::from(v) * 0.01;
    fix.dop.g = Some(scale(u16_le(b, 4)));
    fix.dop.p = Some(scale(u16_le(b, 6)));
    fix.dop.t = Some(scale(u16_le(b, 8)));
    fix.dop.v = Some(scale(u16_le(b, 10)));
    fix.dop.h = Some(scale(u16_le(b, 12)));
    fix.dop.x = Some(scale(u16_le(b, 14)));
    fix.dop.y = Some(scale(u16_le(b, 16)));
    fix.dirty.insert(DirtyBits::DOP);
    ParseOutcome::default()
}

fn decode_nav_sat(sky: &mut Skyview, b: &[u8], warnings: &mut Vec<DecodeWarning>) -> ParseOutcome {
    if b.len() < 8 {
        return ParseOutcome::default();
    }
    let num_svs = u8_at(b, 5) as usize;
    let mut sats = Vec::with_capacity(num_svs);
    for i in 0..num_svs {
        let off = 8 + i * 12;
        if off + 12 > b.len() {
            break;
        }
        let gnss_id = u8_at(b, off);
        let sv_id = u8_at(b, off + 1);
        let cno = u8_at(b, off + 2);
        let elev = i8_at(b, off + 3);
        let azim = i16_le(b, off + 4);
        let flags = u32_le(b, off + 8);
        let health_bits = (flags >> 4) & 0x03;
        let mut record = SatelliteRecord {
            gnss: GnssSystem::from_id(gnss_id),
            svid: u16::from(sv_id),
            nmea_prn: ubx_to_prn(gnss_id, sv_id),
            signal_id: None,
            elevation: Some(f64::from(elev)),
            azimuth: Some(f64::from(azim)),
            snr: Some(f64::from(cno)),
            used: flags & 0x01 != 0,
            health: match health_bits {
                1 => SatHealth::Ok,
                2 => SatHealth::Bad,
                _ => SatHealth::Unknown,
            },
        };
        push_range_warnings("ubx", "NAV-SAT", &mut record, warnings);
        sats.push(record);
    }
    sky.satellites = sats;
    ParseOutcome::default()
}

/// Deprecated but still seen in the field; same shape, fewer flags.
fn decode_nav_svinfo(sky: &mut Skyview, b: &[u8], warnings: &mut Vec<DecodeWarning>) -> ParseOutcome {
    if b.len() < 8 {
        return ParseOutcome::default();
    }
    let num_ch = u8_at(b, 4) as usize;
    let mut sats = Vec::with_capacity(num_ch);
    for i in 0..num_ch {
        let off = 8 + i * 12;
        if off + 12 > b.len() {
            break;
        }
        let sv_id = u8_at(b, off + 1);
        let flags = u8_at(b, off + 2);
        let quality = u8_at(b, off + 3);
        let cno = u8_at(b, off + 4);
        let elev = i8_at(b, off + 5);
        let azim = i16_le(b, off + 6);
        let mut record = SatelliteRecord {
            gnss: Some(GnssSystem::Gps),
            svid: u16::from(sv_id),
            nmea_prn: ubx_to_prn(0, sv_id),
            elevation: Some(f64::from(elev)),
            azimuth: Some(f64::from(azim)),
            snr: Some(f64::from(cno)),
            used: flags & 0x01 != 0,
            health: if quality == 0 { SatHealth::Bad } else { SatHealth::Ok },
            ..Default::default()
        };
        push_range_warnings("ubx", "NAV-SVINFO", &mut record, warnings);
        sats.push(record);
    }
    sky.satellites = sats;
    ParseOutcome::default()
}

/// Sanitizes `record`'s elevation/azimuth in place, logging a
/// [`DecodeWarning`] for each field the satellite decoders above forced
/// to `None` (spec §7, "Decode-range").
fn push_range_warnings(driver: &'static str, message: &'static str, record: &mut SatelliteRecord, warnings: &mut Vec<DecodeWarning>) {
    for field in record.sanitize_ranges() {
        warnings.push(DecodeWarning {
            driver,
            field,
            detail: format!("{message} satellite field out of documented range"),
        });
    }
}

fn decode_nav_posecef(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 20 {
        return ParseOutcome::default();
    }
    fix.ecef.x = Some(cm_to_m(i32_le(b, 4)));
    fix.ecef.y = Some(cm_to_m(i32_le(b, 8)));
    fix.ecef.z = Some(cm_to_m(i32_le(b, 12)));
    fix.ecef.p_acc = Some(cm_to_m(u32_le(b, 16) as i32));
    fix.dirty.insert(DirtyBits::ECEF);
    ParseOutcome::default()
}

fn decode_nav_velecef(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 20 {
        return ParseOutcome::default();
    }
    fix.ecef.vx = Some(cm_to_m(i32_le(b, 4)));
    fix.ecef.vy = Some(cm_to_m(i32_le(b, 8)));
    fix.ecef.vz = Some(cm_to_m(i32_le(b, 12)));
    fix.ecef.v_acc = Some(cm_to_m(u32_le(b, 16) as i32));
    fix.dirty.insert(DirtyBits::VECEF);
    ParseOutcome::default()
}

fn decode_nav_posllh(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 28 {
        return ParseOutcome::default();
    }
    fix.geodetic.lon = Some(f64::from(i32_le(b, 4)) * 1e-7);
    fix.geodetic.lat = Some(f64::from(i32_le(b, 8)) * 1e-7);
    fix.geodetic.alt_hae = Some(mm_to_m(i32_le(b, 12)));
    fix.geodetic.alt_msl = Some(mm_to_m(i32_le(b, 16)));
    fix.dirty.insert(DirtyBits::LATLON | DirtyBits::ALTITUDE);
    ParseOutcome::default()
}

fn decode_nav_velned(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 36 {
        return ParseOutcome::default();
    }
    fix.ned.n = Some(cm_to_m(i32_le(b, 4)));
    fix.ned.e = Some(cm_to_m(i32_le(b, 8)));
    fix.ned.d = Some(cm_to_m(i32_le(b, 12)));
    fix.speed = Some(cm_to_m(u32_le(b, 20) as i32));
    fix.track = Some(f64::from(i32_le(b, 24)) * 1e-5);
    fix.dirty.insert(DirtyBits::VNED | DirtyBits::SPEED | DirtyBits::TRACK);
    ParseOutcome::default()
}

fn decode_nav_hpposecef(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 28 {
        return ParseOutcome::default();
    }
    let hp = |i: i8| f64::from(i) * 0.1;
    fix.ecef.x = Some(cm_to_m(i32_le(b, 8)) + hp(i8_at(b, 20)) / 1000.0);
    fix.ecef.y = Some(cm_to_m(i32_le(b, 12)) + hp(i8_at(b, 21)) / 1000.0);
    fix.ecef.z = Some(cm_to_m(i32_le(b, 16)) + hp(i8_at(b, 22)) / 1000.0);
    fix.ecef.p_acc = Some(f64::from(u32_le(b, 24)) / 10_000.0);
    fix.dirty.insert(DirtyBits::ECEF);
    ParseOutcome::default()
}

fn decode_nav_hpposllh(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 36 {
        return ParseOutcome::default();
    }
    fix.geodetic.lon = Some(f64::from(i32_le(b, 4)) * 1e-7 + f64::from(i8_at(b, 24)) * 1e-9);
    fix.geodetic.lat = Some(f64::from(i32_le(b, 8)) * 1e-7 + f64::from(i8_at(b, 25)) * 1e-9);
    fix.geodetic.alt_hae = Some(mm_to_m(i32_le(b, 12)) + f64::from(i8_at(b, 26)) / 10_000.0);
    fix.geodetic.alt_msl = Some(mm_to_m(i32_le(b, 16)) + f64::from(i8_at(b, 27)) / 10_000.0);
    fix.dirty.insert(DirtyBits::LATLON | DirtyBits::ALTITUDE);
    ParseOutcome::default()
}

fn decode_nav_timegps(ctx: &mut Context, state: &mut UbxState, fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 16 {
        return ParseOutcome::default();
    }
    let itow_ms = u32_le(b, 0);
    let ftow_ns = i32_le(b, 4);
    let week = u16_le(b, 8);
    let leap_s = i8_at(b, 10);
    let valid = u8_at(b, 11);

    if valid & 0x07 != 0 {
        ctx.adopt_leap_seconds(i32::from(leap_s));
        let tow_secs = f64::from(itow_ms) / 1000.0 + f64::from(ftow_ns) / 1e9;
        fix.time = Some(crate::time::resolve_gps_time(ctx, week, tow_secs, i32::from(leap_s)));
        fix.dirty.insert(DirtyBits::TIME);
    }
    let _ = state;
    ParseOutcome::default()
}

fn decode_nav_timeutc(fix: &mut UnifiedFix, b: &[u8]) -> ParseOutcome {
    if b.len() < 20 {
        return ParseOutcome::default();
    }
    let valid = u8_at(b, 19);
    if valid & 0x04 == 0 {
        return ParseOutcome::default(); // UTC standard not yet known
    }
    let year = i32::from(u16_le(b, 12));
    let month = u32::from(u8_at(b, 14));
    let day = u32::from(u8_at(b, 15));
    let hour = u32::from(u8_at(b, 16));
    let min = u32::from(u8_at(b, 17));
    let sec = u32::from(u8_at(b, 18));
    let nano = i32_le(b, 8);
    if let (Some(date), Some(time)) = (
        chrono::NaiveDate::from_ymd_opt(year, month, day),
        chrono::NaiveTime::from_hms_opt(hour, min, sec),
    ) {
        let mut dt = chrono::Utc.from_utc_datetime(&date.and_time(time));
        dt += chrono::Duration::nanoseconds(i64::from(nano));
        fix.time = Some(dt);
        fix.dirty.insert(DirtyBits::TIME);
    }
    ParseOutcome::default()
}

fn decode_nav_timels(ctx: &mut Context, state: &mut UbxState, b: &[u8]) -> ParseOutcome {
    if b.len() < 24 {
        return ParseOutcome::default();
    }
    let curr_ls = i8_at(b, 8);
    let ls_change = i8_at(b, 10);
    let valid = u8_at(b, 23);

    if valid & 0x01 != 0 {
        ctx.adopt_leap_seconds(i32::from(curr_ls));
    }
    if valid & 0x02 != 0 && ls_change != 0 {
        state.pending_leap_warning = Some(PendingLeapWarning {
            new_leap_seconds: i32::from(curr_ls) + i32::from(ls_change),
            surfaced_at: chrono::Utc::now(),
        });
    }
    ParseOutcome::default()
}

/// Each measurement block is 32 bytes: `prMes` f64 (8), `cpMes` f64 (8),
/// `doMes` f32 (4), gnssId (1), svId (1), sigId (1), freqId (1), locktime
/// u16 (2), cno (1), pr/cp/do stdev nibbles (2), trkStat (1), reserved (2).
fn decode_rxm_rawx(raw: &mut Vec<RawMeasurement>, b: &[u8]) -> ParseOutcome {
    if b.len() < 16 {
        return ParseOutcome::default();
    }
    let num_meas = u8_at(b, 11) as usize;
    raw.clear();
    for i in 0..num_meas {
        let off = 16 + i * 32;
        if off + 32 > b.len() {
            break;
        }
        let gnss_id = u8_at(b, off + 20);
        let sv_id = u16::from(u8_at(b, off + 21));
        let mut m = RawMeasurement::invalid(sv_id);
        m.gnss = GnssSystem::from_id(gnss_id);
        m.signal_id = Some(u8_at(b, off + 22));
        m.pseudorange_m = f64_le(b, off);
        m.carrier_phase_cycles = f64_le(b, off + 8);
        m.doppler_hz = f64::from(f32_le(b, off + 16));
        m.locktime = Some(u32::from(u16_le(b, off + 24)));
        m.snr = f64::from(u8_at(b, off + 26));
        m.tracking_status = u32::from(u8_at(b, off + 29));
        m.loss_of_lock = m.tracking_status & 0x02 == 0;
        raw.push(m);
    }
    ParseOutcome::default()
}

/// Looks up a bare (no `PROTVER=`) firmware string against the fixed
/// table of known releases, per §4.5 "else look up firmware string in a
/// fixed table".
fn firmware_protver_table(firmware: &str) -> Option<u16> {
    const TABLE: &[(&str, u16)] = &[
        ("SPG 1.", 10),
        ("SPG 2.", 11),
        ("SPG 3.", 14),
        ("SPG 4.", 15),
        ("HPG 1.", 15),
    ];
    TABLE.iter().find(|(prefix, _)| firmware.starts_with(prefix)).map(|(_, v)| *v)
}

fn decode_mon_ver(state: &mut UbxState, b: &[u8]) {
    if b.len() < 40 {
        return;
    }
    let sw = cstr(&b[0..30]);
    let hw = cstr(&b[30..40]);

    let mut protver = None;
    let mut offset = 40;
    while offset + 30 <= b.len() {
        let ext = cstr(&b[offset..offset + 30]);
        if let Some(rest) = ext.strip_prefix("PROTVER=").or_else(|| ext.strip_prefix("PROTVER ")) {
            protver = rest.trim().parse::<f32>().ok().map(|v| (v * 10.0).round() as u16 / 10);
            if protver.is_none() {
                protver = rest.trim().split('.').next().and_then(|s| s.parse().ok());
            }
        }
        offset += 30;
    }

    state.protocol_version = protver.or_else(|| firmware_protver_table(&sw));
    state.firmware = Some(sw);
    state.hardware = Some(hw);
}

fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_nav_pvt_payload() -> Vec<u8> {
        let mut p = vec![0u8; 92];
        p[4..6].copy_from_slice(&2024u16.to_le_bytes());
        p[6] = 3; // month
        p[7] = 15; // day
        p[8] = 10; // hour
        p[11] = 0x37; // valid: date+time+resolved+mag
        p[20] = 3; // fixType 3D
        p[21] = 0x01; // gnssFixOK
        p[23] = 12; // numSV
        p[24..28].copy_from_slice(&(-122_000_0000i32).to_le_bytes()); // lon
        p[28..32].copy_from_slice(&(374_000_0000i32).to_le_bytes()); // lat
        p[32..36].copy_from_slice(&30_000i32.to_le_bytes()); // altHAE mm
        p[36..40].copy_from_slice(&(-2_000i32).to_le_bytes()); // altMSL mm
        p
    }

    /// Scenario S1.
    #[test]
    fn nav_pvt_happy_path() {
        let mut ctx = Context::default();
        let mut state = UbxState::default();
        let mut fix = UnifiedFix::default();
        let payload = build_nav_pvt_payload();
        let outcome = decode_nav_pvt(&mut ctx, &mut state, &mut fix, &payload);
        assert!(outcome.cycle_complete);
        assert_eq!(fix.mode, FixMode::Fix3D);
        assert_eq!(fix.status, FixStatus::Gps);
        assert!((fix.geodetic.lat.unwrap() - 37.4).abs() < 1e-6);
        assert!((fix.geodetic.lon.unwrap() - (-122.0)).abs() < 1e-6);
        assert!((fix.geodetic.alt_hae.unwrap() - 30.0).abs() < 1e-6);
        assert!((fix.geodetic.alt_msl.unwrap() - (-2.0)).abs() < 1e-6);
        let t = fix.time.unwrap();
        assert_eq!(t.format("%Y-%m-%dT%H:%M:%S").to_string(), "2024-03-15T10:00:00");
    }

    #[test]
    fn nav_eoe_seen_once_suppresses_pvt_as_cycle_ender() {
        let mut state = UbxState::default();
        state.has_nav_eoe = true;
        let mut ctx = Context::default();
        let mut fix = UnifiedFix::default();
        let outcome = decode_nav_pvt(&mut ctx, &mut state, &mut fix, &build_nav_pvt_payload());
        assert!(!outcome.cycle_complete);
    }

    #[test]
    fn nav_dop_scales_centi_units() {
        let mut b = vec![0u8; 18];
        b[6..8].copy_from_slice(&250u16.to_le_bytes()); // pDOP = 2.50
        let mut fix = UnifiedFix::default();
        decode_nav_dop(&mut fix, &b);
        assert_eq!(fix.dop.p, Some(2.5));
    }

    #[test]
    fn mon_ver_parses_protver_extension() {
        let mut b = vec![0u8; 40];
        let mut ext = vec![0u8; 30];
        ext[..8].copy_from_slice(b"PROTVER=");
        ext[8..12].copy_from_slice(b"27.1");
        b.extend_from_slice(&ext);
        let mut state = UbxState::default();
        decode_mon_ver(&mut state, &b);
        assert_eq!(state.protocol_version, Some(27));
    }

    #[test]
    fn nav_enable_set_reissued_once_protocol_version_known() {
        let driver = UbxDriver;
        let ctx = Context::default();
        let mut private = DriverPrivate::Ubx(UbxState::default());

        // Before MON-VER, Configure produces nothing.
        assert!(driver.event_hook(&ctx, &mut private, LifecycleEvent::Configure(1)).is_empty());

        let DriverPrivate::Ubx(state) = &mut private else { unreachable!() };
        state.protocol_version = Some(18);

        let out = driver.event_hook(&ctx, &mut private, LifecycleEvent::Configure(2));
        assert!(!out.is_empty());
        assert_eq!(&out[0..2], &crate::lexer::ubx::SYNC);

        // Only issued once.
        let out2 = driver.event_hook(&ctx, &mut private, LifecycleEvent::Configure(3));
        assert!(out2.is_empty());
    }

    #[test]
    fn nav_sat_clears_out_of_range_elevation_and_warns() {
        let mut b = vec![0u8; 20];
        b[5] = 1; // numSvs
        b[8] = 1; // gnssId: SBAS
        b[9] = 5; // svId
        b[11] = 95i8 as u8; // elev: out of range
        let mut sky = Skyview::default();
        let mut warnings = Vec::new();
        decode_nav_sat(&mut sky, &b, &mut warnings);
        assert_eq!(sky.satellites[0].elevation, None);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "elevation");
        assert_eq!(warnings[0].driver, "ubx");
    }

    #[test]
    fn cfg_prt_frame_has_valid_checksum() {
        let wire = build_cfg_prt(9600, true);
        assert_eq!(&wire[0..2], &crate::lexer::ubx::SYNC);
        assert_eq!(wire[2], CLASS_CFG);
        assert_eq!(wire[3], CFG_PRT);
        let n = wire.len();
        let (a, b) = fletcher(&wire[2..n - 2]);
        assert_eq!((wire[n - 2], wire[n - 1]), (a, b));
    }
}
