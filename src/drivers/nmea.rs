//! NMEA-0183 driver (C4): standard sentence decode plus the
//! proprietary-prefix probes used for chipset family discovery.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::context::Context;
use crate::error::DecodeWarning;
use crate::lexer::PacketType;
use crate::model::{DirtyBits, FixMode, FixStatus, GnssSystem, SatHealth, SatelliteRecord, Skyview, UnifiedFix};
use crate::registry::{Driver, DriverPrivate, LifecycleEvent, ParseOutcome};

/// In-progress GSV accumulation: satellites seen so far in the current
/// (total, seen-so-far) cycle, keyed loosely per §4.4 ("accumulated keyed
/// by (sequence total, current, first-sv-slot)").
#[derive(Debug, Clone, Default)]
pub struct NmeaState {
    /// Talker-derived default GNSS system for satellites lacking their
    /// own system code (§4.4).
    pub default_system: Option<GnssSystem>,
    /// Most recent date from RMC/ZDA, merged with GGA's time-of-day only
    /// sentences (§4.4 "Time assembly").
    pub last_date: Option<NaiveDate>,
    gsv_total: u8,
    gsv_seen: u8,
    gsv_accum: Vec<SatelliteRecord>,
}

pub struct NmeaDriver;

impl Driver for NmeaDriver {
    fn name(&self) -> &'static str {
        "nmea0183"
    }

    fn packet_type(&self) -> PacketType {
        PacketType::Nmea
    }

    fn sticky(&self) -> bool {
        // The generic NMEA driver is the fallback: never sticky, so a
        // more specific proprietary-prefix driver can always take over.
        false
    }

    fn new_private(&self) -> DriverPrivate {
        DriverPrivate::Nmea(NmeaState::default())
    }

    fn parse(
        &self,
        _ctx: &mut Context,
        private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        sky: &mut Skyview,
        _raw: &mut Vec<crate::model::RawMeasurement>,
        warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome {
        let DriverPrivate::Nmea(state) = private else {
            return ParseOutcome::default();
        };
        let Ok(line) = std::str::from_utf8(payload) else {
            return ParseOutcome::default();
        };
        decode_sentence(line, state, fix, sky, warnings)
    }

    fn event_hook(
        &self,
        _ctx: &Context,
        _private: &mut DriverPrivate,
        _event: LifecycleEvent,
    ) -> Vec<u8> {
        Vec::new()
    }
}

/// Splits `"$GPGGA,...,*HH"` into talker-qualified sentence id and the
/// comma-separated fields, with the leading `$`/`!` and trailing `*HH`
/// already stripped by the caller.
pub(crate) fn body(line: &str) -> &str {
    let s = line.strip_prefix('$').or_else(|| line.strip_prefix('!')).unwrap_or(line);
    match s.rfind('*') {
        Some(star) => &s[..star],
        None => s,
    }
}

fn talker_system(talker: &str) -> Option<GnssSystem> {
    match talker {
        "GP" => Some(GnssSystem::Gps),
        "GL" => Some(GnssSystem::Glonass),
        "GA" => Some(GnssSystem::Galileo),
        "GB" | "BD" => Some(GnssSystem::BeiDou),
        "GQ" => Some(GnssSystem::Qzss),
        "GN" => None, // combined/blended solution: no single default system
        _ => None,
    }
}

/// Empty-field-means-invalid parse of a float field.
fn field_f64(f: &str) -> Option<f64> {
    if f.is_empty() { None } else { f.parse().ok() }
}

fn field_u32(f: &str) -> Option<u32> {
    if f.is_empty() { None } else { f.parse().ok() }
}

/// NMEA ddmm.mmmm (or dddmm.mmmm) plus hemisphere letter into signed
/// decimal degrees.
fn parse_lat_lon(value: &str, hemisphere: &str, _lon: bool) -> Option<f64> {
    if value.is_empty() || hemisphere.is_empty() {
        return None;
    }
    let raw: f64 = value.parse().ok()?;
    // Degrees are every digit except the trailing two minutes-integer
    // digits plus fractional minutes (works for both ddmm.mmmm latitude
    // and dddmm.mmmm longitude since the extra digit just lands in the
    // degrees part).
    let deg = (raw / 100.0).trunc();
    let minutes = raw - deg * 100.0;
    let mut decimal = deg + minutes / 60.0;
    if hemisphere == "S" || hemisphere == "W" {
        decimal = -decimal;
    }
    Some(decimal)
}

/// NMEA `hhmmss.ss` time-of-day.
fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 {
        return None;
    }
    let hh: u32 = value[0..2].parse().ok()?;
    let mm: u32 = value[2..4].parse().ok()?;
    let ss: f64 = value[4..].parse().ok()?;
    let whole_ss = ss.trunc() as u32;
    let nanos = (ss.fract() * 1e9).round() as u32;
    NaiveTime::from_hms_nano_opt(hh, mm, whole_ss, nanos)
}

/// NMEA `ddmmyy` date (RMC) or separate dd,mm,yyyy fields (ZDA).
fn parse_ddmmyy(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let dd: u32 = value[0..2].parse().ok()?;
    let mm: u32 = value[2..4].parse().ok()?;
    let yy: i32 = value[4..6].parse().ok()?;
    let year = if yy < 80 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, mm, dd)
}

fn combine(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

fn decode_sentence(
    line: &str,
    state: &mut NmeaState,
    fix: &mut UnifiedFix,
    sky: &mut Skyview,
    warnings: &mut Vec<DecodeWarning>,
) -> ParseOutcome {
    let body = body(line);
    let Some((id, rest)) = body.split_once(',') else {
        return ParseOutcome::default();
    };
    let fields: Vec<&str> = rest.split(',').collect();

    if id.len() >= 5 {
        let talker = &id[..2];
        let sentence = &id[2..];
        state.default_system = talker_system(talker);
        return match sentence {
            "GGA" => decode_gga(&fields, state, fix),
            "GLL" => decode_gll(&fields, fix),
            "RMC" => decode_rmc(&fields, state, fix),
            "VTG" => decode_vtg(&fields, fix),
            "ZDA" => decode_zda(&fields, state, fix),
            "GSA" => decode_gsa(&fields, fix),
            "GSV" => decode_gsv(&fields, state, sky, warnings),
            "GST" => decode_gst(&fields, fix),
            "GBS" => decode_gbs(&fields, fix),
            _ => ParseOutcome::default(),
        };
    }

    ParseOutcome::default()
}

fn decode_gga(f: &[&str], state: &mut NmeaState, fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 9 {
        return ParseOutcome::default();
    }
    let mut dirty = DirtyBits::empty();

    if let Some(tod) = parse_time_of_day(f[0]) {
        if let Some(date) = state.last_date {
            fix.time = Some(combine(date, tod));
            dirty.insert(DirtyBits::TIME);
        }
    }

    let lat = parse_lat_lon(f[1], f[2], false);
    let lon = parse_lat_lon(f[3], f[4], true);
    if lat.is_some() && lon.is_some() {
        fix.geodetic.lat = lat;
        fix.geodetic.lon = lon;
        dirty.insert(DirtyBits::LATLON);
    }

    let quality: u8 = f[5].parse().unwrap_or(0);
    fix.status = gga_quality_to_status(quality);
    dirty.insert(DirtyBits::STATUS);

    if let Some(alt) = field_f64(f.get(8).copied().unwrap_or("")) {
        fix.geodetic.alt_msl = Some(alt);
        dirty.insert(DirtyBits::ALTITUDE);
    }
    if let Some(sep) = f.get(10).and_then(|s| field_f64(s)) {
        fix.geoid_separation = Some(sep);
    }
    if let (Some(msl), Some(sep)) = (fix.geodetic.alt_msl, fix.geoid_separation) {
        fix.geodetic.alt_hae = Some(msl + sep);
    }
    if let Some(age) = f.get(12).and_then(|s| field_f64(s)) {
        fix.dgps_age = Some(age);
    }
    if let Some(id) = f.get(13).and_then(|s| field_u32(s)) {
        fix.dgps_station_id = Some(id as i32);
    }

    dirty.insert(DirtyBits::REPORT_IS);
    fix.dirty.insert(dirty);
    ParseOutcome { cycle_complete: true }
}

fn gga_quality_to_status(quality: u8) -> FixStatus {
    match quality {
        0 => FixStatus::Unknown,
        1 => FixStatus::Gps,
        2 => FixStatus::DGps,
        4 => FixStatus::RtkFixed,
        5 => FixStatus::RtkFloat,
        6 => FixStatus::DeadReckoning,
        7 => FixStatus::Simulated,
        8 => FixStatus::Simulated,
        _ => FixStatus::Unknown,
    }
}

fn decode_gll(f: &[&str], fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 6 {
        return ParseOutcome::default();
    }
    let lat = parse_lat_lon(f[0], f[1], false);
    let lon = parse_lat_lon(f[2], f[3], true);
    if f.get(5).map(|s| *s == "A").unwrap_or(false) {
        if lat.is_some() && lon.is_some() {
            fix.geodetic.lat = lat;
            fix.geodetic.lon = lon;
            fix.dirty.insert(DirtyBits::LATLON);
        }
    }
    ParseOutcome::default()
}

fn decode_rmc(f: &[&str], state: &mut NmeaState, fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 11 {
        return ParseOutcome::default();
    }
    let mut dirty = DirtyBits::empty();

    let valid = f[1] == "A";
    if let Some(date) = parse_ddmmyy(f[8]) {
        state.last_date = Some(date);
    }
    if let (Some(tod), Some(date)) = (parse_time_of_day(f[0]), state.last_date) {
        fix.time = Some(combine(date, tod));
        dirty.insert(DirtyBits::TIME);
    }

    if valid {
        let lat = parse_lat_lon(f[2], f[3], false);
        let lon = parse_lat_lon(f[4], f[5], true);
        if lat.is_some() && lon.is_some() {
            fix.geodetic.lat = lat;
            fix.geodetic.lon = lon;
            dirty.insert(DirtyBits::LATLON);
        }
        if let Some(knots) = field_f64(f[6]) {
            fix.speed = Some(knots * 0.514_444_444);
            dirty.insert(DirtyBits::SPEED);
        }
        if let Some(track) = field_f64(f[7]) {
            fix.track = Some(track);
            dirty.insert(DirtyBits::TRACK);
        }
        if fix.mode == FixMode::NoFix {
            fix.mode = FixMode::Fix2D;
            dirty.insert(DirtyBits::MODE);
        }
        if fix.status == FixStatus::Unknown {
            fix.status = FixStatus::Gps;
            dirty.insert(DirtyBits::STATUS);
        }
    } else {
        fix.set_no_fix();
        dirty.insert(DirtyBits::MODE);
    }

    if let Some(var) = field_f64(f[9]) {
        let signed = if f.get(10).map(|s| *s == "W").unwrap_or(false) { -var } else { var };
        fix.mag_var = Some(signed);
    }

    dirty.insert(DirtyBits::REPORT_IS);
    fix.dirty.insert(dirty);
    ParseOutcome { cycle_complete: true }
}

fn decode_vtg(f: &[&str], fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 8 {
        return ParseOutcome::default();
    }
    if let Some(track) = field_f64(f[0]) {
        fix.track = Some(track);
        fix.dirty.insert(DirtyBits::TRACK);
    }
    if let Some(kmh) = field_f64(f[6]) {
        fix.speed = Some(kmh / 3.6);
        fix.dirty.insert(DirtyBits::SPEED);
    }
    ParseOutcome::default()
}

fn decode_zda(f: &[&str], state: &mut NmeaState, fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 6 {
        return ParseOutcome::default();
    }
    let (Some(dd), Some(mm), Some(yyyy)) = (
        f[1].parse::<u32>().ok(),
        f[2].parse::<u32>().ok(),
        f[3].parse::<i32>().ok(),
    ) else {
        return ParseOutcome::default();
    };
    let Some(date) = NaiveDate::from_ymd_opt(yyyy, mm, dd) else {
        return ParseOutcome::default();
    };
    state.last_date = Some(date);
    if let Some(tod) = parse_time_of_day(f[0]) {
        fix.time = Some(combine(date, tod));
        fix.dirty.insert(DirtyBits::TIME);
    }
    ParseOutcome::default()
}

fn decode_gsa(f: &[&str], fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 17 {
        return ParseOutcome::default();
    }
    fix.mode = match f[1] {
        "2" => FixMode::Fix2D,
        "3" => FixMode::Fix3D,
        _ => FixMode::NoFix,
    };
    if let Some(pdop) = field_f64(f[14]) {
        fix.dop.p = Some(pdop);
    }
    if let Some(hdop) = field_f64(f[15]) {
        fix.dop.h = Some(hdop);
    }
    if let Some(vdop) = field_f64(f[16]) {
        fix.dop.v = Some(vdop);
    }
    fix.dirty.insert(DirtyBits::MODE | DirtyBits::DOP);
    ParseOutcome::default()
}

fn decode_gsv(f: &[&str], state: &mut NmeaState, sky: &mut Skyview, warnings: &mut Vec<DecodeWarning>) -> ParseOutcome {
    if f.len() < 3 {
        return ParseOutcome::default();
    }
    let total: u8 = f[0].parse().unwrap_or(1);
    let current: u8 = f[1].parse().unwrap_or(1);

    if current == 1 {
        state.gsv_accum.clear();
        state.gsv_total = total;
    }
    state.gsv_seen = current;

    // Up to four satellites per sentence, four fields each: prn, elev,
    // azimuth, snr.
    let mut idx = 3;
    while idx + 4 <= f.len() {
        let Ok(prn) = f[idx].parse::<u16>() else {
            idx += 4;
            continue;
        };
        let elevation = field_f64(f[idx + 1]);
        let azimuth = field_f64(f[idx + 2]);
        let snr = field_f64(f[idx + 3]);
        let mut record = SatelliteRecord {
            gnss: state.default_system,
            svid: prn,
            nmea_prn: Some(prn),
            elevation,
            azimuth,
            snr,
            health: if snr.is_some() { SatHealth::Ok } else { SatHealth::Unknown },
            ..Default::default()
        };
        for field in record.sanitize_ranges() {
            warnings.push(DecodeWarning {
                driver: "nmea0183",
                field,
                detail: format!("GSV PRN {prn} out of documented range"),
            });
        }
        state.gsv_accum.push(record);
        idx += 4;
    }

    if current >= state.gsv_total {
        sky.satellites = state.gsv_accum.clone();
        return ParseOutcome::default();
    }
    ParseOutcome::default()
}

fn decode_gst(f: &[&str], fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 7 {
        return ParseOutcome::default();
    }
    if let Some(lat_err) = field_f64(f[4]) {
        fix.err.eph = Some(lat_err);
    }
    if let Some(alt_err) = field_f64(f[6]) {
        fix.err.epv = Some(alt_err);
    }
    ParseOutcome::default()
}

fn decode_gbs(f: &[&str], fix: &mut UnifiedFix) -> ParseOutcome {
    if f.len() < 8 {
        return ParseOutcome::default();
    }
    if let Some(id) = field_u32(f[7]) {
        fix.dgps_station_id = Some(id as i32);
    }
    ParseOutcome::default()
}
