//! Pseudo-NMEA emitter (C11): synthesizes NMEA-0183 sentences from the
//! unified model. Used only to produce the GGA uplink NTRIP sends back to
//! the caster, and optionally for client passthrough.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::model::{FixMode, Skyview, UnifiedFix};

fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

fn finish(body: String) -> String {
    let cs = checksum(&body);
    format!("${body}*{cs:02X}\r\n")
}

/// Encodes decimal degrees as NMEA `ddmm.mmmm`/`dddmm.mmmm` plus hemisphere.
fn encode_lat(lat: f64) -> (String, char) {
    let hemi = if lat < 0.0 { 'S' } else { 'N' };
    let abs = lat.abs();
    let deg = abs.trunc();
    let min = (abs - deg) * 60.0;
    (format!("{deg:02.0}{min:07.4}"), hemi)
}

fn encode_lon(lon: f64) -> (String, char) {
    let hemi = if lon < 0.0 { 'W' } else { 'E' };
    let abs = lon.abs();
    let deg = abs.trunc();
    let min = (abs - deg) * 60.0;
    (format!("{deg:03.0}{min:07.4}"), hemi)
}

fn encode_time(t: DateTime<Utc>) -> String {
    format!(
        "{:02}{:02}{:02}.{:02}",
        t.hour(),
        t.minute(),
        t.second(),
        t.timestamp_subsec_millis() / 10,
    )
}

fn encode_date(t: DateTime<Utc>) -> String {
    format!("{:02}{:02}{:02}", t.day(), t.month(), t.year() % 100)
}

/// Fix-quality field for GGA, derived from the unified fix's mode/status.
fn gga_fix_quality(fix: &UnifiedFix) -> u8 {
    use crate::model::FixStatus;
    if fix.mode == FixMode::NoFix {
        return 0;
    }
    match fix.status {
        FixStatus::DGps => 2,
        FixStatus::RtkFixed => 4,
        FixStatus::RtkFloat => 5,
        FixStatus::Simulated => 8,
        _ => 1,
    }
}

/// Renders `$GPGGA`. Returns `None` if the fix has no time or position —
/// GGA has nothing meaningful to report without both.
pub fn render_gga(fix: &UnifiedFix) -> Option<String> {
    let t = fix.time?;
    let lat = fix.geodetic.lat?;
    let lon = fix.geodetic.lon?;
    let (lat_str, lat_hemi) = encode_lat(lat);
    let (lon_str, lon_hemi) = encode_lon(lon);
    let alt = fix.geodetic.alt_msl.or(fix.geodetic.alt_hae).unwrap_or(0.0);
    let hdop = fix.dop.h.unwrap_or(0.0);

    let body = format!(
        "GPGGA,{time},{lat},{lat_hemi},{lon},{lon_hemi},{quality},{nsats:02},{hdop:.1},{alt:.1},M,{geoid:.1},M,,",
        time = encode_time(t),
        lat = lat_str,
        lon = lon_str,
        quality = gga_fix_quality(fix),
        nsats = 0,
        hdop = hdop,
        alt = alt,
        geoid = fix.geoid_separation.unwrap_or(0.0),
    );
    Some(finish(body))
}

/// Renders `$GPRMC`.
pub fn render_rmc(fix: &UnifiedFix) -> Option<String> {
    let t = fix.time?;
    let lat = fix.geodetic.lat?;
    let lon = fix.geodetic.lon?;
    let (lat_str, lat_hemi) = encode_lat(lat);
    let (lon_str, lon_hemi) = encode_lon(lon);
    let status = if fix.mode == FixMode::NoFix { 'V' } else { 'A' };
    let speed_kt = fix.speed.unwrap_or(0.0) * 1.943_844_49;
    let track = fix.track.unwrap_or(0.0);

    let body = format!(
        "GPRMC,{time},{status},{lat},{lat_hemi},{lon},{lon_hemi},{speed:.1},{track:.1},{date},{magvar},",
        time = encode_time(t),
        status = status,
        lat = lat_str,
        lon = lon_str,
        speed = speed_kt,
        track = track,
        date = encode_date(t),
        magvar = "",
    );
    Some(finish(body))
}

/// Renders `$GPGSA` (DOP and active satellites, PRNs only; the unified
/// model's `used` flags drive which satellites are listed).
pub fn render_gsa(fix: &UnifiedFix, sky: &Skyview) -> String {
    let mode2 = match fix.mode {
        FixMode::NoFix => '1',
        FixMode::Fix2D => '2',
        FixMode::Fix3D => '3',
    };
    let mut prns: Vec<String> = sky
        .satellites
        .iter()
        .filter(|s| s.used)
        .map(|s| s.nmea_prn.map(|p| p.to_string()).unwrap_or_default())
        .collect();
    prns.resize(12, String::new());

    let body = format!(
        "GPGSA,A,{mode2},{prns},{pdop:.1},{hdop:.1},{vdop:.1}",
        mode2 = mode2,
        prns = prns.join(","),
        pdop = fix.dop.p.unwrap_or(0.0),
        hdop = fix.dop.h.unwrap_or(0.0),
        vdop = fix.dop.v.unwrap_or(0.0),
    );
    finish(body)
}

/// Renders `$GPGSV` sentences, four satellites per sentence (§4.10).
pub fn render_gsv(sky: &Skyview) -> Vec<String> {
    let total = sky.satellites.len();
    let num_sentences = total.div_ceil(4).max(1);
    let mut out = Vec::with_capacity(num_sentences);

    for sentence_idx in 0..num_sentences {
        let chunk = &sky.satellites[sentence_idx * 4..((sentence_idx + 1) * 4).min(total)];
        let mut fields = format!("GPGSV,{num_sentences},{},{total:02}", sentence_idx + 1);
        for sat in chunk {
            fields.push_str(&format!(
                ",{:02},{:02},{:03},{:02}",
                sat.nmea_prn.unwrap_or(0),
                sat.elevation.unwrap_or(0.0) as i32,
                sat.azimuth.unwrap_or(0.0) as i32,
                sat.snr.unwrap_or(0.0) as i32,
            ));
        }
        out.push(finish(fields));
    }
    out
}

/// Renders `$GPZDA`.
pub fn render_zda(fix: &UnifiedFix) -> Option<String> {
    let t = fix.time?;
    let body = format!(
        "GPZDA,{time},{day:02},{month:02},{year:04},00,00",
        time = encode_time(t),
        day = t.day(),
        month = t.month(),
        year = t.year(),
    );
    Some(finish(body))
}

/// Renders `$GPGBS` (RAIM fault-detection sentence).
pub fn render_gbs(fix: &UnifiedFix) -> Option<String> {
    let t = fix.time?;
    let body = format!(
        "GPGBS,{time},{eph:.1},{epv:.1},{ept:.1},,,,",
        time = encode_time(t),
        eph = fix.err.eph.unwrap_or(0.0),
        epv = fix.err.epv.unwrap_or(0.0),
        ept = fix.err.ept.unwrap_or(0.0),
    );
    Some(finish(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Geodetic, SatelliteRecord};
    use chrono::TimeZone;

    fn sample_fix() -> UnifiedFix {
        UnifiedFix {
            time: Some(Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 15).unwrap()),
            mode: FixMode::Fix3D,
            geodetic: Geodetic {
                lat: Some(37.4),
                lon: Some(-122.0),
                alt_hae: Some(30.0),
                alt_msl: Some(28.0),
            },
            ..Default::default()
        }
    }

    #[test]
    fn gga_checksum_is_valid() {
        let sentence = render_gga(&sample_fix()).unwrap();
        let body = sentence.trim_start_matches('$');
        let (body, cs_str) = body.split_once('*').unwrap();
        let cs = u8::from_str_radix(cs_str.trim(), 16).unwrap();
        assert_eq!(checksum(body), cs);
    }

    /// Testable property from §8: round-tripping lat/lon through the
    /// encoder and the existing NMEA decoder agrees to within encoding
    /// precision.
    #[test]
    fn gga_lat_lon_roundtrips_through_nmea_decoder() {
        use crate::drivers::nmea::NmeaState;
        use crate::registry::{Driver, DriverPrivate};

        let fix_in = sample_fix();
        let sentence = render_gga(&fix_in).unwrap();
        let line = sentence.trim_end();

        let driver = crate::drivers::nmea::NmeaDriver;
        let mut private = DriverPrivate::Nmea(NmeaState::default());
        let mut fix_out = UnifiedFix::default();
        let mut sky = Skyview::default();
        let mut raw = Vec::new();
        let mut warnings = Vec::new();
        let mut ctx = crate::context::Context::default();
        driver.parse(&mut ctx, &mut private, &mut fix_out, &mut sky, &mut raw, &mut warnings, line.as_bytes());

        assert!((fix_out.geodetic.lat.unwrap() - 37.4).abs() < 1e-4);
        assert!((fix_out.geodetic.lon.unwrap() - (-122.0)).abs() < 1e-4);
    }

    #[test]
    fn gsv_groups_four_satellites_per_sentence() {
        let mut sky = Skyview::default();
        for i in 0..6 {
            sky.satellites.push(SatelliteRecord {
                svid: i,
                nmea_prn: Some(i),
                ..Default::default()
            });
        }
        let sentences = render_gsv(&sky);
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("$GPGSV,2,1,06"));
    }

    #[test]
    fn gga_is_none_without_a_fix() {
        assert!(render_gga(&UnifiedFix::default()).is_none());
    }
}
