//! The unified navigation/skyview/raw-measurement model (C9).
//!
//! Structurally grounded on the teacher's `protocol::v3::{types,response}`
//! (`Tpv`, `Sky`, `Dop`, `Ecef`, `Ned`, `Satellite`, `Measurement`) but
//! decoupled from serde/JSON: these are the *decoded* form a driver writes
//! into, independent of which wire protocol produced the values. Every
//! field that the wire protocol may not have supplied is `Option<T>` —
//! the Rust-idiomatic form of spec's "validity sentinel" requirement.

use chrono::{DateTime, Utc};

/// GPS fix mode, as in `protocol::v3::types::FixMode` but owned by this
/// crate rather than mapped from a wire-protocol repr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixMode {
    #[default]
    NoFix,
    Fix2D,
    Fix3D,
}

/// GPS fix status: positioning method and augmentation in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FixStatus {
    #[default]
    Unknown,
    Gps,
    DGps,
    RtkFixed,
    RtkFloat,
    DeadReckoning,
    GnssDr,
    TimeOnly,
    Simulated,
}

/// Geodetic position: latitude/longitude in degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geodetic {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_hae: Option<f64>,
    pub alt_msl: Option<f64>,
}

/// Earth-Centered, Earth-Fixed position and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ecef {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub vx: Option<f64>,
    pub vy: Option<f64>,
    pub vz: Option<f64>,
    pub p_acc: Option<f64>,
    pub v_acc: Option<f64>,
}

/// Local tangent-plane (North-East-Down) velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NedVelocity {
    pub n: Option<f64>,
    pub e: Option<f64>,
    pub d: Option<f64>,
}

/// Dilution-of-precision figures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dop {
    pub g: Option<f64>,
    pub p: Option<f64>,
    pub h: Option<f64>,
    pub v: Option<f64>,
    pub t: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Error estimates, all 95%-confidence per spec's glossary convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ErrorEstimates {
    pub eph: Option<f64>,
    pub epv: Option<f64>,
    pub eps: Option<f64>,
    pub ept: Option<f64>,
}

bitflags::bitflags! {
    /// Categories of the unified fix touched since the last publication.
    /// Driver decoders OR bits in; the cycle-ender clears and publishes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyBits: u32 {
        const TIME       = 1 << 0;
        const LATLON     = 1 << 1;
        const ALTITUDE   = 1 << 2;
        const SPEED      = 1 << 3;
        const TRACK      = 1 << 4;
        const MODE       = 1 << 5;
        const STATUS     = 1 << 6;
        const DOP        = 1 << 7;
        const SATELLITE  = 1 << 8;
        const USED       = 1 << 9;
        const ECEF       = 1 << 10;
        const VECEF      = 1 << 11;
        const NED        = 1 << 12;
        const VNED       = 1 << 13;
        const RAW        = 1 << 14;
        const SUBFRAME   = 1 << 15;
        const REPORT_IS  = 1 << 16;
        const CLEAR_IS   = 1 << 17;
    }
}

/// The canonical, protocol-agnostic navigation datum.
///
/// Invariant: if `mode == FixMode::NoFix`, `geodetic.lat`/`lon`/`alt_*`
/// must be `None` — decoders are responsible for upholding this when they
/// set `mode`, see `UnifiedFix::set_no_fix`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnifiedFix {
    pub time: Option<DateTime<Utc>>,
    pub mode: FixMode,
    pub status: FixStatus,
    pub geodetic: Geodetic,
    pub ecef: Ecef,
    pub ned: NedVelocity,
    pub dop: Dop,
    pub err: ErrorEstimates,
    pub mag_var: Option<f64>,
    pub dgps_station_id: Option<i32>,
    pub dgps_age: Option<f64>,
    pub speed: Option<f64>,
    pub track: Option<f64>,
    pub climb: Option<f64>,
    pub geoid_separation: Option<f64>,
    pub dirty: DirtyBits,
}

impl UnifiedFix {
    /// Marks the fix as having no position, per the invariant in §3.
    pub fn set_no_fix(&mut self) {
        self.mode = FixMode::NoFix;
        self.geodetic = Geodetic::default();
        self.dirty.insert(DirtyBits::MODE | DirtyBits::LATLON | DirtyBits::ALTITUDE);
    }

    /// Clears the dirty mask; called by the cycle-ender after publication.
    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyBits::empty();
    }
}

/// GNSS constellation identifier, per §3's skyview definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GnssSystem {
    Gps,
    Sbas,
    Galileo,
    BeiDou,
    Imes,
    Qzss,
    Glonass,
    Irnss,
}

impl GnssSystem {
    /// Numeric id as used on the wire (u-blox `gnssId` convention, which
    /// the spec adopts as the canonical numbering in §3).
    pub fn id(self) -> u8 {
        match self {
            GnssSystem::Gps => 0,
            GnssSystem::Sbas => 1,
            GnssSystem::Galileo => 2,
            GnssSystem::BeiDou => 3,
            GnssSystem::Imes => 4,
            GnssSystem::Qzss => 5,
            GnssSystem::Glonass => 6,
            GnssSystem::Irnss => 20,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(GnssSystem::Gps),
            1 => Some(GnssSystem::Sbas),
            2 => Some(GnssSystem::Galileo),
            3 => Some(GnssSystem::BeiDou),
            4 => Some(GnssSystem::Imes),
            5 => Some(GnssSystem::Qzss),
            6 => Some(GnssSystem::Glonass),
            20 => Some(GnssSystem::Irnss),
            _ => None,
        }
    }
}

/// Satellite health, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SatHealth {
    #[default]
    Unknown,
    Ok,
    Bad,
}

/// A single satellite record within a skyview.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SatelliteRecord {
    pub gnss: Option<GnssSystem>,
    pub svid: u16,
    /// Cross-constellation NMEA PRN (see `ubx_prn`).
    pub nmea_prn: Option<u16>,
    pub signal_id: Option<u8>,
    /// Degrees, `|elevation| <= 90`. `None` iff not yet tracked.
    pub elevation: Option<f64>,
    /// Degrees, `0 <= azimuth < 360`. `None` iff not yet tracked.
    pub azimuth: Option<f64>,
    pub snr: Option<f64>,
    pub used: bool,
    pub health: SatHealth,
}

impl SatelliteRecord {
    /// Invariant check from §3/§8: angle ranges and the
    /// absent-iff-not-tracked rule.
    pub fn is_well_formed(&self) -> bool {
        let elevation_ok = self.elevation.is_none_or(|e| e.abs() <= 90.0);
        let azimuth_ok = self.azimuth.is_none_or(|a| (0.0..360.0).contains(&a));
        let tracked_together = self.elevation.is_some() == self.azimuth.is_some();
        elevation_ok && azimuth_ok && tracked_together
    }

    /// Forces `elevation`/`azimuth` to `None` if present but outside the
    /// documented range (the same bounds `is_well_formed` checks), per
    /// the "Decode-range" error category (spec §7). Returns the name of
    /// each field it cleared so the caller can log a
    /// [`crate::error::DecodeWarning`].
    pub fn sanitize_ranges(&mut self) -> Vec<&'static str> {
        let mut cleared = Vec::new();
        if self.elevation.is_some_and(|e| e.abs() > 90.0) {
            self.elevation = None;
            cleared.push("elevation");
        }
        if self.azimuth.is_some_and(|a| !(0.0..360.0).contains(&a)) {
            self.azimuth = None;
            cleared.push("azimuth");
        }
        cleared
    }
}

/// An ordered skyview, as accumulated from (for example) NMEA GSV
/// sentences or a UBX `NAV-SAT` message.
#[derive(Debug, Clone, Default)]
pub struct Skyview {
    pub satellites: Vec<SatelliteRecord>,
}

/// RINEX-style observation code, kept as a short owned string rather than
/// an enum because the set is large and vendor-extensible.
pub type ObsCode = String;

/// A single raw-measurement record, per §3. NaN marks an invalid field to
/// match the wire convention (as opposed to the unified fix's `Option`,
/// which is used here too for Rust idiom, with NaN reserved for the
/// payload fields the spec explicitly calls out as using NaN).
#[derive(Debug, Clone, Default)]
pub struct RawMeasurement {
    pub gnss: Option<GnssSystem>,
    pub svid: u16,
    pub signal_id: Option<u8>,
    pub obs_code: Option<ObsCode>,
    pub pseudorange_m: f64,
    pub carrier_phase_cycles: f64,
    pub doppler_hz: f64,
    pub code_phase: f64,
    pub delta_range: f64,
    pub locktime: Option<u32>,
    pub snr: f64,
    pub loss_of_lock: bool,
    pub tracking_status: u32,
}

impl RawMeasurement {
    /// A fresh record with every optional numeric field at the
    /// invalid/NaN sentinel described in §3.
    pub fn invalid(svid: u16) -> Self {
        RawMeasurement {
            svid,
            pseudorange_m: f64::NAN,
            carrier_phase_cycles: f64::NAN,
            doppler_hz: f64::NAN,
            code_phase: f64::NAN,
            delta_range: f64::NAN,
            snr: f64::NAN,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fix_invariant_clears_position() {
        let mut fix = UnifiedFix {
            geodetic: Geodetic {
                lat: Some(1.0),
                lon: Some(2.0),
                ..Default::default()
            },
            ..Default::default()
        };
        fix.set_no_fix();
        assert_eq!(fix.mode, FixMode::NoFix);
        assert_eq!(fix.geodetic.lat, None);
    }

    #[test]
    fn dirty_mask_ors_and_clears() {
        let mut fix = UnifiedFix::default();
        fix.dirty.insert(DirtyBits::TIME);
        fix.dirty.insert(DirtyBits::LATLON);
        assert!(fix.dirty.contains(DirtyBits::TIME | DirtyBits::LATLON));
        fix.clear_dirty();
        assert!(fix.dirty.is_empty());
    }

    #[test]
    fn satellite_elevation_azimuth_bounds() {
        let good = SatelliteRecord {
            elevation: Some(45.0),
            azimuth: Some(180.0),
            ..Default::default()
        };
        assert!(good.is_well_formed());

        let bad = SatelliteRecord {
            elevation: Some(91.0),
            azimuth: Some(180.0),
            ..Default::default()
        };
        assert!(!bad.is_well_formed());

        let untracked = SatelliteRecord::default();
        assert!(untracked.is_well_formed());
    }

    #[test]
    fn sanitize_ranges_clears_only_the_offending_field() {
        let mut rec = SatelliteRecord {
            elevation: Some(91.0),
            azimuth: Some(400.0),
            ..Default::default()
        };
        let cleared = rec.sanitize_ranges();
        assert_eq!(cleared, vec!["elevation", "azimuth"]);
        assert!(rec.elevation.is_none());
        assert!(rec.azimuth.is_none());

        let mut fine = SatelliteRecord {
            elevation: Some(45.0),
            azimuth: Some(180.0),
            ..Default::default()
        };
        assert!(fine.sanitize_ranges().is_empty());
        assert_eq!(fine.elevation, Some(45.0));
    }

    #[test]
    fn gnss_system_id_roundtrips() {
        for sys in [
            GnssSystem::Gps,
            GnssSystem::Sbas,
            GnssSystem::Galileo,
            GnssSystem::BeiDou,
            GnssSystem::Imes,
            GnssSystem::Qzss,
            GnssSystem::Glonass,
            GnssSystem::Irnss,
        ] {
            assert_eq!(GnssSystem::from_id(sys.id()), Some(sys));
        }
    }

    #[test]
    fn raw_measurement_invalid_uses_nan_sentinels() {
        let m = RawMeasurement::invalid(5);
        assert!(m.pseudorange_m.is_nan());
        assert!(m.snr.is_nan());
        assert_eq!(m.svid, 5);
    }
}
