//! Bidirectional (gnssId, svId) <-> cross-constellation NMEA-PRN mapping
//! (§4.5 "PRN mapping"). Re-architected per REDESIGN FLAGS
//! "Vendor-table proliferation": a static table of ranges, not a switch.

use crate::model::GnssSystem;

struct Range {
    system: GnssSystem,
    sv_lo: u16,
    sv_hi: u16,
    prn_lo: u16,
}

/// (system, sv range, first PRN in the range), declaration order matches
/// §4.5's piecewise table.
const RANGES: &[Range] = &[
    Range { system: GnssSystem::Gps, sv_lo: 1, sv_hi: 32, prn_lo: 1 },
    Range { system: GnssSystem::Sbas, sv_lo: 120, sv_hi: 158, prn_lo: 33 },
    Range { system: GnssSystem::Galileo, sv_lo: 1, sv_hi: 36, prn_lo: 301 },
    Range { system: GnssSystem::BeiDou, sv_lo: 1, sv_hi: 37, prn_lo: 401 },
    Range { system: GnssSystem::Qzss, sv_lo: 1, sv_hi: 7, prn_lo: 193 },
    Range { system: GnssSystem::Glonass, sv_lo: 1, sv_hi: 32, prn_lo: 65 },
    Range { system: GnssSystem::Imes, sv_lo: 1, sv_hi: 10, prn_lo: 173 },
];

/// Maps a u-blox (gnssId, svId) pair to the extended NMEA-4.0 PRN.
pub fn ubx_to_prn(gnss_id: u8, sv_id: u8) -> Option<u16> {
    let system = GnssSystem::from_id(gnss_id)?;
    let sv = u16::from(sv_id);
    RANGES
        .iter()
        .find(|r| r.system == system && (r.sv_lo..=r.sv_hi).contains(&sv))
        .map(|r| r.prn_lo + (sv - r.sv_lo))
}

/// Inverse of [`ubx_to_prn`]: extended NMEA PRN back to (gnssId, svId).
pub fn prn_to_ubx(prn: u16) -> Option<(u8, u8)> {
    RANGES.iter().find_map(|r| {
        let hi = r.prn_lo + (r.sv_hi - r.sv_lo);
        if (r.prn_lo..=hi).contains(&prn) {
            let sv = r.sv_lo + (prn - r.prn_lo);
            Some((r.system.id(), sv as u8))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_maps_identity() {
        assert_eq!(ubx_to_prn(0, 5), Some(5));
        assert_eq!(prn_to_ubx(5), Some((0, 5)));
    }

    #[test]
    fn sbas_offsets_into_33_64() {
        assert_eq!(ubx_to_prn(1, 120), Some(33));
        assert_eq!(ubx_to_prn(1, 158), Some(64));
    }

    #[test]
    fn out_of_range_sv_is_none() {
        assert_eq!(ubx_to_prn(0, 33), None);
        assert_eq!(ubx_to_prn(6, 33), None);
    }

    /// Testable property from §8: the PRN mapping is a bijection on its
    /// declared domain.
    #[test]
    fn mapping_is_bijective_on_declared_domain() {
        for gnss_id in [0u8, 1, 2, 3, 5, 6, 4] {
            let Some(system) = GnssSystem::from_id(gnss_id) else { continue };
            let range = RANGES.iter().find(|r| r.system == system).unwrap();
            for sv in range.sv_lo..=range.sv_hi {
                let prn = ubx_to_prn(gnss_id, sv as u8).unwrap();
                assert_eq!(prn_to_ubx(prn), Some((gnss_id, sv as u8)));
            }
        }
    }
}
