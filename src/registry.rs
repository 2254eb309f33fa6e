//! Driver registry (C3): an ordered catalog of driver descriptors, and the
//! selection rules that pick the active driver for a device session.

use std::time::Duration;

use crate::context::Context;
use crate::error::DecodeWarning;
use crate::lexer::PacketType;
use crate::model::{RawMeasurement, Skyview, UnifiedFix};

/// Lifecycle events a descriptor's event-hook may be invoked on (§4.3
/// rule 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Identified,
    /// Carries a monotonically increasing counter so the hook can stage
    /// successive configuration writes across cycles.
    Configure(u32),
    Reactivate,
    Deactivate,
    TriggerMatch,
    Wakeup,
    DriverSwitch,
}

/// Requested device speed/parity/stopbits, per the command surface in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialParams {
    pub baud: u32,
    pub parity: Parity,
    pub stopbits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Mode-switch target, per §6's `{binary, nmea}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Binary,
    Nmea,
}

/// Per-family driver-private subrecord. One variant per driver that needs
/// to carry state across packets beyond the unified model (staged
/// configuration counters, hardware-variant discovery, GSV accumulation).
/// `None` is used by drivers with no private state of their own.
#[derive(Debug, Clone)]
pub enum DriverPrivate {
    None,
    Nmea(crate::drivers::nmea::NmeaState),
    Ubx(crate::drivers::ubx::UbxState),
    Tsip(crate::drivers::tsip::TsipState),
    Skytraq(crate::drivers::skytraq::SkytraqState),
}

impl Default for DriverPrivate {
    fn default() -> Self {
        DriverPrivate::None
    }
}

/// Outcome of decoding one packet: whether this packet was a cycle-ender
/// (§4.8/§5: "the cycle ender ... causes a single publication").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOutcome {
    pub cycle_complete: bool,
}

/// Behavior table for one receiver family (spec §4.3's "driver
/// descriptor"). A registry is a `Vec<Box<dyn Driver>>` in declaration
/// order. Optional capabilities (probe, rate switch, ...) are represented
/// by a default method returning `None`/doing nothing, per the redesign
/// note "Dynamic dispatch on drivers" — never a null function pointer.
pub trait Driver: Send + Sync {
    /// Stable, human-readable name (diagnostic logging only).
    fn name(&self) -> &'static str;

    /// The packet type this driver consumes from the lexer.
    fn packet_type(&self) -> PacketType;

    /// For NMEA-shaped drivers: a literal prefix of the sentence body that
    /// identifies this chipset family (e.g. `$PMTK`). `None` for drivers
    /// activated purely by packet type.
    fn trigger(&self) -> Option<&'static str> {
        None
    }

    /// Sticky drivers remain active across a device re-open (§4.3 rule 2).
    fn sticky(&self) -> bool {
        false
    }

    /// Minimum supported cycle time; used to clamp rate-switch requests.
    fn min_cycle(&self) -> Duration {
        Duration::from_millis(200)
    }

    /// Builds this driver's private subrecord, created once on activation.
    fn new_private(&self) -> DriverPrivate {
        DriverPrivate::None
    }

    /// Decodes one payload (already framed and checksum-validated by the
    /// lexer) into the unified model, ORing dirty bits as it goes. Raw
    /// carrier/pseudorange observables (§3: a session-level collection
    /// distinct from the unified fix) are appended to `raw` rather than
    /// replacing it, since several packets can each contribute one
    /// satellite's measurement within the same cycle. A field present
    /// but outside its documented range is forced to `None` and a
    /// [`DecodeWarning`] is appended to `warnings` rather than rejecting
    /// the whole packet (the "Decode-range" category, spec §7).
    fn parse(
        &self,
        ctx: &mut Context,
        private: &mut DriverPrivate,
        fix: &mut UnifiedFix,
        sky: &mut Skyview,
        raw: &mut Vec<RawMeasurement>,
        warnings: &mut Vec<DecodeWarning>,
        payload: &[u8],
    ) -> ParseOutcome;

    /// Invoked on the lifecycle events in §4.3 rule 4. Returns bytes to
    /// write to the device, or an empty vec if this event requires no
    /// write (the common case, e.g. `Deactivate`).
    fn event_hook(
        &self,
        _ctx: &Context,
        _private: &mut DriverPrivate,
        _event: LifecycleEvent,
    ) -> Vec<u8> {
        Vec::new()
    }

    /// Builds a mode-switch command, if this driver supports one.
    fn set_mode(&self, _ctx: &Context, _mode: DeviceMode) -> Option<Vec<u8>> {
        None
    }

    /// Builds a speed-switch command, if this driver supports one.
    fn set_speed(&self, _ctx: &Context, _params: SerialParams) -> Option<Vec<u8>> {
        None
    }

    /// Builds a rate-switch command for a measurement period, clamped to
    /// `[min_cycle, 65535 ms]` per §4.5.
    fn set_rate(&self, _ctx: &Context, _period: Duration) -> Option<Vec<u8>> {
        None
    }

    /// Wraps an RTCM correction payload for injection into this device's
    /// output stream (the NTRIP-to-primary-device path in §2/§9).
    fn rtcm_write(&self, _payload: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// The process-wide, immutable, ordered catalog of driver descriptors.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new(drivers: Vec<Box<dyn Driver>>) -> Self {
        DriverRegistry { drivers }
    }

    /// The standard catalog: every driver this crate implements, in the
    /// declaration order that governs trigger-matching precedence.
    pub fn standard() -> Self {
        DriverRegistry::new(vec![
            Box::new(crate::drivers::nmea::NmeaDriver),
            Box::new(crate::drivers::nmea_proprietary::GarminPgrmDriver),
            Box::new(crate::drivers::nmea_proprietary::MtkDriver),
            Box::new(crate::drivers::nmea_proprietary::AshtechRidDriver),
            Box::new(crate::drivers::nmea_proprietary::FecDriver),
            Box::new(crate::drivers::nmea_proprietary::TrimbleTntDriver),
            Box::new(crate::drivers::nmea_proprietary::SirfNmeaDriver),
            Box::new(crate::drivers::ubx::UbxDriver),
            Box::new(crate::drivers::tsip::TsipDriver),
            Box::new(crate::drivers::skytraq::SkytraqDriver),
            Box::new(crate::drivers::other::SirfDriver),
            Box::new(crate::drivers::other::GarminDriver),
            Box::new(crate::drivers::other::EvermoreDriver),
        ])
    }

    pub fn drivers(&self) -> &[Box<dyn Driver>] {
        &self.drivers
    }

    /// §4.3 rule 3: a non-NMEA packet activates the descriptor tagged
    /// with that packet type.
    pub fn by_packet_type(&self, pt: PacketType) -> Option<&dyn Driver> {
        self.drivers
            .iter()
            .find(|d| d.packet_type() == pt)
            .map(|b| b.as_ref())
    }

    /// §4.3 rule 2: scans in declaration order for any descriptor whose
    /// trigger is a prefix of the sentence body (without the leading `$`
    /// or trailing checksum); first match wins.
    pub fn by_nmea_trigger(&self, sentence_body: &str) -> Option<&dyn Driver> {
        self.drivers
            .iter()
            .find(|d| matches!(d.trigger(), Some(t) if sentence_body.starts_with(t)))
            .map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_packet_type_finds_ubx() {
        let reg = DriverRegistry::standard();
        let d = reg.by_packet_type(PacketType::Ubx).expect("ubx driver");
        assert_eq!(d.name(), "ubx");
    }

    #[test]
    fn unmatched_packet_type_returns_none() {
        let reg = DriverRegistry::standard();
        assert!(reg.by_packet_type(PacketType::Zodiac).is_none());
    }

    #[test]
    fn trigger_matching_is_first_match_in_declaration_order() {
        let reg = DriverRegistry::standard();
        // A standard GGA sentence body matches none of the proprietary
        // prefixes (§4.4); only the explicit PGRM/PMTK/PASHR,RID/PFEC,GP/
        // PTNT/PSRF families (drivers::nmea_proprietary) declare triggers.
        assert!(reg.by_nmea_trigger("GPGGA,1,2,3").is_none());
    }

    #[test]
    fn trigger_matching_finds_proprietary_family_by_prefix() {
        let reg = DriverRegistry::standard();
        let d = reg.by_nmea_trigger("PMTK001,604,3").expect("pmtk trigger match");
        assert_eq!(d.name(), "nmea-pmtk");
    }
}
