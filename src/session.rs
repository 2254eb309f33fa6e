//! Device session (C9 glue): ties one byte stream's [`Lexer`] to the
//! [`DriverRegistry`] selection rules, the active driver's private state,
//! and the unified [`UnifiedFix`]/[`Skyview`]/raw-measurement outputs.

use std::time::Duration;

use crate::context::Context;
use crate::error::DecodeWarning;
use crate::lexer::{BadFrameReason, LexResult, Lexer, PacketType, TypeMask};
use crate::model::{RawMeasurement, Skyview, UnifiedFix};
use crate::registry::{Driver, DriverPrivate, DriverRegistry, LifecycleEvent};

/// Lower bound of the periodic re-poll window (§5 "Cancellation /
/// timeouts": "issues repoll commands every 5-60 s when expected packets
/// are overdue").
pub const PERIODIC_POLL_MIN: Duration = Duration::from_secs(5);
pub const PERIODIC_POLL_MAX: Duration = Duration::from_secs(60);

/// One decoded packet's effect on the session, returned by [`DeviceSession::feed`]
/// so the caller can act on publication/writes without reaching back into
/// session internals.
#[derive(Debug, Default)]
pub struct FeedOutcome {
    /// Set when a cycle ender fired this call: the fix is ready to
    /// publish and its dirty mask describes what changed.
    pub published: bool,
    /// Bytes the active driver wants written back to the device (a
    /// configuration/probe command queued by an `event_hook`).
    pub writes: Vec<Vec<u8>>,
}

/// A device session: the live state for one physical/virtual GNSS byte
/// stream. Owns its lexer, driver-private subrecord, and unified datum
/// exclusively (§3 "Ownership").
pub struct DeviceSession {
    registry: DriverRegistry,
    lexer: Lexer,
    active: Option<usize>,
    private: DriverPrivate,
    sticky_active: Option<usize>,
    fix: UnifiedFix,
    sky: Skyview,
    raw: Vec<RawMeasurement>,
    /// Decode-range warnings accumulated across the session's lifetime
    /// (spec §7, "Decode-range"): a field was present but out of its
    /// documented range, forced to `None`, and logged here instead of
    /// failing the packet.
    warnings: Vec<DecodeWarning>,
    identified: bool,
    configure_counter: u32,
}

impl DeviceSession {
    pub fn new(registry: DriverRegistry) -> Self {
        DeviceSession {
            registry,
            lexer: Lexer::new(),
            active: None,
            private: DriverPrivate::None,
            sticky_active: None,
            fix: UnifiedFix::default(),
            sky: Skyview::default(),
            raw: Vec::new(),
            warnings: Vec::new(),
            identified: false,
            configure_counter: 0,
        }
    }

    pub fn fix(&self) -> &UnifiedFix {
        &self.fix
    }

    pub fn skyview(&self) -> &Skyview {
        &self.sky
    }

    pub fn raw_measurements(&self) -> &[RawMeasurement] {
        &self.raw
    }

    /// Decode-range warnings accumulated so far. Cleared by
    /// [`DeviceSession::drain_warnings`]; a caller not interested in them
    /// can simply never call it, since they otherwise just grow forever.
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// Takes ownership of the accumulated decode warnings, leaving the
    /// session's own collection empty.
    pub fn drain_warnings(&mut self) -> Vec<DecodeWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn active_driver(&self) -> Option<&dyn Driver> {
        self.active.map(|i| self.registry.drivers()[i].as_ref())
    }

    /// Re-opening a device: a sticky driver from the previous open stays
    /// active instead of re-running discovery (§4.3 rule 2), and gets a
    /// `Reactivate` lifecycle event instead of running `Identified` again.
    /// A non-sticky active driver is told `Deactivate` before it's dropped.
    pub fn reopen(&mut self, ctx: &Context) -> Vec<Vec<u8>> {
        self.lexer = Lexer::new();
        self.identified = false;
        if let Some(i) = self.sticky_active {
            self.activate(ctx, i, LifecycleEvent::Reactivate)
        } else {
            if let Some(i) = self.active {
                let driver = self.registry.drivers()[i].as_ref();
                driver.event_hook(ctx, &mut self.private, LifecycleEvent::Deactivate);
            }
            self.active = None;
            self.private = DriverPrivate::None;
            Vec::new()
        }
    }

    /// Called by the embedder on its own schedule (§5: "issues repoll
    /// commands every 5-60 s when expected packets are overdue") with how
    /// long it's been since the last packet arrived. Below
    /// [`PERIODIC_POLL_MIN`] this is a no-op; the active driver decides
    /// for itself (via its own `event_hook`) whether this particular call
    /// is actually due to write anything.
    pub fn wakeup(&mut self, ctx: &Context, idle_for: Duration) -> Vec<Vec<u8>> {
        if idle_for < PERIODIC_POLL_MIN {
            return Vec::new();
        }
        let Some(idx) = self.active else { return Vec::new() };
        let driver = self.registry.drivers()[idx].as_ref();
        let writes = driver.event_hook(ctx, &mut self.private, LifecycleEvent::Wakeup);
        if writes.is_empty() { Vec::new() } else { vec![writes] }
    }

    fn activate(&mut self, ctx: &Context, index: usize, event: LifecycleEvent) -> Vec<Vec<u8>> {
        let driver = self.registry.drivers()[index].as_ref();
        self.lexer.set_type_mask(TypeMask::from_bits_truncate(driver.packet_type().mask_bit()));
        self.private = driver.new_private();
        self.active = Some(index);
        if driver.sticky() {
            self.sticky_active = Some(index);
        }
        let writes = driver.event_hook(ctx, &mut self.private, event);
        if writes.is_empty() { Vec::new() } else { vec![writes] }
    }

    fn select_for_packet_type(&self, kind: PacketType) -> Option<usize> {
        self.registry.drivers().iter().position(|d| d.packet_type() == kind)
    }

    fn select_for_nmea_trigger(&self, body: &str) -> Option<usize> {
        self.registry.drivers().iter().position(|d| matches!(d.trigger(), Some(t) if body.starts_with(t)))
    }

    /// Feeds newly-arrived bytes and drains as many frames as are
    /// immediately available, decoding each through the active (or
    /// newly-selected) driver.
    pub fn feed(&mut self, ctx: &mut Context, bytes: &[u8]) -> FeedOutcome {
        self.lexer.advance(bytes);
        let mut outcome = FeedOutcome::default();

        loop {
            match self.lexer.next() {
                LexResult::NoFrameYet => break,
                LexResult::Bad(bad) => {
                    self.log_bad_frame(bad.reason);
                    continue;
                }
                LexResult::Frame(packet) => {
                    self.route_frame(ctx, packet, &mut outcome);
                }
            }
        }

        outcome
    }

    fn log_bad_frame(&self, reason: BadFrameReason) {
        match reason {
            BadFrameReason::Overflow => log::warn!("session: frame overflow, lexer reset"),
            _ => log::debug!("session: bad frame ({reason:?})"),
        }
    }

    fn route_frame(&mut self, ctx: &mut Context, packet: crate::lexer::Packet, outcome: &mut FeedOutcome) {
        if packet.kind == PacketType::Nmea {
            let Ok(line) = std::str::from_utf8(&packet.payload) else {
                return;
            };
            let body = crate::drivers::nmea::body(line);
            if let Some((id, _)) = body.split_once(',') {
                if id.len() >= 5 {
                    if let Some(idx) = self.select_for_nmea_trigger(body) {
                        if self.active != Some(idx) {
                            outcome.writes.extend(self.activate(ctx, idx, LifecycleEvent::TriggerMatch));
                        }
                    } else if self.active.is_none() {
                        if let Some(idx) = self.select_for_packet_type(PacketType::Nmea) {
                            outcome.writes.extend(self.activate(ctx, idx, LifecycleEvent::DriverSwitch));
                        }
                    }
                }
            }
        } else if self.active.map(|i| self.registry.drivers()[i].packet_type()) != Some(packet.kind) {
            if let Some(idx) = self.select_for_packet_type(packet.kind) {
                outcome.writes.extend(self.activate(ctx, idx, LifecycleEvent::DriverSwitch));
            } else {
                return;
            }
        }

        let Some(idx) = self.active else { return };
        let driver = self.registry.drivers()[idx].as_ref();

        if !self.identified {
            self.identified = true;
            outcome.writes.push_and_extend(driver.event_hook(ctx, &mut self.private, LifecycleEvent::Identified));
        }

        let result = driver.parse(
            ctx,
            &mut self.private,
            &mut self.fix,
            &mut self.sky,
            &mut self.raw,
            &mut self.warnings,
            &packet.payload,
        );
        if result.cycle_complete {
            outcome.published = true;
            self.fix.clear_dirty();
        }

        self.configure_counter += 1;
        let writes = driver.event_hook(ctx, &mut self.private, LifecycleEvent::Configure(self.configure_counter));
        outcome.writes.push_and_extend(writes);
    }
}

/// Small helper so `route_frame` can push a non-empty write without an
/// `if !writes.is_empty()` at every call site.
trait PushNonEmpty {
    fn push_and_extend(&mut self, writes: Vec<u8>);
}

impl PushNonEmpty for Vec<Vec<u8>> {
    fn push_and_extend(&mut self, writes: Vec<u8>) {
        if !writes.is_empty() {
            self.push(writes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nmea_sentence(body: &str) -> String {
        let sum = body.bytes().fold(0u8, |acc, b| acc ^ b);
        format!("${body}*{sum:02X}\r\n")
    }

    #[test]
    fn nmea_frame_activates_nmea_driver_and_publishes() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        let sentence = nmea_sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
        let outcome = session.feed(&mut ctx, sentence.as_bytes());
        assert!(outcome.published);
        assert_eq!(session.active_driver().unwrap().name(), "nmea0183");
        assert!(session.fix().geodetic.lat.is_some());
    }

    #[test]
    fn ubx_frame_activates_ubx_driver() {
        use crate::lexer::ubx::fletcher;

        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        let payload = vec![0u8; 92 + 4];
        let mut core = vec![0x01, 0x07]; // NAV-PVT
        core.extend_from_slice(&92u16.to_le_bytes());
        core.extend_from_slice(&payload[4..]);
        let (a, b) = fletcher(&core);
        let mut wire = vec![0xB5, 0x62];
        wire.extend_from_slice(&core);
        wire.push(a);
        wire.push(b);

        session.feed(&mut ctx, &wire);
        assert_eq!(session.active_driver().unwrap().name(), "ubx");
    }

    #[test]
    fn reopen_keeps_sticky_driver_active() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        let sentence = nmea_sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        session.feed(&mut ctx, sentence.as_bytes());
        session.reopen(&ctx);
        // The generic NMEA driver is never sticky, so reopening drops it.
        assert!(session.active_driver().is_none());
    }

    #[test]
    fn reopen_fires_reactivate_on_a_sticky_driver() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        session.feed(&mut ctx, "$PMTK001,604,3*32\r\n".as_bytes());
        assert_eq!(session.active_driver().unwrap().name(), "nmea-pmtk");

        session.reopen(&ctx);
        // A sticky driver survives the reopen instead of falling back to
        // re-running discovery from scratch.
        assert_eq!(session.active_driver().unwrap().name(), "nmea-pmtk");
    }

    #[test]
    fn binary_packet_switch_reaches_tsip_identification_request() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());

        // A minimal TSIP 0x41 (GPS time) report is enough to activate the
        // TSIP driver via its packet-type selection rule (firing
        // `DriverSwitch`) and exercise the `Identified` hook through the
        // public `feed` path.
        let frame = [0x10u8, 0x41, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0x03];
        let outcome = session.feed(&mut ctx, &frame);
        assert_eq!(session.active_driver().unwrap().name(), "tsip");
        // TSIP's Identified hook always requests firmware/hardware
        // identification, so the session should have queued a write.
        assert!(!outcome.writes.is_empty());
    }

    #[test]
    fn nmea_trigger_match_switches_from_generic_driver_to_proprietary_family() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        session.feed(&mut ctx, nmea_sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,").as_bytes());
        assert_eq!(session.active_driver().unwrap().name(), "nmea0183");

        // A PMTK sentence arriving mid-stream is a trigger match: it
        // should switch the active driver away from the generic decoder.
        session.feed(&mut ctx, nmea_sentence("PMTK001,604,3").as_bytes());
        assert_eq!(session.active_driver().unwrap().name(), "nmea-pmtk");
    }

    #[test]
    fn wakeup_before_the_minimum_poll_window_is_a_no_op() {
        let ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        assert!(session.wakeup(&ctx, Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn wakeup_with_no_active_driver_is_a_no_op() {
        let ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        assert!(session.wakeup(&ctx, PERIODIC_POLL_MIN).is_empty());
    }

    #[test]
    fn gsv_out_of_range_field_surfaces_through_session_warnings() {
        let mut ctx = Context::default();
        let mut session = DeviceSession::new(DriverRegistry::standard());
        // Elevation 95 is out of the documented +/-90 range.
        let sentence = nmea_sentence("GPGSV,1,1,01,05,95,045,40");
        session.feed(&mut ctx, sentence.as_bytes());

        assert_eq!(session.warnings().len(), 1);
        assert_eq!(session.warnings()[0].field, "elevation");

        let drained = session.drain_warnings();
        assert_eq!(drained.len(), 1);
        assert!(session.warnings().is_empty());
    }
}
