//! Process-wide (but explicitly-threaded) context.
//!
//! The original system keeps leap seconds, the current GPS week, and the
//! debug level in a process-global `context` struct. Per the redesign
//! note "Global mutable state", this crate instead passes `Context` by
//! reference wherever it's needed and never hides it behind a `static`.

/// Configuration inputs recognized by the core (see external interfaces).
///
/// This is deliberately a closed, enumerated set — no free-form config map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    /// Suppress all writes to the device (probes, configuration, mode
    /// switches). A fully read-only session.
    pub readonly: bool,

    /// Suppress configuration writes but still allow identification
    /// probes. Weaker than `readonly`.
    pub passive: bool,

    /// Graded debug verbosity; gates the noisier log levels that don't
    /// map onto a `log::Level` one-to-one (prog/data/io/raw/spin).
    pub debug_level: u8,

    /// Overrides a driver's advertised minimum cycle time, when set.
    pub min_cycle_override: Option<std::time::Duration>,

    /// Leap seconds (GPS-UTC offset), learned from the device or seeded
    /// with a compiled-in baseline until a packet supplies a better value.
    pub leap_seconds: i32,

    /// Current GPS week baseline used to disambiguate a truncated
    /// (10-bit) week number against rollover. Updated only by the
    /// time-resolution path.
    pub gps_week_baseline: u16,
}

/// Leap seconds known to be correct as of this crate's release; used only
/// until a device supplies its own (§4.8 "Absent leap seconds, use a
/// compiled-in baseline").
pub const BASELINE_LEAP_SECONDS: i32 = 18;

/// GPS week at roughly the time this baseline was set (week 0 is
/// 1980-01-06). Used to promote a truncated 10-bit week number into the
/// current rollover epoch.
pub const BASELINE_GPS_WEEK: u16 = 2347;

impl Default for Context {
    fn default() -> Self {
        Context {
            readonly: false,
            passive: false,
            debug_level: 0,
            min_cycle_override: None,
            leap_seconds: BASELINE_LEAP_SECONDS,
            gps_week_baseline: BASELINE_GPS_WEEK,
        }
    }
}

impl Context {
    /// Whether any write to the device is currently permitted at all
    /// (identification probes are allowed even when `passive`).
    pub fn writes_allowed(&self) -> bool {
        !self.readonly
    }

    /// Whether configuration writes (as opposed to bare probes) are
    /// permitted.
    pub fn configuration_allowed(&self) -> bool {
        !self.readonly && !self.passive
    }

    /// Records a newly learned leap-second count, per §4.8: a device that
    /// reports ≥18 leap seconds after 2017 is considered authoritative.
    pub fn adopt_leap_seconds(&mut self, leap_seconds: i32) {
        if leap_seconds >= BASELINE_LEAP_SECONDS {
            self.leap_seconds = leap_seconds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_permits_everything() {
        let ctx = Context::default();
        assert!(ctx.writes_allowed());
        assert!(ctx.configuration_allowed());
    }

    #[test]
    fn readonly_blocks_everything() {
        let ctx = Context {
            readonly: true,
            ..Default::default()
        };
        assert!(!ctx.writes_allowed());
        assert!(!ctx.configuration_allowed());
    }

    #[test]
    fn passive_blocks_only_configuration() {
        let ctx = Context {
            passive: true,
            ..Default::default()
        };
        assert!(ctx.writes_allowed());
        assert!(!ctx.configuration_allowed());
    }

    #[test]
    fn adopt_leap_seconds_ignores_implausible_small_values() {
        let mut ctx = Context::default();
        ctx.adopt_leap_seconds(5);
        assert_eq!(ctx.leap_seconds, BASELINE_LEAP_SECONDS);
        ctx.adopt_leap_seconds(19);
        assert_eq!(ctx.leap_seconds, 19);
    }
}
