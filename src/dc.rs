//! Distributed-clock steering (§4.F): a PI controller that keeps the periodic tick aligned with
//! the reference slave's system clock.
//!
//! Two modes share one controller: in [`Mode::MasterSteersItself`] the master reads the
//! reference's clock back each cycle and re-arms its own timer; in
//! [`Mode::MasterDrivesReference`] the master instead broadcasts `now` and lets the reference
//! slave run its own PI loop, only pulling the time back for bookkeeping. Both modes enqueue the
//! all-slaves sync read every cycle — that scheduling happens in [`crate::master`], not here.

/// Proportional gain, expressed as an integer divisor (`delta / 100` ⇒ Kp = 0.01).
const KP_DIVISOR: i64 = 100;
/// Integral gain, expressed as an integer divisor (`integral / 20` ⇒ Ki = 0.05).
const KI_DIVISOR: i64 = 20;

/// Which side of the sync relationship this master plays.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// The master steers its own periodic timer to the reference slave's clock.
    MasterSteersItself,
    /// The master drives the reference slave's PI loop by broadcasting its own `now`.
    MasterDrivesReference,
}

/// The DC PI controller's persistent state: just the integral term, carried cycle to cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Controller {
    integral: i64,
}

/// Result of one controller step: the clock error observed this cycle and the timer correction
/// to apply before the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    /// Signed offset of the reference clock from where it should be, in nanoseconds, wrapped
    /// into `(-cycle_time_ns/2, cycle_time_ns/2]`.
    pub delta_ns: i64,
    /// Nanosecond adjustment to apply to the next cycle's timer period. Negative shortens it.
    pub offset_ns: i64,
}

impl Controller {
    /// A controller with a zeroed integral term.
    pub const fn new() -> Self {
        Self { integral: 0 }
    }

    /// Step the controller given the reference clock reading `dc_ref_time_ns` sampled this
    /// cycle, `shift_time_ns` (the configured phase offset) and `cycle_time_ns`.
    ///
    /// Per §4.F: `delta = (dc_ref_time - shift_time) mod cycle_time`, folded into
    /// `(-cycle/2, cycle/2]`; the integral advances by `sign(delta)` each cycle (a bang-bang
    /// integral, not delta-proportional); the correction is `-(delta/100) - (integral/20)`.
    pub fn step(&mut self, dc_ref_time_ns: u64, shift_time_ns: u64, cycle_time_ns: u64) -> Correction {
        let cycle = cycle_time_ns as i64;
        let raw = (dc_ref_time_ns as i64).wrapping_sub(shift_time_ns as i64);
        let mut delta = raw.rem_euclid(cycle);
        if delta > cycle / 2 {
            delta -= cycle;
        }

        self.integral += delta.signum();

        let offset_ns = -(delta / KP_DIVISOR) - (self.integral / KI_DIVISOR);

        Correction { delta_ns: delta, offset_ns }
    }

    /// Current integral accumulator, exposed for diagnostics (`perf -d`-style dumps).
    pub fn integral(&self) -> i64 {
        self.integral
    }
}

/// Build the broadcast-write payload for [`Mode::MasterDrivesReference`]: the master's own clock
/// reading, little-endian, in either 32-bit or 64-bit form depending on the reference slave's
/// register width.
pub fn system_time_payload_32(now_ns: u64) -> [u8; 4] {
    (now_ns as u32).to_le_bytes()
}

/// 64-bit counterpart of [`system_time_payload_32`], for reference slaves with a wide DC range.
pub fn system_time_payload_64(now_ns: u64) -> [u8; 8] {
    now_ns.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s6_dc_steering() {
        let mut ctrl = Controller::new();

        let correction = ctrl.step(1_250_000, 200_000, 1_000_000);

        assert_eq!(correction.delta_ns, 50_000);
        assert_eq!(ctrl.integral(), 1);
        assert_eq!(correction.offset_ns, -500);
    }

    #[test]
    fn property_7_monotone_convergence_under_constant_drift() {
        let mut ctrl = Controller::new();
        let cycle = 1_000_000u64;
        let shift = 0u64;

        // Reference clock drifts ahead by a constant amount each cycle; |delta| must not grow.
        let mut ref_time: u64 = 100_000;
        let mut prev_abs_delta = i64::MAX;

        for _ in 0..50 {
            let correction = ctrl.step(ref_time, shift, cycle);
            let abs_delta = correction.delta_ns.abs();
            assert!(abs_delta <= prev_abs_delta.max(1), "|delta| must not grow cycle over cycle");
            prev_abs_delta = abs_delta;
            // Next cycle's sample reflects the (small) correction having been applied.
            ref_time = ref_time.wrapping_add(1000).wrapping_add(correction.offset_ns as u64);
        }
    }

    #[test]
    fn delta_wraps_into_symmetric_range() {
        let mut ctrl = Controller::new();

        // dc_ref_time - shift = 900_000, cycle = 1_000_000 -> raw mod = 900_000 > cycle/2
        // so delta folds to 900_000 - 1_000_000 = -100_000.
        let correction = ctrl.step(900_000, 0, 1_000_000);

        assert_eq!(correction.delta_ns, -100_000);
    }
}
