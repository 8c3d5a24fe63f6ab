//! Runtime-tunable master configuration (§6, Module J). Compile-time bounds (slave/netdev/PDO
//! capacity) are const generics on [`crate::master::Master`] itself; only the values that can
//! change without a rebuild live here.

/// Default non-periodic task wake interval (`CONFIG_EC_NONPERIOD_INTERVAL_MS`'s default).
pub const DEFAULT_NONPERIOD_INTERVAL_MS: u32 = 10;

/// Default scan task poll interval.
pub const DEFAULT_SCAN_INTERVAL_MS: u32 = 1000;

/// Datagram reply timeout (§4.C, §8 property 4): fixed, not configurable, since it is part of
/// the scheduler's correctness contract rather than a deployment tuning knob.
pub const DATAGRAM_TIMEOUT_NS: u64 = 50_000_000;

/// How a multi-slave PDO exchange is laid out in the logical arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PdoDomainMode {
    /// One LRW datagram covers every slave's process data in a single frame region.
    Single,
    /// One LRW datagram per slave — costs more datagram overhead but isolates a single slave's
    /// working-counter mismatch from the rest of the segment.
    PerSlave,
}

/// Runtime inputs to [`crate::master::Master::new`] (§6: "Runtime inputs").
#[derive(Debug, Clone, Copy)]
pub struct MasterConfig {
    /// Periodic task cycle time in nanoseconds (e.g. 1_000_000 for 1 ms).
    pub cycle_time_ns: u64,
    /// DC phase offset from the cycle boundary.
    pub shift_time_ns: u64,
    /// Whether the master steers itself to the reference clock (`true`, Mode A) or drives the
    /// reference slave's own PI loop (`false`, Mode B).
    pub dc_sync_with_dc_ref_enable: bool,
    /// Non-periodic task wake interval in milliseconds.
    pub nonperiod_interval_ms: u32,
    /// Scan task poll interval in milliseconds.
    pub scan_interval_ms: u32,
    /// Single global LRW vs. per-slave LRW for cyclic PDO exchange.
    pub pdo_domain_mode: PdoDomainMode,
}

impl MasterConfig {
    /// A configuration with a 1 ms cycle, zero shift, master-steers-itself DC, and the default
    /// values above for the non-real-time intervals.
    pub const fn new(cycle_time_ns: u64) -> Self {
        Self {
            cycle_time_ns,
            shift_time_ns: 0,
            dc_sync_with_dc_ref_enable: true,
            nonperiod_interval_ms: DEFAULT_NONPERIOD_INTERVAL_MS,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            pdo_domain_mode: PdoDomainMode::Single,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_master_steers_itself_and_single_domain() {
        let cfg = MasterConfig::new(1_000_000);

        assert!(cfg.dc_sync_with_dc_ref_enable);
        assert_eq!(cfg.pdo_domain_mode, PdoDomainMode::Single);
        assert_eq!(cfg.nonperiod_interval_ms, DEFAULT_NONPERIOD_INTERVAL_MS);
    }
}
