//! The master aggregate (§3, §4.E): net-devices, the pending-datagram arena and queue, slave
//! table, PDO arena, DC state and performance counters, plus the phase state machine that gates
//! periodic PDO exchange.
//!
//! The hot algorithms — [`Master::send`] (packing) and [`Master::receive`] (RX demux) — are pure
//! given a monotonic timestamp and, for `receive`, a frame slice: they take no dependency on the
//! [`crate::os`] traits, which keeps them unit-testable without a thread or a clock. The actual
//! periodic/non-periodic task loops that drive them in a real deployment live in
//! [`periodic`]/[`nonperiodic`] and *do* depend on `Os`.

#[cfg(feature = "std")]
mod nonperiodic;
mod periodic;
mod receive;
mod send;

#[cfg(feature = "std")]
pub use nonperiodic::nonperiodic_loop;
pub use periodic::periodic_tick;

use crate::config::MasterConfig;
use crate::dc;
use crate::datagram::Datagram;
use crate::error::Error;
use crate::netdev::{Netdev, NetdevDriver};
use crate::queue::Queue;
use crate::slave::Slave;

/// Minimum cycle time, in nanoseconds (§4.E contract: "40 µs floor").
pub const MIN_CYCLE_TIME_NS: u64 = 40_000;

/// Upper bound on how long [`Master::stop`] will spin waiting for slaves/links to settle,
/// in milliseconds. `ec_master_stop` spins unboundedly; this core bounds it instead.
pub const STOP_WAIT_TIMEOUT_MS: u32 = 5_000;

/// Poll interval used by [`Master::stop`]'s spin-wait, matching `ec_master_stop`'s own
/// `ec_osal_msleep(10)`.
const STOP_POLL_INTERVAL_MS: u32 = 10;

/// The master's top-level phase (§3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Not yet started; no net-device has been brought up.
    Unknown,
    /// Started, slaves may be scanned/configured, but no cyclic PDO exchange is running.
    Idle,
    /// Cyclic PDO exchange is running; the periodic task owns the NIC exclusively.
    Operation,
}

/// Result of [`Master::queue_ext_datagram`] with `wait = true` (§4.E contract).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtDatagramOutcome {
    /// Received with a nonzero working counter.
    Ok,
    /// Received but the working counter was zero — no slave processed the command.
    WorkingCounterError,
    /// No reply within the datagram timeout.
    Timeout,
    /// The link went down before a reply arrived.
    Io,
    /// The datagram was not found in the arena (should not happen; defensive).
    Unknown,
}

/// Cycle-time and DC-offset diagnostics, read by the `perf` CLI command (§6).
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfCounters {
    pub min_period_ns: u64,
    pub max_period_ns: u64,
    pub avg_period_ns: u64,
    pub last_tick_ns: u64,
    pub send_exec_ns: u64,
    pub recv_exec_ns: u64,
    pub dc_offset_ns: i64,
}

pub(crate) struct DcState {
    pub controller: dc::Controller,
    pub mode: dc::Mode,
    pub ref_slave: Option<usize>,
}

/// The EtherCAT master. `MAX_NETDEVS`/`MAX_SLAVES`/`MAX_DATAGRAMS`/`MAX_PDO_BUFSIZE` are
/// compile-time bounds (§6, Module J), a const-generic capacity declaration the same way a
/// fixed-size frame/PDU pool would be sized. `MAX_DATAGRAMS` must fit in a `u8` slot index (≤ 256).
pub struct Master<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
> where
    D: NetdevDriver,
{
    pub(crate) netdevs: heapless::Vec<Netdev<D>, MAX_NETDEVS>,
    pub(crate) queue: Queue<MAX_DATAGRAMS>,
    pub(crate) datagrams: [Option<Datagram>; MAX_DATAGRAMS],
    pub(crate) phase: Phase,
    pub(crate) started: bool,
    pub(crate) next_index: u8,
    pub(crate) pdo_arena: heapless::Vec<u8, MAX_PDO_BUFSIZE>,
    pub(crate) actual_pdo_size: usize,
    pub(crate) slaves: [Option<Slave>; MAX_SLAVES],
    pub(crate) slave_count: usize,
    pub(crate) expected_working_counter: u16,
    pub(crate) actual_working_counter: u16,
    pub(crate) dc: DcState,
    pub(crate) config: MasterConfig,
    pub(crate) scan_done: bool,
    pub(crate) rescan_request: bool,
    pub(crate) nonperiod_suspend: bool,
    pub(crate) perf: PerfCounters,
    /// Arena slot of the all-slaves DC sync read enqueued last cycle, read back this cycle.
    pub(crate) dc_read_slot: Option<u8>,
    /// Arena slots of this cycle's PDO datagram(s): one in single-domain mode, one per slave in
    /// multi-domain mode.
    pub(crate) pdo_slots: heapless::Vec<u8, MAX_SLAVES>,
}

impl<D, const MAX_NETDEVS: usize, const MAX_SLAVES: usize, const MAX_DATAGRAMS: usize, const MAX_PDO_BUFSIZE: usize>
    Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>
where
    D: NetdevDriver,
{
    /// Build a master over `netdev_drivers` (one per link, primary first). `config.cycle_time_ns`
    /// must already satisfy the 40 µs floor — `start()` asserts it again before entering
    /// `Operation`.
    pub fn new(config: MasterConfig, netdev_drivers: [D; MAX_NETDEVS]) -> Self {
        debug_assert!(MAX_DATAGRAMS <= 256, "arena slot indices are u8; MAX_DATAGRAMS must fit in 256 (§9)");

        let mut netdevs = heapless::Vec::new();
        for driver in netdev_drivers {
            // Capacity is exactly `MAX_NETDEVS`, so this can never fail.
            unwrap!(netdevs.push(Netdev::new(driver)).map_err(|_| ()));
        }

        let mode =
            if config.dc_sync_with_dc_ref_enable { dc::Mode::MasterSteersItself } else { dc::Mode::MasterDrivesReference };

        Self {
            netdevs,
            queue: Queue::new(),
            datagrams: core::array::from_fn(|_| None),
            phase: Phase::Unknown,
            started: false,
            next_index: 0,
            pdo_arena: heapless::Vec::new(),
            actual_pdo_size: 0,
            slaves: core::array::from_fn(|_| None),
            slave_count: 0,
            expected_working_counter: 0,
            actual_working_counter: 0,
            dc: DcState { controller: dc::Controller::new(), mode, ref_slave: None },
            config,
            scan_done: false,
            rescan_request: false,
            nonperiod_suspend: false,
            perf: PerfCounters::default(),
            dc_read_slot: None,
            pdo_slots: heapless::Vec::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `Σ slaves[i].expected_working_counter` (§3 invariant 3).
    pub fn expected_working_counter(&self) -> u16 {
        self.expected_working_counter
    }

    /// Working counter observed on the most recent PDO exchange.
    pub fn actual_working_counter(&self) -> u16 {
        self.actual_working_counter
    }

    /// Number of slaves currently known to the master.
    pub fn slave_count(&self) -> usize {
        self.slave_count
    }

    pub fn slave(&self, index: usize) -> Option<&Slave> {
        self.slaves.get(index).and_then(|s| s.as_ref())
    }

    pub fn slave_mut(&mut self, index: usize) -> Option<&mut Slave> {
        self.slaves.get_mut(index).and_then(|s| s.as_mut())
    }

    /// Number of configured net-devices (links).
    pub fn netdev_count(&self) -> usize {
        self.netdevs.len()
    }

    /// Current link state of `netdev_idx`, or `None` if out of range.
    pub fn netdev_link_up(&self, netdev_idx: usize) -> Option<bool> {
        self.netdevs.get(netdev_idx).map(|d| d.link_up())
    }

    /// Rolling statistics for `netdev_idx`, or `None` if out of range (§4.A, `perf`/`wc` CLI
    /// commands).
    pub fn netdev_stats(&self, netdev_idx: usize) -> Option<&crate::netdev::Stats> {
        self.netdevs.get(netdev_idx).map(|d| &d.stats)
    }

    /// Borrow `netdev_idx`'s driver directly, e.g. to read transport-specific diagnostics.
    pub fn netdev_driver(&self, netdev_idx: usize) -> Option<&D> {
        self.netdevs.get(netdev_idx).map(|d| d.driver())
    }

    /// Mutably borrow `netdev_idx`'s driver directly, e.g. to reconfigure it.
    pub fn netdev_driver_mut(&mut self, netdev_idx: usize) -> Option<&mut D> {
        self.netdevs.get_mut(netdev_idx).map(|d| d.driver_mut())
    }

    /// Cycle-time and DC diagnostics accumulated by the periodic task (`perf` CLI command).
    pub fn perf(&self) -> PerfCounters {
        self.perf
    }

    /// Record this cycle's measured send-path execution time (§4.E step 7: "send-exec = now -
    /// t0"). [`periodic::periodic_tick`] is a pure, clock-free function, so it cannot measure
    /// its own wall-clock cost; a real deployment's periodic task times the call and feeds the
    /// result back here before the next tick.
    pub fn record_send_exec_ns(&mut self, ns: u64) {
        self.perf.send_exec_ns = ns;
    }

    /// The DC PI controller's current integral accumulator (`perf -d`-style dumps).
    pub fn dc_integral(&self) -> i64 {
        self.dc.controller.integral()
    }

    /// Replace the slave table, e.g. from a [`crate::collab::Scanner`] result, recomputing the
    /// PDO arena layout (§3 invariant 2) and `expected_working_counter` (invariant 3).
    pub fn set_slaves(&mut self, slaves: [Option<Slave>; MAX_SLAVES], count: usize, dc_ref_slave: Option<usize>) {
        self.slaves = slaves;
        self.slave_count = count;
        self.dc.ref_slave = dc_ref_slave;
        self.recompute_pdo_layout();
        self.scan_done = true;
        self.rescan_request = false;
    }

    /// Request a rescan on the next scan-task poll.
    pub fn request_rescan(&mut self) {
        self.rescan_request = true;
    }

    pub fn rescan_requested(&self) -> bool {
        self.rescan_request
    }

    fn recompute_pdo_layout(&mut self) {
        let mut offset: u32 = 0;
        let mut expected_wc: u16 = 0;

        for slot in self.slaves.iter_mut().take(self.slave_count) {
            if let Some(slave) = slot {
                slave.logical_start_address = offset;
                offset += u32::from(slave.odata_size) + u32::from(slave.idata_size);
                expected_wc += slave.expected_working_counter;
            }
        }

        self.actual_pdo_size = offset as usize;
        self.expected_working_counter = expected_wc;

        self.pdo_arena.clear();
        for _ in 0..self.actual_pdo_size.min(MAX_PDO_BUFSIZE) {
            // Capacity is `MAX_PDO_BUFSIZE`; `actual_pdo_size` is clamped to it above.
            unwrap!(self.pdo_arena.push(0).map_err(|_| ()));
        }
    }

    /// `IDLE → OPERATION` (§4.E). Fails (and leaves phase unchanged) if the structural
    /// invariants required to enter cyclic exchange are not met: the 40 µs cycle-time floor, a
    /// completed scan, and `shift_time_ns <= cycle_time_ns`.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.config.cycle_time_ns < MIN_CYCLE_TIME_NS {
            crate::fmt::error!("cycle_time_ns {} below the 40 us floor", self.config.cycle_time_ns);
            return Err(Error::InvalidArgument);
        }
        if self.config.shift_time_ns > self.config.cycle_time_ns {
            crate::fmt::error!("shift_time_ns exceeds cycle_time_ns");
            return Err(Error::InvalidArgument);
        }
        if !self.scan_done {
            crate::fmt::error!("start() called before a scan completed");
            return Err(Error::NotSupported);
        }

        for slot in self.slaves.iter_mut().take(self.slave_count) {
            if let Some(slave) = slot {
                slave.requested_state = crate::slave::AlState::Op;
            }
        }

        self.nonperiod_suspend = true;
        self.started = true;
        self.phase = Phase::Operation;
        crate::fmt::debug!("master entered Operation, {} slaves", self.slave_count);
        Ok(())
    }

    /// `OPERATION → IDLE` (§4.E). Requests `PreOp` on every slave, then spins — sleeping
    /// `STOP_POLL_INTERVAL_MS` between checks via the caller-supplied `sleep_ms` — until every
    /// link is either down or every slave's `current_state` has settled to `PreOp`, mirroring
    /// `ec_master_stop`'s own `while(1) { ... ec_osal_msleep(10); }` loop (`examples/
    /// original_source/src/ec_master.c:598-609`). That original loop is unbounded; this one is
    /// capped at `STOP_WAIT_TIMEOUT_MS` so a genuinely stuck slave cannot block the calling
    /// (non-periodic/control) context forever. Clears the PDO datagrams' arena content so a stale
    /// frame can never be replayed, whether or not the spin converged before timing out.
    pub fn stop(&mut self, mut sleep_ms: impl FnMut(u32)) {
        for slot in self.slaves.iter_mut().take(self.slave_count) {
            if let Some(slave) = slot {
                slave.requested_state = crate::slave::AlState::PreOp;
            }
        }

        let mut waited_ms: u32 = 0;
        while !self.stop_settled() && waited_ms < STOP_WAIT_TIMEOUT_MS {
            sleep_ms(STOP_POLL_INTERVAL_MS);
            waited_ms += STOP_POLL_INTERVAL_MS;
        }

        for byte in self.pdo_arena.iter_mut() {
            *byte = 0;
        }

        self.phase = Phase::Idle;
        self.nonperiod_suspend = false;
    }

    /// Whether every net-device has either gone down or reports every slave settled at `PreOp`.
    fn stop_settled(&self) -> bool {
        self.netdevs.iter().all(|netdev| {
            !netdev.link_up()
                || self.slaves.iter().take(self.slave_count).flatten().all(|s| s.current_state == crate::slave::AlState::PreOp)
        })
    }

    /// Allocate an arena slot for `datagram`, returning its index, or `None` if the arena is
    /// full. The slot is not queued yet — call [`Master::enqueue`] next.
    fn alloc_slot(&mut self, datagram: Datagram) -> Option<u8> {
        for (i, slot) in self.datagrams.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(datagram);
                return Some(i as u8);
            }
        }
        None
    }

    /// Enqueue a freshly built datagram, returning its arena slot. Internal datagrams (DC sync,
    /// PDO) use this directly; [`Master::queue_ext_datagram`] is the external-collaborator
    /// entry point.
    pub(crate) fn enqueue(&mut self, datagram: Datagram) -> Option<u8> {
        let slot = self.alloc_slot(datagram)?;
        if let Some(dg) = self.datagrams[slot as usize].as_mut() {
            dg.set_state(crate::datagram::State::Queued);
        }
        self.queue.push_back(slot);
        Some(slot)
    }

    /// Borrow a queued/sent/completed datagram by its arena slot.
    pub fn datagram(&self, slot: u8) -> Option<&Datagram> {
        self.datagrams[slot as usize].as_ref()
    }

    /// Release a completed datagram's arena slot back to the pool. Callers own this: the core
    /// never frees a slot on its own, since a mailbox operation may need to inspect a `Received`
    /// datagram after `send()`/`receive()` return.
    pub fn free(&mut self, slot: u8) {
        self.queue.remove(slot);
        self.datagrams[slot as usize] = None;
    }

    /// External-collaborator entry point for `ec_master_queue_ext_datagram` (§4.E contract).
    /// Must not be called from the periodic task. The original wakes a blocked waiter through a
    /// semaphore tied to the datagram; this core has no `Os` dependency of its own, so it instead
    /// only enqueues — completion is observed by polling [`Master::ext_datagram_outcome`], which
    /// is how `ectool`'s `exchange()` drives every external datagram to completion. See
    /// `DESIGN.md` for why the wake/wait semaphore plumbing was dropped rather than reimplemented.
    pub fn queue_ext_datagram(&mut self, datagram: Datagram) -> Option<u8> {
        self.enqueue(datagram)
    }

    /// Resolve a completed datagram's outcome, per the contract's four-way result.
    pub fn ext_datagram_outcome(&self, slot: u8) -> ExtDatagramOutcome {
        match self.datagrams[slot as usize].as_ref() {
            None => ExtDatagramOutcome::Unknown,
            Some(dg) => match dg.state() {
                crate::datagram::State::Received if dg.working_counter() > 0 => ExtDatagramOutcome::Ok,
                crate::datagram::State::Received => ExtDatagramOutcome::WorkingCounterError,
                crate::datagram::State::TimedOut => ExtDatagramOutcome::Timeout,
                crate::datagram::State::Error => ExtDatagramOutcome::Io,
                crate::datagram::State::Init | crate::datagram::State::Queued | crate::datagram::State::Sent => {
                    ExtDatagramOutcome::Unknown
                }
            },
        }
    }
}
