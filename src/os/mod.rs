//! OS abstraction seam (§5, §6): every concurrency primitive the master needs — critical
//! section, semaphore-with-timeout, cooperative thread suspend/resume, and a monotonic clock —
//! goes through a trait here rather than a hard dependency on `std::thread`.
//!
//! The periodic task must be a wait-free, timer-driven loop that never yields to an executor, so
//! this seam is a blocking/threaded model rather than `async`/executor-based. See `DESIGN.md`.

#[cfg(feature = "std")]
mod std_impl;

#[cfg(feature = "std")]
pub use std_impl::StdOs;
#[cfg(feature = "std")]
pub use std_impl::SuspendFlag;

/// A monotonic nanosecond clock. Implementations must never go backwards.
pub trait Clock {
    /// Current time in nanoseconds since an arbitrary, fixed epoch.
    fn now_ns(&self) -> u64;
}

/// A counting semaphore with a bounded wait, used by the non-periodic task to sleep between
/// mailbox/scan flushes (§4.E) without busy-polling.
pub trait Semaphore {
    /// Increment the count, waking one waiter if any is blocked in [`Semaphore::wait_timeout`].
    fn signal(&self);

    /// Block until signaled or `timeout_ms` elapses. Returns whether it was signaled.
    fn wait_timeout(&self, timeout_ms: u32) -> bool;
}

/// A short, non-blocking mutual-exclusion region for the hot datagram-queue path (§5: "short
/// critical section").
///
/// Modeled on an `enter_critical_section`/`leave_critical_section` pairing: callers pass a
/// closure rather than holding a guard across a suspension point, which is impossible to misuse
/// by accidentally blocking inside the section.
pub trait CriticalSection {
    /// Run `f` with exclusive access, returning its result.
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// A long-lived mutex for structural rebuilds (`scan_lock`, §5) — may be held across blocking
/// operations, unlike [`CriticalSection`].
pub trait ScanLock {
    /// Block until the lock is free, run `f` while holding it, then release.
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// A one-shot or periodic hardware timer with microsecond re-arm granularity (§6).
pub trait HwTimer {
    /// Arm the timer to fire once after `period_us` microseconds.
    fn start(&self, period_us: u32);

    /// Re-arm the already-running timer with a new period, effective next expiry.
    fn update(&self, period_us: u32);

    /// Disarm the timer.
    fn stop(&self);

    /// Block the calling task until the timer next fires. The periodic task's only suspension
    /// point (§5: "the periodic task never blocks: it must be wait-free except for the critical
    /// section" — waiting on its own driving timer is what makes it periodic in the first
    /// place, not an extra blocking point).
    fn wait_next_tick(&self);
}

/// A cooperatively suspendable worker thread.
///
/// Real OSes can force-suspend a thread; std cannot safely do that, so suspension here is
/// cooperative: [`ThreadHandle::suspend`] requests a pause and blocks until the thread reaches
/// its next suspend-point check, mirroring how the non-periodic task yields the NIC to the
/// periodic one on entering `OPERATION` (§4.E).
pub trait ThreadHandle {
    /// Request the thread suspend at its next check-point, blocking until it has.
    fn suspend(&self);

    /// Release a previously suspended thread.
    fn resume(&self);

    /// Block until the thread function returns.
    fn join(self);
}

/// Spawns the periodic, non-periodic and scan tasks (§5).
///
/// `std`-only: spawning a cooperative OS thread needs an allocator and a join handle, which
/// `no_std` targets provide through their own executor rather than this trait. A `no_std` port
/// wires the per-primitive traits above (`Clock`/`Semaphore`/`CriticalSection`/`ScanLock`/
/// `HwTimer`) into its own task loop directly instead of going through `Os::spawn`.
#[cfg(feature = "std")]
pub trait Os {
    type Semaphore: Semaphore;
    type CriticalSection: CriticalSection;
    type ScanLock: ScanLock;
    type HwTimer: HwTimer;
    type Thread: ThreadHandle;
    type Clock: Clock;

    fn clock(&self) -> &Self::Clock;

    fn new_semaphore(&self) -> Self::Semaphore;
    fn new_critical_section(&self) -> Self::CriticalSection;
    fn new_scan_lock(&self) -> Self::ScanLock;
    fn new_hw_timer(&self) -> Self::HwTimer;

    /// Spawn a cooperative worker running `body`. `body` must periodically check
    /// [`SuspendFlag::checkpoint`] to honor [`ThreadHandle::suspend`].
    fn spawn(&self, name: &'static str, body: impl FnOnce(SuspendFlag) + Send + 'static) -> Self::Thread;

    /// Sleep the calling task for `ms` milliseconds — used by the scan task's poll interval.
    fn msleep(&self, ms: u32);
}
