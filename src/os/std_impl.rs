//! The one concrete [`super::Os`] implementation this crate ships: `std::thread` workers,
//! `Mutex`/`Condvar`-backed semaphore and critical section, and a `std::time::Instant` clock.
//! Sleep-based re-arm stands in for a hardware timer, which is the right trade-off for a
//! host-side reference implementation; a microcontroller port would swap in a real `HwTimer`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{Clock, CriticalSection, HwTimer, Os, ScanLock, Semaphore, ThreadHandle};

/// Monotonic clock anchored at construction time.
pub struct StdClock {
    epoch: Instant,
}

impl Clock for StdClock {
    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// `Mutex` + `Condvar` counting semaphore.
pub struct StdSemaphore {
    count: Mutex<u32>,
    cvar: Condvar,
}

impl StdSemaphore {
    fn new() -> Self {
        Self { count: Mutex::new(0), cvar: Condvar::new() }
    }
}

impl Semaphore for StdSemaphore {
    fn signal(&self) {
        *unwrap!(self.count.lock().map_err(|_| ())) += 1;
        self.cvar.notify_one();
    }

    fn wait_timeout(&self, timeout_ms: u32) -> bool {
        let count = unwrap!(self.count.lock().map_err(|_| ()));
        let (mut count, result) = unwrap!(self
            .cvar
            .wait_timeout_while(count, Duration::from_millis(u64::from(timeout_ms)), |c| *c == 0)
            .map_err(|_| ()));

        if result.timed_out() {
            false
        } else {
            *count -= 1;
            true
        }
    }
}

/// A `Mutex<()>`-backed short critical section — uncontended in practice since the periodic,
/// non-periodic and RX contexts only ever hold it briefly.
pub struct StdCriticalSection(Mutex<()>);

impl StdCriticalSection {
    fn new() -> Self {
        Self(Mutex::new(()))
    }
}

impl CriticalSection for StdCriticalSection {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = unwrap!(self.0.lock().map_err(|_| ()));
        f()
    }
}

/// The long-lived structural-rebuild lock (`scan_lock`).
pub struct StdScanLock(Mutex<()>);

impl StdScanLock {
    fn new() -> Self {
        Self(Mutex::new(()))
    }
}

impl ScanLock for StdScanLock {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = unwrap!(self.0.lock().map_err(|_| ()));
        f()
    }
}

/// Sleep-based stand-in for a hardware re-arm timer.
pub struct StdHwTimer {
    period_us: AtomicU32,
}

impl StdHwTimer {
    fn new() -> Self {
        Self { period_us: AtomicU32::new(0) }
    }
}

impl HwTimer for StdHwTimer {
    fn start(&self, period_us: u32) {
        self.period_us.store(period_us, Ordering::Relaxed);
    }

    fn update(&self, period_us: u32) {
        self.period_us.store(period_us, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.period_us.store(0, Ordering::Relaxed);
    }

    fn wait_next_tick(&self) {
        let period = self.period_us.load(Ordering::Relaxed);
        if period > 0 {
            std::thread::sleep(Duration::from_micros(u64::from(period)));
        }
    }
}

struct SuspendInner {
    paused: Mutex<bool>,
    paused_cvar: Condvar,
    parked: Mutex<bool>,
    parked_cvar: Condvar,
}

/// Handed to a spawned task body so it can honor [`ThreadHandle::suspend`]/`resume`.
///
/// Call [`SuspendFlag::checkpoint`] at a safe point in the task's loop (never mid-critical-
/// section); it parks the calling thread while suspended and returns once resumed.
#[derive(Clone)]
pub struct SuspendFlag {
    inner: Arc<SuspendInner>,
}

impl SuspendFlag {
    /// Park here if a suspend is pending; otherwise return immediately.
    pub fn checkpoint(&self) {
        let mut paused = unwrap!(self.inner.paused.lock().map_err(|_| ()));
        if *paused {
            *unwrap!(self.inner.parked.lock().map_err(|_| ())) = true;
            self.inner.parked_cvar.notify_all();

            while *paused {
                paused = unwrap!(self.inner.paused_cvar.wait(paused).map_err(|_| ()));
            }

            *unwrap!(self.inner.parked.lock().map_err(|_| ())) = false;
        }
    }
}

/// Join/suspend/resume handle for a task spawned via [`StdOs::spawn`].
pub struct StdThreadHandle {
    join_handle: Option<JoinHandle<()>>,
    inner: Arc<SuspendInner>,
}

impl ThreadHandle for StdThreadHandle {
    fn suspend(&self) {
        *unwrap!(self.inner.paused.lock().map_err(|_| ())) = true;

        let parked = unwrap!(self.inner.parked.lock().map_err(|_| ()));
        let _parked = unwrap!(self
            .inner
            .parked_cvar
            .wait_while(parked, |p| !*p)
            .map_err(|_| ()));
    }

    fn resume(&self) {
        *unwrap!(self.inner.paused.lock().map_err(|_| ())) = false;
        self.inner.paused_cvar.notify_all();
    }

    fn join(mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

/// `std`-backed [`Os`] implementation.
pub struct StdOs {
    clock: StdClock,
}

impl StdOs {
    /// Construct an `Os` whose clock is anchored at this call.
    pub fn new() -> Self {
        Self { clock: StdClock { epoch: Instant::now() } }
    }
}

impl Default for StdOs {
    fn default() -> Self {
        Self::new()
    }
}

impl Os for StdOs {
    type Semaphore = StdSemaphore;
    type CriticalSection = StdCriticalSection;
    type ScanLock = StdScanLock;
    type HwTimer = StdHwTimer;
    type Thread = StdThreadHandle;
    type Clock = StdClock;

    fn clock(&self) -> &Self::Clock {
        &self.clock
    }

    fn new_semaphore(&self) -> Self::Semaphore {
        StdSemaphore::new()
    }

    fn new_critical_section(&self) -> Self::CriticalSection {
        StdCriticalSection::new()
    }

    fn new_scan_lock(&self) -> Self::ScanLock {
        StdScanLock::new()
    }

    fn new_hw_timer(&self) -> Self::HwTimer {
        StdHwTimer::new()
    }

    fn spawn(&self, name: &'static str, body: impl FnOnce(SuspendFlag) + Send + 'static) -> Self::Thread {
        let inner = Arc::new(SuspendInner {
            paused: Mutex::new(false),
            paused_cvar: Condvar::new(),
            parked: Mutex::new(false),
            parked_cvar: Condvar::new(),
        });
        let flag = SuspendFlag { inner: inner.clone() };

        let join_handle = unwrap!(std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|_| ()));

        StdThreadHandle { join_handle: Some(join_handle), inner }
    }

    fn msleep(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_wait_times_out_without_signal() {
        let sem = StdSemaphore::new();
        assert!(!sem.wait_timeout(20));
    }

    #[test]
    fn semaphore_wait_returns_true_when_signaled() {
        let sem = Arc::new(StdSemaphore::new());
        let sem2 = sem.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            sem2.signal();
        });

        assert!(sem.wait_timeout(500));
        unwrap!(handle.join().map_err(|_| ()));
    }

    #[test]
    fn critical_section_runs_closure_and_returns_value() {
        let cs = StdCriticalSection::new();
        let result = cs.with(|| 1 + 1);
        assert_eq!(result, 2);
    }

    #[test]
    fn clock_is_monotonic_across_calls() {
        let os = StdOs::new();
        let a = os.clock().now_ns();
        std::thread::sleep(Duration::from_millis(1));
        let b = os.clock().now_ns();
        assert!(b > a);
    }
}
