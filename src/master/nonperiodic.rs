//! The non-periodic task's loop body (§4.E): wait on a semaphore with timeout, flush queued
//! mailbox/scan datagrams via `send()`, and cooperatively suspend while the periodic task owns
//! the NIC in `Operation` phase.
//!
//! Unlike `send`/`receive`/`periodic_tick`, this *does* depend on [`crate::os`] — it is the one
//! place a real deployment's thread actually lives, sharing the `Master` with the periodic task
//! behind a `Mutex` — a safe, `std`-host realization of a short, hot critical section, in place
//! of a bare-metal target's raw interrupt-masking one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::Master;
use crate::netdev::NetdevDriver;
use crate::os::{Clock, Semaphore, SuspendFlag};

/// Runs the non-periodic task loop until `running` is cleared. Intended as the body passed to
/// [`crate::os::Os::spawn`].
///
/// On each wake it takes the lock (the critical section), flushes the queue via `send()`, and
/// releases it before checking whether a suspend has been requested.
pub fn nonperiodic_loop<
    D,
    S,
    C,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: Arc<Mutex<Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>>>,
    semaphore: Arc<S>,
    clock: Arc<C>,
    timeout_ms: u32,
    running: Arc<AtomicBool>,
    suspend: SuspendFlag,
) where
    D: NetdevDriver,
    S: Semaphore,
    C: Clock,
{
    while running.load(Ordering::Acquire) {
        semaphore.wait_timeout(timeout_ms);

        {
            // Capacity of `master`'s own datagram arena bounds this call's cost; the lock is
            // held only for the duration of one `send()`, keeping this a short, hot critical
            // section.
            let mut guard = unwrap!(master.lock().map_err(|_| ()));
            let now_ns = clock.now_ns();
            guard.send(now_ns);
        }

        suspend.checkpoint();
    }
}
