//! Net-device façade (§4.A): the boundary between the master and a physical (or virtual) link.
//!
//! A [`Netdev`] owns nothing about the frame's contents — it hands out a TX buffer, transmits
//! whatever was written into it, and forwards received frames upward via [`NetdevDriver`]. The
//! low-level send/receive/link-poll operations are supplied by a driver implementing
//! [`NetdevDriver`]; this crate ships no driver of its own; a raw-socket or smoltcp-backed one is
//! an external collaborator, keeping the physical transport behind a trait boundary rather than
//! hard-wiring a socket type into the scheduler.

use crate::frame::ETHERNET_MTU;

/// Number of low-pass-filtered rate intervals tracked per statistic (§4.A: 1 s / 10 s / 60 s).
pub const RATE_COUNT: usize = 3;
const RATE_INTERVALS_S: [i64; RATE_COUNT] = [1, 10, 60];

/// One second in nanoseconds — the statistics update cadence.
const STATS_INTERVAL_NS: u64 = 1_000_000_000;

/// Driver-level operations a net-device needs from its physical transport.
///
/// Implementations must be non-blocking: `transmit` queues (or performs) a single send and
/// returns; `poll_link` samples the current link state without waiting on PHY negotiation.
pub trait NetdevDriver {
    /// Transmit `frame` (already padded/terminated). Returns `false` on a transmit error, which
    /// the caller folds into `tx_errors`.
    fn transmit(&mut self, frame: &[u8]) -> bool;

    /// Sample the current physical link state.
    fn poll_link(&mut self) -> bool;
}

/// Rolling statistics for one net-device, updated at most once per second (§4.A).
///
/// Each rate is a first-order low-pass filter over its interval's per-second delta:
/// `y += (x - y) / tau`. `loss` is `tx_count - rx_count` over the same window; the "subtract 1
/// for the unanswered probe frame" cosmetic adjustment belongs to the display layer, not here.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub tx_count: u64,
    pub rx_count: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_errors: u64,
    pub unmatched: u64,
    pub timeouts: u64,
    pub corrupted: u64,

    last_tx_count: u64,
    last_rx_count: u64,
    last_tx_bytes: u64,
    last_rx_bytes: u64,
    last_loss: i64,
    last_update_ns: u64,

    pub tx_frame_rates: [i64; RATE_COUNT],
    pub rx_frame_rates: [i64; RATE_COUNT],
    pub tx_byte_rates: [i64; RATE_COUNT],
    pub rx_byte_rates: [i64; RATE_COUNT],
    pub loss_rates: [i64; RATE_COUNT],
}

impl Stats {
    /// Total frames sent minus frames received, over the lifetime of this net-device.
    pub fn loss(&self) -> i64 {
        self.tx_count as i64 - self.rx_count as i64
    }

    /// Apply the once-per-second low-pass update if at least one second has elapsed since the
    /// last one. `now_ns` is a monotonic timestamp.
    fn maybe_update(&mut self, now_ns: u64) {
        if now_ns.saturating_sub(self.last_update_ns) < STATS_INTERVAL_NS {
            return;
        }

        let tx_frame_rate = (self.tx_count - self.last_tx_count) as i64 * 1000;
        let rx_frame_rate = (self.rx_count - self.last_rx_count) as i64 * 1000;
        let tx_byte_rate = (self.tx_bytes - self.last_tx_bytes) as i64;
        let rx_byte_rate = (self.rx_bytes - self.last_rx_bytes) as i64;
        let loss = self.loss();
        let loss_rate = (loss - self.last_loss) * 1000;

        for (i, &tau) in RATE_INTERVALS_S.iter().enumerate() {
            self.tx_frame_rates[i] += (tx_frame_rate - self.tx_frame_rates[i]) / tau;
            self.rx_frame_rates[i] += (rx_frame_rate - self.rx_frame_rates[i]) / tau;
            self.tx_byte_rates[i] += (tx_byte_rate - self.tx_byte_rates[i]) / tau;
            self.rx_byte_rates[i] += (rx_byte_rate - self.rx_byte_rates[i]) / tau;
            self.loss_rates[i] += (loss_rate - self.loss_rates[i]) / tau;
        }

        self.last_tx_count = self.tx_count;
        self.last_rx_count = self.rx_count;
        self.last_tx_bytes = self.tx_bytes;
        self.last_rx_bytes = self.rx_bytes;
        self.last_loss = loss;
        self.last_update_ns = now_ns;
    }
}

/// A link-state edge detector: only reports `Up`/`Down` on change, so callers that only care
/// about transitions don't have to re-derive them from a raw boolean every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEdge {
    /// No change since the last poll.
    Unchanged,
    /// The link transitioned from down to up.
    Up,
    /// The link transitioned from up to down.
    Down,
}

/// One physical (or virtual) link: a TX buffer, link-state flag, and rolling statistics.
pub struct Netdev<D> {
    driver: D,
    tx_buf: [u8; ETHERNET_MTU],
    link_up: bool,
    pub stats: Stats,
}

impl<D: NetdevDriver> Netdev<D> {
    /// Wrap `driver` in a net-device façade, starting with the link assumed down.
    pub fn new(driver: D) -> Self {
        Self { driver, tx_buf: [0u8; ETHERNET_MTU], link_up: false, stats: Stats::default() }
    }

    /// A writable region sized for one max-MTU frame. The caller (the frame packer) writes the
    /// EtherCAT frame header and datagrams starting at offset 0.
    pub fn get_tx_buffer(&mut self) -> &mut [u8] {
        &mut self.tx_buf
    }

    /// Transmit the first `size` bytes of the TX buffer, updating `tx_count`/`tx_bytes` or
    /// `tx_errors`.
    pub fn send(&mut self, size: usize) {
        let frame = &self.tx_buf[..size];
        if self.driver.transmit(frame) {
            self.stats.tx_count += 1;
            self.stats.tx_bytes += size as u64;
        } else {
            self.stats.tx_errors += 1;
        }
    }

    /// Record a received frame's statistics. The frame's bytes themselves are handed to the RX
    /// demultiplexer by the caller; this only updates counters.
    pub fn note_received(&mut self, size: usize) {
        self.stats.rx_count += 1;
        self.stats.rx_bytes += size as u64;
    }

    /// Sample the driver's link state, returning the edge (if any) since the last poll.
    pub fn poll_link(&mut self) -> LinkEdge {
        let up = self.driver.poll_link();
        let edge = match (self.link_up, up) {
            (false, true) => LinkEdge::Up,
            (true, false) => LinkEdge::Down,
            _ => LinkEdge::Unchanged,
        };
        self.link_up = up;
        edge
    }

    /// Whether the link is currently up.
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Borrow the underlying driver, e.g. to read transport-specific diagnostics.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutably borrow the underlying driver, e.g. to reconfigure it.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Apply the once-per-second statistics low-pass update.
    pub fn update_stats(&mut self, now_ns: u64) {
        self.stats.maybe_update(now_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDriver {
        transmit_ok: bool,
        link: bool,
    }

    impl NetdevDriver for FakeDriver {
        fn transmit(&mut self, _frame: &[u8]) -> bool {
            self.transmit_ok
        }

        fn poll_link(&mut self) -> bool {
            self.link
        }
    }

    #[test]
    fn send_updates_tx_counters_on_success() {
        let mut dev = Netdev::new(FakeDriver { transmit_ok: true, link: true });
        dev.get_tx_buffer()[0] = 0xAB;
        dev.send(60);

        assert_eq!(dev.stats.tx_count, 1);
        assert_eq!(dev.stats.tx_bytes, 60);
        assert_eq!(dev.stats.tx_errors, 0);
    }

    #[test]
    fn send_failure_increments_errors_not_count() {
        let mut dev = Netdev::new(FakeDriver { transmit_ok: false, link: true });
        dev.send(60);

        assert_eq!(dev.stats.tx_count, 0);
        assert_eq!(dev.stats.tx_errors, 1);
    }

    #[test]
    fn link_edge_reported_only_on_change() {
        let mut dev = Netdev::new(FakeDriver { transmit_ok: true, link: false });

        assert_eq!(dev.poll_link(), LinkEdge::Unchanged);

        dev.driver.link = true;
        assert_eq!(dev.poll_link(), LinkEdge::Up);
        assert_eq!(dev.poll_link(), LinkEdge::Unchanged);

        dev.driver.link = false;
        assert_eq!(dev.poll_link(), LinkEdge::Down);
    }

    #[test]
    fn loss_is_tx_minus_rx() {
        let mut dev = Netdev::new(FakeDriver { transmit_ok: true, link: true });
        dev.send(60);
        dev.send(60);
        dev.note_received(60);

        assert_eq!(dev.stats.loss(), 1);
    }

    #[test]
    fn stats_update_is_rate_limited_to_once_per_second() {
        let mut dev = Netdev::new(FakeDriver { transmit_ok: true, link: true });
        dev.send(60);
        dev.update_stats(0);
        assert_eq!(dev.stats.tx_frame_rates[0], 0);

        dev.update_stats(500_000_000);
        assert_eq!(dev.stats.tx_frame_rates[0], 0, "under a second, filter must not move yet");

        dev.update_stats(1_000_000_000);
        assert_eq!(dev.stats.tx_frame_rates[0], 1000, "one frame/second delta, tau=1 applies it fully");
    }
}
