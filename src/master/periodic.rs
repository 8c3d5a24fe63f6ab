//! The periodic task's cycle body (§4.E steps 1–7): DC discipline, enqueueing this cycle's DC
//! sync and PDO datagrams, `send()`, and performance-counter bookkeeping.
//!
//! [`periodic_tick`] is the same kind of pure, `Os`-free function as `Master::send`/`receive` —
//! it takes `now_ns` as a parameter and returns the timer correction (if any) for the caller to
//! apply, rather than reaching for a clock or a `HwTimer` itself. The actual timer-driven thread
//! loop that calls this every `cycle_time_ns` lives in [`super::nonperiodic`]'s sibling (the
//! periodic task is spawned by the same `Os::spawn` machinery, wired up by the embedding
//! application, since the periodic task's priority/affinity is a deployment concern this crate
//! does not own).

use super::{DcState, Master, Phase};
use crate::config::PdoDomainMode;
use crate::datagram::{Datagram, State};
use crate::dc::Mode;
use crate::netdev::NetdevDriver;
use crate::slave::DcRange;

/// ESC System Time register (ETG.1000.4 §6.2): where the DC sync read/write datagrams target.
const DC_SYSTEM_TIME_REGISTER: u16 = 0x0910;

/// Run one periodic cycle. Returns the nanosecond timer-period correction computed by the DC
/// controller, if DC steering is active and a prior cycle's sync read has come back — the caller
/// (a real periodic task) folds this into its next `HwTimer::update` call.
pub fn periodic_tick<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: &mut Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>,
    now_ns: u64,
) -> Option<i64>
where
    D: NetdevDriver,
{
    if master.phase != Phase::Operation {
        return None;
    }

    let t0 = now_ns;
    let offset_ns = apply_dc_discipline(master, now_ns);

    enqueue_dc_read(master);
    enqueue_pdo_datagrams(master);

    master.send(now_ns);

    update_perf_counters(&mut master.perf, t0, offset_ns);

    offset_ns
}

fn apply_dc_discipline<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: &mut Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>,
    now_ns: u64,
) -> Option<i64>
where
    D: NetdevDriver,
{
    let mut offset_ns = None;
    let dc_range = ref_slave_dc_range(master);

    if let Some(slot) = master.dc_read_slot.take() {
        if let Some(dg) = master.datagram(slot) {
            if dg.state() == State::Received {
                if let Some(dc_ref_time) = dg.owned_data().map(|data| decode_dc_time(data, dc_range)) {
                    offset_ns = step_dc_controller(&mut master.dc, dc_ref_time, master.config.shift_time_ns, master.config.cycle_time_ns);
                }
            }
        }
        master.free(slot);
    }

    if master.dc.mode == Mode::MasterDrivesReference {
        match dc_range {
            DcRange::Bits32 => {
                let payload = crate::dc::system_time_payload_32(now_ns);
                master.enqueue(Datagram::bwr(DC_SYSTEM_TIME_REGISTER, &payload, 0));
            }
            DcRange::Bits64 => {
                let payload = crate::dc::system_time_payload_64(now_ns);
                master.enqueue(Datagram::bwr(DC_SYSTEM_TIME_REGISTER, &payload, 0));
            }
        }
    }

    offset_ns
}

/// The DC reference slave's system-time register width, defaulting to 32-bit when there is no
/// elected reference slave yet (matches [`crate::slave::Slave::new`]'s own default).
fn ref_slave_dc_range<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: &Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>,
) -> DcRange
where
    D: NetdevDriver,
{
    master.dc.ref_slave.and_then(|idx| master.slave(idx)).map(|s| s.base_dc_range).unwrap_or(DcRange::Bits32)
}

fn step_dc_controller(dc: &mut DcState, dc_ref_time_ns: u64, shift_time_ns: u64, cycle_time_ns: u64) -> Option<i64> {
    match dc.mode {
        Mode::MasterSteersItself => {
            let correction = dc.controller.step(dc_ref_time_ns, shift_time_ns, cycle_time_ns);
            Some(correction.offset_ns)
        }
        Mode::MasterDrivesReference => None,
    }
}

fn decode_dc_time(payload: &[u8], dc_range: DcRange) -> u64 {
    match dc_range {
        DcRange::Bits64 if payload.len() >= 8 => {
            u64::from_le_bytes([payload[0], payload[1], payload[2], payload[3], payload[4], payload[5], payload[6], payload[7]])
        }
        _ if payload.len() >= 4 => u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as u64,
        _ => 0,
    }
}

fn enqueue_dc_read<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: &mut Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>,
) where
    D: NetdevDriver,
{
    let len = match ref_slave_dc_range(master) {
        DcRange::Bits32 => 4,
        DcRange::Bits64 => 8,
    };
    let dg = Datagram::brd(DC_SYSTEM_TIME_REGISTER, len, 0);
    master.dc_read_slot = master.enqueue(dg);
}

fn enqueue_pdo_datagrams<
    D,
    const MAX_NETDEVS: usize,
    const MAX_SLAVES: usize,
    const MAX_DATAGRAMS: usize,
    const MAX_PDO_BUFSIZE: usize,
>(
    master: &mut Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>,
) where
    D: NetdevDriver,
{
    for slot in core::mem::take(&mut master.pdo_slots) {
        master.free(slot);
    }

    match master.config.pdo_domain_mode {
        PdoDomainMode::Single => {
            let len = master.actual_pdo_size;
            if let Some(slot) = master.enqueue(Datagram::lrw(0, 0, len, 0)) {
                // Capacity is `MAX_SLAVES`, always >= 1 for single-domain mode.
                unwrap!(master.pdo_slots.push(slot).map_err(|_| ()));
            }
        }
        PdoDomainMode::PerSlave => {
            for i in 0..master.slave_count() {
                let Some(slave) = master.slave(i) else { continue };
                let start = slave.logical_start_address;
                let len = usize::from(slave.pdo_size());
                if len == 0 {
                    continue;
                }
                if let Some(slot) = master.enqueue(Datagram::lrw(start, start as usize, len, 0)) {
                    unwrap!(master.pdo_slots.push(slot).map_err(|_| ()));
                }
            }
        }
    }
}

fn update_perf_counters(perf: &mut super::PerfCounters, t0: u64, offset_ns: Option<i64>) {
    if perf.last_tick_ns != 0 {
        let period = t0.saturating_sub(perf.last_tick_ns);
        if perf.min_period_ns == 0 || period < perf.min_period_ns {
            perf.min_period_ns = period;
        }
        if period > perf.max_period_ns {
            perf.max_period_ns = period;
        }
        perf.avg_period_ns = if perf.avg_period_ns == 0 { period } else { (perf.avg_period_ns + period) / 2 };
    }
    perf.last_tick_ns = t0;
    if let Some(offset_ns) = offset_ns {
        perf.dc_offset_ns = offset_ns;
    }
}
