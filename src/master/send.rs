//! The send path (§4.C): statistics update, timeout sweep, link-down cancellation, and the
//! per-link frame packer. `Master::send` takes an explicit `now_ns` rather than reading a clock
//! itself, so the scheduler's behavior (S1–S4, properties 1, 2, 4, 5, 6) can be driven
//! deterministically from tests without a real clock or thread.

use super::Master;
use crate::datagram::State;
use crate::frame::{DatagramFlags, FrameHeader, DATAGRAM_HEADER_LEN, ETHERNET_MIN_FRAME_LEN, ETHERNET_MTU, FRAME_HEADER_LEN, WORKING_COUNTER_LEN};
use crate::netdev::NetdevDriver;

/// Datagram reply timeout (§4.C step 2, §8 property 4).
const DATAGRAM_TIMEOUT_NS: u64 = 50_000_000;

impl<D, const MAX_NETDEVS: usize, const MAX_SLAVES: usize, const MAX_DATAGRAMS: usize, const MAX_PDO_BUFSIZE: usize>
    Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>
where
    D: NetdevDriver,
{
    /// Run one send pass: poll link state and update link statistics, sweep timeouts, cancel
    /// datagrams on down links, then pack and transmit as many frames per link as the queue
    /// demands.
    pub fn send(&mut self, now_ns: u64) {
        for netdev in self.netdevs.iter_mut() {
            netdev.poll_link();
            netdev.update_stats(now_ns);
        }

        self.sweep_timeouts(now_ns);

        for netdev_idx in 0..self.netdevs.len() as u8 {
            if self.netdevs[netdev_idx as usize].link_up() {
                while self.pack_one_frame(netdev_idx, now_ns) > 0 {}
            } else {
                self.cancel_link(netdev_idx);
            }
        }
    }

    fn sweep_timeouts(&mut self, now_ns: u64) {
        let Self { queue, datagrams, netdevs, .. } = self;

        for slot in 0..MAX_DATAGRAMS as u8 {
            let Some(dg) = datagrams[slot as usize].as_mut() else { continue };
            if dg.state() != State::Sent {
                continue;
            }
            if now_ns.saturating_sub(dg.sent_ns()) <= DATAGRAM_TIMEOUT_NS {
                continue;
            }

            dg.set_state(State::TimedOut);
            let netdev_idx = dg.netdev_idx();
            queue.remove(slot);
            if let Some(netdev) = netdevs.get_mut(netdev_idx as usize) {
                netdev.stats.timeouts += 1;
            }
            crate::fmt::debug!("datagram slot {slot} timed out on netdev {netdev_idx}");
        }
    }

    fn cancel_link(&mut self, netdev_idx: u8) {
        let Self { queue, datagrams, netdevs, .. } = self;

        for slot in 0..MAX_DATAGRAMS as u8 {
            let Some(dg) = datagrams[slot as usize].as_mut() else { continue };
            if dg.netdev_idx() != netdev_idx {
                continue;
            }
            if !matches!(dg.state(), State::Queued | State::Sent) {
                continue;
            }

            dg.set_state(State::Error);
            queue.remove(slot);
        }

        if let Some(netdev) = netdevs.get_mut(netdev_idx as usize) {
            netdev.stats = Default::default();
        }
        crate::fmt::warn!("netdev {netdev_idx} link down, cancelling queued datagrams");
    }

    /// Pack and transmit a single frame's worth of queued datagrams for `netdev_idx`. Returns
    /// how many datagrams were packed (0 means nothing left to send on this link).
    fn pack_one_frame(&mut self, netdev_idx: u8, now_ns: u64) -> usize {
        let Self { queue, datagrams, netdevs, pdo_arena, next_index, .. } = self;
        let netdev = &mut netdevs[netdev_idx as usize];
        let buf = netdev.get_tx_buffer();

        let mut offset = FRAME_HEADER_LEN;
        let mut last_flags_offset: Option<usize> = None;
        let mut packed: heapless::Vec<(u8, u8), MAX_DATAGRAMS> = heapless::Vec::new();

        for slot in queue.iter() {
            let (data_size, type_code, address_bytes) = {
                let dg = match datagrams[slot as usize].as_ref() {
                    Some(dg) if dg.state() == State::Queued && dg.netdev_idx() == netdev_idx => dg,
                    _ => continue,
                };
                (dg.data_size(), dg.type_code(), dg.address_bytes())
            };

            let need = DATAGRAM_HEADER_LEN + data_size + WORKING_COUNTER_LEN;
            if offset + need > ETHERNET_MTU {
                break;
            }

            if let Some(prev_offset) = last_flags_offset {
                let mut flags = unwrap!(DatagramFlags::unpack_from_slice(&buf[prev_offset..prev_offset + 2]).map_err(|_| ()));
                flags.set_more_follows(true);
                buf[prev_offset..prev_offset + 2].copy_from_slice(&flags.pack());
            }

            let header_start = offset;
            let index = *next_index;
            *next_index = next_index.wrapping_add(1);

            buf[header_start] = type_code;
            buf[header_start + 1] = index;
            buf[header_start + 2..header_start + 6].copy_from_slice(&address_bytes);
            let flags = DatagramFlags::with_len(data_size as u16);
            buf[header_start + 6..header_start + 8].copy_from_slice(&flags.pack());
            buf[header_start + 8..header_start + 10].copy_from_slice(&0u16.to_le_bytes());

            let payload_start = header_start + DATAGRAM_HEADER_LEN;
            match datagrams[slot as usize].as_ref().and_then(|dg| dg.owned_data()) {
                Some(bytes) => buf[payload_start..payload_start + data_size].copy_from_slice(bytes),
                None => {
                    if let Some((start, len)) = datagrams[slot as usize].as_ref().and_then(|dg| dg.arena_range()) {
                        buf[payload_start..payload_start + len].copy_from_slice(&pdo_arena[start..start + len]);
                    }
                }
            }

            let wc_start = payload_start + data_size;
            buf[wc_start..wc_start + WORKING_COUNTER_LEN].copy_from_slice(&0u16.to_le_bytes());

            offset = wc_start + WORKING_COUNTER_LEN;
            last_flags_offset = Some(header_start + 6);
            // Capacity is `MAX_DATAGRAMS`, so this can never overflow.
            unwrap!(packed.push((slot, index)).map_err(|_| ()));
        }

        if packed.is_empty() {
            return 0;
        }

        let header = FrameHeader::new((offset - FRAME_HEADER_LEN) as u16);
        buf[0..FRAME_HEADER_LEN].copy_from_slice(&header.pack());

        let total_len = offset.max(ETHERNET_MIN_FRAME_LEN);
        for b in buf[offset..total_len].iter_mut() {
            *b = 0;
        }

        netdev.send(total_len);

        for (slot, index) in packed.iter().copied() {
            if let Some(dg) = datagrams[slot as usize].as_mut() {
                dg.set_index(index);
                dg.set_state(State::Sent);
                dg.set_sent_ns(now_ns);
            }
        }

        packed.len()
    }
}
