//! The RX demultiplexer (§4.D): parses a received frame's embedded datagrams and matches each to
//! its queued request. Like `send`, `receive` takes an explicit `now_ns` and is otherwise free of
//! any `Os`/clock dependency.

use super::{Master, Phase};
use crate::datagram::State;
use crate::frame::{DatagramFlags, FrameHeader, DATAGRAM_HEADER_LEN, FRAME_HEADER_LEN, WORKING_COUNTER_LEN};
use crate::netdev::NetdevDriver;

impl<D, const MAX_NETDEVS: usize, const MAX_SLAVES: usize, const MAX_DATAGRAMS: usize, const MAX_PDO_BUFSIZE: usize>
    Master<D, MAX_NETDEVS, MAX_SLAVES, MAX_DATAGRAMS, MAX_PDO_BUFSIZE>
where
    D: NetdevDriver,
{
    /// Demultiplex a received frame (§4.D). Runs on the NIC RX context — may be an ISR or a
    /// dedicated deferred task, but must complete before the next periodic tick reads back any
    /// `Received` datagram (§5 ordering guarantee ii).
    pub fn receive(&mut self, netdev_idx: u8, frame: &[u8], now_ns: u64) {
        if let Some(netdev) = self.netdevs.get_mut(netdev_idx as usize) {
            netdev.note_received(frame.len());
        }

        if frame.len() < FRAME_HEADER_LEN {
            self.bump_corrupted(netdev_idx);
            return;
        }

        let header = match FrameHeader::unpack_from_slice(&frame[0..FRAME_HEADER_LEN]) {
            Ok(h) => h,
            Err(_) => {
                self.bump_corrupted(netdev_idx);
                return;
            }
        };

        let frame_len = FRAME_HEADER_LEN + header.payload_len();
        if frame_len > frame.len() {
            self.bump_corrupted(netdev_idx);
            return;
        }

        let mut cursor = FRAME_HEADER_LEN;
        loop {
            if cursor + DATAGRAM_HEADER_LEN > frame_len {
                break;
            }

            let type_code = frame[cursor];
            let index = frame[cursor + 1];
            let flags = match DatagramFlags::unpack_from_slice(&frame[cursor + 6..cursor + 8]) {
                Ok(f) => f,
                Err(_) => {
                    self.bump_corrupted(netdev_idx);
                    return;
                }
            };
            let length = usize::from(flags.len());

            if cursor + DATAGRAM_HEADER_LEN + length + WORKING_COUNTER_LEN > frame_len {
                self.bump_corrupted(netdev_idx);
                return;
            }

            let payload_start = cursor + DATAGRAM_HEADER_LEN;
            let wc_start = payload_start + length;
            let wc = u16::from_le_bytes([frame[wc_start], frame[wc_start + 1]]);

            self.match_datagram(netdev_idx, type_code, index, length, &frame[payload_start..wc_start], wc, now_ns);

            cursor = wc_start + WORKING_COUNTER_LEN;
            if !flags.more_follows() {
                break;
            }
        }

        if self.phase == Phase::Operation {
            self.invoke_pdo_callbacks();
        }
    }

    fn bump_corrupted(&mut self, netdev_idx: u8) {
        if let Some(netdev) = self.netdevs.get_mut(netdev_idx as usize) {
            netdev.stats.corrupted += 1;
        }
        crate::fmt::warn!("corrupted frame on netdev {netdev_idx}");
    }

    /// §4.D step 3/4 and the tie-break rule: first matching `Sent` datagram in queue order wins.
    fn match_datagram(
        &mut self,
        netdev_idx: u8,
        type_code: u8,
        index: u8,
        length: usize,
        payload: &[u8],
        wc: u16,
        now_ns: u64,
    ) {
        let Self { queue, datagrams, netdevs, pdo_arena, .. } = self;

        let found = queue.iter().find(|&slot| {
            datagrams[slot as usize].as_ref().is_some_and(|dg| {
                dg.state() == State::Sent
                    && dg.index() == index
                    && dg.type_code() == type_code
                    && dg.data_size() == length
                    && dg.netdev_idx() == netdev_idx
            })
        });

        let Some(slot) = found else {
            if let Some(netdev) = netdevs.get_mut(netdev_idx as usize) {
                netdev.stats.unmatched += 1;
            }
            crate::fmt::debug!("unmatched reply: netdev {netdev_idx} index {index} type {type_code:#04x}");
            return;
        };

        if let Some(dg) = datagrams[slot as usize].as_mut() {
            if !dg.command().is_write_only() {
                match dg.arena_range() {
                    Some((start, len)) => pdo_arena[start..start + len].copy_from_slice(payload),
                    None => {
                        if let Some(buf) = dg.owned_data_mut() {
                            buf.copy_from_slice(payload);
                        }
                    }
                }
            }
            dg.set_working_counter(wc);
            dg.set_state(State::Received);
            dg.set_received_ns(now_ns);
        }

        queue.remove(slot);
    }

    /// §4.D "After RX in OPERATION phase": for every slave with a `pdo_callback`, invoke it with
    /// pointers into its output/input region of the PDO arena, and sum working counters into
    /// `actual_working_counter`.
    ///
    /// Only runs once a cycle's PDO datagram(s) have actually reached `Received` — callers (the
    /// periodic task) are expected to have already confirmed that via `receive()`'s return before
    /// relying on `actual_working_counter`.
    fn invoke_pdo_callbacks(&mut self) {
        let Self { slaves, slave_count, pdo_arena, .. } = self;

        for i in 0..*slave_count {
            let Some(slave) = slaves[i].as_ref() else { continue };
            let start = slave.logical_start_address as usize;
            let odata_size = usize::from(slave.odata_size);
            let idata_size = usize::from(slave.idata_size);

            if start + odata_size + idata_size > pdo_arena.len() {
                continue;
            }

            if let Some(callback) = slave.pdo_callback {
                let (before, input) = pdo_arena.split_at_mut(start + odata_size);
                let output = &mut before[start..start + odata_size];
                callback(slave, output, &input[..idata_size]);
            }
        }

        let mut total_wc: u16 = 0;
        for slot in self.datagrams.iter() {
            if let Some(dg) = slot {
                if dg.arena_range().is_some() && dg.state() == State::Received {
                    total_wc += dg.working_counter();
                }
            }
        }

        self.actual_working_counter = total_wc;
    }
}
