//! Black-box end-to-end scenarios and testable properties against the public `Master` API:
//! a datagram is enqueued, `send()` packs and "transmits" it through a fake driver, a reply is
//! hand-built to the exact wire format and fed back through `receive()`, and the resulting
//! `Datagram`/`Master` state is asserted. Frames are parsed and built byte-for-byte rather than
//! through any crate-internal helper, so these tests also pin the wire format from the outside.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use ethercat_master::command::Command;
use ethercat_master::config::MasterConfig;
use ethercat_master::datagram::{Datagram, State};
use ethercat_master::frame::{DATAGRAM_HEADER_LEN, FRAME_HEADER_LEN, WORKING_COUNTER_LEN};
use ethercat_master::master::{periodic_tick, ExtDatagramOutcome, Master};
use ethercat_master::netdev::NetdevDriver;
use ethercat_master::slave::Slave;

/// A [`NetdevDriver`] that captures every transmitted frame and reports a caller-controlled link
/// state; used in place of a real raw socket for every test in this file.
struct FakeDriver {
    transmitted: Vec<Vec<u8>>,
    link_up: bool,
}

impl FakeDriver {
    fn new(link_up: bool) -> Self {
        Self { transmitted: Vec::new(), link_up }
    }
}

impl NetdevDriver for FakeDriver {
    fn transmit(&mut self, frame: &[u8]) -> bool {
        self.transmitted.push(frame.to_vec());
        true
    }

    fn poll_link(&mut self) -> bool {
        self.link_up
    }
}

/// One datagram's header fields, as read back out of a captured/injected frame.
#[derive(Debug, Clone, Copy)]
struct ParsedDatagram {
    type_code: u8,
    index: u8,
    length: usize,
}

/// Walk a frame's embedded datagrams, mirroring the core's own RX demux loop (§4.D) but
/// independently, so these tests don't rely on any crate-internal parsing helper.
fn parse_frame(frame: &[u8]) -> Vec<ParsedDatagram> {
    let header = u16::from_le_bytes([frame[0], frame[1]]);
    let frame_len = FRAME_HEADER_LEN + usize::from(header & 0x07FF);

    let mut out = Vec::new();
    let mut cursor = FRAME_HEADER_LEN;
    loop {
        if cursor + DATAGRAM_HEADER_LEN > frame_len {
            break;
        }
        let type_code = frame[cursor];
        let index = frame[cursor + 1];
        let flags = u16::from_le_bytes([frame[cursor + 6], frame[cursor + 7]]);
        let length = usize::from(flags & 0x07FF);
        let more_follows = (flags >> 15) & 1 == 1;

        out.push(ParsedDatagram { type_code, index, length });

        cursor += DATAGRAM_HEADER_LEN + length + WORKING_COUNTER_LEN;
        if !more_follows {
            break;
        }
    }
    out
}

/// One entry to splice into a hand-built reply frame.
struct ReplyEntry<'a> {
    type_code: u8,
    index: u8,
    payload: &'a [u8],
    wc: u16,
}

/// Build a reply frame carrying `entries` back-to-back, setting `more_follows` on every entry but
/// the last — the inverse of [`parse_frame`].
fn build_reply_frame(entries: &[ReplyEntry]) -> Vec<u8> {
    let area_len: usize = entries.iter().map(|e| DATAGRAM_HEADER_LEN + e.payload.len() + WORKING_COUNTER_LEN).sum();
    let mut buf = vec![0u8; FRAME_HEADER_LEN + area_len];

    let frame_header = (area_len as u16 & 0x07FF) | (0x1 << 12);
    buf[0..2].copy_from_slice(&frame_header.to_le_bytes());

    let mut offset = FRAME_HEADER_LEN;
    for (i, entry) in entries.iter().enumerate() {
        let more_follows = i + 1 < entries.len();
        let flags = (entry.payload.len() as u16 & 0x07FF) | ((more_follows as u16) << 15);

        buf[offset] = entry.type_code;
        buf[offset + 1] = entry.index;
        // Address bytes (offset+2..offset+6) are irrelevant to matching; left zeroed.
        buf[offset + 6..offset + 8].copy_from_slice(&flags.to_le_bytes());
        // irq (offset+8..offset+10) left zeroed.

        let payload_start = offset + DATAGRAM_HEADER_LEN;
        buf[payload_start..payload_start + entry.payload.len()].copy_from_slice(entry.payload);

        let wc_start = payload_start + entry.payload.len();
        buf[wc_start..wc_start + WORKING_COUNTER_LEN].copy_from_slice(&entry.wc.to_le_bytes());

        offset = wc_start + WORKING_COUNTER_LEN;
    }

    buf
}

type TestMaster = Master<FakeDriver, 1, 4, 210, 64>;

fn new_master(link_up: bool) -> TestMaster {
    Master::new(MasterConfig::new(1_000_000), [FakeDriver::new(link_up)])
}

fn transmitted(master: &TestMaster) -> Vec<Vec<u8>> {
    master.netdev_driver(0).unwrap().transmitted.clone()
}

#[test]
fn s1_round_trip_brd() {
    let mut master = new_master(true);

    let slot = master.queue_ext_datagram(Datagram::brd(0x0120, 2, 0)).expect("arena has room");
    master.send(0);

    let frames = transmitted(&master);
    assert_eq!(frames.len(), 1);
    let parsed = parse_frame(&frames[0]);
    assert_eq!(parsed.len(), 1);
    let dg = parsed[0];
    assert_eq!(dg.type_code, Command::Brd { offset: 0 }.type_code());
    assert_eq!(dg.length, 2);
    assert_eq!(master.datagram(slot).unwrap().index(), dg.index);

    let reply = build_reply_frame(&[ReplyEntry { type_code: dg.type_code, index: dg.index, payload: &[0x08, 0x00], wc: 1 }]);
    master.receive(0, &reply, 1_000);

    let dg = master.datagram(slot).unwrap();
    assert_eq!(dg.state(), State::Received);
    assert_eq!(dg.owned_data(), Some([0x08, 0x00].as_slice()));
    assert_eq!(dg.working_counter(), 1);
    assert_eq!(master.ext_datagram_outcome(slot), ExtDatagramOutcome::Ok);
}

#[test]
fn s2_timeout() {
    let mut master = new_master(true);

    let slot = master.queue_ext_datagram(Datagram::aprd(0, 0x0130, 2, 0)).unwrap();
    master.send(0);
    assert_eq!(master.datagram(slot).unwrap().state(), State::Sent);

    master.send(51_000_000);

    assert_eq!(master.datagram(slot).unwrap().state(), State::TimedOut);
    assert_eq!(master.netdev_stats(0).unwrap().timeouts, 1);
    assert_eq!(master.ext_datagram_outcome(slot), ExtDatagramOutcome::Timeout);
}

#[test]
fn s3_frame_split_200_datagrams() {
    let mut master = new_master(true);

    let mut slots = Vec::with_capacity(200);
    for _ in 0..200u16 {
        let slot = master.queue_ext_datagram(Datagram::apwr(0, 0, &[0u8; 8], 0)).expect("arena has room");
        slots.push(slot);
    }

    master.send(0);

    let frames = transmitted(&master);
    assert_eq!(frames.len(), 3, "200 datagrams at 20 bytes each, ~74 per 1500-byte frame, split into 3 frames");

    let total_bytes: usize = frames.iter().map(|f| f.len()).sum();
    let expected_datagram_bytes = 200 * (DATAGRAM_HEADER_LEN + 8 + WORKING_COUNTER_LEN);
    let expected_frame_overhead = frames.len() * FRAME_HEADER_LEN;
    assert_eq!(total_bytes, expected_datagram_bytes + expected_frame_overhead, "packing conservation (§8 property 1)");

    let mut seen_indices = HashSet::new();
    for &slot in &slots {
        let dg = master.datagram(slot).unwrap();
        assert_eq!(dg.state(), State::Sent);
        assert!(seen_indices.insert(dg.index()), "index {} reused among in-flight datagrams", dg.index());
    }
    assert_eq!(seen_indices.len(), 200, "every in-flight datagram has a unique index (§8 property 2)");
}

#[test]
fn s4_unmatched_reply() {
    let mut master = new_master(true);

    let slot = master.queue_ext_datagram(Datagram::aprd(0, 0x0130, 2, 0)).unwrap();
    master.send(0);
    let assigned_index = master.datagram(slot).unwrap().index();

    let wrong_index = assigned_index.wrapping_add(1);
    let reply = build_reply_frame(&[ReplyEntry {
        type_code: Command::Aprd { position: 0, offset: 0x0130 }.type_code(),
        index: wrong_index,
        payload: &[0u8; 2],
        wc: 1,
    }]);
    master.receive(0, &reply, 1_000);

    assert_eq!(master.netdev_stats(0).unwrap().unmatched, 1);
    assert_eq!(master.datagram(slot).unwrap().state(), State::Sent, "unmatched reply leaves the original datagram Sent");
}

static PDO_CALLBACK_LOG: OnceLock<Mutex<Vec<(Vec<u8>, Vec<u8>)>>> = OnceLock::new();

fn pdo_callback_log() -> &'static Mutex<Vec<(Vec<u8>, Vec<u8>)>> {
    PDO_CALLBACK_LOG.get_or_init(|| Mutex::new(Vec::new()))
}

fn record_pdo_callback(_slave: &Slave, output: &mut [u8], input: &[u8]) {
    pdo_callback_log().lock().unwrap().push((output.to_vec(), input.to_vec()));
}

#[test]
fn s5_pdo_cycle() {
    pdo_callback_log().lock().unwrap().clear();

    let mut master = new_master(true);

    let mut slave = Slave::new(0x1001);
    slave.odata_size = 4;
    slave.idata_size = 4;
    slave.expected_working_counter = 3;
    slave.pdo_callback = Some(record_pdo_callback);

    let mut slaves: [Option<Slave>; 4] = core::array::from_fn(|_| None);
    slaves[0] = Some(slave);
    master.set_slaves(slaves, 1, None);
    assert_eq!(master.expected_working_counter(), 3);

    master.start().expect("40us floor and shift_time_ns satisfied, scan already done");

    let _offset = periodic_tick(&mut master, 0);

    let frames = transmitted(&master);
    assert_eq!(frames.len(), 1, "DC read + single-domain LRW fit in one frame");
    let parsed = parse_frame(&frames[0]);

    let lrw_type = Command::Lrw { logical_address: 0 }.type_code();
    let lrw = parsed.iter().find(|d| d.type_code == lrw_type).expect("single-domain LRW datagram present");
    assert_eq!(lrw.length, 8, "odata(4) + idata(4)");

    let brd_type = Command::Brd { offset: 0 }.type_code();
    let dc_read = parsed.iter().find(|d| d.type_code == brd_type).expect("all-slaves DC read present");

    let reply = build_reply_frame(&[
        ReplyEntry { type_code: dc_read.type_code, index: dc_read.index, payload: &[0, 0, 0, 0], wc: 1 },
        ReplyEntry { type_code: lrw.type_code, index: lrw.index, payload: &[0, 0, 0, 0, 0xAA, 0xBB, 0xCC, 0xDD], wc: 3 },
    ]);
    master.receive(0, &reply, 1_000);

    assert_eq!(master.actual_working_counter(), 3);

    let log = pdo_callback_log().lock().unwrap();
    assert_eq!(log.len(), 1);
    let (output, input) = &log[0];
    assert_eq!(output.len(), 4);
    assert_eq!(input.as_slice(), &[0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn property6_link_down_cancels_queued_and_sent_datagrams() {
    let mut master = new_master(true);

    let sent_slot = master.queue_ext_datagram(Datagram::aprd(0, 0x0130, 2, 0)).unwrap();
    master.send(0);
    assert_eq!(master.datagram(sent_slot).unwrap().state(), State::Sent);

    let queued_slot = master.queue_ext_datagram(Datagram::aprd(1, 0x0130, 2, 0)).unwrap();

    master.netdev_driver_mut(0).unwrap().link_up = false;
    master.send(1_000);

    assert_eq!(master.datagram(sent_slot).unwrap().state(), State::Error);
    assert_eq!(master.datagram(queued_slot).unwrap().state(), State::Error);
    assert_eq!(master.netdev_link_up(0), Some(false));
}

#[test]
fn queue_ext_datagram_starts_queued_until_sent() {
    let mut master = new_master(true);

    let slot = master.queue_ext_datagram(Datagram::aprd(0, 0x0130, 2, 0)).unwrap();

    // `Queue::push_back`'s idempotence (§8 property 5) is exercised directly in
    // `queue::tests::requeue_is_idempotent`; from the public `Master` API the observable
    // guarantee is that a freshly queued datagram stays `Queued` until a `send()` pass runs.
    assert_eq!(master.datagram(slot).unwrap().state(), State::Queued);
    assert_eq!(master.ext_datagram_outcome(slot), ExtDatagramOutcome::Unknown);
}
