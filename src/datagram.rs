//! A single EtherCAT command plus the bookkeeping needed to track it from enqueue through reply
//! (or timeout). See [`crate::queue::Queue`] for how these are scheduled and
//! [`crate::master::send`]/[`crate::master::receive`] for the packing/matching algorithms.

use crate::command::Command;
use crate::frame::MAX_DATAGRAM_DATA_LEN;
use heapless::Vec;

/// A datagram's payload: either an inline buffer it owns, or a window into the master's PDO
/// arena.
///
/// The arena variant exists purely to avoid a copy on the cyclic hot path (§4.B): the frame
/// packer reads straight out of `master.pdo_arena[start..start + len]` and the RX demux writes
/// straight back into it, so a PDO datagram never owns a buffer of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// An inline, owned buffer — used by mailbox one-shots, SII access and slave scanning.
    Owned(Vec<u8, MAX_DATAGRAM_DATA_LEN>),
    /// A `[start, start + len)` byte range inside the master's PDO arena.
    Arena {
        /// Offset of the first byte in the arena.
        start: usize,
        /// Length in bytes.
        len: usize,
    },
}

impl Payload {
    /// Length in bytes, regardless of which variant this is.
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(buf) => buf.len(),
            Self::Arena { len, .. } => *len,
        }
    }

    /// Whether this payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a [`Datagram`] is in its send/receive lifecycle.
///
/// Invariant (§3): a datagram is on the pending queue iff `state` is `Queued` or `Sent`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Freshly built, not yet handed to the master.
    Init,
    /// On the queue, waiting to be packed into a frame.
    Queued,
    /// Packed into a frame and sent; waiting for a matching reply or timeout.
    Sent,
    /// Matched to a reply; `working_counter` and any read payload are valid.
    Received,
    /// No reply arrived within 50 ms of `sent_ns`.
    TimedOut,
    /// The link it was queued on went down before it could be sent.
    Error,
}

/// One EtherCAT command: type, address, payload, and the state machine tracking it from
/// `Init` through `Received`/`TimedOut`/`Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    command: Command,
    payload: Payload,
    /// Written by the RX demux; zero means no slave processed the command.
    working_counter: u16,
    /// 8-bit rolling index, assigned at send time (§3 invariant 1).
    index: u8,
    /// Which net-device (primary/backup link) this datagram targets.
    netdev_idx: u8,
    state: State,
    sent_ns: u64,
    received_ns: u64,
}

impl Datagram {
    /// Build a datagram with an inline, owned buffer of `data`, targeting `netdev_idx`.
    pub fn owned(command: Command, netdev_idx: u8, data: &[u8]) -> Self {
        let mut buf = Vec::new();
        // `data` is always bounded by `MAX_DATAGRAM_DATA_LEN` by construction at call sites;
        // an overflow here is a caller bug, not a runtime condition to recover from.
        unwrap!(buf.extend_from_slice(data).map_err(|_| ()));

        Self {
            command,
            payload: Payload::Owned(buf),
            working_counter: 0,
            index: 0,
            netdev_idx,
            state: State::Init,
            sent_ns: 0,
            received_ns: 0,
        }
    }

    /// Build a datagram with an inline, owned, zero-filled buffer of `len` bytes — used for
    /// read commands (APRD/FPRD/BRD) where there is nothing to send but a reply to expect.
    pub fn init(command: Command, netdev_idx: u8, len: usize) -> Self {
        debug_assert!(len <= MAX_DATAGRAM_DATA_LEN);

        let mut buf = Vec::new();
        unwrap!(buf.resize(len, 0).map_err(|_| ()));

        Self {
            command,
            payload: Payload::Owned(buf),
            working_counter: 0,
            index: 0,
            netdev_idx,
            state: State::Init,
            sent_ns: 0,
            received_ns: 0,
        }
    }

    /// Build a PDO datagram whose payload is a window into the master's PDO arena rather than
    /// an owned buffer.
    pub fn arena(logical_address: u32, netdev_idx: u8, start: usize, len: usize) -> Self {
        Self {
            command: Command::Lrw { logical_address },
            payload: Payload::Arena { start, len },
            working_counter: 0,
            index: 0,
            netdev_idx,
            state: State::Init,
            sent_ns: 0,
            received_ns: 0,
        }
    }

    /// Reset to `Init` with a zero working counter. Does not touch the payload buffer; call
    /// [`Datagram::zero`] first if you also need the payload cleared.
    pub fn clear(&mut self) {
        self.state = State::Init;
        self.working_counter = 0;
    }

    /// Zero the owned payload buffer in place. A no-op for arena-backed datagrams — zeroing
    /// those goes through the arena directly (see `Master::zero_pdo_arena`).
    pub fn zero(&mut self) {
        if let Payload::Owned(buf) = &mut self.payload {
            buf.iter_mut().for_each(|b| *b = 0);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// The command this datagram carries.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The single-byte command type code, as it appears on the wire.
    pub fn type_code(&self) -> u8 {
        self.command.type_code()
    }

    /// The encoded 4-byte address field.
    pub fn address_bytes(&self) -> [u8; 4] {
        self.command.address_bytes()
    }

    /// Payload length in bytes — used both for frame packing and for matching an RX datagram
    /// back to its request (§4.D: index, type and `data_size` must all agree).
    pub fn data_size(&self) -> usize {
        self.payload.len()
    }

    /// Borrow the owned payload, if this is an [`Payload::Owned`] datagram.
    pub fn owned_data(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Owned(buf) => Some(buf.as_slice()),
            Payload::Arena { .. } => None,
        }
    }

    /// Mutably borrow the owned payload, if this is an [`Payload::Owned`] datagram.
    pub fn owned_data_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.payload {
            Payload::Owned(buf) => Some(buf.as_mut_slice()),
            Payload::Arena { .. } => None,
        }
    }

    /// The `[start, start + len)` arena window, if this is an [`Payload::Arena`] datagram.
    pub fn arena_range(&self) -> Option<(usize, usize)> {
        match self.payload {
            Payload::Arena { start, len } => Some((start, len)),
            Payload::Owned(_) => None,
        }
    }

    /// The 8-bit rolling index assigned at send time. `0` before the first send.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: u8) {
        self.index = index;
    }

    /// Which net-device (primary/backup link) this datagram targets.
    pub fn netdev_idx(&self) -> u8 {
        self.netdev_idx
    }

    /// Working counter from the last reply. Zero if never received.
    pub fn working_counter(&self) -> u16 {
        self.working_counter
    }

    pub(crate) fn set_working_counter(&mut self, wc: u16) {
        self.working_counter = wc;
    }

    pub(crate) fn set_sent_ns(&mut self, ns: u64) {
        self.sent_ns = ns;
    }

    pub(crate) fn sent_ns(&self) -> u64 {
        self.sent_ns
    }

    pub(crate) fn set_received_ns(&mut self, ns: u64) {
        self.received_ns = ns;
    }
}

/// Builder helpers for the command types named in §3. Each returns an owned, zero-filled
/// datagram of the right size for a read, or an owned datagram carrying the given bytes for a
/// write.
impl Datagram {
    /// Auto-increment physical read of `len` bytes.
    pub fn aprd(position: u16, offset: u16, len: usize, netdev_idx: u8) -> Self {
        Self::init(Command::Aprd { position, offset }, netdev_idx, len)
    }

    /// Auto-increment physical write of `data`.
    pub fn apwr(position: u16, offset: u16, data: &[u8], netdev_idx: u8) -> Self {
        Self::owned(Command::Apwr { position, offset }, netdev_idx, data)
    }

    /// Configured-address physical read of `len` bytes.
    pub fn fprd(address: u16, offset: u16, len: usize, netdev_idx: u8) -> Self {
        Self::init(Command::Fprd { address, offset }, netdev_idx, len)
    }

    /// Configured-address physical write of `data`.
    pub fn fpwr(address: u16, offset: u16, data: &[u8], netdev_idx: u8) -> Self {
        Self::owned(Command::Fpwr { address, offset }, netdev_idx, data)
    }

    /// Configured-address physical read/write, used by DC mode B to drive the reference clock.
    pub fn frmw(address: u16, offset: u16, data: &[u8], netdev_idx: u8) -> Self {
        Self::owned(Command::Frmw { address, offset }, netdev_idx, data)
    }

    /// Broadcast read of `len` bytes.
    pub fn brd(offset: u16, len: usize, netdev_idx: u8) -> Self {
        Self::init(Command::Brd { offset }, netdev_idx, len)
    }

    /// Broadcast write of `data`.
    pub fn bwr(offset: u16, data: &[u8], netdev_idx: u8) -> Self {
        Self::owned(Command::Bwr { offset }, netdev_idx, data)
    }

    /// Logical read/write of `len` bytes at `logical_addr`, backed by the PDO arena rather than
    /// an owned buffer.
    pub fn lrw(logical_addr: u32, start: usize, len: usize, netdev_idx: u8) -> Self {
        Self::arena(logical_addr, netdev_idx, start, len)
    }
}
