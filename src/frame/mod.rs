//! Bit-exact wire layout of an EtherCAT frame: the 2-byte frame header followed by one or more
//! datagrams, each prefixed by a 10-byte header and trailed by a 2-byte working counter.
//!
//! ```text
//! [ frame header: 2B ] [ datagram header: 10B ][ payload: N B ][ wkc: 2B ] [ datagram... ] ...
//! ```
//!
//! See [`crate::command`] for the datagram command types and [`crate::datagram`] for the owned,
//! stateful `Datagram` built from them.

mod flags;
mod header;

pub use flags::DatagramFlags;
pub use header::FrameHeader;

/// Size in bytes of the EtherCAT frame header (§6: 2-byte `len[11] | type[4]` word).
pub const FRAME_HEADER_LEN: usize = 2;

/// Size in bytes of one datagram header: `type(1) + index(1) + address(4) + flags(2) + irq(2)`.
pub const DATAGRAM_HEADER_LEN: usize = 10;

/// Size in bytes of the working counter trailing every datagram.
pub const WORKING_COUNTER_LEN: usize = 2;

/// Ethernet payload length an EtherCAT frame must not exceed (standard, untagged frame).
pub const ETHERNET_MTU: usize = 1500;

/// Minimum Ethernet frame payload length; frames are padded with zeros up to this size before
/// the Ethernet FCS is appended by the link layer.
pub const ETHERNET_MIN_FRAME_LEN: usize = 60;

/// Largest payload a single datagram may carry (§3: 11-bit length field).
pub const MAX_DATAGRAM_DATA_LEN: usize = 2047;
