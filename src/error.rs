//! The error taxonomy surfaced to callers. Hot-path failures (timeout, link-down, unmatched,
//! corrupted) are never returned as `panic`s — they are recorded in [`crate::netdev::Stats`]
//! and, for an external datagram polled via [`crate::master::Master::ext_datagram_outcome`],
//! delivered as one of these variants. Structural invariant violations (cycle time below the
//! floor, missing slave config) are assertions, not `Error`s: see
//! [`crate::master::Master::start`].

use core::fmt;

/// Mailbox protocol discriminant carried by [`Error::Mailbox`] variants that need to say *which*
/// protocol failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MailboxProtocol {
    /// CAN application protocol over EtherCAT.
    Coe,
    /// File access over EtherCAT.
    Foe,
    /// Ethernet over EtherCAT.
    Eoe,
}

/// All error kinds a caller of this crate can observe.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// A fixed-size allocation (queue slot, PDO arena region) was exhausted.
    NoMemory,
    /// A caller-supplied argument violates a documented precondition.
    InvalidArgument,
    /// A datagram's `sent_ns` aged past the 50 ms timeout before a reply arrived.
    Timeout,
    /// The requested operation is not implemented by this build.
    NotSupported,
    /// Link-level or frame-level I/O failure (link down, send failed).
    Io,
    /// A datagram was `Received` with a working counter of zero: no slave processed it.
    WorkingCounter,
    /// A slave reported an AL status error during a requested state transition.
    AlStatus {
        /// The AL status error code reported by the slave.
        code: u16,
    },
    /// SII (EEPROM) access failed.
    Sii,
    /// A mailbox-level protocol error.
    Mailbox(MailboxProtocol),
    /// The slave's mailbox had nothing to read.
    MailboxEmpty,
    /// Every other EtherCAT-level failure the caller does not need to discriminate further.
    Unknown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMemory => f.write_str("out of memory"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Timeout => f.write_str("datagram timed out"),
            Self::NotSupported => f.write_str("not supported"),
            Self::Io => f.write_str("I/O error"),
            Self::WorkingCounter => f.write_str("working counter error"),
            Self::AlStatus { code } => write!(f, "AL status error 0x{code:04x}"),
            Self::Sii => f.write_str("SII error"),
            Self::Mailbox(proto) => write!(f, "mailbox error ({proto:?})"),
            Self::MailboxEmpty => f.write_str("mailbox empty"),
            Self::Unknown => f.write_str("unknown error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
