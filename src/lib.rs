//! An EtherCAT master: a datagram scheduler, a two-task (periodic/non-periodic) cyclic loop,
//! and distributed-clock discipline.
//!
//! The periodic task is driven by a hardware timer and must never block; it builds the
//! cycle's DC and PDO datagrams, hands them to [`master::send`], and on the next tick reads
//! back whatever the previous cycle's frame returned. The non-periodic task flushes
//! mailbox/scan datagrams on a timeout-bounded semaphore and is suspended for the duration of
//! [`Phase::Operation`].
//!
//! Slave discovery, mailbox protocol semantics (CoE/FoE/EoE), SII access and per-vendor PDO
//! tables are external collaborators (see [`collab`]) — this crate only defines the interfaces
//! the core loop needs from them.

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod fmt;

pub mod collab;
pub mod command;
pub mod config;
pub mod datagram;
pub mod dc;
pub mod error;
pub mod frame;
pub mod master;
pub mod netdev;
pub mod os;
pub mod queue;
pub mod slave;
#[cfg(feature = "cli")]
pub mod transport;

pub use datagram::Datagram;
pub use error::Error;
pub use master::{Master, Phase};
pub use netdev::Netdev;
pub use slave::Slave;
