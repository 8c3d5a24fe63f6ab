//! External collaborator interfaces (§6, Module G).
//!
//! Slave discovery, mailbox protocol semantics (CoE/FoE/EoE), SII access and per-vendor PDO
//! tables are out of scope for the core — this module fixes the minimal trait shapes the core
//! needs from them so the rest of the crate can compile and be tested against something concrete
//! rather than leaving the seam unexpressed.

use crate::error::Error;
use crate::slave::Slave;

/// Populates slave state during `start()`/`rescan()`. A real implementation walks the physical
/// ring via broadcast/auto-increment reads; topology discovery itself is out of scope here.
pub trait Scanner<const MAX_SLAVES: usize> {
    /// Discover slaves, filling `slaves` in ring order and returning how many were found.
    ///
    /// Must also elect the DC reference slave (the first slave supporting DC) and return its
    /// index, if any.
    fn scan(&mut self, slaves: &mut [Option<Slave>; MAX_SLAVES]) -> Result<ScanResult, Error>;
}

/// Outcome of a [`Scanner::scan`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// Number of slaves found, in ring order starting at index 0.
    pub slave_count: usize,
    /// Index into the scanned slave array of the elected DC reference slave, if the segment has
    /// one.
    pub dc_ref_slave: Option<usize>,
}

/// CoE/FoE/EoE mailbox transport. Deliberately opaque: a mailbox operation only needs to build,
/// queue and await a datagram carrying its protocol-specific payload — the payload semantics
/// themselves are a Non-goal.
pub trait MailboxTransport {
    /// Exchange `request` with the slave at `configured_address`'s mailbox, returning the raw
    /// reply payload. Blocks the calling (non-periodic or scan) task, never the periodic one.
    fn exchange(&mut self, configured_address: u16, request: &[u8]) -> Result<heapless::Vec<u8, 256>, Error>;
}

/// SII (slave information interface / EEPROM) access: one word at a time, via a queued datagram.
pub trait SiiAccess {
    /// Read one 16-bit word at `word_address` from `configured_address`'s EEPROM.
    fn read_word(&mut self, configured_address: u16, word_address: u16) -> Result<u16, Error>;

    /// Write one 16-bit word. SII writes are rare (configuration time only) and always run
    /// under `scan_lock`.
    fn write_word(&mut self, configured_address: u16, word_address: u16, value: u16) -> Result<(), Error>;
}

/// One SyncManager's PDO assignment, as reported by a vendor table.
#[derive(Debug, Clone, Copy)]
pub struct SyncInfo {
    pub sync_manager_index: u8,
    pub byte_length: u16,
    pub is_output: bool,
}

/// Per-vendor static PDO tables (Non-goal to generalize beyond a lookup). A real implementation
/// ships one table per supported device family; this crate only needs the lookup signature.
pub trait VendorTable {
    /// Look up the SyncManager layout for a given vendor/product/revision in a given slave
    /// state, per §6: `find_slave_sync_info(vendor, product, revision, mode)`.
    fn find_slave_sync_info(
        &self,
        vendor_id: u32,
        product_code: u32,
        revision: u32,
        mode: crate::slave::AlState,
    ) -> Option<heapless::Vec<SyncInfo, 8>>;
}
