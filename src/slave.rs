//! Slave state, opaque to the core beyond the fields it reads and writes (§3: "Slave (opaque to
//! the core except for the fields below)"). Discovery, SII parsing and per-vendor PDO tables are
//! external collaborators — see [`crate::collab`] — that populate a `Slave` before the core ever
//! touches it.

/// The EtherCAT slave application-layer state machine (ETG1000.6 §6.4.1), in ascending order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlState {
    Init,
    PreOp,
    Boot,
    SafeOp,
    Op,
}

impl AlState {
    /// Decode an AL status register value, ignoring the error bit (bit 4).
    pub fn from_status(status: u8) -> Option<Self> {
        match status & 0x0f {
            0x01 => Some(Self::Init),
            0x02 => Some(Self::PreOp),
            0x03 => Some(Self::Boot),
            0x04 => Some(Self::SafeOp),
            0x08 => Some(Self::Op),
            _ => None,
        }
    }

    /// The AL control/status code for this state.
    pub fn code(self) -> u8 {
        match self {
            Self::Init => 0x01,
            Self::PreOp => 0x02,
            Self::Boot => 0x03,
            Self::SafeOp => 0x04,
            Self::Op => 0x08,
        }
    }
}

bitflags::bitflags! {
    /// Which mailbox protocols this slave's SII "mailbox supported protocols" category (ETG1000.6
    /// §5.4, SII category 0x0018) advertises. Populated by the SII/scanner collaborator; read by
    /// the CLI to decide whether `foe_read`/`eoe_start`/etc. are meaningful for a given slave. The
    /// core never interprets mailbox payloads itself (§1 Non-goals) — this is capability
    /// metadata, not protocol semantics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MailboxProtocols: u8 {
        /// AoE (ADS over EtherCAT).
        const AOE = 0x01;
        /// EoE (Ethernet over EtherCAT).
        const EOE = 0x02;
        /// CoE (CAN application protocol over EtherCAT).
        const COE = 0x04;
        /// FoE (file access over EtherCAT).
        const FOE = 0x08;
        /// SoE (servo profile over EtherCAT).
        const SOE = 0x10;
    }
}

/// Whether a slave's distributed-clock register range is 32-bit or 64-bit (depends on the ESC
/// generation).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DcRange {
    /// System time registers are 32 bits wide.
    Bits32,
    /// System time registers are 64 bits wide.
    Bits64,
}

/// Per-SyncManager PDO assignment: which PDOs are mapped, and their total byte length.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncManagerConfig {
    pub enabled: bool,
    /// Byte length of the process data mapped through this SyncManager.
    pub length: u16,
}

/// Per-slave configuration produced by scanning/mailbox configuration (external collaborators),
/// consumed by the core's PDO packing and state transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaveConfig {
    pub sync_managers: [SyncManagerConfig; 4],
}

/// One discovered EtherCAT slave. Populated by the scanner; consumed by the master loop for
/// state transitions, working-counter accounting and PDO mapping.
pub struct Slave {
    pub configured_address: u16,
    pub current_state: AlState,
    pub requested_state: AlState,
    /// Offset into the PDO arena at which this slave's process data begins (§3 invariant 2).
    pub logical_start_address: u32,
    pub odata_size: u16,
    pub idata_size: u16,
    /// Working counter contribution expected from this slave on every cyclic exchange.
    pub expected_working_counter: u16,
    /// Propagation delay from the reference clock, in nanoseconds (DC topology).
    pub transmission_delay: u32,
    pub base_dc_range: DcRange,
    pub config: SlaveConfig,
    /// Mailbox protocols this slave's EEPROM advertises support for.
    pub mailbox_protocols: MailboxProtocols,
    /// Invoked once per cycle after this slave's PDO datagram reaches `Received` (§3, §4.D
    /// "After RX in OPERATION phase"): `(slave, output, input)`, where `output` is the region the
    /// master writes before the next send and `input` is the region the slave wrote into this
    /// cycle's reply. Runs in the RX context holding no lock — must be real-time safe and must
    /// not re-enter master APIs other than `queue_ext_datagram` (§9 design note).
    pub pdo_callback: Option<fn(&Slave, output: &mut [u8], input: &[u8])>,
}

impl Slave {
    /// A freshly discovered slave at its configured address, not yet transitioned out of Init.
    pub fn new(configured_address: u16) -> Self {
        Self {
            configured_address,
            current_state: AlState::Init,
            requested_state: AlState::Init,
            logical_start_address: 0,
            odata_size: 0,
            idata_size: 0,
            expected_working_counter: 0,
            transmission_delay: 0,
            base_dc_range: DcRange::Bits32,
            config: SlaveConfig::default(),
            mailbox_protocols: MailboxProtocols::empty(),
            pdo_callback: None,
        }
    }

    /// Total process-data bytes (output + input) this slave contributes to the PDO arena.
    pub fn pdo_size(&self) -> u16 {
        self.odata_size + self.idata_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn al_state_decodes_known_codes() {
        assert_eq!(AlState::from_status(0x04), Some(AlState::SafeOp));
        assert_eq!(AlState::from_status(0x14), Some(AlState::SafeOp), "error bit must be ignored");
    }

    #[test]
    fn al_state_rejects_unknown_codes() {
        assert_eq!(AlState::from_status(0x00), None);
    }

    #[test]
    fn pdo_size_is_sum_of_output_and_input() {
        let mut slave = Slave::new(0x1001);
        slave.odata_size = 4;
        slave.idata_size = 2;

        assert_eq!(slave.pdo_size(), 6);
    }

    #[test]
    fn mailbox_protocols_decode_from_sii_byte() {
        let flags = MailboxProtocols::from_bits_truncate(0x0c);

        assert!(flags.contains(MailboxProtocols::COE));
        assert!(flags.contains(MailboxProtocols::FOE));
        assert!(!flags.contains(MailboxProtocols::EOE));
    }
}
