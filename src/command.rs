//! EtherCAT datagram command types and their 4-byte address encoding.
//!
//! The address field's meaning depends on the command: auto-increment commands carry a ring
//! position (sent as its two's complement so each slave subtracts one as it forwards the
//! datagram), configured-address commands carry a station address assigned during scanning,
//! broadcast commands carry only an offset, and LRW/LRD/LWR carry a flat 32-bit logical address
//! into the PDO arena.

/// One EtherCAT datagram command type (ETG1000.4 §5.4).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    /// Auto-increment physical read: addresses a slave by ring position.
    Aprd {
        /// Ring position, 0 = first slave after the master.
        position: u16,
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Auto-increment physical write.
    Apwr {
        /// Ring position, 0 = first slave after the master.
        position: u16,
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Configured-address physical read.
    Fprd {
        /// Configured station address.
        address: u16,
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Configured-address physical write.
    Fpwr {
        /// Configured station address.
        address: u16,
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Configured-address physical read/write (used for the DC reference-clock sync write).
    Frmw {
        /// Configured station address.
        address: u16,
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Broadcast read: every slave ORs its value into the response.
    Brd {
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Broadcast write: every slave applies the write.
    Bwr {
        /// Byte offset into the slave's register/memory space.
        offset: u16,
    },
    /// Logical read/write into the flat PDO address space, mapped to slaves via FMMUs.
    Lrw {
        /// Logical address in the shared PDO arena.
        logical_address: u32,
    },
}

impl Command {
    /// Encode this command's 4-byte address field, little-endian on the wire.
    pub fn address_bytes(&self) -> [u8; 4] {
        let (adp, ado) = match *self {
            Self::Aprd { position, offset } => (0u16.wrapping_sub(position), offset),
            Self::Apwr { position, offset } => (0u16.wrapping_sub(position), offset),
            Self::Fprd { address, offset } => (address, offset),
            Self::Fpwr { address, offset } => (address, offset),
            Self::Frmw { address, offset } => (address, offset),
            Self::Brd { offset } => (0, offset),
            Self::Bwr { offset } => (0, offset),
            Self::Lrw { logical_address } => {
                let le = logical_address.to_le_bytes();
                return le;
            }
        };

        let mut out = [0u8; 4];
        out[0..2].copy_from_slice(&adp.to_le_bytes());
        out[2..4].copy_from_slice(&ado.to_le_bytes());
        out
    }

    /// The single-byte command type code carried in the datagram header.
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Aprd { .. } => 0x01,
            Self::Apwr { .. } => 0x02,
            Self::Fprd { .. } => 0x04,
            Self::Fpwr { .. } => 0x05,
            Self::Frmw { .. } => 0x0e,
            Self::Brd { .. } => 0x07,
            Self::Bwr { .. } => 0x08,
            Self::Lrw { .. } => 0x0c,
        }
    }

    /// Whether a slave response for this command carries back data, or only a working counter.
    ///
    /// Per §4.D, write-only commands (APWR/FPWR/BWR/LWR — this crate has no standalone LWR, but
    /// the rule is the same for the write-half of LRW) never copy their reply payload back into
    /// the datagram's buffer, since the slave's "reply" is simply its working counter.
    pub fn is_write_only(&self) -> bool {
        matches!(self, Self::Apwr { .. } | Self::Fpwr { .. } | Self::Bwr { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increment_address_is_twos_complement_position() {
        let cmd = Command::Aprd { position: 2, offset: 0x0130 };

        let addr = cmd.address_bytes();

        assert_eq!(u16::from_le_bytes([addr[0], addr[1]]), 0xfffe);
        assert_eq!(u16::from_le_bytes([addr[2], addr[3]]), 0x0130);
    }

    #[test]
    fn lrw_address_is_flat_logical_u32() {
        let cmd = Command::Lrw { logical_address: 0x0000_0100 };

        assert_eq!(cmd.address_bytes(), 0x0000_0100u32.to_le_bytes());
    }
}
