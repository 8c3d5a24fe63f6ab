//! Traits used to pack/unpack structs from EtherCAT frames on the wire.
//!
//! This crate is intentionally minimal: it exists only to give the handful of bit-packed wire
//! structures used by [`ethercat-master`](https://crates.io/crates/ethercat-master) — the frame
//! header and the per-datagram length/flags word — a shared, allocation-free pack/unpack
//! interface instead of ad-hoc byte twiddling at every call site.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]

mod error;
mod impls;

pub use error::WireError;

/// A type to be sent/received on the wire, according to EtherCAT spec rules (packed bits, little
/// endian).
pub trait EtherCatWire<'a>: Sized {
    /// Pack the type and write it into the beginning of `buf`.
    ///
    /// The default implementation of this method will return an error if the buffer is not long
    /// enough.
    fn pack_to_slice<'buf>(&self, buf: &'buf mut [u8]) -> Result<&'buf [u8], WireError> {
        if buf.len() < self.packed_len() {
            return Err(WireError::TooShort);
        }

        Ok(self.pack_to_slice_unchecked(buf))
    }

    /// Pack the type and write it into the beginning of `buf`.
    ///
    /// # Panics
    ///
    /// This method must panic if `buf` is too short to hold the packed data.
    fn pack_to_slice_unchecked<'buf>(&self, buf: &'buf mut [u8]) -> &'buf [u8];

    /// Unpack this type from the beginning of the given buffer.
    fn unpack_from_slice(buf: &'a [u8]) -> Result<Self, WireError>;

    /// Get the length in bytes of this item when packed.
    fn packed_len(&self) -> usize;
}

/// Implemented for types with a known size at compile time (pretty much everything that isn't a
/// `&[u8]`).
pub trait EtherCatWireSized<'a>: EtherCatWire<'a> {
    /// Packed size in bytes.
    const BYTES: usize;

    /// Used to define an array of the correct length. This type should ALWAYS be of the form `[u8;
    /// N]` where `N` is a fixed value or const generic as per the type this trait is implemented
    /// on.
    type Arr: AsRef<[u8]> + AsMut<[u8]>;

    /// Pack this item to a fixed sized array.
    fn pack(&self) -> Self::Arr;

    /// Create a buffer sized to contain the packed representation of this item.
    fn buffer() -> Self::Arr;
}
