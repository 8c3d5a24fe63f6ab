//! Error type returned by wire pack/unpack operations.

use core::fmt;

/// An error packing or unpacking a wire type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The source or destination buffer was shorter than the item's packed length.
    TooShort,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => f.write_str("buffer too short for wire item"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WireError {}
