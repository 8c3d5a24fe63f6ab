//! Internal logging/assert helpers, kept in one place so the rest of the crate doesn't have to
//! think about whether the `log` feature is enabled.

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::trace!($($arg)*);
    };
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
    };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
    };
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::error!($($arg)*);
    };
}

/// `.unwrap()` with a fixed message, used at call sites where the `Err` case is an internal
/// invariant violation (e.g. a slice length already checked by the caller) rather than a value
/// the caller should handle.
macro_rules! unwrap {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(_e) => panic!(concat!(stringify!($expr), " failed")),
        }
    };
}

#[allow(unused_imports)]
pub(crate) use {debug, error, trace, unwrap, warn};
