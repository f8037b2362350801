/// Logging macros
#[macro_use]
#[allow(unused_macros)]
pub mod macro_logger;
#[macro_use]
/// Debugging
pub mod debug_utils;
/// In-memory chain and peer services
pub mod loopback;
#[allow(missing_docs)]
#[cfg(feature = "test_utils")]
#[macro_use]
pub mod test_utils;

/// Millisatoshis per satoshi
pub const MSAT_PER_SAT: u64 = 1000;
