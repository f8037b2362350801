/// Log the channel state at the trace level, or at debug level with
/// the `debug_channel_state` feature.
#[macro_export]
macro_rules! trace_channel_state {
    ($chan: expr) => {
        #[cfg(not(feature = "debug_channel_state"))]
        log::trace!("{}:\n{:#?}", function!(), $chan);
        #[cfg(feature = "debug_channel_state")]
        log::debug!("{}:\n{:#?}", function!(), $chan);
    };
}

/// Logs the arguments at debug level.
#[macro_export]
macro_rules! debug_vals {
    ( $($arg:tt)* ) => {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}: {}", short_function!(), vals_str!($($arg)*));
        }
    };
}

/// Logs the arguments at debug level.
#[macro_export]
macro_rules! debug_failed_vals {
    ( $($arg:tt)* ) => {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{} failed: {}", short_function!(), vals_str!($($arg)*));
        }
    };
}
