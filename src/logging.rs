//! Unified logging macro for the interface layer
//!
//! `knx_log!` selects between `log::` (USB logger) and `defmt::` based on
//! the active feature flags. With neither backend enabled (host builds,
//! unit tests) the macro compiles to nothing but still borrows its
//! arguments, so call sites do not trigger unused-variable lints.
//!
//! # Usage
//!
//! ```rust,ignore
//! knx_log!(info, "interface {} created", index);
//! knx_log!(warn, "device init failed: {}", err);
//! ```
//!
//! Only pass values that implement both `Display` and `defmt::Format`
//! (integers, `&str`, addresses, [`NetError`](crate::error::NetError)).
//!
//! # Feature Flags
//!
//! - `usb-logger` - Uses `log::` crate (for USB serial debugging)
//! - `defmt` - Uses `defmt::` (more efficient for embedded)

#[macro_export]
#[cfg(feature = "usb-logger")]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { log::trace!($($arg)*) };
}

#[macro_export]
#[cfg(all(feature = "defmt", not(feature = "usb-logger")))]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
}

#[macro_export]
#[cfg(not(any(feature = "defmt", feature = "usb-logger")))]
macro_rules! knx_log {
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        $( let _ = &$arg; )*
    }};
}
