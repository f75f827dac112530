//! Convenience macros for KNX addresses.
//!
//! `ia!` validates its components at compile time, which makes it the
//! preferred way to write addresses in filters, tests and firmware
//! configuration.

/// Creates an [`IndividualAddress`](crate::addressing::IndividualAddress)
/// from its `area.line.device` components.
///
/// # Syntax
///
/// ```text
/// ia!(area, line, device)
/// ```
///
/// Where:
/// - `area`: Area (0-15)
/// - `line`: Line (0-15)
/// - `device`: Device (0-255)
///
/// # Examples
///
/// ```
/// use knx_netif::ia;
///
/// let own = ia!(1, 1, 1);
/// assert_eq!(u16::from(own), 0x1101);
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // Area > 15
/// let addr = knx_netif::ia!(16, 0, 1);
/// ```
#[macro_export]
macro_rules! ia {
    ($area:literal, $line:literal, $device:literal $(,)?) => {{
        const _: () = {
            if $area > 15 {
                panic!("Area must be 0-15");
            }
            if $line > 15 {
                panic!("Line must be 0-15");
            }
            if $device > 255 {
                panic!("Device must be 0-255");
            }
        };

        // AAAALLLL DDDDDDDD
        const RAW: u16 = (($area & 0x0F) << 12) | (($line & 0x0F) << 8) | ($device & 0xFF);
        $crate::addressing::IndividualAddress::from(RAW)
    }};
}
