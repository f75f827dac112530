//! Fallback option handling shared by every KNX device driver.
//!
//! Drivers call these for any option they do not handle themselves. The
//! answer is always the same "not supported" error: the caller's buffer is
//! never read or written and the device is never touched.
//!
//! `NetOpt::Address` has no fallback. A driver that reaches [`get`] for it
//! is rejected when an interface is created on it.

use crate::error::{NetError, Result};
use crate::netdev::NetDev;
use crate::netopt::NetOpt;

/// Read an option the device class does not implement.
///
/// `value.len()` is the caller's capacity; no byte of it is written.
///
/// # Errors
///
/// Always returns the `unsupported` capability error.
#[inline]
pub fn get<D: NetDev + ?Sized>(_dev: &D, _opt: NetOpt, _value: &mut [u8]) -> Result<usize> {
    Err(NetError::unsupported())
}

/// Write an option the device class does not implement.
///
/// # Errors
///
/// Always returns the `unsupported` capability error.
#[inline]
pub fn set<D: NetDev + ?Sized>(_dev: &D, _opt: NetOpt, _value: &[u8]) -> Result<usize> {
    Err(NetError::unsupported())
}
