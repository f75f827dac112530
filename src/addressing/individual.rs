//! KNX individual address.
//!
//! Individual addresses identify a transceiver on the twisted-pair bus and
//! are what the `Address` option reads and writes.
//! Format: Area.Line.Device (e.g., 1.1.5)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Device: 0-255 (8 bits)
//!
//! On the option path the address travels as two bytes, high byte first.

use crate::error::{NetError, Result};
use core::fmt;

/// KNX Individual Address (Area.Line.Device)
///
/// # Examples
///
/// ```
/// use knx_netif::IndividualAddress;
///
/// let addr = IndividualAddress::new(1, 1, 5).unwrap();
/// assert_eq!(addr.to_string(), "1.1.5");
///
/// let addr = IndividualAddress::from(0x1105u16);
/// assert_eq!(addr.area(), 1);
/// assert_eq!(addr.device(), 5);
///
/// let addr: IndividualAddress = "1.1.5".parse().unwrap();
/// assert_eq!(addr.to_bytes(), [0x11, 0x05]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;
    /// Width of the address on the option path
    pub const LEN: usize = 2;

    /// Create a new Individual Address from components.
    ///
    /// # Errors
    ///
    /// Returns an invalid-value error if area or line exceed 15.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(NetError::invalid_value());
        }
        let raw = (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device);
        Ok(Self { raw })
    }

    /// Create from the raw 16-bit form, usable in const context.
    #[inline(always)]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// Get the raw u16 representation of the address.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Get the area component (0-15).
    #[inline(always)]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Get the line component (0-15).
    #[inline(always)]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Get the device component (0-255).
    #[inline(always)]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Big-endian byte form used on the option path and in telegram headers.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Write the address into an option buffer.
    ///
    /// # Errors
    ///
    /// Returns a buffer-too-small error if `buf` holds fewer than 2 bytes.
    #[inline]
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let out = buf.get_mut(..Self::LEN).ok_or_else(NetError::buffer_too_small)?;
        out.copy_from_slice(&self.to_bytes());
        Ok(Self::LEN)
    }

    /// Read an address from the first two bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a buffer-too-small error if `buf` holds fewer than 2 bytes.
    #[inline]
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self::from(u16::from_be_bytes([*hi, *lo]))),
            _ => Err(NetError::buffer_too_small()),
        }
    }

    /// Parse a `set(Address)` value, which must be exactly two bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid-length error for any other length.
    pub fn from_option(value: &[u8]) -> Result<Self> {
        if value.len() != Self::LEN {
            return Err(NetError::invalid_length());
        }
        Self::decode(value)
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline(always)]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.').map(|p| p.parse::<u8>().ok());

        let (Some(Some(area)), Some(Some(line)), Some(Some(device)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(NetError::invalid_value());
        };

        Self::new(area, line, device)
    }
}
