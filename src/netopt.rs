//! Stack-wide option identifiers.
//!
//! A device class implements a subset of these; everything else is
//! answered with the uniform "not supported" error by the fallback in
//! [`crate::netdev::knx`].

/// Largest option value carried between the stack and an interface task.
pub const OPTION_VALUE_MAX: usize = 32;

/// Option identifier understood by `get`/`set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum NetOpt {
    /// Individual address of the transceiver (2 bytes, big-endian)
    Address,
    /// Length of a link-layer address in bytes (`u16`)
    AddrLen,
    /// Length of the source address used when sending (`u16`)
    SrcLen,
    /// Device type (`u16`, see [`DeviceType`])
    DeviceType,
    /// Whether the medium is wired ([`NetOptEnable`])
    IsWired,
    /// Transceiver busy flag ([`NetOptEnable`])
    PhyBusy,
    /// Hardware CRC on received telegrams ([`NetOptEnable`])
    Checksum,
    /// Add an address to, or read, the source filter
    L2Filter,
    /// Remove an address from the source filter
    L2FilterRm,
    /// Link state ([`NetOptEnable`])
    Link,
    /// Largest PDU the device can send (`u16`)
    MaxPduSize,
    /// Number of retransmissions (`u8`)
    Retrans,
    /// Receive all telegrams regardless of destination ([`NetOptEnable`])
    Promiscuous,
}

/// Boolean option value, encoded as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum NetOptEnable {
    Disable = 0,
    Enable = 1,
}

impl NetOptEnable {
    /// Width of the encoded value.
    pub const LEN: usize = 1;

    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enable)
    }

    /// Write the value into an option buffer.
    ///
    /// # Errors
    ///
    /// Returns a buffer-too-small error if `buf` is empty.
    pub fn encode(self, buf: &mut [u8]) -> crate::Result<usize> {
        let slot = buf.first_mut().ok_or_else(crate::NetError::buffer_too_small)?;
        *slot = self as u8;
        Ok(Self::LEN)
    }

    /// Parse a `set` value, which must be exactly one byte.
    ///
    /// Any non-zero byte enables.
    ///
    /// # Errors
    ///
    /// Returns an invalid-length error for any other length.
    pub fn from_option(value: &[u8]) -> crate::Result<Self> {
        match value {
            [b] => Ok(Self::from(*b != 0)),
            _ => Err(crate::NetError::invalid_length()),
        }
    }
}

impl From<bool> for NetOptEnable {
    fn from(on: bool) -> Self {
        if on { Self::Enable } else { Self::Disable }
    }
}

/// Value of [`NetOpt::DeviceType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum DeviceType {
    Unknown = 0,
    Knx = 0x4B58,
}

impl DeviceType {
    pub const fn value(self) -> u16 {
        self as u16
    }
}

/// Write a `u16` option value in native byte order.
pub(crate) fn encode_u16(value: u16, buf: &mut [u8]) -> crate::Result<usize> {
    let out = buf.get_mut(..2).ok_or_else(crate::NetError::buffer_too_small)?;
    out.copy_from_slice(&value.to_ne_bytes());
    Ok(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_encoding() {
        let mut buf = [0xAAu8; 2];
        assert_eq!(NetOptEnable::Enable.encode(&mut buf).unwrap(), 1);
        assert_eq!(buf, [1, 0xAA]);
        assert!(NetOptEnable::Disable.encode(&mut []).is_err());
    }

    #[test]
    fn test_enable_from_option() {
        assert_eq!(NetOptEnable::from_option(&[0]).unwrap(), NetOptEnable::Disable);
        assert_eq!(NetOptEnable::from_option(&[7]).unwrap(), NetOptEnable::Enable);
        assert!(NetOptEnable::from_option(&[]).is_err());
        assert!(NetOptEnable::from_option(&[1, 1]).is_err());
    }

    #[test]
    fn test_encode_u16() {
        let mut buf = [0u8; 2];
        encode_u16(2, &mut buf).unwrap();
        assert_eq!(u16::from_ne_bytes(buf), 2);
        assert!(encode_u16(2, &mut [0u8; 1]).is_err());
    }
}
