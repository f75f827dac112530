//! Minimal KNX TP1 telegram handling for the interface layer.
//!
//! The interface task only needs to tell telegrams from noise, check the
//! trailing checksum and find the source and destination addresses. Field
//! layouts:
//!
//! ```text
//! standard: CTRL  SRC SRC DST DST NPCI ...          CS   (8-23 bytes)
//! extended: CTRL  CTRLE SRC SRC DST DST LEN ...     CS   (9-263 bytes)
//! poll:     0xF0  SRC SRC DST DST N CS                   (7 bytes)
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{NetError, Result};

/// Largest telegram (extended frame with 254 bytes of payload).
pub const TELEGRAM_MAX_LEN: usize = 263;

const CONTROL_POLL: u8 = 0xF0;
const CONTROL_STANDARD: u8 = 0x90;
const CONTROL_EXTENDED: u8 = 0x10;

/// Telegram frame type, derived from the control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelegramType {
    Standard,
    Extended,
    Poll,
}

impl TelegramType {
    /// Classify a control byte.
    pub const fn from_control(control: u8) -> Option<Self> {
        if control == CONTROL_POLL {
            Some(Self::Poll)
        } else if control & CONTROL_STANDARD == CONTROL_STANDARD {
            Some(Self::Standard)
        } else if control & CONTROL_EXTENDED == CONTROL_EXTENDED {
            Some(Self::Extended)
        } else {
            None
        }
    }

    /// Accepted total length range, checksum included.
    pub const fn length_bounds(self) -> (usize, usize) {
        match self {
            Self::Standard => (8, 23),
            Self::Extended => (9, TELEGRAM_MAX_LEN),
            Self::Poll => (7, 7),
        }
    }

    const fn src_offset(self) -> usize {
        match self {
            Self::Standard | Self::Poll => 1,
            Self::Extended => 2,
        }
    }
}

/// Destination of a telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    Individual(IndividualAddress),
    Group(GroupAddress),
}

impl Destination {
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }
}

/// XOR checksum over `bytes`, seeded with 0xFF.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xFF, |sum, b| sum ^ b)
}

/// Whether the trailing byte matches the checksum of the rest.
pub fn is_checksum_valid(telegram: &[u8]) -> bool {
    match telegram.split_last() {
        Some((last, body)) => checksum(body) == *last,
        None => false,
    }
}

/// Recompute and store the trailing checksum.
pub fn update_checksum(telegram: &mut [u8]) {
    if let Some((last, body)) = telegram.split_last_mut() {
        *last = checksum(body);
    }
}

/// Borrowed view of a telegram whose type and length were checked.
#[derive(Debug, Clone, Copy)]
pub struct Telegram<'a> {
    bytes: &'a [u8],
    kind: TelegramType,
}

impl<'a> Telegram<'a> {
    /// Check type and length, not the checksum.
    ///
    /// # Errors
    ///
    /// Returns a bad-message error for an unknown control byte or a length
    /// outside the bounds of the frame type.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let control = *bytes.first().ok_or_else(NetError::bad_message)?;
        let kind = TelegramType::from_control(control).ok_or_else(NetError::bad_message)?;
        let (min, max) = kind.length_bounds();
        if !(min..=max).contains(&bytes.len()) {
            return Err(NetError::bad_message());
        }
        Ok(Self { bytes, kind })
    }

    /// Check type, length and checksum.
    ///
    /// # Errors
    ///
    /// Returns a bad-message error if any of the checks fails.
    pub fn parse_checked(bytes: &'a [u8]) -> Result<Self> {
        let telegram = Self::parse(bytes)?;
        if !is_checksum_valid(bytes) {
            return Err(NetError::bad_message());
        }
        Ok(telegram)
    }

    pub fn kind(&self) -> TelegramType {
        self.kind
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn word(&self, offset: usize) -> u16 {
        // Bounds were checked in parse()
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    pub fn source(&self) -> IndividualAddress {
        IndividualAddress::from(self.word(self.kind.src_offset()))
    }

    pub fn is_group_addressed(&self) -> bool {
        match self.kind {
            TelegramType::Standard => self.bytes[5] & 0x80 != 0,
            TelegramType::Extended => self.bytes[1] & 0x80 != 0,
            TelegramType::Poll => false,
        }
    }

    pub fn destination(&self) -> Destination {
        let raw = self.word(self.kind.src_offset() + 2);
        if self.is_group_addressed() {
            Destination::Group(GroupAddress::from(raw))
        } else {
            Destination::Individual(IndividualAddress::from(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1.1.5 -> 1/2/3, GroupValue_Write(1)
    const GROUP_WRITE: [u8; 9] = [0xBC, 0x11, 0x05, 0x0A, 0x03, 0xE1, 0x00, 0x81, 0x00];

    fn with_checksum<const N: usize>(mut bytes: [u8; N]) -> [u8; N] {
        update_checksum(&mut bytes);
        bytes
    }

    #[test]
    fn test_classify_control() {
        assert_eq!(TelegramType::from_control(0xF0), Some(TelegramType::Poll));
        assert_eq!(TelegramType::from_control(0xBC), Some(TelegramType::Standard));
        assert_eq!(TelegramType::from_control(0x3C), Some(TelegramType::Extended));
        assert_eq!(TelegramType::from_control(0x0B), None);
    }

    #[test]
    fn test_checksum() {
        let telegram = with_checksum(GROUP_WRITE);
        assert!(is_checksum_valid(&telegram));

        let mut corrupted = telegram;
        corrupted[7] ^= 0x01;
        assert!(!is_checksum_valid(&corrupted));
        assert!(!is_checksum_valid(&[]));
    }

    #[test]
    fn test_standard_addresses() {
        let bytes = with_checksum(GROUP_WRITE);
        let telegram = Telegram::parse_checked(&bytes).unwrap();
        assert_eq!(telegram.kind(), TelegramType::Standard);
        assert_eq!(telegram.source(), IndividualAddress::from(0x1105));
        assert_eq!(telegram.destination(), Destination::Group(GroupAddress::from(0x0A03)));
    }

    #[test]
    fn test_extended_addresses() {
        let bytes = with_checksum([0x3C, 0x60, 0x12, 0x34, 0x11, 0x01, 0x01, 0x00, 0x80, 0x00]);
        let telegram = Telegram::parse_checked(&bytes).unwrap();
        assert_eq!(telegram.kind(), TelegramType::Extended);
        assert_eq!(telegram.source(), IndividualAddress::from(0x1234));
        assert_eq!(
            telegram.destination(),
            Destination::Individual(IndividualAddress::from(0x1101))
        );
    }

    #[test]
    fn test_length_bounds() {
        assert!(Telegram::parse(&GROUP_WRITE[..7]).is_err());
        assert!(Telegram::parse(&[0xBC; 24]).is_err());
        assert!(Telegram::parse(&[0xF0, 0, 0, 0, 0, 0]).is_err());
        assert!(Telegram::parse(&[0xF0, 0x11, 0x01, 0x11, 0x02, 0x01, 0x00]).is_ok());
        assert!(Telegram::parse(&[]).is_err());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let err = Telegram::parse_checked(&GROUP_WRITE).unwrap_err();
        assert!(err.is_argument());
    }
}
