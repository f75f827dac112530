//! KNX group address.
//!
//! Group addresses appear as the destination of multicast telegrams. The
//! interface layer only needs to recognize them and count them
//! separately from unicast traffic, so the address stays in its raw
//! 16-bit form (`MMMMMIII SSSSSSSS`).

/// KNX Group Address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Get the raw u16 representation of the address.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }
}

impl From<u16> for GroupAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline(always)]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversions() {
        let addr = GroupAddress::from(0x0A03);
        assert_eq!(addr.raw(), 0x0A03);
        assert_eq!(u16::from(addr), 0x0A03);
    }
}
