//! Mock KNX device for testing.
//!
//! `MockDevice` stands in for a transceiver in unit tests and in
//! downstream crates (with the `std` feature). It:
//! - Answers `Address` and `PhyBusy` like a real driver and delegates the
//!   rest to the fallback
//! - Records every telegram passed to `send()`
//! - Delivers telegrams pushed onto an optional [`MockBus`] as received
//! - Can simulate a failing `init()` or a driver without `Address`
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_netif::netdev::mock::MockDevice;
//! use knx_netif::netdev::NetDev;
//! use knx_netif::netopt::NetOpt;
//!
//! let mut dev = MockDevice::new();
//! let mut buf = [0u8; 2];
//! let n = embassy_futures::block_on(dev.get(NetOpt::Address, &mut buf)).unwrap();
//! assert_eq!(n, 2);
//! ```

use std::collections::VecDeque;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::addressing::IndividualAddress;
use crate::error::{NetError, Result};
use crate::netdev::{knx, NetDev, NetDevEvent};
use crate::netopt::{NetOpt, NetOptEnable};

/// Telegrams "on the wire" towards a mock device.
pub type MockBus = Channel<CriticalSectionRawMutex, Vec<u8>, 4>;

/// Mock transceiver for testing the interface layer without hardware.
pub struct MockDevice {
    address: IndividualAddress,
    busy: bool,
    implements_address: bool,
    fail_init: bool,
    init_calls: usize,
    sent: Vec<Vec<u8>>,
    options: Vec<NetOpt>,
    rx: VecDeque<Vec<u8>>,
    bus: Option<&'static MockBus>,
}

impl core::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockDevice")
            .field("address", &self.address)
            .field("busy", &self.busy)
            .field("sent", &self.sent.len())
            .field("rx", &self.rx.len())
            .field("bus", &self.bus.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a mock device with address 15.15.255.
    pub fn new() -> Self {
        Self {
            address: IndividualAddress::from(0xFFFF),
            busy: false,
            implements_address: true,
            fail_init: false,
            init_calls: 0,
            sent: Vec::new(),
            options: Vec::new(),
            rx: VecDeque::new(),
            bus: None,
        }
    }

    /// Receive telegrams from `bus` while bound to an interface.
    #[must_use]
    pub fn with_bus(mut self, bus: &'static MockBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Behave like a driver that forgot to handle `Address`.
    #[must_use]
    pub fn without_address(mut self) -> Self {
        self.implements_address = false;
        self
    }

    /// Make `init()` fail with a timeout.
    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Queue a telegram as already received.
    pub fn push_rx(&mut self, telegram: &[u8]) {
        self.rx.push_back(telegram.to_vec());
    }

    pub fn address(&self) -> IndividualAddress {
        self.address
    }

    /// Telegrams passed to `send()`, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Options the device answered itself, in call order.
    pub fn options_seen(&self) -> &[NetOpt] {
        &self.options
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls
    }
}

impl NetDev for MockDevice {
    const CLASS: &'static str = "mock";

    async fn init(&mut self) -> Result<()> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(NetError::timeout());
        }
        Ok(())
    }

    async fn send(&mut self, telegram: &[u8]) -> Result<usize> {
        self.sent.push(telegram.to_vec());
        Ok(telegram.len())
    }

    async fn wait_event(&mut self) -> NetDevEvent {
        if !self.rx.is_empty() {
            return NetDevEvent::RxComplete;
        }
        match self.bus {
            Some(bus) => {
                let telegram = bus.receive().await;
                self.rx.push_back(telegram);
                NetDevEvent::RxComplete
            }
            None => core::future::pending().await,
        }
    }

    fn pending(&self) -> usize {
        self.rx.front().map_or(0, Vec::len)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(telegram) = self.rx.pop_front() else {
            return Ok(0);
        };
        let out = buf.get_mut(..telegram.len()).ok_or_else(NetError::buffer_too_small)?;
        out.copy_from_slice(&telegram);
        Ok(telegram.len())
    }

    fn drop_pending(&mut self) {
        self.rx.pop_front();
    }

    async fn get(&mut self, opt: NetOpt, value: &mut [u8]) -> Result<usize> {
        match opt {
            NetOpt::Address if self.implements_address => {
                self.options.push(opt);
                self.address.encode(value)
            }
            NetOpt::PhyBusy => {
                self.options.push(opt);
                NetOptEnable::from(self.busy).encode(value)
            }
            _ => knx::get(&*self, opt, value),
        }
    }

    async fn set(&mut self, opt: NetOpt, value: &[u8]) -> Result<usize> {
        match opt {
            NetOpt::Address if self.implements_address => {
                self.options.push(opt);
                self.address = IndividualAddress::from_option(value)?;
                Ok(IndividualAddress::LEN)
            }
            NetOpt::PhyBusy => {
                self.options.push(opt);
                self.busy = NetOptEnable::from_option(value)?.is_enabled();
                Ok(NetOptEnable::LEN)
            }
            _ => knx::set(&*self, opt, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_address_set_then_get() {
        let mut dev = MockDevice::new();
        assert_eq!(block_on(dev.set(NetOpt::Address, &[0x11, 0x05])).unwrap(), 2);

        let mut buf = [0u8; 4];
        assert_eq!(block_on(dev.get(NetOpt::Address, &mut buf)).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x11, 0x05]);
        assert_eq!(dev.options_seen(), &[NetOpt::Address, NetOpt::Address]);
    }

    #[test]
    fn test_without_address_falls_through() {
        let mut dev = MockDevice::new().without_address();
        let mut buf = [0u8; 2];
        assert!(block_on(dev.get(NetOpt::Address, &mut buf)).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_recv_too_small_drops_telegram() {
        let mut dev = MockDevice::new();
        dev.push_rx(&[1, 2, 3, 4]);
        dev.push_rx(&[5]);
        assert_eq!(dev.pending(), 4);

        let mut small = [0u8; 2];
        assert!(dev.recv(&mut small).is_err());
        assert_eq!(dev.pending(), 1);

        let mut buf = [0u8; 8];
        assert_eq!(dev.recv(&mut buf).unwrap(), 1);
        assert_eq!(dev.pending(), 0);
    }

    #[test]
    fn test_send_is_recorded() {
        let mut dev = MockDevice::new();
        assert_eq!(block_on(dev.send(&[0xBC, 0x11])).unwrap(), 2);
        assert_eq!(dev.sent(), &[vec![0xBC, 0x11]]);
    }
}
