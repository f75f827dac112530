//! Network device abstraction for KNX transceivers.
//!
//! A driver implements [`NetDev`] for its hardware and only special-cases
//! the options it actually supports. Everything else falls through to the
//! class-wide fallback in [`knx`], which answers "not supported" without
//! touching the device or the caller's buffer.
//!
//! Devices are parked in a [`DeviceSlot`] until an interface task binds
//! them. Binding moves the driver out of the slot, so exactly one task can
//! drive a given transceiver at a time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_netif::netdev::{DeviceSlot, NetDev};
//!
//! static TPUART: DeviceSlot<CriticalSectionRawMutex, Tpuart<Uart>> =
//!     DeviceSlot::new(Tpuart::new(uart));
//! ```

pub mod knx;
#[cfg(any(test, feature = "std"))]
pub mod mock;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::Result;
use crate::netopt::NetOpt;

/// Event reported by a device to its interface task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetDevEvent {
    /// A complete telegram is waiting, see [`NetDev::pending`]
    RxComplete,
    /// Reception stopped before the telegram was complete
    RxIncomplete,
    /// The transceiver reported a state indication
    State(u8),
    /// The transceiver is about to lose bus power
    Save,
    /// A transmission finished
    TxComplete,
    /// A transmission was not confirmed in time
    TxTimeout,
}

/// KNX-class network device.
///
/// Hardware I/O happens in the async methods; the interface task is the
/// only caller. `get` and `set` default to the class fallback, so a
/// driver overrides them to handle its own options and delegates the rest
/// with `knx::get(self, opt, value)`.
///
/// Every driver must answer `get(NetOpt::Address)`.
#[allow(async_fn_in_trait, reason = "futures run on a single-threaded executor")]
pub trait NetDev {
    /// Device class name, used to build default interface names.
    const CLASS: &'static str = "knx";

    /// Bring the transceiver into a known state.
    ///
    /// # Errors
    ///
    /// Returns a device error if the transceiver does not respond.
    async fn init(&mut self) -> Result<()>;

    /// Transmit one telegram.
    ///
    /// # Returns
    ///
    /// Number of bytes sent.
    ///
    /// # Errors
    ///
    /// Returns a device error if the telegram was not confirmed.
    async fn send(&mut self, telegram: &[u8]) -> Result<usize>;

    /// Wait until the device has something to report.
    ///
    /// Must be cancel-safe: the interface task races it against incoming
    /// requests and drops the future when a request wins.
    async fn wait_event(&mut self) -> NetDevEvent;

    /// Size of the received telegram waiting to be read, 0 if none.
    fn pending(&self) -> usize;

    /// Copy the waiting telegram into `buf` and consume it.
    ///
    /// # Errors
    ///
    /// Returns a buffer-too-small error if `buf` cannot hold the telegram,
    /// which is dropped in that case.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard the waiting telegram, if any.
    fn drop_pending(&mut self);

    /// Read an option into `value`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `unsupported` for options the device does not implement.
    async fn get(&mut self, opt: NetOpt, value: &mut [u8]) -> Result<usize> {
        knx::get(&*self, opt, value)
    }

    /// Write an option from `value`, returning the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns `unsupported` for options the device does not implement.
    async fn set(&mut self, opt: NetOpt, value: &[u8]) -> Result<usize> {
        knx::set(&*self, opt, value)
    }
}

/// Parking place for a device that is not bound to an interface.
pub struct DeviceSlot<M: RawMutex, D> {
    inner: Mutex<M, RefCell<Option<D>>>,
}

impl<M: RawMutex, D> DeviceSlot<M, D> {
    /// Park `device` until an interface binds it.
    pub const fn new(device: D) -> Self {
        Self { inner: Mutex::new(RefCell::new(Some(device))) }
    }

    /// Whether an interface task currently owns the device.
    pub fn is_bound(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().is_none())
    }

    /// Run `f` on the parked device.
    ///
    /// Returns `None` while the device is bound to an interface; use the
    /// interface's `get`/`set` then.
    pub fn with<R>(&self, f: impl FnOnce(&mut D) -> R) -> Option<R> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }

    /// Take the device out of the slot for binding.
    pub(crate) fn claim(&self) -> Option<D> {
        self.inner.lock(|cell| cell.borrow_mut().take())
    }

    /// Return a device after its interface task ended.
    pub(crate) fn release(&self, device: D) {
        self.inner.lock(|cell| {
            cell.borrow_mut().replace(device);
        });
    }
}

impl<M: RawMutex, D> core::fmt::Debug for DeviceSlot<M, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceSlot").field("bound", &self.is_bound()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockDevice;
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn test_slot_claim_release() {
        let slot: DeviceSlot<NoopRawMutex, MockDevice> = DeviceSlot::new(MockDevice::new());
        assert!(!slot.is_bound());

        let dev = slot.claim().unwrap();
        assert!(slot.is_bound());
        assert!(slot.claim().is_none());
        assert!(slot.with(|_| ()).is_none());

        slot.release(dev);
        assert!(!slot.is_bound());
        assert_eq!(slot.with(|d| d.sent().len()), Some(0));
    }

    #[test]
    fn test_unhandled_option_uses_fallback() {
        let mut dev = MockDevice::new();
        let mut buf = [0x5Au8; 4];
        let err = embassy_futures::block_on(dev.get(NetOpt::Retrans, &mut buf)).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(buf, [0x5A; 4]);
    }
}
