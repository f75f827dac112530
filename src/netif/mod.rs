//! Network interfaces bound to KNX devices.
//!
//! Each interface is one [`InterfaceTask`] that owns one device. The stack
//! talks to it only through the [`NetIfTable`], which keeps the interface
//! records and a mailbox per slot:
//!
//! ```text
//!  caller ── get/set/send ──▶ requests ──▶ InterfaceTask ──▶ NetDev
//!         ◀──────────────── replies  ◀──┘      │
//!  caller ◀── recv ───────── rx queue ◀────────┘
//! ```
//!
//! Calls into one interface are serialised by its call lock. Different
//! interfaces never share a lock beyond the short record lookups.
//!
//! ## Example
//!
//! ```rust,ignore
//! static NETIFS: NetIfTable<CriticalSectionRawMutex, 2> = NetIfTable::new();
//!
//! let id = knx::create(&NETIFS, &mut spawner, stack, 4, None, &TPUART).await?;
//! let mut addr = [0u8; 2];
//! NETIFS.get(id, NetOpt::Address, &mut addr).await?;
//! ```

pub mod knx;
#[cfg(any(test, feature = "std"))]
pub mod mock;
mod task;

pub use task::InterfaceTask;

use core::cell::{Cell, RefCell};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::addressing::IndividualAddress;
use crate::error::{NetError, Result};
use crate::netif::knx::TaskId;
use crate::netopt::{NetOpt, OPTION_VALUE_MAX};
use crate::telegram::{Destination, Telegram, TELEGRAM_MAX_LEN};

/// Longest interface name.
pub const NETIF_NAME_MAX: usize = 16;

/// Received frames buffered per interface before new ones are dropped.
pub const RX_QUEUE_LEN: usize = 4;

pub(crate) type OptionValue = heapless::Vec<u8, OPTION_VALUE_MAX>;
pub(crate) type TelegramBuf = heapless::Vec<u8, TELEGRAM_MAX_LEN>;

/// Handle to a registered interface.
///
/// Handles are invalidated by [`NetIfTable::destroy`]; a later interface
/// in the same slot gets a new generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetIfId {
    index: usize,
    generation: u32,
}

impl NetIfId {
    /// Slot index of the interface in its table.
    pub const fn index(self) -> usize {
        self.index
    }
}

/// Lifecycle flags of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceState {
    /// Visible to the stack
    pub registered: bool,
    /// The interface task is serving requests
    pub running: bool,
}

/// The stack's view of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: heapless::String<NETIF_NAME_MAX>,
    pub task: TaskId,
    pub priority: u8,
    /// `NetDev::CLASS` of the bound device
    pub device_class: &'static str,
    pub state: InterfaceState,
}

/// Per-interface traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetStats {
    pub rx_count: u32,
    pub rx_bytes: u32,
    pub tx_unicast_count: u32,
    pub tx_mcast_count: u32,
    pub tx_success: u32,
    pub tx_failed: u32,
    pub tx_bytes: u32,
}

impl NetStats {
    const ZERO: Self = Self {
        rx_count: 0,
        rx_bytes: 0,
        tx_unicast_count: 0,
        tx_mcast_count: 0,
        tx_success: 0,
        tx_failed: 0,
        tx_bytes: 0,
    };
}

/// A received telegram with its addresses already extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub src: IndividualAddress,
    pub dst: Destination,
    /// The complete telegram, checksum included
    pub telegram: heapless::Vec<u8, TELEGRAM_MAX_LEN>,
}

impl Frame {
    /// Build a frame from a telegram that passed validation.
    pub(crate) fn new(telegram: &Telegram<'_>) -> Result<Self> {
        Ok(Self {
            src: telegram.source(),
            dst: telegram.destination(),
            telegram: heapless::Vec::from_slice(telegram.as_bytes())
                .map_err(|_| NetError::invalid_length())?,
        })
    }
}

pub(crate) enum Request {
    Get { opt: NetOpt, max_len: usize },
    Set { opt: NetOpt, value: OptionValue },
    Send(TelegramBuf),
    Shutdown,
}

pub(crate) enum Reply {
    Get(Result<OptionValue>),
    Set(Result<usize>),
    Send(Result<usize>),
    Shutdown,
}

/// Requests and replies are tagged so a reply left behind by a cancelled
/// call is never handed to the next caller.
pub(crate) type Tag = u32;

pub(crate) struct Mailbox<M: RawMutex> {
    /// Call lock; guards the tag counter
    api: Mutex<M, Tag>,
    pub(crate) requests: Channel<M, (Tag, Request), 1>,
    pub(crate) replies: Channel<M, (Tag, Reply), 1>,
    pub(crate) rx: Channel<M, Frame, RX_QUEUE_LEN>,
    /// `recv` waiters take turns on the rx queue
    reader: Mutex<M, ()>,
    /// Raised by `destroy` to wake a waiting reader
    closed: Signal<M, ()>,
    stats: BlockingMutex<M, Cell<NetStats>>,
}

impl<M: RawMutex> Mailbox<M> {
    const fn new() -> Self {
        Self {
            api: Mutex::new(0),
            requests: Channel::new(),
            replies: Channel::new(),
            rx: Channel::new(),
            reader: Mutex::new(()),
            closed: Signal::new(),
            stats: BlockingMutex::new(Cell::new(NetStats::ZERO)),
        }
    }

    pub(crate) fn update_stats(&self, f: impl FnOnce(&mut NetStats)) {
        self.stats.lock(|cell| {
            let mut stats = cell.get();
            f(&mut stats);
            cell.set(stats);
        });
    }

    fn reset(&self) {
        while self.rx.try_receive().is_ok() {}
        while self.requests.try_receive().is_ok() {}
        while self.replies.try_receive().is_ok() {}
        self.stats.lock(|cell| cell.set(NetStats::ZERO));
    }
}

enum Entry {
    Free,
    /// Claimed by `create`; `running` is set if the task started before
    /// the record was committed.
    Reserved { running: bool },
    Registered(InterfaceRecord),
}

struct Slot {
    generation: u32,
    entry: Entry,
}

impl Slot {
    const FREE: Self = Self { generation: 0, entry: Entry::Free };

    fn holds(&self, id: NetIfId) -> bool {
        self.generation == id.generation && matches!(self.entry, Entry::Registered(_))
    }

    fn release(&mut self) {
        self.entry = Entry::Free;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Fixed-capacity table of up to `N` interfaces.
pub struct NetIfTable<M: RawMutex, const N: usize> {
    slots: BlockingMutex<M, RefCell<[Slot; N]>>,
    mailboxes: [Mailbox<M>; N],
}

impl<M: RawMutex, const N: usize> Default for NetIfTable<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> core::fmt::Debug for NetIfTable<M, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetIfTable")
            .field("capacity", &N)
            .field("free", &self.free_slots())
            .finish()
    }
}

impl<M: RawMutex, const N: usize> NetIfTable<M, N> {
    pub const fn new() -> Self {
        Self {
            slots: BlockingMutex::new(RefCell::new([const { Slot::FREE }; N])),
            mailboxes: [const { Mailbox::new() }; N],
        }
    }

    fn with_slots<R>(&self, f: impl FnOnce(&mut [Slot; N]) -> R) -> R {
        self.slots.lock(|cell| f(&mut cell.borrow_mut()))
    }

    // =========================================================================
    // Lifecycle (used by `knx::create` and the interface task)
    // =========================================================================

    /// Claim a free slot for an interface under construction.
    pub(crate) fn reserve(&self) -> Result<NetIfId> {
        self.with_slots(|slots| {
            let (index, slot) = slots
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| matches!(slot.entry, Entry::Free))
                .ok_or_else(NetError::no_free_slot)?;
            slot.entry = Entry::Reserved { running: false };
            Ok(NetIfId { index, generation: slot.generation })
        })
    }

    /// Give back a reserved slot after a failed `create`.
    pub(crate) fn unreserve(&self, id: NetIfId) {
        self.with_slots(|slots| {
            if let Some(slot) = slots.get_mut(id.index) {
                if slot.generation == id.generation
                    && matches!(slot.entry, Entry::Reserved { .. })
                {
                    slot.release();
                }
            }
        });
        if let Some(mailbox) = self.mailboxes.get(id.index) {
            mailbox.reset();
        }
    }

    /// Make a reserved slot visible to the stack.
    pub(crate) fn commit(&self, id: NetIfId, mut record: InterfaceRecord) {
        self.with_slots(|slots| {
            if let Some(slot) = slots.get_mut(id.index) {
                if let Entry::Reserved { running } = slot.entry {
                    record.state = InterfaceState { registered: true, running };
                    slot.entry = Entry::Registered(record);
                }
            }
        });
    }

    pub(crate) fn set_running(&self, id: NetIfId, running: bool) {
        self.with_slots(|slots| {
            if let Some(slot) = slots.get_mut(id.index) {
                if slot.generation != id.generation {
                    return;
                }
                match &mut slot.entry {
                    Entry::Reserved { running: r } => *r = running,
                    Entry::Registered(record) => record.state.running = running,
                    Entry::Free => {}
                }
            }
        });
    }

    pub(crate) fn mailbox(&self, id: NetIfId) -> &Mailbox<M> {
        &self.mailboxes[id.index]
    }

    fn registered_mailbox(&self, id: NetIfId) -> Result<&Mailbox<M>> {
        if self.is_registered(id) {
            Ok(self.mailbox(id))
        } else {
            Err(NetError::not_registered())
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether `id` names a live interface.
    pub fn is_registered(&self, id: NetIfId) -> bool {
        self.with_slots(|slots| slots.get(id.index).is_some_and(|slot| slot.holds(id)))
    }

    /// Copy of the interface record.
    pub fn record(&self, id: NetIfId) -> Option<InterfaceRecord> {
        self.with_slots(|slots| match slots.get(id.index) {
            Some(Slot { generation, entry: Entry::Registered(record) })
                if *generation == id.generation =>
            {
                Some(record.clone())
            }
            _ => None,
        })
    }

    /// First registered interface called `name`.
    pub fn find(&self, name: &str) -> Option<NetIfId> {
        self.with_slots(|slots| {
            slots.iter().enumerate().find_map(|(index, slot)| match &slot.entry {
                Entry::Registered(record) if record.name == name => {
                    Some(NetIfId { index, generation: slot.generation })
                }
                _ => None,
            })
        })
    }

    /// Handles of all registered interfaces, in slot order.
    pub fn interfaces(&self) -> heapless::Vec<NetIfId, N> {
        self.with_slots(|slots| {
            slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| matches!(slot.entry, Entry::Registered(_)))
                .map(|(index, slot)| NetIfId { index, generation: slot.generation })
                .collect()
        })
    }

    pub fn free_slots(&self) -> usize {
        self.with_slots(|slots| {
            slots.iter().filter(|slot| matches!(slot.entry, Entry::Free)).count()
        })
    }

    pub fn stats(&self, id: NetIfId) -> Option<NetStats> {
        let mailbox = self.registered_mailbox(id).ok()?;
        Some(mailbox.stats.lock(Cell::get))
    }

    // =========================================================================
    // Requests to the interface task
    // =========================================================================

    async fn call(&self, id: NetIfId, request: Request) -> Result<Reply> {
        let mailbox = self.registered_mailbox(id)?;
        let mut tag = mailbox.api.lock().await;
        // Destroyed while waiting for the lock
        if !self.is_registered(id) {
            return Err(NetError::not_registered());
        }

        *tag = tag.wrapping_add(1);
        mailbox.requests.send((*tag, request)).await;
        loop {
            let (reply_tag, reply) = mailbox.replies.receive().await;
            if reply_tag == *tag {
                return Ok(reply);
            }
        }
    }

    /// Read an option into `value`, returning the number of bytes written.
    ///
    /// `value` is only written on success. At most `OPTION_VALUE_MAX`
    /// bytes are requested from the device.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for a stale handle, otherwise whatever the
    /// interface or its device answers (`unsupported` for unknown options).
    pub async fn get(&self, id: NetIfId, opt: NetOpt, value: &mut [u8]) -> Result<usize> {
        let request = Request::Get { opt, max_len: value.len() };
        match self.call(id, request).await? {
            Reply::Get(result) => {
                let data = result?;
                value[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            _ => Err(NetError::bad_response()),
        }
    }

    /// Write an option from `value`, returning the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// `InvalidLength` if `value` exceeds `OPTION_VALUE_MAX`, otherwise as
    /// [`get`](Self::get).
    pub async fn set(&self, id: NetIfId, opt: NetOpt, value: &[u8]) -> Result<usize> {
        let value = OptionValue::from_slice(value).map_err(|_| NetError::invalid_length())?;
        match self.call(id, Request::Set { opt, value }).await? {
            Reply::Set(result) => result,
            _ => Err(NetError::bad_response()),
        }
    }

    /// Transmit a telegram. The checksum byte is recomputed.
    ///
    /// # Errors
    ///
    /// `BadMessage` if `telegram` is not a telegram, otherwise the device
    /// error.
    pub async fn send(&self, id: NetIfId, telegram: &[u8]) -> Result<usize> {
        let telegram = TelegramBuf::from_slice(telegram).map_err(|_| NetError::bad_message())?;
        match self.call(id, Request::Send(telegram)).await? {
            Reply::Send(result) => result,
            _ => Err(NetError::bad_response()),
        }
    }

    /// Wait for the next received frame.
    ///
    /// Waiters are served one at a time.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for a stale handle, also when the interface is
    /// destroyed while waiting. Frames of a later interface in the same
    /// slot are never returned for the old handle.
    pub async fn recv(&self, id: NetIfId) -> Result<Frame> {
        let mailbox = self.registered_mailbox(id)?;
        let _turn = mailbox.reader.lock().await;
        loop {
            if !self.is_registered(id) {
                return Err(NetError::not_registered());
            }
            // Closing is polled first, a destroyed reader must not take a frame
            match select(mailbox.closed.wait(), mailbox.rx.receive()).await {
                Either::First(()) => {}
                Either::Second(frame) => return Ok(frame),
            }
        }
    }

    /// Next received frame, if one is queued.
    pub fn try_recv(&self, id: NetIfId) -> Result<Option<Frame>> {
        let mailbox = self.registered_mailbox(id)?;
        Ok(mailbox.rx.try_receive().ok())
    }

    /// Stop the interface task, return its device to the device slot and
    /// free the interface slot.
    ///
    /// # Errors
    ///
    /// `NotRegistered` for a stale handle.
    pub async fn destroy(&self, id: NetIfId) -> Result<()> {
        let mailbox = self.registered_mailbox(id)?;
        let mut tag = mailbox.api.lock().await;
        if !self.is_registered(id) {
            return Err(NetError::not_registered());
        }

        *tag = tag.wrapping_add(1);
        mailbox.requests.send((*tag, Request::Shutdown)).await;
        loop {
            let (reply_tag, reply) = mailbox.replies.receive().await;
            if reply_tag == *tag && matches!(reply, Reply::Shutdown) {
                break;
            }
        }

        self.with_slots(|slots| slots[id.index].release());
        mailbox.reset();
        mailbox.closed.signal(());
        knx_log!(info, "netif {}: destroyed", id.index);
        Ok(())
    }
}
