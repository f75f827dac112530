//! The per-interface task.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::addressing::IndividualAddress;
use crate::configuration::KNX_L2FILTER_LISTSIZE;
use crate::error::{NetError, Result};
use crate::netdev::{DeviceSlot, NetDev, NetDevEvent};
use crate::netif::{Frame, Mailbox, NetIfId, NetIfTable, OptionValue, Reply, Request, TelegramBuf};
use crate::netopt::{encode_u16, DeviceType, NetOpt, NetOptEnable, OPTION_VALUE_MAX};
use crate::telegram::{update_checksum, Telegram, TELEGRAM_MAX_LEN};

/// Owns one device and serves its interface.
///
/// Built by [`knx::create`](crate::netif::knx::create) and handed to the
/// spawner, which runs [`run`](Self::run) to completion.
pub struct InterfaceTask<M: RawMutex + 'static, D: 'static, const N: usize> {
    id: NetIfId,
    table: &'static NetIfTable<M, N>,
    slot: &'static DeviceSlot<M, D>,
    device: D,
    /// Accepted source addresses; empty accepts all
    filter: heapless::Vec<IndividualAddress, KNX_L2FILTER_LISTSIZE>,
}

impl<M: RawMutex + 'static, D: 'static, const N: usize> core::fmt::Debug
    for InterfaceTask<M, D, N>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterfaceTask")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<M: RawMutex + 'static, D: NetDev + 'static, const N: usize> InterfaceTask<M, D, N> {
    pub(crate) fn new(
        id: NetIfId,
        table: &'static NetIfTable<M, N>,
        slot: &'static DeviceSlot<M, D>,
        device: D,
    ) -> Self {
        Self { id, table, slot, device, filter: heapless::Vec::new() }
    }

    pub fn id(&self) -> NetIfId {
        self.id
    }

    /// Give up the device without running, used when spawning fails.
    pub(crate) fn into_device(self) -> D {
        self.device
    }

    /// Serve the interface until it is destroyed.
    pub async fn run(mut self) {
        let table = self.table;
        let mailbox = table.mailbox(self.id);
        table.set_running(self.id, true);
        knx_log!(debug, "netif {}: task running", self.id.index());

        loop {
            let next = select(self.device.wait_event(), mailbox.requests.receive()).await;
            match next {
                Either::First(event) => self.on_event(event, mailbox),
                Either::Second((tag, Request::Shutdown)) => {
                    let Self { id, slot, device, .. } = self;
                    slot.release(device);
                    table.set_running(id, false);
                    mailbox.replies.send((tag, Reply::Shutdown)).await;
                    knx_log!(debug, "netif {}: task stopped", id.index());
                    return;
                }
                Either::Second((tag, request)) => {
                    let reply = self.on_request(request, mailbox).await;
                    mailbox.replies.send((tag, reply)).await;
                }
            }
        }
    }

    fn on_event(&mut self, event: NetDevEvent, mailbox: &Mailbox<M>) {
        match event {
            NetDevEvent::RxComplete => self.receive(mailbox),
            NetDevEvent::RxIncomplete => {
                knx_log!(debug, "netif {}: incomplete telegram", self.id.index());
            }
            NetDevEvent::State(state) => {
                knx_log!(debug, "netif {}: device state {}", self.id.index(), state);
            }
            NetDevEvent::Save => {
                knx_log!(warn, "netif {}: bus power failing", self.id.index());
            }
            NetDevEvent::TxComplete => {}
            NetDevEvent::TxTimeout => {
                knx_log!(warn, "netif {}: transmission timed out", self.id.index());
            }
        }
    }

    fn receive(&mut self, mailbox: &Mailbox<M>) {
        if self.device.pending() == 0 {
            return;
        }

        let mut buf = [0u8; TELEGRAM_MAX_LEN];
        let len = match self.device.recv(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                knx_log!(warn, "netif {}: receive failed: {}", self.id.index(), e);
                return;
            }
        };

        let frame = match Telegram::parse_checked(&buf[..len]).and_then(|t| {
            if self.accepts(t.source()) {
                Frame::new(&t).map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(_) => {
                knx_log!(debug, "netif {}: dropped invalid telegram", self.id.index());
                return;
            }
        };

        mailbox.update_stats(|stats| {
            stats.rx_count = stats.rx_count.wrapping_add(1);
            stats.rx_bytes = stats.rx_bytes.wrapping_add(len as u32);
        });
        if mailbox.rx.try_send(frame).is_err() {
            knx_log!(warn, "netif {}: rx queue full, telegram dropped", self.id.index());
        }
    }

    fn accepts(&self, source: IndividualAddress) -> bool {
        self.filter.is_empty() || self.filter.contains(&source)
    }

    async fn on_request(&mut self, request: Request, mailbox: &Mailbox<M>) -> Reply {
        match request {
            Request::Get { opt, max_len } => Reply::Get(self.get(opt, max_len).await),
            Request::Set { opt, value } => Reply::Set(self.set(opt, &value).await),
            Request::Send(telegram) => Reply::Send(self.transmit(telegram, mailbox).await),
            // Handled by `run`
            Request::Shutdown => Reply::Shutdown,
        }
    }

    async fn get(&mut self, opt: NetOpt, max_len: usize) -> Result<OptionValue> {
        let mut buf = [0u8; OPTION_VALUE_MAX];
        let out = &mut buf[..max_len.min(OPTION_VALUE_MAX)];
        let len = match opt {
            NetOpt::DeviceType => encode_u16(DeviceType::Knx.value(), out),
            NetOpt::AddrLen | NetOpt::SrcLen => encode_u16(IndividualAddress::LEN as u16, out),
            NetOpt::IsWired => NetOptEnable::Enable.encode(out),
            NetOpt::L2Filter => self.encode_filter(out),
            _ => self.device.get(opt, out).await,
        }?;
        let data = out.get(..len).ok_or_else(NetError::buffer_too_small)?;
        OptionValue::from_slice(data).map_err(|_| NetError::buffer_too_small())
    }

    async fn set(&mut self, opt: NetOpt, value: &[u8]) -> Result<usize> {
        match opt {
            NetOpt::L2Filter => {
                let addr = IndividualAddress::from_option(value)?;
                if !self.filter.contains(&addr) {
                    self.filter.push(addr).map_err(|_| NetError::filter_full())?;
                }
                Ok(IndividualAddress::LEN)
            }
            NetOpt::L2FilterRm => {
                let addr = IndividualAddress::from_option(value)?;
                let pos = self
                    .filter
                    .iter()
                    .position(|a| *a == addr)
                    .ok_or_else(NetError::invalid_value)?;
                self.filter.swap_remove(pos);
                Ok(IndividualAddress::LEN)
            }
            _ => self.device.set(opt, value).await,
        }
    }

    fn encode_filter(&self, out: &mut [u8]) -> Result<usize> {
        let len = self.filter.len() * IndividualAddress::LEN;
        if out.len() < len {
            return Err(NetError::buffer_too_small());
        }
        for (addr, chunk) in self.filter.iter().zip(out.chunks_exact_mut(IndividualAddress::LEN)) {
            addr.encode(chunk)?;
        }
        Ok(len)
    }

    async fn transmit(&mut self, mut telegram: TelegramBuf, mailbox: &Mailbox<M>) -> Result<usize> {
        let multicast = Telegram::parse(&telegram)?.destination().is_group();
        update_checksum(&mut telegram);

        mailbox.update_stats(|stats| {
            if multicast {
                stats.tx_mcast_count = stats.tx_mcast_count.wrapping_add(1);
            } else {
                stats.tx_unicast_count = stats.tx_unicast_count.wrapping_add(1);
            }
        });

        let result = self.device.send(&telegram).await;
        mailbox.update_stats(|stats| match &result {
            Ok(sent) => {
                stats.tx_success = stats.tx_success.wrapping_add(1);
                stats.tx_bytes = stats.tx_bytes.wrapping_add(*sent as u32);
            }
            Err(_) => stats.tx_failed = stats.tx_failed.wrapping_add(1),
        });
        if let Err(e) = &result {
            knx_log!(warn, "netif {}: send failed: {}", self.id.index(), e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::errno;
    use crate::netdev::mock::{MockBus, MockDevice};
    use crate::netif::knx::{create, MIN_STACK_SIZE};
    use crate::netif::mock::MockSpawner;
    use core::future::Future;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Table = NetIfTable<CriticalSectionRawMutex, 2>;
    type Slot<D = MockDevice> = DeviceSlot<CriticalSectionRawMutex, D>;
    type Task<D = MockDevice> = InterfaceTask<CriticalSectionRawMutex, D, 2>;

    fn start<D: NetDev + 'static>(
        device: D,
    ) -> (&'static Table, &'static Slot<D>, NetIfId, Task<D>) {
        let table: &'static Table = Box::leak(Box::new(NetIfTable::new()));
        let slot: &'static Slot<D> = Box::leak(Box::new(DeviceSlot::new(device)));
        let stack = Box::leak(vec![0u8; MIN_STACK_SIZE].into_boxed_slice());
        let mut spawner = MockSpawner::new(1);
        let id = block_on(create(table, &mut spawner, stack, 2, None, slot)).unwrap();
        (table, slot, id, spawner.take().unwrap())
    }

    /// Run the task next to `body`, then destroy the interface.
    fn serve<D: NetDev + 'static, F: Future>(
        table: &'static Table,
        id: NetIfId,
        task: Task<D>,
        body: F,
    ) -> F::Output {
        let ((), out) = block_on(join(task.run(), async {
            let out = body.await;
            table.destroy(id).await.unwrap();
            out
        }));
        out
    }

    /// Standard telegram from `src` to group 1/2/3 (or individual 0.10.3).
    fn telegram(src: u16, group: bool) -> Vec<u8> {
        let [hi, lo] = src.to_be_bytes();
        let flags = if group { 0xE1 } else { 0x61 };
        let mut t = vec![0xBC, hi, lo, 0x0A, 0x03, flags, 0x00, 0x81, 0x00];
        update_checksum(&mut t);
        t
    }

    /// Claims more `PhyBusy` bytes than it was given room for.
    struct Overreporting(MockDevice);

    impl NetDev for Overreporting {
        async fn init(&mut self) -> Result<()> {
            self.0.init().await
        }

        async fn send(&mut self, telegram: &[u8]) -> Result<usize> {
            self.0.send(telegram).await
        }

        async fn wait_event(&mut self) -> NetDevEvent {
            self.0.wait_event().await
        }

        fn pending(&self) -> usize {
            self.0.pending()
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.0.recv(buf)
        }

        fn drop_pending(&mut self) {
            self.0.drop_pending();
        }

        async fn get(&mut self, opt: NetOpt, value: &mut [u8]) -> Result<usize> {
            match opt {
                NetOpt::PhyBusy => Ok(value.len() + 4),
                _ => self.0.get(opt, value).await,
            }
        }
    }

    #[test]
    fn test_class_options_answered_by_interface() {
        let (table, _slot, id, task) = start(MockDevice::new());

        let (device_type, addr_len, wired) = serve(table, id, task, async {
            let mut a = [0u8; 4];
            let mut b = [0u8; 4];
            let mut c = [0u8; 4];
            let n = table.get(id, NetOpt::DeviceType, &mut a).await.unwrap();
            let m = table.get(id, NetOpt::AddrLen, &mut b).await.unwrap();
            let k = table.get(id, NetOpt::IsWired, &mut c).await.unwrap();
            (a[..n].to_vec(), b[..m].to_vec(), c[..k].to_vec())
        });

        assert_eq!(device_type, DeviceType::Knx.value().to_ne_bytes());
        assert_eq!(addr_len, 2u16.to_ne_bytes());
        assert_eq!(wired, [1]);
    }

    #[test]
    fn test_address_round_trip() {
        let (table, slot, id, task) = start(MockDevice::new());

        let read = serve(table, id, task, async {
            assert_eq!(table.set(id, NetOpt::Address, &[0x11, 0x05]).await.unwrap(), 2);
            let mut buf = [0u8; 2];
            table.get(id, NetOpt::Address, &mut buf).await.unwrap();
            buf
        });

        assert_eq!(read, [0x11, 0x05]);
        assert_eq!(slot.with(|d| d.address().raw()), Some(0x1105));
    }

    #[test]
    fn test_unsupported_option_leaves_buffer() {
        let (table, _slot, id, task) = start(MockDevice::new());

        let (err, buf) = serve(table, id, task, async {
            let mut buf = [0xAA; 4];
            let err = table.get(id, NetOpt::Link, &mut buf).await.unwrap_err();
            (err, buf)
        });

        assert_eq!(err.code(), -errno::ENOTSUP);
        assert_eq!(buf, [0xAA; 4]);
    }

    #[test]
    fn test_filter_options() {
        let (table, _slot, id, task) = start(MockDevice::new());

        serve(table, id, task, async {
            table.set(id, NetOpt::L2Filter, &ia!(1, 1, 5).to_bytes()).await.unwrap();
            table.set(id, NetOpt::L2Filter, &ia!(1, 1, 6).to_bytes()).await.unwrap();
            // Duplicates are ignored
            table.set(id, NetOpt::L2Filter, &ia!(1, 1, 5).to_bytes()).await.unwrap();

            let mut buf = [0u8; 8];
            let n = table.get(id, NetOpt::L2Filter, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x11, 0x05, 0x11, 0x06]);

            let mut small = [0u8; 2];
            let err = table.get(id, NetOpt::L2Filter, &mut small).await.unwrap_err();
            assert_eq!(err.code(), -errno::ENOBUFS);

            table.set(id, NetOpt::L2FilterRm, &[0x11, 0x05]).await.unwrap();
            let n = table.get(id, NetOpt::L2Filter, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x11, 0x06]);

            let err = table.set(id, NetOpt::L2FilterRm, &[0x11, 0x05]).await.unwrap_err();
            assert_eq!(err.code(), -errno::EINVAL);
            let err = table.set(id, NetOpt::L2Filter, &[0x11]).await.unwrap_err();
            assert_eq!(err.code(), -errno::EINVAL);
        });
    }

    #[test]
    fn test_full_filter_is_reported_as_filter_full() {
        let (table, _slot, id, task) = start(MockDevice::new());

        let err = serve(table, id, task, async {
            for device in 0..KNX_L2FILTER_LISTSIZE as u16 {
                let addr = IndividualAddress::from(0x1100 + device);
                table.set(id, NetOpt::L2Filter, &addr.to_bytes()).await.unwrap();
            }
            // Already listed, so no room is needed
            table.set(id, NetOpt::L2Filter, &ia!(1, 1, 0).to_bytes()).await.unwrap();
            table.set(id, NetOpt::L2Filter, &ia!(1, 2, 0).to_bytes()).await.unwrap_err()
        });

        assert_eq!(err.code(), -errno::ENOMEM);
        let NetError::Resource(resource) = err else {
            panic!("expected a resource error");
        };
        assert!(resource.is_filter_full());
        assert!(!resource.is_no_free_slot());
    }

    #[test]
    fn test_overlong_option_from_driver_is_an_error() {
        let (table, _slot, id, task) = start(Overreporting(MockDevice::new()));

        let (err, buf) = serve(table, id, task, async {
            let mut buf = [0xAA; 2];
            let err = table.get(id, NetOpt::PhyBusy, &mut buf).await.unwrap_err();
            (err, buf)
        });

        assert_eq!(err.code(), -errno::ENOBUFS);
        assert_eq!(buf, [0xAA; 2]);
    }

    #[test]
    fn test_send_fixes_checksum() {
        let (table, slot, id, task) = start(MockDevice::new());
        let mut frame = telegram(0x1105, true);
        *frame.last_mut().unwrap() = 0;

        let stats = serve(table, id, task, async {
            assert_eq!(table.send(id, &frame).await.unwrap(), frame.len());
            table.send(id, &telegram(0x1105, false)).await.unwrap();
            table.stats(id).unwrap()
        });

        let sent = slot.with(|d| d.sent().to_vec()).unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], telegram(0x1105, true));
        assert_eq!(stats.tx_mcast_count, 1);
        assert_eq!(stats.tx_unicast_count, 1);
        assert_eq!(stats.tx_success, 2);
        assert_eq!(stats.tx_bytes, 18);
    }

    #[test]
    fn test_send_rejects_non_telegram() {
        let (table, slot, id, task) = start(MockDevice::new());

        let err = serve(table, id, task, async {
            table.send(id, &[0x00, 0x01, 0x02]).await.unwrap_err()
        });

        assert_eq!(err.code(), -errno::EBADMSG);
        assert_eq!(slot.with(|d| d.sent().len()), Some(0));
    }

    #[test]
    fn test_receive_queued_telegram() {
        let mut device = MockDevice::new();
        device.push_rx(&telegram(0x1105, true));
        let (table, _slot, id, task) = start(device);

        let (frame, stats) = serve(table, id, task, async {
            let frame = table.recv(id).await.unwrap();
            (frame, table.stats(id).unwrap())
        });

        assert_eq!(frame.src, IndividualAddress::from(0x1105));
        assert!(frame.dst.is_group());
        assert_eq!(frame.telegram.as_slice(), telegram(0x1105, true).as_slice());
        assert_eq!(stats.rx_count, 1);
        assert_eq!(stats.rx_bytes, 9);
    }

    #[test]
    fn test_receive_drops_bad_and_filtered() {
        let bus: &'static MockBus = Box::leak(Box::new(MockBus::new()));
        let (table, _slot, id, task) = start(MockDevice::new().with_bus(bus));

        let (frame, rest) = serve(table, id, task, async {
            table.set(id, NetOpt::L2Filter, &[0x11, 0x07]).await.unwrap();

            let mut corrupt = telegram(0x1107, true);
            corrupt[7] ^= 0xFF;
            bus.send(corrupt).await;
            bus.send(telegram(0x1105, true)).await;
            bus.send(telegram(0x1107, false)).await;

            let frame = table.recv(id).await.unwrap();
            (frame, table.try_recv(id).unwrap())
        });

        assert_eq!(frame.src, IndividualAddress::from(0x1107));
        assert!(!frame.dst.is_group());
        assert!(rest.is_none());
    }

    #[test]
    fn test_destroy_returns_device() {
        let (table, slot, id, task) = start(MockDevice::new());
        assert!(slot.is_bound());

        serve(table, id, task, async {
            assert!(table.record(id).unwrap().state.running);
        });

        assert!(!slot.is_bound());
        assert!(!table.is_registered(id));
        assert_eq!(table.free_slots(), 2);
        let mut buf = [0u8; 2];
        let err = block_on(table.get(id, NetOpt::Address, &mut buf)).unwrap_err();
        assert_eq!(err.code(), -errno::ENODEV);
    }
}
