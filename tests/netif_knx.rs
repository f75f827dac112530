//! Interface tasks running on a real executor.
//!
//! Tasks are spawned onto a tokio `LocalSet`, so requests, replies and
//! received telegrams cross task boundaries the same way they do on the
//! embassy executor.
//!
//! ```bash
//! cargo test --features std --test netif_knx
//! ```

use std::ops::RangeInclusive;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use tokio::task::LocalSet;

use knx_netif::error::errno;
use knx_netif::netdev::mock::{MockBus, MockDevice};
use knx_netif::netdev::{DeviceSlot, NetDev};
use knx_netif::netif::knx::{create, TaskId, TaskSpawner, TaskSpec, MIN_STACK_SIZE};
use knx_netif::netif::{InterfaceTask, NetIfTable};
use knx_netif::telegram::update_checksum;
use knx_netif::{auto_init, ia, IndividualAddress, NetOpt};

type Table = NetIfTable<CriticalSectionRawMutex, 2>;
type Slot = DeviceSlot<CriticalSectionRawMutex, MockDevice>;

/// Runs every interface task on the current `LocalSet`.
#[derive(Debug, Default)]
struct LocalSpawner {
    spawned: u16,
}

impl<M, D, const N: usize> TaskSpawner<InterfaceTask<M, D, N>> for LocalSpawner
where
    M: RawMutex + 'static,
    D: NetDev + 'static,
{
    fn priority_range(&self) -> RangeInclusive<u8> {
        1..=7
    }

    fn spawn(
        &mut self,
        _spec: TaskSpec,
        task: InterfaceTask<M, D, N>,
    ) -> Result<TaskId, InterfaceTask<M, D, N>> {
        tokio::task::spawn_local(task.run());
        self.spawned += 1;
        Ok(TaskId(self.spawned))
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn stack() -> &'static mut [u8] {
    Box::leak(vec![0u8; MIN_STACK_SIZE].into_boxed_slice())
}

/// Standard group telegram 1.1.x -> 1/2/3, GroupValue_Write(1).
fn group_write(src: u16) -> Vec<u8> {
    let [hi, lo] = src.to_be_bytes();
    let mut t = vec![0xBC, hi, lo, 0x0A, 0x03, 0xE1, 0x00, 0x81, 0x00];
    update_checksum(&mut t);
    t
}

/// Extended telegram `src` -> individual 1.1.9.
fn extended(src: u16) -> Vec<u8> {
    let [hi, lo] = src.to_be_bytes();
    let mut t = vec![0x3C, 0x60, hi, lo, 0x11, 0x09, 0x01, 0x00, 0x80, 0x00];
    update_checksum(&mut t);
    t
}

#[tokio::test]
async fn test_create_binds_device_once() {
    LocalSet::new()
        .run_until(async {
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new()));
            let mut spawner = LocalSpawner::default();

            let id = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();
            assert!(slot.is_bound());

            let err = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap_err();
            assert_eq!(err.code(), -errno::EALREADY);
            assert_eq!(spawner.spawned, 1);
            assert_eq!(table.interfaces().as_slice(), &[id]);
        })
        .await;
}

#[tokio::test]
async fn test_address_round_trip() {
    LocalSet::new()
        .run_until(async {
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new()));
            let mut spawner = LocalSpawner::default();
            let id = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();

            let addr: IndividualAddress = "1.2.3".parse().unwrap();
            let n = table.set(id, NetOpt::Address, &addr.to_bytes()).await.unwrap();
            assert_eq!(n, 2);

            let mut buf = [0u8; 4];
            let n = table.get(id, NetOpt::Address, &mut buf).await.unwrap();
            assert_eq!(IndividualAddress::decode(&buf[..n]).unwrap(), addr);
            assert_eq!(&buf[2..], &[0, 0]);
        })
        .await;
}

#[tokio::test]
async fn test_destroy_then_recreate() {
    LocalSet::new()
        .run_until(async {
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new()));
            let mut spawner = LocalSpawner::default();

            let old = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();
            table.destroy(old).await.unwrap();
            assert!(!slot.is_bound());
            assert!(table.record(old).is_none());

            let mut buf = [0u8; 2];
            let err = table.get(old, NetOpt::Address, &mut buf).await.unwrap_err();
            assert_eq!(err.code(), -errno::ENODEV);

            let new = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();
            assert_ne!(old, new);
            assert!(table.is_registered(new));
            assert!(!table.is_registered(old));
            assert_eq!(slot.with(|d| d.init_calls()), None);
        })
        .await;
}

#[tokio::test]
async fn test_waiting_recv_ends_when_interface_is_destroyed() {
    LocalSet::new()
        .run_until(async {
            let bus: &'static MockBus = leak(MockBus::new());
            let table: &'static Table = leak(NetIfTable::new());
            let first: &'static Slot = leak(DeviceSlot::new(MockDevice::new()));
            let second: &'static Slot = leak(DeviceSlot::new(MockDevice::new().with_bus(bus)));
            let mut spawner = LocalSpawner::default();

            let old = create(table, &mut spawner, stack(), 3, None, first).await.unwrap();
            let waiter = tokio::task::spawn_local(async move { table.recv(old).await });
            tokio::task::yield_now().await;

            table.destroy(old).await.unwrap();
            let new = create(table, &mut spawner, stack(), 3, None, second).await.unwrap();
            assert_eq!(new.index(), old.index());

            bus.send(group_write(0x1234)).await;

            let err = waiter.await.unwrap().unwrap_err();
            assert_eq!(err.code(), -errno::ENODEV);

            let frame = table.recv(new).await.unwrap();
            assert_eq!(frame.src, IndividualAddress::from(0x1234));
            assert!(table.try_recv(new).unwrap().is_none());
        })
        .await;
}

#[tokio::test]
async fn test_concurrent_calls_get_their_own_reply() {
    LocalSet::new()
        .run_until(async {
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new()));
            let mut spawner = LocalSpawner::default();
            let id = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();

            let mut wired = [0u8; 4];
            let mut addr = [0u8; 4];
            let mut busy = [0u8; 4];
            let (wired_len, addr_len, busy_len, link) = tokio::join!(
                table.get(id, NetOpt::IsWired, &mut wired),
                table.get(id, NetOpt::Address, &mut addr),
                table.get(id, NetOpt::PhyBusy, &mut busy),
                async {
                    let mut buf = [0u8; 4];
                    table.get(id, NetOpt::Link, &mut buf).await
                },
            );

            assert_eq!(&wired[..wired_len.unwrap()], &[1]);
            assert_eq!(&addr[..addr_len.unwrap()], &[0xFF, 0xFF]);
            assert_eq!(&busy[..busy_len.unwrap()], &[0]);
            assert_eq!(link.unwrap_err().code(), -errno::ENOTSUP);
        })
        .await;
}

#[tokio::test]
async fn test_receive_path_validates_and_filters() {
    LocalSet::new()
        .run_until(async {
            let bus: &'static MockBus = leak(MockBus::new());
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new().with_bus(bus)));
            let mut spawner = LocalSpawner::default();
            let id = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap();

            table.set(id, NetOpt::L2Filter, &[0x11, 0x07]).await.unwrap();

            let mut corrupt = group_write(0x1107);
            let last = corrupt.len() - 1;
            corrupt[last] ^= 0x01;
            bus.send(corrupt).await;
            bus.send(group_write(0x1105)).await;
            bus.send(extended(0x1107)).await;

            let frame = table.recv(id).await.unwrap();
            assert_eq!(frame.src, IndividualAddress::from(0x1107));
            assert!(!frame.dst.is_group());
            assert_eq!(frame.telegram.as_slice(), extended(0x1107).as_slice());
            assert!(table.try_recv(id).unwrap().is_none());
            assert_eq!(table.stats(id).unwrap().rx_count, 1);
        })
        .await;
}

#[tokio::test]
async fn test_driver_without_address_leaves_no_trace() {
    LocalSet::new()
        .run_until(async {
            let table: &'static Table = leak(NetIfTable::new());
            let slot: &'static Slot = leak(DeviceSlot::new(MockDevice::new().without_address()));
            let mut spawner = LocalSpawner::default();

            let err = create(table, &mut spawner, stack(), 3, None, slot).await.unwrap_err();

            assert_eq!(err.code(), -errno::EADDRNOTAVAIL);
            assert_eq!(spawner.spawned, 0);
            assert_eq!(table.free_slots(), 2);
            assert!(!slot.is_bound());
        })
        .await;
}

#[tokio::test]
async fn test_auto_init_skips_failing_device() {
    LocalSet::new()
        .run_until(async {
            let table: &'static NetIfTable<CriticalSectionRawMutex, 4> = leak(NetIfTable::new());
            let devices: &'static [Slot] = leak([
                DeviceSlot::new(MockDevice::new()),
                DeviceSlot::new(MockDevice::new().failing_init()),
                DeviceSlot::new(MockDevice::new()),
            ]);
            let stacks = (0..3).map(|_| Box::leak(vec![0u8; 4096].into_boxed_slice()));
            let mut spawner = LocalSpawner::default();

            let created = auto_init::init_all(table, &mut spawner, stacks, devices, "mock").await;

            assert_eq!(created.len(), 2);
            assert!(!devices[1].is_bound());
            for &id in &created {
                let record = table.record(id).unwrap();
                assert_eq!(record.name.as_str(), "mock");

                // The configured device address was applied
                let mut buf = [0u8; 2];
                table.get(id, NetOpt::Address, &mut buf).await.unwrap();
                assert_eq!(IndividualAddress::decode(&buf).unwrap(), ia!(1, 1, 1));
            }
        })
        .await;
}
