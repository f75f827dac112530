//! Bring up every configured transceiver at boot.
//!
//! Stack size and priority come from the compile-time configuration (see
//! [`utility`](crate::utility)). A device that fails to come up is logged
//! and skipped; the others are still created.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::drivers::{Ncn5120, SerialPort, Tpuart};
use crate::netdev::{DeviceSlot, NetDev};
use crate::netif::knx::{create, TaskSpawner};
use crate::netif::{InterfaceTask, NetIfId, NetIfTable};
use crate::netopt::NetOpt;
use crate::utility::{get_device_address, get_priority, get_stack_size};

/// Create one interface named `name` per device, pairing devices with
/// stacks in order. Returns the interfaces that came up.
pub async fn init_all<M, D, S, const N: usize>(
    table: &'static NetIfTable<M, N>,
    spawner: &mut S,
    stacks: impl IntoIterator<Item = &'static mut [u8]>,
    devices: &'static [DeviceSlot<M, D>],
    name: &str,
) -> heapless::Vec<NetIfId, N>
where
    M: RawMutex + 'static,
    D: NetDev + 'static,
    S: TaskSpawner<InterfaceTask<M, D, N>>,
{
    let stack_size = get_stack_size();
    let priority = get_priority();
    let mut created = heapless::Vec::new();

    for (index, (device, stack)) in devices.iter().zip(stacks).enumerate() {
        let (stack, _) = stack.split_at_mut(stack_size.min(stack.len()));
        match create(table, spawner, stack, priority, Some(name), device).await {
            Ok(id) => {
                apply_address(table, id).await;
                // Cannot overflow: every id occupies a distinct table slot
                let _ = created.push(id);
            }
            Err(e) => {
                knx_log!(error, "{} #{}: init failed: {}", name, index, e);
            }
        }
    }
    created
}

async fn apply_address<M: RawMutex, const N: usize>(table: &NetIfTable<M, N>, id: NetIfId) {
    let Some(addr) = get_device_address() else {
        return;
    };
    if let Err(e) = table.set(id, NetOpt::Address, &addr.to_bytes()).await {
        knx_log!(warn, "netif {}: cannot set address {}: {}", id.index(), addr, e);
    }
}

/// Create an interface for each TPUART, all named `"tpuart"`.
pub async fn tpuart<M, P, S, const N: usize>(
    table: &'static NetIfTable<M, N>,
    spawner: &mut S,
    stacks: impl IntoIterator<Item = &'static mut [u8]>,
    devices: &'static [DeviceSlot<M, Tpuart<P>>],
) -> heapless::Vec<NetIfId, N>
where
    M: RawMutex + 'static,
    P: SerialPort + 'static,
    S: TaskSpawner<InterfaceTask<M, Tpuart<P>, N>>,
{
    init_all(table, spawner, stacks, devices, "tpuart").await
}

/// Create an interface for each NCN5120, all named `"ncn5120"`.
pub async fn ncn5120<M, P, S, const N: usize>(
    table: &'static NetIfTable<M, N>,
    spawner: &mut S,
    stacks: impl IntoIterator<Item = &'static mut [u8]>,
    devices: &'static [DeviceSlot<M, Ncn5120<P>>],
) -> heapless::Vec<NetIfId, N>
where
    M: RawMutex + 'static,
    P: SerialPort + 'static,
    S: TaskSpawner<InterfaceTask<M, Ncn5120<P>, N>>,
{
    init_all(table, spawner, stacks, devices, "ncn5120").await
}

