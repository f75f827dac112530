//! Task factory for KNX interfaces.
//!
//! [`create`] turns a parked device into a running interface: it validates
//! the task parameters, binds the device, brings it up and hands an
//! [`InterfaceTask`] to the scheduler through a [`TaskSpawner`]. Either all
//! of that happens or none of it does.

use core::fmt::Write as _;
use core::ops::RangeInclusive;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::addressing::IndividualAddress;
use crate::error::{NetError, Result};
use crate::netdev::{DeviceSlot, NetDev};
use crate::netif::{InterfaceRecord, InterfaceState, InterfaceTask, NetIfId, NetIfTable, NETIF_NAME_MAX};
use crate::netopt::NetOpt;

/// Smallest stack an interface task accepts.
pub const MIN_STACK_SIZE: usize = 1024;
/// Stack size used when `KNX_NETIF_STACKSIZE` is not configured.
pub const DEFAULT_STACKSIZE: usize = 2048;
/// Priority used when `KNX_NETIF_PRIO` is not configured.
pub const DEFAULT_PRIORITY: u8 = 4;

/// Scheduler identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub u16);

/// Parameters for a new task.
#[derive(Debug)]
pub struct TaskSpec {
    pub stack: &'static mut [u8],
    pub priority: u8,
    pub name: heapless::String<NETIF_NAME_MAX>,
}

/// The scheduler seam.
///
/// `spawn` takes ownership of `task` and returns it unchanged if the
/// scheduler has no room, so the caller can undo the binding.
pub trait TaskSpawner<T> {
    /// Priorities this scheduler accepts.
    fn priority_range(&self) -> RangeInclusive<u8>;

    /// Start `task`.
    ///
    /// # Errors
    ///
    /// Gives `task` back if it cannot be started.
    fn spawn(&mut self, spec: TaskSpec, task: T) -> core::result::Result<TaskId, T>;
}

/// Create an interface task for the device parked in `device`.
///
/// The device's `get(Address)` must succeed after `init`; drivers that do
/// not implement it are rejected.
///
/// # Arguments
///
/// * `stack` - Stack memory, at least [`MIN_STACK_SIZE`] bytes
/// * `priority` - Must lie in `spawner.priority_range()`
/// * `name` - Interface name, `"{CLASS}{index}"` if `None`
///
/// # Errors
///
/// * `InvalidStackSize`, `InvalidPriority`, `InvalidName` - bad parameters
/// * `NoFreeSlot` - the table is full
/// * `AlreadyBound` - another interface owns the device
/// * device errors from `init`
/// * `AddressNotImplemented` - the driver cannot report its address
/// * `NoFreeTask` - the spawner rejected the task
pub async fn create<M, D, S, const N: usize>(
    table: &'static NetIfTable<M, N>,
    spawner: &mut S,
    stack: &'static mut [u8],
    priority: u8,
    name: Option<&str>,
    device: &'static DeviceSlot<M, D>,
) -> Result<NetIfId>
where
    M: RawMutex + 'static,
    D: NetDev + 'static,
    S: TaskSpawner<InterfaceTask<M, D, N>>,
{
    if stack.len() < MIN_STACK_SIZE {
        return Err(NetError::invalid_stack_size());
    }
    if !spawner.priority_range().contains(&priority) {
        return Err(NetError::invalid_priority());
    }
    if let Some(name) = name {
        if name.is_empty() || name.len() > NETIF_NAME_MAX {
            return Err(NetError::invalid_name());
        }
    }

    let id = table.reserve()?;
    let result = bind(table, spawner, stack, priority, name, device, id).await;
    if let Err(e) = &result {
        table.unreserve(id);
        knx_log!(warn, "netif {}: create failed: {}", id.index(), e);
    }
    result
}

async fn bind<M, D, S, const N: usize>(
    table: &'static NetIfTable<M, N>,
    spawner: &mut S,
    stack: &'static mut [u8],
    priority: u8,
    name: Option<&str>,
    slot: &'static DeviceSlot<M, D>,
    id: NetIfId,
) -> Result<NetIfId>
where
    M: RawMutex + 'static,
    D: NetDev + 'static,
    S: TaskSpawner<InterfaceTask<M, D, N>>,
{
    let name = interface_name::<D>(name, id)?;
    let mut device = slot.claim().ok_or_else(NetError::already_bound)?;

    if let Err(e) = probe(&mut device).await {
        slot.release(device);
        return Err(e);
    }

    let task = InterfaceTask::new(id, table, slot, device);
    let spec = TaskSpec { stack, priority, name: name.clone() };
    let pid = match spawner.spawn(spec, task) {
        Ok(pid) => pid,
        Err(task) => {
            slot.release(task.into_device());
            return Err(NetError::no_free_task());
        }
    };

    knx_log!(info, "netif {}: {} up as task {} (prio {})", id.index(), name.as_str(), pid.0, priority);
    table.commit(
        id,
        InterfaceRecord {
            name,
            task: pid,
            priority,
            device_class: D::CLASS,
            state: InterfaceState::default(),
        },
    );
    Ok(id)
}

/// Bring the device up and check it can report its address.
async fn probe<D: NetDev>(device: &mut D) -> Result<()> {
    device.init().await?;

    let mut addr = [0u8; IndividualAddress::LEN];
    match device.get(NetOpt::Address, &mut addr).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_unsupported() => Err(NetError::address_not_implemented()),
        Err(e) => Err(e),
    }
}

fn interface_name<D: NetDev>(
    name: Option<&str>,
    id: NetIfId,
) -> Result<heapless::String<NETIF_NAME_MAX>> {
    let mut out = heapless::String::new();
    match name {
        Some(name) => out.push_str(name).map_err(|_| NetError::invalid_name())?,
        None => write!(out, "{}{}", D::CLASS, id.index()).map_err(|_| NetError::invalid_name())?,
    }
    Ok(out)
}
