//! Utility functions for configuration parsing

use crate::addressing::IndividualAddress;
use crate::configuration::CONFIG;
use crate::netif::knx::{DEFAULT_PRIORITY, DEFAULT_STACKSIZE};

/// Look up the raw value of `key` in a `KEY=VALUE` block.
fn lookup<'a>(config: &'a str, key: &str) -> Option<&'a str> {
    config
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
        .map(str::trim)
}

/// Stack size for each interface task in bytes.
///
/// # Returns
/// * `usize` - `KNX_NETIF_STACKSIZE`, or [`DEFAULT_STACKSIZE`] if unset
pub fn get_stack_size() -> usize {
    stack_size_from(CONFIG)
}

/// Scheduler priority for each interface task.
///
/// # Returns
/// * `u8` - `KNX_NETIF_PRIO`, or [`DEFAULT_PRIORITY`] if unset
pub fn get_priority() -> u8 {
    priority_from(CONFIG)
}

/// Individual address to program into the transceiver after creation.
///
/// # Returns
/// * `Option<IndividualAddress>` - `None` keeps the device's own address
pub fn get_device_address() -> Option<IndividualAddress> {
    device_address_from(CONFIG)
}

fn stack_size_from(config: &str) -> usize {
    lookup(config, "KNX_NETIF_STACKSIZE")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_STACKSIZE)
}

fn priority_from(config: &str) -> u8 {
    lookup(config, "KNX_NETIF_PRIO")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PRIORITY)
}

fn device_address_from(config: &str) -> Option<IndividualAddress> {
    lookup(config, "KNX_DEVICE_ADDRESS").and_then(|v| v.parse().ok())
}
