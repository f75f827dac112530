#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![doc = include_str!("../README.md")]

//! # knx-netif
//!
//! KNX device abstraction and interface tasks for embedded network stacks.
//!
//! This crate provides a `no_std` network-device layer for KNX twisted-pair
//! transceivers, designed for use with the Embassy async runtime on
//! embedded microcontrollers.
//!
//! ## Features
//!
//! - `NetDev` trait with a class-wide fallback for unsupported options
//! - TPUART and NCN5120 drivers over any async serial port
//! - One interface task per device, created atomically
//! - Telegram validation and L2 source filtering
//! - Errno-compatible error codes
//!
//! ## Example
//!
//! ```rust,ignore
//! use knx_netif::netif::{knx, NetIfTable};
//! use knx_netif::netopt::NetOpt;
//!
//! let id = knx::create(&NETIFS, &mut spawner, stack, 4, None, &TPUART).await?;
//! let mut addr = [0u8; 2];
//! NETIFS.get(id, NetOpt::Address, &mut addr).await?;
//! ```

// Macro modules (must be declared before use)
#[macro_use]
pub mod macros;
#[macro_use]
pub mod logging;

pub mod addressing;
pub mod auto_init;
pub mod configuration;
pub mod drivers;
pub mod error;
pub mod netdev;
pub mod netif;
pub mod netopt;
pub mod telegram;
pub mod utility;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{GroupAddress, IndividualAddress};
#[doc(inline)]
pub use error::{to_return_code, NetError, Result};
#[doc(inline)]
pub use netdev::{DeviceSlot, NetDev, NetDevEvent};
#[doc(inline)]
pub use netif::{Frame, NetIfId, NetIfTable};
#[doc(inline)]
pub use netopt::{NetOpt, NetOptEnable};
