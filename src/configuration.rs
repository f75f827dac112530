//! Compile-time configuration of the KNX interfaces.
//!
//! Adjust the values to the board before flashing. Keys that are missing
//! or fail to parse fall back to the defaults in [`crate::utility`].

pub const CONFIG: &str = r#"
KNX_NETIF_STACKSIZE=2048
KNX_NETIF_PRIO=4
KNX_DEVICE_ADDRESS=1.1.1
"#;

/// Number of source addresses an interface's L2 filter can hold.
pub const KNX_L2FILTER_LISTSIZE: usize = 8;
