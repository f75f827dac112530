//! KNX addressing system.
//!
//! - Individual addresses identify transceivers (Area.Line.Device)
//! - Group addresses identify multicast destinations (Main/Middle/Sub)

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;
