#![cfg_attr(not(feature = "std"), no_std)]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod constants;
pub mod device_config;
pub mod lss;
pub mod messages;
pub mod node_id;
pub mod objects;
pub mod sdo;
pub mod timer;
pub mod traits;

#[cfg(feature = "socketcan")]
mod socketcan;

#[cfg(feature = "socketcan")]
pub use socketcan::{open_socketcan, SocketCanReceiver, SocketCanSender};


pub use node_id::NodeId;

pub use messages::{CanMessage, CanId, CanError};