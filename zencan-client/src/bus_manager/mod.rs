//! Tracks the set of nodes present on a bus and provides per-node SDO/LSS/NMT access
#[allow(clippy::module_inception)]
mod bus_manager;
mod shared_receiver;
mod shared_sender;

pub use bus_manager::{BusManager, NodeInfo, SdoClientGuard};
pub(crate) use shared_receiver::{SharedReceiver, SharedReceiverChannel};
pub(crate) use shared_sender::SharedSender;
