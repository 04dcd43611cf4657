//! WebSocket transport to the device.

pub mod connection_manager;

pub use connection_manager::{ChannelOptions, ConnectionError, ConnectionManager, SessionEvent};
