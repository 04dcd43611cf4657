//! Device websocket protocol.
//!
//! - [`command`]: what the client sends (single-letter commands, free text,
//!   `U`-prefixed JSON updates, binary audio frames).
//! - [`inbound`]: classification of what the device sends.
//! - [`channel`]: per-channel connection state and reconnect policy.

pub mod channel;
pub mod command;
pub mod inbound;
