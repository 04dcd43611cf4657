//! Infrastructure layer for the panel client.
//!
//! Adapters between the application layer and the outside world.
//!
//! # Sub-modules
//!
//! - **`ws`** – the [`ws::ConnectionManager`]: one pump task per WebSocket
//!   channel, bounded send polling, reconnect after closes the client did
//!   not request, the heartbeat, and a single ordered event stream for the
//!   session.
//!
//! - **`http`** – [`http::DeviceApi`], a reqwest client for `/status`,
//!   `/control`, `/update`, the device log and OTA upload, plus a debouncer
//!   for rapid control changes.
//!
//! - **`audio`** – channel plumbing between the session and the sound card.
//!   The cpal streams themselves sit behind the `audio-device` feature.
//!
//! - **`storage`** – the TOML client config and the saved peer list.

pub mod audio;
pub mod http;
pub mod storage;
pub mod ws;
