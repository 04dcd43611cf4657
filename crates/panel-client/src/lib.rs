//! panel-client library entry point.
//!
//! Re-exports the module tree so the `panel` binary and the integration
//! tests in `tests/` share it.
//!
//! # What does panel-client do?
//!
//! The device serves a web control panel: a status page that updates live,
//! config tables per settings group, buttons that poke `/control`, and an
//! optional two-way audio stream.  This crate is a native client for that
//! panel:
//!
//! 1. Opens the device's WebSocket channels (a control channel and an audio
//!    channel by default) and keeps them alive with a heartbeat, reconnecting
//!    after abnormal drops.
//! 2. Applies status pushes and config payloads to an in-memory panel model
//!    from `panel-core`.
//! 3. Turns UI events into device requests through the command table.
//! 4. Streams mic audio to the device and plays received audio, when built
//!    with the `audio-device` feature.

/// Application layer: session and action dispatch.
pub mod application;

/// Infrastructure layer: sockets, HTTP, sound card and storage.
pub mod infrastructure;
