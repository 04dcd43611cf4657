//! # panel-core
//!
//! Shared, I/O-free building blocks for the device panel client.
//!
//! The device (an ESP32-class board) serves a small web control panel.  This
//! crate holds everything about that panel that can be expressed without a
//! socket or a sound card:
//!
//! - **`domain`** – the status cache, the type-tagged config field format, the
//!   config table builder, the panel view model that status pushes are written
//!   into, and device log classification.
//!
//! - **`protocol`** – the single-character command vocabulary spoken over the
//!   device WebSocket, classification of inbound frames, and the per-channel
//!   connection state machine with its reconnect policy.
//!
//! - **`audio`** – nearest-sample resampling, float/i16 conversion, fixed-size
//!   frame assembly for the mic path and the playback ring buffer for the
//!   speaker path.
//!
//! - **`router`** – the command table that maps UI events to typed actions.
//!
//! The `panel-client` crate wires these into a live session over the network.

pub mod audio;
pub mod domain;
pub mod protocol;
pub mod router;

pub use audio::{AudioError, AudioFrame, FrameAssembler, MicPipeline, PlaybackBuffer, Resampler};
pub use domain::config_field::{ConfigField, FieldError, FieldKind};
pub use domain::panel::{Element, InputKind, Panel};
pub use domain::status::StatusMap;
pub use domain::table::{BuildOutcome, ConfigTable, Container, TableBuilder, TableError};
pub use protocol::channel::{AfterClose, ChannelSlot, ChannelSpec, ChannelState, ReconnectPolicy};
pub use protocol::command::{OutboundCommand, WireFrame};
pub use protocol::inbound::{classify_binary, classify_text, InboundError, InboundMessage};
pub use router::{Action, ClickRole, CommandTable, UiEvent};
