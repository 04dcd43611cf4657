//! Outbound websocket commands.
//!
//! The device firmware dispatches on the first character of each text frame:
//!
//! | Frame        | Meaning                              |
//! |--------------|--------------------------------------|
//! | `H`          | heartbeat (liveness only)            |
//! | `K`          | client is closing; kill the socket   |
//! | `X`          | stop the remote mic stream           |
//! | `U{...}`     | bulk update / control as JSON        |
//! | anything     | free-text command typed by the user  |
//!
//! Binary frames carry little-endian i16 audio.

use serde_json::{Map, Value};

use crate::audio::AudioFrame;

pub const HEARTBEAT: &str = "H";
pub const KILL: &str = "K";
pub const STOP_AUDIO: &str = "X";
pub const UPDATE_PREFIX: char = 'U';

/// A frame ready for the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Everything the client can send to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    Heartbeat,
    Kill,
    StopAudio,
    /// Free text typed by the user.
    Text(String),
    /// JSON bulk update.
    Update(Map<String, Value>),
    Audio(AudioFrame),
}

impl OutboundCommand {
    pub fn into_wire(self) -> WireFrame {
        match self {
            Self::Heartbeat => WireFrame::Text(HEARTBEAT.to_string()),
            Self::Kill => WireFrame::Text(KILL.to_string()),
            Self::StopAudio => WireFrame::Text(STOP_AUDIO.to_string()),
            Self::Text(text) => WireFrame::Text(text),
            Self::Update(body) => {
                WireFrame::Text(format!("{UPDATE_PREFIX}{}", Value::Object(body)))
            }
            Self::Audio(frame) => WireFrame::Binary(frame.to_le_bytes()),
        }
    }

    /// Short description for log lines; audio frames are summarised.
    pub fn describe(&self) -> String {
        match self {
            Self::Audio(frame) => format!("<audio {} samples>", frame.len()),
            other => match other.clone().into_wire() {
                WireFrame::Text(text) => text,
                WireFrame::Binary(bytes) => format!("<{} bytes>", bytes.len()),
            },
        }
    }
}
