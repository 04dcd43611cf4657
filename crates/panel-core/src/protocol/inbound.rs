//! Classification of frames received from the device.

use thiserror::Error;

use crate::audio::decode_pcm;
use crate::domain::status::{StatusMap, STATUS_GROUP};

/// Prefix of app-specific messages that bypass the log.
pub const CUSTOM_PREFIX: char = '#';

#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed JSON push: {0}")]
    Json(#[from] serde_json::Error),
}

/// A decoded device frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Status push (no group, or group `-1`).
    Status(StatusMap),
    /// Config table payload for a config group.
    Config { group: String, data: StatusMap },
    /// `#`-prefixed app message, prefix stripped.
    Custom(String),
    /// Plain log line.
    Log(String),
    /// Speaker samples decoded from i16 LE audio.
    Audio(Vec<f32>),
}

/// Classifies a text frame.
///
/// # Errors
///
/// Returns [`InboundError::Json`] when a frame starting with `{` is not a
/// JSON object.
pub fn classify_text(text: &str) -> Result<InboundMessage, InboundError> {
    if text.starts_with('{') {
        let mut data = StatusMap::from_json_str(text)?;
        return Ok(match data.take_group() {
            Some(group) if group != STATUS_GROUP => InboundMessage::Config { group, data },
            _ => InboundMessage::Status(data),
        });
    }
    if let Some(custom) = text.strip_prefix(CUSTOM_PREFIX) {
        return Ok(InboundMessage::Custom(custom.to_string()));
    }
    Ok(InboundMessage::Log(text.to_string()))
}

/// Classifies a binary frame.  The device only sends audio in binary.
pub fn classify_binary(bytes: &[u8]) -> InboundMessage {
    InboundMessage::Audio(decode_pcm(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_push() {
        let msg = classify_text(r#"{"cfgGroup":"-1","fps":"20"}"#).unwrap();
        let InboundMessage::Status(data) = msg else {
            panic!("expected status, got {msg:?}");
        };
        assert_eq!(data.get_text("fps").as_deref(), Some("20"));
        assert!(data.get("cfgGroup").is_none());
    }

    #[test]
    fn test_push_without_group_is_status() {
        assert!(matches!(
            classify_text(r#"{"fps":"20"}"#).unwrap(),
            InboundMessage::Status(_)
        ));
    }

    #[test]
    fn test_config_push_carries_group() {
        let msg = classify_text(r#"{"cfgGroup":"3","a":"1","a_l":"A","a_t":"T"}"#).unwrap();
        match msg {
            InboundMessage::Config { group, data } => {
                assert_eq!(group, "3");
                assert_eq!(data.len(), 3);
            }
            other => panic!("expected config, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_and_log_lines() {
        assert_eq!(
            classify_text("#photo:12").unwrap(),
            InboundMessage::Custom("photo:12".into())
        );
        assert_eq!(
            classify_text("[10:01:02 WARN] low heap").unwrap(),
            InboundMessage::Log("[10:01:02 WARN] low heap".into())
        );
    }

    #[test]
    fn test_binary_frame_is_decoded_audio() {
        // Arrange: 0x4000 and 0x8000 little-endian, plus a stray odd byte.
        let bytes = [0x00, 0x40, 0x00, 0x80, 0x7f];

        // Act
        let msg = classify_binary(&bytes);

        // Assert
        assert_eq!(msg, InboundMessage::Audio(vec![0.5, -1.0]));
    }

    #[test]
    fn test_broken_json_is_error() {
        assert!(matches!(
            classify_text("{broken"),
            Err(InboundError::Json(_))
        ));
    }
}
