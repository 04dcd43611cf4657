//! Sound card adapter.
//!
//! The real-time audio callbacks never touch session state.  They exchange
//! sample blocks with the session over bounded channels and drop blocks
//! when a channel is full:
//!
//! ```text
//! mic callback ──MicBlock──► session ─► MicPipeline ─► audio channel
//! audio channel ─► session ─► classify_binary ──Vec<f32>──► speaker callback
//! ```
//!
//! The cpal implementation is compiled only with the `audio-device` feature.

#[cfg(feature = "audio-device")]
pub mod device;

use tokio::sync::mpsc;

/// Blocks buffered between the session and the speaker callback.
pub const SPEAKER_QUEUE_BLOCKS: usize = 64;

/// Blocks buffered between the mic callback and the session.
pub const MIC_QUEUE_BLOCKS: usize = 64;

/// One captured block, mono, at the capture device's native rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MicBlock {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Session side of the speaker path.
pub type SpeakerFeed = mpsc::Sender<Vec<f32>>;

/// Creates the channel between the session and a speaker output.
pub fn speaker_channel() -> (SpeakerFeed, mpsc::Receiver<Vec<f32>>) {
    mpsc::channel(SPEAKER_QUEUE_BLOCKS)
}

/// Creates the channel between a mic input and the session.
pub fn mic_channel() -> (mpsc::Sender<MicBlock>, mpsc::Receiver<MicBlock>) {
    mpsc::channel(MIC_QUEUE_BLOCKS)
}

/// Averages interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
