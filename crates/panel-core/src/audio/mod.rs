//! Audio DSP for the mic and speaker paths.
//!
//! # Mic path
//!
//! ```text
//! capture (native rate, f32)
//!   → Resampler      nearest-sample, to the target rate
//!   → FrameAssembler f32 → i16, fixed-size frames
//!   → audio channel  one binary frame per AudioFrame
//! ```
//!
//! # Speaker path
//!
//! ```text
//! audio channel binary frame → decode_pcm (i16 LE → f32) → PlaybackBuffer
//!   → output callback (silence on underrun)
//! ```
//!
//! Everything here is plain data processing.  The sound card adapter in
//! `panel-client` moves blocks between these types and the device callbacks
//! through channels.

pub mod frame;
pub mod playback;
pub mod resample;

use thiserror::Error;

pub use frame::{decode_pcm, AudioFrame, FrameAssembler};
pub use playback::PlaybackBuffer;
pub use resample::{f32_to_i16, i16_to_f32, Resampler};

/// Rate the device expects mic audio at and sends speaker audio at.
pub const DEFAULT_TARGET_RATE: u32 = 16_000;

/// 20 ms at 16 kHz.
pub const DEFAULT_FRAME_SAMPLES: usize = 320;

#[derive(Debug, Error, PartialEq)]
pub enum AudioError {
    #[error("invalid sample rate conversion {input} Hz -> {output} Hz")]
    InvalidRate { input: u32, output: u32 },

    #[error("frame length must be non-zero")]
    EmptyFrame,

    /// The platform refused microphone access.
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("no {0} audio device available")]
    NoDevice(&'static str),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Resampler and frame assembler chained for the mic path.
#[derive(Debug)]
pub struct MicPipeline {
    resampler: Resampler,
    assembler: FrameAssembler,
}

impl MicPipeline {
    /// # Errors
    ///
    /// Propagates [`Resampler::new`] and [`FrameAssembler::new`] errors.
    pub fn new(input_rate: u32, output_rate: u32, frame_samples: usize) -> Result<Self, AudioError> {
        Ok(Self {
            resampler: Resampler::new(input_rate, output_rate)?,
            assembler: FrameAssembler::new(frame_samples)?,
        })
    }

    /// Feeds one captured block and returns the frames it completed.
    pub fn process(&mut self, block: &[f32]) -> Vec<AudioFrame> {
        let resampled = self.resampler.process(block);
        self.assembler.push(&resampled)
    }

    /// Drops any partially assembled frame and restarts the resampler.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.assembler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_emits_frames_at_target_rate() {
        // Arrange: 48 kHz capture, 16 kHz target, 320-sample frames.
        let mut pipeline = MicPipeline::new(48_000, 16_000, 320).unwrap();
        let block = vec![0.25_f32; 960];

        // Act: 960 samples at ratio 3 → 320 output samples → one frame.
        let frames = pipeline.process(&block);

        // Assert
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 320);
        assert!(frames[0].samples().iter().all(|&s| s == f32_to_i16(0.25)));
    }

    #[test]
    fn test_pipeline_frame_count_follows_capture_time() {
        // Arrange: 1 s of 44.1 kHz capture in 441-sample blocks.
        let mut pipeline = MicPipeline::new(44_100, 16_000, 320).unwrap();
        let block = vec![0.0_f32; 441];

        // Act
        let frames: usize = (0..100).map(|_| pipeline.process(&block).len()).sum();

        // Assert: 16 000 samples make 50 frames.
        assert_eq!(frames, 50);
    }

    #[test]
    fn test_pipeline_rejects_zero_rate() {
        assert_eq!(
            MicPipeline::new(0, 16_000, 320).unwrap_err(),
            AudioError::InvalidRate {
                input: 0,
                output: 16_000
            }
        );
    }
}
