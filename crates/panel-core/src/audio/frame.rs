//! Fixed-size i16 frames.

use super::resample::{f32_to_i16, i16_to_f32};
use super::AudioError;

/// One block of i16 samples as sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame(Vec<i16>);

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self(samples)
    }

    pub fn samples(&self) -> &[i16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Little-endian byte image, two bytes per sample.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Decodes little-endian i16 PCM into float samples.
///
/// A trailing odd byte cannot form a sample and is ignored.
pub fn decode_pcm(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Accumulates converted samples and cuts them into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_samples: usize,
    pending: Vec<i16>,
}

impl FrameAssembler {
    /// # Errors
    ///
    /// [`AudioError::EmptyFrame`] if `frame_samples` is zero.
    pub fn new(frame_samples: usize) -> Result<Self, AudioError> {
        if frame_samples == 0 {
            return Err(AudioError::EmptyFrame);
        }
        Ok(Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        })
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Converts and appends `samples`, returning every frame completed.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        for &sample in samples {
            self.pending.push(f32_to_i16(sample));
            if self.pending.len() == self.frame_samples {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_samples));
                frames.push(AudioFrame(full));
            }
        }
        frames
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_cut_at_fixed_size() {
        // Arrange
        let mut assembler = FrameAssembler::new(4).unwrap();

        // Act
        let first = assembler.push(&[0.0; 6]);
        let second = assembler.push(&[0.0; 3]);

        // Assert
        assert_eq!(first.len(), 1);
        assert_eq!(assembler.pending(), 1);
        assert_eq!(second.len(), 1);
        assert!(second.iter().all(|f| f.len() == 4));
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut assembler = FrameAssembler::new(4).unwrap();
        assembler.push(&[0.5; 3]);
        assembler.reset();
        assert_eq!(assembler.pending(), 0);
        assert!(assembler.push(&[0.5; 3]).is_empty());
    }

    #[test]
    fn test_zero_frame_size_is_rejected() {
        assert_eq!(FrameAssembler::new(0).unwrap_err(), AudioError::EmptyFrame);
    }

    #[test]
    fn test_decode_pcm_ignores_odd_trailing_byte() {
        let decoded = decode_pcm(&[0x00, 0x40, 0x00, 0x80, 0x7F]);
        assert_eq!(decoded, vec![0.5, -1.0]);
    }

    #[test]
    fn test_frame_bytes_decode_back_to_scaled_samples() {
        let frame = AudioFrame::new(vec![16384, -16384]);
        assert_eq!(decode_pcm(&frame.to_le_bytes()), vec![0.5, -0.5]);
    }
}
