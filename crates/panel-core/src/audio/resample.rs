//! Nearest-sample resampling and sample format conversion.
//!
//! Each output sample is the input sample nearest to its position; there is
//! no filtering.

use super::AudioError;

/// Streaming resampler from a capture rate to a target rate.
///
/// Positions are counted across blocks, so after `N` input samples exactly
/// `round(N / ratio)` output samples have been produced regardless of how
/// the capture callback slices its blocks.
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    ratio: f64,
    /// Input samples consumed by earlier blocks.
    consumed: u64,
    /// Output samples produced so far.
    emitted: u64,
    /// Final sample of the previous block.
    carry: f32,
}

impl Resampler {
    /// # Errors
    ///
    /// [`AudioError::InvalidRate`] if either rate is zero.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, AudioError> {
        if input_rate == 0 || output_rate == 0 {
            return Err(AudioError::InvalidRate {
                input: input_rate,
                output: output_rate,
            });
        }
        Ok(Self {
            input_rate,
            output_rate,
            ratio: f64::from(input_rate) / f64::from(output_rate),
            consumed: 0,
            emitted: 0,
            carry: 0.0,
        })
    }

    /// `input_rate / output_rate`.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Resamples the next block of the stream.
    ///
    /// On a fresh resampler the output holds `round(len / ratio)` samples and
    /// sample `i` is input sample `round(i * ratio)`, clamped to the last
    /// input index.  Later blocks continue the same sample grid; a position
    /// that falls just before the block resolves to the previous block's
    /// final sample.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() {
            return Vec::new();
        }
        let total = self.consumed + input.len() as u64;
        let target = self.output_position(total);
        let output = (self.emitted..target)
            .map(|i| {
                let index = self.input_position(i).min(total - 1);
                match index.checked_sub(self.consumed) {
                    Some(local) => input[local as usize],
                    None => self.carry,
                }
            })
            .collect();
        self.consumed = total;
        self.emitted = target;
        self.carry = input[input.len() - 1];
        output
    }

    /// Forgets the stream position.
    pub fn reset(&mut self) {
        self.consumed = 0;
        self.emitted = 0;
        self.carry = 0.0;
    }

    /// `round(i * input_rate / output_rate)` in integer arithmetic.
    fn input_position(&self, i: u64) -> u64 {
        let (input, output) = (u64::from(self.input_rate), u64::from(self.output_rate));
        (2 * i * input + output) / (2 * output)
    }

    /// `round(n * output_rate / input_rate)` in integer arithmetic.
    fn output_position(&self, n: u64) -> u64 {
        let (input, output) = (u64::from(self.input_rate), u64::from(self.output_rate));
        (2 * n * output + input) / (2 * input)
    }
}

/// Converts a float sample to i16, clamping to [-1, 1] first.
///
/// Negative samples scale by 0x8000 and positive ones by 0x7FFF so that both
/// ends of the range map exactly onto the i16 limits.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    let scaled = if s < 0.0 {
        s * 32768.0
    } else {
        s * 32767.0
    };
    scaled.round() as i16
}

/// Converts an i16 sample to float in [-1, 1).
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
