//! Bounded playback ring buffer for the speaker path.
//!
//! Network frames arrive in bursts; the output callback drains at a steady
//! rate.  The buffer is bounded so that a stalled output cannot grow latency
//! without limit: on overflow the oldest samples are discarded.  On underrun
//! the callback gets silence.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct PlaybackBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    underruns: u64,
}

impl PlaybackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            underruns: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of `fill` calls that ran out of samples.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Appends decoded samples, discarding the oldest on overflow.
    pub fn push(&mut self, block: &[f32]) {
        for &sample in block {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Fills `out` from the buffer, padding with silence.  Returns the number
    /// of buffered samples used.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let available = self.samples.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(self.samples.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0.0);
        if available < out.len() {
            self.underruns += 1;
        }
        available
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
