//! AudioFrame - one validated block of captured samples
//!
//! Frames are produced by the capture collaborator and handed to the
//! autocorrelator for a single estimation call. Construction is the only
//! place the length/sample-rate contract is checked.

use crate::error::AudioError;

/// Fixed-size, immutable block of mono samples plus its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Create a frame, rejecting malformed input.
    ///
    /// # Errors
    /// * `AudioError::MalformedFrame` - empty or non power-of-two length
    /// * `AudioError::InvalidSampleRate` - sample rate of zero
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        validate_frame(samples.len(), sample_rate)?;
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by the frame in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64 * 1000.0
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Shortest frame the autocorrelator can refine a peak in
pub const MIN_FRAME_SIZE: usize = 4;

/// Check the frame contract shared by [`AudioFrame::new`] and the capture path.
pub fn validate_frame(len: usize, sample_rate: u32) -> Result<(), AudioError> {
    if sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate { sample_rate });
    }
    validate_frame_size(len)
}

/// Length half of the frame contract, for sizes taken from configuration.
pub fn validate_frame_size(len: usize) -> Result<(), AudioError> {
    if len < MIN_FRAME_SIZE || !len.is_power_of_two() {
        return Err(AudioError::MalformedFrame {
            expected: len.max(MIN_FRAME_SIZE).next_power_of_two(),
            actual: len,
        });
    }
    Ok(())
}
