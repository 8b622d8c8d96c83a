//! Audio Buffer Management
//!
//! The non-interleaved sample buffer every node in the graph reads and
//! writes, plus the level helpers the tests and the CLI report use.

use crate::error::{EngineError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS (Root Mean Square) level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.channels() * buffer.len();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Non-interleaved 32-bit float audio, one `Vec<f32>` per channel
///
/// Render chunks reuse one buffer: [`AudioBuffer::set_len`] changes the
/// frame count without giving back capacity, so a buffer created with
/// [`AudioBuffer::with_capacity`] never reallocates while it stays within
/// its budget.
///
/// # Example
/// ```
/// use repitch::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::new(44100, 2, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is frames
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer of `num_frames` frames
    pub fn new(num_frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_frames]; channels],
            sample_rate,
        }
    }

    /// Create an empty buffer able to hold `capacity` frames without reallocating
    pub fn with_capacity(capacity: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: (0..channels).map(|_| Vec::with_capacity(capacity)).collect(),
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// Fails if the data length is not a whole number of frames.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(EngineError::UnsupportedFormat {
                format: "zero-channel audio".to_string(),
            });
        }

        if interleaved.len() % channels != 0 {
            return Err(EngineError::UnsupportedFormat {
                format: format!(
                    "interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    channels
                ),
            });
        }

        let num_frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(num_frames); channels];

        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_frames = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_frames);
        for frame in 0..num_frames {
            for channel in &self.samples {
                interleaved.push(channel[frame]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Resize every channel to `num_frames`, zero-filling any new frames
    pub fn set_len(&mut self, num_frames: usize) {
        for channel in &mut self.samples {
            channel.resize(num_frames, 0.0);
        }
    }

    /// Overwrite every sample with silence
    pub fn silence(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, 2, 44100)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_silent() {
        let buffer = AudioBuffer::new(128, 2, 48000);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 128);
        assert!(buffer.samples.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_with_capacity_starts_empty() {
        let buffer = AudioBuffer::with_capacity(4096, 2, 44100);
        assert!(buffer.is_empty());
        assert_eq!(buffer.channels(), 2);
        assert!(buffer.samples[0].capacity() >= 4096);
    }

    #[test]
    fn test_set_len_keeps_capacity() {
        let mut buffer = AudioBuffer::with_capacity(1024, 1, 44100);
        buffer.set_len(1024);
        let ptr = buffer.samples[0].as_ptr();
        buffer.set_len(100);
        buffer.set_len(1024);
        assert_eq!(buffer.samples[0].as_ptr(), ptr);
        assert_eq!(buffer.len(), 1024);
    }

    #[test]
    fn test_interleave_roundtrip() {
        let interleaved = vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 44100).unwrap();
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[5.0, 6.0, 7.0]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_partial_frame() {
        let result = AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0], 2, 44100);
        assert!(matches!(result, Err(EngineError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_is_finite_detects_nan() {
        let mut buffer = AudioBuffer::new(4, 1, 44100);
        assert!(buffer.is_finite());
        buffer.channel_mut(0)[2] = f32::NAN;
        assert!(!buffer.is_finite());
    }

    #[test]
    fn test_levels() {
        let mut buffer = AudioBuffer::new(4, 1, 44100);
        assert_eq!(calculate_rms(&buffer), f32::NEG_INFINITY);
        buffer.channel_mut(0).copy_from_slice(&[0.5, -0.5, 0.5, -0.5]);
        assert!((calculate_peak(&buffer) - linear_to_db(0.5)).abs() < 1e-4);
        assert!((calculate_rms(&buffer) - linear_to_db(0.5)).abs() < 1e-4);
    }
}
