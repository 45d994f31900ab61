//! Sample Buffer
//!
//! Decoded, immutable mono audio shared between the control side and the
//! render thread. The samples live behind an `Arc` so handing a buffer to
//! the renderer never copies audio data.

use std::sync::Arc;

use crate::error::{PhonelineError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// RMS level of a block of samples (linear)
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Peak absolute level of a block of samples (linear)
fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

// ============================================================================
// Sample Buffer
// ============================================================================

/// Mono audio ready for playback
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap mono samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Build a mono buffer from per-channel data by averaging channels
    ///
    /// # Errors
    /// `DecodeFailure` if the channels have different lengths
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Ok(Self::new(Vec::new(), sample_rate));
        };
        if channels.iter().any(|ch| ch.len() != first.len()) {
            return Err(PhonelineError::decode("channels have mismatched lengths"));
        }
        if channels.len() == 1 {
            return Ok(Self::new(first.clone(), sample_rate));
        }

        let scale = 1.0 / channels.len() as f32;
        let mono = (0..first.len())
            .map(|i| channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect();
        Ok(Self::new(mono, sample_rate))
    }

    /// Shared handle to the samples
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Peak level in dBFS
    pub fn peak_db(&self) -> f32 {
        linear_to_db(calculate_peak(&self.samples))
    }

    /// RMS level in dBFS
    pub fn rms_db(&self) -> f32 {
        linear_to_db(calculate_rms(&self.samples))
    }

    /// Check all samples are finite
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// Check the buffer can actually be played
    ///
    /// # Errors
    /// `DecodeFailure` for empty buffers, a zero sample rate or NaN/Inf samples
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PhonelineError::decode("sample rate is zero"));
        }
        if self.is_empty() {
            return Err(PhonelineError::decode("audio contains no samples"));
        }
        if !self.is_finite() {
            return Err(PhonelineError::decode("audio contains NaN or infinite samples"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duration() {
        let buffer = SampleBuffer::new(vec![0.0; 24000], 48000);
        assert_relative_eq!(buffer.duration_secs(), 0.5);
        assert_eq!(buffer.len(), 24000);
    }

    #[test]
    fn test_stereo_downmix() {
        let buffer =
            SampleBuffer::from_channels(&[vec![1.0, 0.5, 0.0], vec![0.0, 0.5, -1.0]], 48000).unwrap();
        assert_eq!(buffer.samples(), &[0.5, 0.5, -0.5]);
    }

    #[test]
    fn test_mismatched_channels_rejected() {
        let result = SampleBuffer::from_channels(&[vec![0.0; 3], vec![0.0; 2]], 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_empty() {
        let buffer = SampleBuffer::new(Vec::new(), 48000);
        let err = buffer.validate().unwrap_err();
        assert_eq!(err.error_code(), "DECODE_FAILURE");
    }

    #[test]
    fn test_validate_non_finite() {
        let buffer = SampleBuffer::new(vec![0.0, f32::NAN], 48000);
        assert!(buffer.validate().is_err());
    }

    #[test]
    fn test_levels() {
        let buffer = SampleBuffer::new(vec![0.5, -0.5, 0.5, -0.5], 48000);
        assert_relative_eq!(buffer.peak_db(), linear_to_db(0.5));
        assert_relative_eq!(buffer.rms_db(), linear_to_db(0.5));
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_shared_samples_does_not_copy() {
        let buffer = SampleBuffer::new(vec![0.25; 8], 48000);
        let shared = buffer.shared_samples();
        assert!(std::ptr::eq(shared.as_ptr(), buffer.samples().as_ptr()));
    }
}
