//! Audio container I/O for Phoneline
//!
//! Decodes the in-memory WAV container produced by the capture
//! collaborator, and encodes/writes WAV for capture and export.
//!
//! Decoded audio is downmixed to mono and resampled to the engine rate
//! using linear interpolation.

use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::SampleBuffer;
use crate::error::{PhonelineError, Result};

/// Decode a WAV container held in memory
///
/// # Arguments
/// * `bytes` - Complete WAV file contents
/// * `target_rate` - Sample rate of the rendering engine
///
/// # Errors
/// * `DecodeFailure` - unreadable container, more than 2 channels,
///   unsupported bit depth, or no samples
pub fn decode_audio(bytes: &[u8], target_rate: u32) -> Result<SampleBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| PhonelineError::DecodeFailure {
        reason: format!("not a readable WAV container: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > 2 {
        return Err(PhonelineError::decode(format!(
            "{}-channel audio (only mono/stereo supported)",
            channels
        )));
    }
    if spec.sample_rate == 0 {
        return Err(PhonelineError::decode("sample rate is zero"));
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.len() < channels {
        return Err(PhonelineError::decode("audio contains no samples"));
    }

    let channel_data = deinterleave(&interleaved, channels);
    let resampled = if spec.sample_rate != target_rate {
        channel_data
            .iter()
            .map(|ch| resample_linear(ch, target_rate as f64 / spec.sample_rate as f64))
            .collect()
    } else {
        channel_data
    };

    let buffer = SampleBuffer::from_channels(&resampled, target_rate)?;
    buffer.validate()?;
    log::debug!(
        "decoded {} ch @ {} Hz -> {:.2}s mono @ {} Hz",
        channels,
        spec.sample_rate,
        buffer.duration_secs(),
        target_rate
    );
    Ok(buffer)
}

/// Encode mono samples as a 16-bit PCM WAV container
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = pcm16_spec(sample_rate);
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(hound_to_io)?;
        for &sample in samples {
            writer.write_sample(to_i16(sample)).map_err(hound_to_io)?;
        }
        writer.finalize().map_err(hound_to_io)?;
    }
    Ok(cursor.into_inner())
}

/// Write mono samples to a 16-bit PCM WAV file
#[cfg(test)]
pub(crate) fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = WavWriter::create(path, pcm16_spec(sample_rate)).map_err(hound_to_io)?;
    for &sample in samples {
        writer.write_sample(to_i16(sample)).map_err(hound_to_io)?;
    }
    writer.finalize().map_err(hound_to_io)?;
    Ok(())
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> SampleBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..num_samples)
        .map(|i| 0.5 * (angular_freq * i as f32).sin())
        .collect();
    SampleBuffer::new(samples, sample_rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

pub(crate) fn pcm16_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

#[inline]
pub(crate) fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

pub(crate) fn hound_to_io(e: hound::Error) -> PhonelineError {
    match e {
        hound::Error::IoError(io) => PhonelineError::Io(io),
        other => PhonelineError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_err = |e: hound::Error| PhonelineError::DecodeFailure {
        reason: format!("failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        // 24-bit stored as i32 in hound
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_err),
        (format, bits) => Err(PhonelineError::decode(format!(
            "unsupported sample format: {}-bit {:?}",
            bits, format
        ))),
    }
}

/// De-interleave samples from [L,R,L,R,...] to [[L,L,...], [R,R,...]]
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut result = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            result[ch].push(sample);
        }
    }

    result
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        // Map output index to source position
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wav_bytes(spec: WavSpec, frames: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in frames {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_encoded_tone() {
        let tone = generate_test_tone(440.0, 0.5, 48000);
        let bytes = encode_wav(tone.samples(), 48000).unwrap();

        let decoded = decode_audio(&bytes, 48000).unwrap();
        assert_eq!(decoded.len(), tone.len());
        let max_err = decoded
            .samples()
            .iter()
            .zip(tone.samples())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 1e-3);
    }

    #[test]
    fn test_decode_resamples_to_engine_rate() {
        let tone = generate_test_tone(440.0, 1.0, 24000);
        let bytes = encode_wav(tone.samples(), 24000).unwrap();

        let decoded = decode_audio(&bytes, 48000).unwrap();
        assert_eq!(decoded.sample_rate(), 48000);
        assert!((decoded.duration_secs() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_decode_stereo_downmix() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[16384, 0, 16384, 0]);
        let decoded = decode_audio(&bytes, 8000).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded.samples()[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_audio(b"definitely not audio", 48000).unwrap_err();
        assert_eq!(err.error_code(), "DECODE_FAILURE");
    }

    #[test]
    fn test_decode_empty_fails() {
        let bytes = encode_wav(&[], 48000).unwrap();
        let err = decode_audio(&bytes, 48000).unwrap_err();
        assert!(err.to_string().contains("no samples"));
    }

    #[test]
    fn test_decode_rejects_multichannel() {
        let spec = WavSpec {
            channels: 4,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[0; 8]);
        assert!(decode_audio(&bytes, 8000).is_err());
    }

    #[test]
    fn test_write_wav_roundtrips_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav(&path, &[0.0, 0.5, -0.5], 16000).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_audio(&bytes, 16000).unwrap();
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let resampled = resample_linear(&[0.0, 1.0], 2.0);
        assert_eq!(resampled, vec![0.0, 0.5, 1.0, 1.0]);
    }
}
