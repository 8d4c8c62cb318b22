//! Wire codec for transport audio
//!
//! The remote service speaks 16-bit little-endian PCM: 16 kHz mono on the
//! way up, 24 kHz mono on the way down. Both directions are handled by the
//! two pure functions here.

use crate::{Error, Result};

/// Sample rate for captured audio sent to the service
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio received from the service
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Encode f32 samples in [-1.0, 1.0] as 16-bit little-endian PCM
///
/// Out-of-range input saturates rather than wrapping. Empty input yields
/// empty output.
#[must_use]
pub fn encode(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&sample_i16.to_le_bytes());
    }
    bytes
}

/// Decode 16-bit little-endian PCM into f32 samples
///
/// The sample count is `bytes.len() / 2` (mono).
///
/// # Errors
///
/// Returns `Error::Codec` if the byte length is odd.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Codec(format!(
            "odd PCM payload length: {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_empty_is_empty() {
        assert!(encode(&[]).is_empty());
    }

    #[test]
    fn encode_saturates_out_of_range() {
        let bytes = encode(&[2.0, -2.0]);
        assert_eq!(
            bytes,
            [i16::MAX.to_le_bytes(), i16::MIN.to_le_bytes()].concat()
        );
    }

    #[test]
    fn decode_reconstructs_sample_count() {
        let samples = decode(&[0x00, 0x00, 0xff, 0x7f, 0x00, 0x80]).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].abs() < f32::EPSILON);
        assert!((samples[1] - 0.9999).abs() < 0.001);
        assert!((samples[2] + 1.0).abs() < 0.001);
    }

    #[test]
    fn decode_odd_length_is_codec_error() {
        let err = decode(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn roundtrip_is_lossless_within_quantization() {
        let original = [0.0f32, 0.5, -0.5, 0.25, -1.0];
        let decoded = decode(&encode(&original)).unwrap();
        for (a, b) in original.iter().zip(&decoded) {
            assert!((a - b).abs() < 1.0 / 32000.0);
        }
    }
}
