//! Signed 16-bit little-endian PCM decoding.
//!
//! The decoder process is asked for `s16le` mono output, so every frame is
//! `frame_len × 2` bytes. Codes map to floats by dividing by 32768, which
//! puts `i16::MIN` exactly on `-1.0` and `i16::MAX` just below `1.0`.

/// Bytes per `s16le` sample.
pub const BYTES_PER_SAMPLE: usize = 2;

const SCALE: f32 = 32_768.0;

/// Convert raw `s16le` bytes to normalised samples.
///
/// A trailing odd byte (half a sample) is ignored.
pub fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / SCALE)
        .collect()
}

/// Decode exactly `frame_len` samples, zero-padding a short read.
///
/// Returns the samples and whether padding was applied.
pub fn decode_frame(bytes: &[u8], frame_len: usize) -> (Vec<f32>, bool) {
    let wanted = frame_len * BYTES_PER_SAMPLE;
    let usable = &bytes[..bytes.len().min(wanted)];

    let mut samples = pcm_s16le_to_f32(usable);
    let padded = samples.len() < frame_len;
    samples.resize(frame_len, 0.0);
    (samples, padded)
}

/// Encode samples as `s16le`, used by tests to script decoder output.
#[cfg(test)]
pub fn encode_s16le(codes: &[i16]) -> Vec<u8> {
    codes.iter().flat_map(|c| c.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_map_to_unit_range() {
        let bytes = encode_s16le(&[i16::MIN, 0, i16::MAX]);
        let samples = pcm_s16le_to_f32(&bytes);

        assert_eq!(samples[0], -1.0);
        assert_eq!(samples[1], 0.0);
        assert!(samples[2] < 1.0);
        assert!((samples[2] - 32_767.0 / 32_768.0).abs() < 1e-9);
    }

    #[test]
    fn little_endian_byte_order() {
        // 0x0100 = 256
        let samples = pcm_s16le_to_f32(&[0x00, 0x01]);
        assert_eq!(samples, vec![256.0 / 32_768.0]);
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        let samples = pcm_s16le_to_f32(&[0x00, 0x40, 0x7f]);
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn short_read_is_zero_padded() {
        let bytes = encode_s16le(&[16_384, -16_384]);
        let (samples, padded) = decode_frame(&bytes, 4);

        assert!(padded);
        assert_eq!(samples, vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn full_read_is_not_padded() {
        let bytes = encode_s16le(&[1, 2, 3]);
        let (samples, padded) = decode_frame(&bytes, 3);
        assert!(!padded);
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn excess_bytes_are_truncated() {
        let bytes = encode_s16le(&[1, 2, 3, 4]);
        let (samples, padded) = decode_frame(&bytes, 2);
        assert!(!padded);
        assert_eq!(samples.len(), 2);
    }
}
