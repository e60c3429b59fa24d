//! 16-bit PCM encoding and decoding for the live wire format

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Scale between `f32` samples in [-1.0, 1.0] and 16-bit PCM
const PCM_SCALE: f32 = 32768.0;

/// Convert one `f32` sample to 16-bit PCM
///
/// Multiplies by 32768 and truncates toward zero; values outside the `i16`
/// range saturate (so a full-scale `1.0` becomes `32767`).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    // `as` on floats truncates toward zero and saturates
    (sample * PCM_SCALE) as i16
}

/// Convert one 16-bit PCM sample to `f32`
#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / PCM_SCALE
}

/// Encode `f32` samples as little-endian 16-bit PCM bytes
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| f32_to_i16(s).to_le_bytes())
        .collect()
}

/// Encode `f32` samples as base64 16-bit PCM, ready for a media chunk
#[must_use]
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    STANDARD.encode(encode_pcm16(samples))
}

/// Decode little-endian 16-bit PCM bytes into per-channel `f32` samples
///
/// Interleaved input is split into `channels` planes of equal length.
///
/// # Errors
///
/// Returns error if the byte length is not a whole number of frames
pub fn decode_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<Vec<f32>>> {
    let channels = usize::from(channels.max(1));
    let frame_bytes = 2 * channels;

    if bytes.len() % frame_bytes != 0 {
        return Err(Error::Audio(format!(
            "pcm payload of {} bytes is not a multiple of {frame_bytes}",
            bytes.len()
        )));
    }

    let frames = bytes.len() / frame_bytes;
    let mut planes = vec![Vec::with_capacity(frames); channels];

    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, pair) in frame.chunks_exact(2).enumerate() {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            planes[channel].push(i16_to_f32(sample));
        }
    }

    Ok(planes)
}

/// Decode a base64 16-bit PCM payload into per-channel `f32` samples
///
/// # Errors
///
/// Returns error if the payload is not valid base64 or not whole frames
pub fn decode_pcm16_base64(data: &str, channels: u16) -> Result<Vec<Vec<f32>>> {
    let bytes = STANDARD.decode(data)?;
    decode_pcm16(&bytes, channels)
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
