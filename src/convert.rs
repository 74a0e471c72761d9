//! Sample format and channel-layout conversion
//!
//! Stateless helpers turning a [`SampleBlock`] into the byte layout a sink
//! expects. Two target widths are supported: signed 16-bit little-endian and
//! signed 24-bit little-endian packed into three bytes.
//!
//! # Quantization
//!
//! Float input is clamped to [-1.0, 1.0] before scaling, so out-of-range
//! values saturate at full scale instead of wrapping. Every float-to-integer
//! step rounds to nearest (half away from zero). NaN samples become silence.
//!
//! # Channel layout
//!
//! Output channel `c` is taken from input channel `min(c, input_channels - 1)`:
//! the leading channels are copied as-is and the last available input channel
//! fills any extra output channels. Mono to stereo therefore duplicates the
//! sample, and stereo to mono keeps the left channel.

use crate::sample::{BitDepth, EncodedFrame, OutputFormat, SampleBlock, SampleData};
use crate::{BridgeError, Result};

/// Largest value representable in signed 24-bit
pub const I24_MAX: i32 = 8_388_607;
/// Smallest value representable in signed 24-bit
pub const I24_MIN: i32 = -8_388_608;

/// Convert a block to the target format at unity gain
pub fn convert(block: &SampleBlock, format: OutputFormat) -> Result<EncodedFrame> {
    convert_scaled(block, format, 1.0)
}

/// Convert a block to the target format, scaling every sample by `scale`
///
/// A scale of exactly `1.0` keeps the integer passthrough path, so 16-bit input
/// converted to 16-bit output is byte-identical.
pub fn convert_scaled(
    block: &SampleBlock,
    format: OutputFormat,
    scale: f32,
) -> Result<EncodedFrame> {
    let mut out = Vec::new();
    convert_into(block, format, scale, &mut out)?;
    Ok(EncodedFrame::from_bytes(out))
}

/// Convert a block into a caller-provided buffer
///
/// `out` is cleared first; its capacity is reused.
pub fn convert_into(
    block: &SampleBlock,
    format: OutputFormat,
    scale: f32,
    out: &mut Vec<u8>,
) -> Result<()> {
    if format.channels == 0 {
        return Err(BridgeError::UnexpectedConversionFailure(
            "output channel count is zero".into(),
        ));
    }
    if !scale.is_finite() || scale < 0.0 {
        return Err(BridgeError::UnexpectedConversionFailure(format!(
            "invalid scale factor {scale}"
        )));
    }

    let in_channels = block.channels() as usize;
    let out_channels = format.channels as usize;
    let frames = block.frame_count();
    let needed = frames
        .checked_mul(format.bytes_per_frame())
        .ok_or_else(|| {
            BridgeError::UnexpectedConversionFailure(format!(
                "{frames} frames overflow the output buffer size"
            ))
        })?;

    out.clear();
    out.reserve(needed);

    match block.data() {
        SampleData::Int16(samples) => {
            for frame in samples.chunks_exact(in_channels) {
                for c in 0..out_channels {
                    let v = frame[c.min(in_channels - 1)];
                    write_sample(out, format.bit_depth, quantize_i16(v, scale, format.bit_depth));
                }
            }
        }
        SampleData::Float32(samples) => {
            for frame in samples.chunks_exact(in_channels) {
                for c in 0..out_channels {
                    let v = frame[c.min(in_channels - 1)];
                    write_sample(out, format.bit_depth, quantize_f32(v, scale, format.bit_depth));
                }
            }
        }
    }

    debug_assert_eq!(out.len(), needed);
    Ok(())
}

#[inline]
fn quantize_i16(v: i16, scale: f32, depth: BitDepth) -> i32 {
    match depth {
        BitDepth::Sixteen if scale == 1.0 => v as i32,
        BitDepth::Sixteen => (v as f32 * scale).round().clamp(-32768.0, 32767.0) as i32,
        BitDepth::TwentyFour => {
            (v as f32 * scale / 32768.0 * I24_MAX as f32)
                .round()
                .clamp(I24_MIN as f32, I24_MAX as f32) as i32
        }
    }
}

#[inline]
fn quantize_f32(v: f32, scale: f32, depth: BitDepth) -> i32 {
    let full_scale = match depth {
        BitDepth::Sixteen => i16::MAX as f32,
        BitDepth::TwentyFour => I24_MAX as f32,
    };
    ((v * scale).clamp(-1.0, 1.0) * full_scale).round() as i32
}

#[inline]
fn write_sample(out: &mut Vec<u8>, depth: BitDepth, value: i32) {
    match depth {
        BitDepth::Sixteen => out.extend_from_slice(&(value as i16).to_le_bytes()),
        BitDepth::TwentyFour => out.extend_from_slice(&pack_i24(value)),
    }
}

/// Convert a normalized float sample to signed 16-bit
///
/// Input is clamped to [-1.0, 1.0] and rounded to nearest.
pub fn float_to_i16(v: f32) -> i16 {
    quantize_f32(v, 1.0, BitDepth::Sixteen) as i16
}

/// Scale a signed 16-bit sample into the signed 24-bit range
///
/// Uses `v / 32768 * 8388607`, rounded to nearest.
pub fn i16_to_i24(v: i16) -> i32 {
    quantize_i16(v, 1.0, BitDepth::TwentyFour)
}

/// Pack the low 24 bits of `v` as three little-endian bytes
///
/// Negative values keep their two's-complement form (`v & 0xFFFFFF`).
#[inline]
pub fn pack_i24(v: i32) -> [u8; 3] {
    let bits = (v & 0x00FF_FFFF) as u32;
    [bits as u8, (bits >> 8) as u8, (bits >> 16) as u8]
}

/// Decode three little-endian bytes as a sign-extended 24-bit value
#[inline]
pub fn unpack_i24(bytes: [u8; 3]) -> i32 {
    let raw = (bytes[0] as i32) | ((bytes[1] as i32) << 8) | ((bytes[2] as i32) << 16);
    (raw << 8) >> 8
}
