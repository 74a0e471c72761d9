//! Sample blocks and output formats
//!
//! A [`SampleBlock`] is what the emulation core hands over once per video
//! frame: interleaved PCM in a single encoding. An [`EncodedFrame`] is the
//! byte form the sink consumes after conversion.

use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Encoding of an incoming sample block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Signed 16-bit integer samples
    Int16,
    /// Normalized 32-bit float samples in [-1.0, 1.0]
    Float32,
}

/// Interleaved sample storage
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    /// Signed 16-bit samples
    Int16(Vec<i16>),
    /// Normalized float samples
    Float32(Vec<f32>),
}

impl SampleData {
    fn len(&self) -> usize {
        match self {
            SampleData::Int16(s) => s.len(),
            SampleData::Float32(s) => s.len(),
        }
    }
}

/// One block of interleaved PCM produced by the emulation core
///
/// Blocks are immutable once built. The sample count must be a multiple of
/// the channel count; a trailing partial frame is rejected at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    channels: u16,
    data: SampleData,
}

impl SampleBlock {
    /// Build a block from signed 16-bit interleaved samples
    pub fn int16(samples: Vec<i16>, channels: u16) -> Result<Self> {
        Self::new(SampleData::Int16(samples), channels)
    }

    /// Build a block from normalized float interleaved samples
    pub fn float32(samples: Vec<f32>, channels: u16) -> Result<Self> {
        Self::new(SampleData::Float32(samples), channels)
    }

    /// Build a block from raw little-endian PCM bytes
    ///
    /// This is the shape most libretro-style cores deliver. The byte count
    /// must be a whole number of samples and of sample frames.
    pub fn from_le_bytes(encoding: SampleEncoding, channels: u16, bytes: &[u8]) -> Result<Self> {
        let width = match encoding {
            SampleEncoding::Int16 => 2,
            SampleEncoding::Float32 => 4,
        };
        if bytes.len() % width != 0 {
            return Err(BridgeError::InvalidSampleBlock {
                samples: bytes.len() / width,
                channels,
            });
        }

        let data = match encoding {
            SampleEncoding::Int16 => SampleData::Int16(
                bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            ),
            SampleEncoding::Float32 => SampleData::Float32(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
        };
        Self::new(data, channels)
    }

    fn new(data: SampleData, channels: u16) -> Result<Self> {
        let samples = data.len();
        if channels == 0 || samples % channels as usize != 0 {
            return Err(BridgeError::InvalidSampleBlock { samples, channels });
        }
        Ok(Self { channels, data })
    }

    /// Encoding of the samples
    pub fn encoding(&self) -> SampleEncoding {
        match self.data {
            SampleData::Int16(_) => SampleEncoding::Int16,
            SampleData::Float32(_) => SampleEncoding::Float32,
        }
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Borrow the interleaved samples
    pub fn data(&self) -> &SampleData {
        &self.data
    }

    /// Total number of samples across all channels
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    /// Whether the block carries no samples
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Peak absolute amplitude in the signed 16-bit domain
    ///
    /// Float samples are clamped to [-1.0, 1.0] and scaled by 32767 first.
    pub fn peak(&self) -> i32 {
        match &self.data {
            SampleData::Int16(s) => s.iter().map(|&v| (v as i32).abs()).max().unwrap_or(0),
            SampleData::Float32(s) => s
                .iter()
                .map(|&v| (v.clamp(-1.0, 1.0) * 32767.0).round().abs() as i32)
                .max()
                .unwrap_or(0),
        }
    }
}

/// Output sample width accepted by the sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    /// Signed 16-bit little-endian
    #[default]
    Sixteen,
    /// Signed 24-bit little-endian packed in three bytes
    TwentyFour,
}

impl TryFrom<u16> for BitDepth {
    type Error = BridgeError;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            other => Err(BridgeError::ConfigError(format!(
                "bit depth must be 16 or 24, got {other}"
            ))),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> u16 {
        depth.bits()
    }
}

impl BitDepth {
    /// Bytes used by one sample
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::Sixteen => 2,
            BitDepth::TwentyFour => 3,
        }
    }

    /// Number of bits per sample
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
        }
    }
}

/// Target layout for converted frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample width
    pub bit_depth: BitDepth,
    /// Interleaved channel count
    pub channels: u16,
}

impl OutputFormat {
    /// Create an output format
    pub fn new(bit_depth: BitDepth, channels: u16) -> Self {
        Self {
            bit_depth,
            channels,
        }
    }

    /// Bytes used by one sample frame (all channels)
    pub fn bytes_per_frame(&self) -> usize {
        self.bit_depth.bytes_per_sample() * self.channels as usize
    }
}

/// Converted audio ready for the sink
///
/// Owned by the frame queue from enqueue until it is fully consumed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedFrame(Vec<u8>);

impl EncodedFrame {
    /// Wrap already-encoded bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the underlying buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}
