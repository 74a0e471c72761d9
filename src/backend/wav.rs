//! Backend recording the stream to a WAV file

use super::{AudioBackend, VolumeControl};
use crate::config::StreamParams;
use crate::convert::unpack_i24;
use crate::sample::BitDepth;
use crate::streaming::{PushSink, SinkMode, WriteError};
use crate::{BridgeError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

/// Push backend writing the encoded stream to a WAV file
///
/// The file header carries the negotiated rate, channel count and bit depth,
/// so the recording is exactly what a device would have been sent.
#[derive(Debug)]
pub struct WavBackend {
    path: PathBuf,
}

impl WavBackend {
    /// Backend writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    bit_depth: BitDepth,
}

impl PushSink for WavSink {
    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), WriteError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(WriteError::Failed("WAV writer already finalized".into()));
        };

        match self.bit_depth {
            BitDepth::Sixteen => {
                for b in bytes.chunks_exact(2) {
                    writer
                        .write_sample(i16::from_le_bytes([b[0], b[1]]))
                        .map_err(|e| WriteError::Failed(e.to_string()))?;
                }
            }
            BitDepth::TwentyFour => {
                for b in bytes.chunks_exact(3) {
                    writer
                        .write_sample(unpack_i24([b[0], b[1], b[2]]))
                        .map_err(|e| WriteError::Failed(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| format!("Failed to finalize WAV file: {e}"))?;
        }
        Ok(())
    }
}

impl AudioBackend for WavBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn volume_control(&self) -> VolumeControl {
        VolumeControl::Software
    }

    fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)> {
        let spec = hound::WavSpec {
            channels: requested.channels,
            sample_rate: requested.sample_rate,
            bits_per_sample: requested.bit_depth.bits(),
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&self.path, spec).map_err(|e| {
            BridgeError::DeviceInitFailure(format!(
                "Failed to create WAV file {}: {e}",
                self.path.display()
            ))
        })?;

        info!(path = %self.path.display(), "Recording stream to WAV");

        let sink = WavSink {
            writer: Some(writer),
            bit_depth: requested.bit_depth,
        };
        Ok((*requested, SinkMode::Push(Box::new(sink))))
    }
}
