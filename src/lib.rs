//! PCM audio bridge for emulator output
//!
//! Carries fixed-size blocks of PCM samples produced by an emulation loop
//! (typically 60 blocks per second) to an audio device running on its own
//! clock. The two sides never block each other: a bounded frame queue sits
//! between them, dropping the oldest audio when the producer runs ahead and
//! playing silence when the device runs ahead.
//!
//! # Features
//! - 16-bit integer and 32-bit float input, mono or stereo
//! - 16-bit or packed 24-bit little-endian output with channel remapping
//! - Optional one-shot auto-gain that tames hot input
//! - Push-mode (non-blocking write) and pull-mode (device callback) backends
//! - Stream statistics: overruns, underruns, dropped writes
//!
//! # Crate feature flags
//! - `wav` (default): WAV file recording backend (enables `hound`)
//! - `playback` (opt-in): Real-time output on a system device (enables `rodio`)
//!
//! # Quick start
//! ```no_run
//! use pcm_bridge::{AudioDriver, BackendKind, DriverConfig, SampleBlock};
//!
//! let config = DriverConfig::low_latency().with_backend(BackendKind::Null);
//! let mut driver = AudioDriver::new(config)?;
//! if driver.init(44_100) {
//!     // One 60 Hz block of stereo silence
//!     let block = SampleBlock::int16(vec![0; 735 * 2], 2)?;
//!     driver.play_samples(&block);
//! }
//! driver.close();
//! # Ok::<(), pcm_bridge::BridgeError>(())
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod convert;
pub mod driver;
pub mod gain;
pub mod sample;
pub mod streaming;

/// Error types for audio bridge operations
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// Requested backend is not compiled in or has no device
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Device could not be opened with any acceptable parameters
    #[error("Audio device error: {0}")]
    DeviceInitFailure(String),

    /// Sample block with zero channels or a partial sample frame
    #[error("Invalid sample block: {samples} samples do not divide into {channels} channels")]
    InvalidSampleBlock {
        /// Number of samples in the block
        samples: usize,
        /// Declared channel count
        channels: u16,
    },

    /// Conversion failed for a reason other than malformed input
    #[error("Conversion failed: {0}")]
    UnexpectedConversionFailure(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or thread spawn
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for BridgeError {
    /// Converts a String into `BridgeError::Other`.
    ///
    /// Prefer a specific variant where one fits; this exists for wrapping
    /// third-party error messages with `map_err(|e| format!(..))?`.
    fn from(msg: String) -> Self {
        BridgeError::Other(msg)
    }
}

impl From<&str> for BridgeError {
    fn from(msg: &str) -> Self {
        BridgeError::Other(msg.to_string())
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Public API exports
pub use backend::{create_backend, probe, AudioBackend, Capability, NullBackend, VolumeControl};
#[cfg(feature = "playback")]
pub use backend::PlaybackBackend;
#[cfg(feature = "wav")]
pub use backend::WavBackend;
pub use config::{BackendKind, DriverConfig, StreamParams};
pub use convert::{convert, convert_scaled};
pub use driver::{AudioDriver, DriverState};
pub use gain::{GainNormalizer, GainState};
pub use sample::{BitDepth, EncodedFrame, OutputFormat, SampleBlock, SampleData, SampleEncoding};
pub use streaming::{
    FrameQueue, PullCallback, PullSink, PushSink, SinkMode, StreamStats, WriteError,
};
