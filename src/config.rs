//! Driver configuration and named presets
//!
//! A single [`DriverConfig`] covers every backend. Latency/quality trade-offs
//! are expressed as preset constructors rather than separate driver types.

use crate::sample::{BitDepth, OutputFormat};
use crate::streaming::{DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_SAMPLE_RATE};
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Which compiled-in backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Discard everything (always available)
    Null,
    /// Record to a WAV file at `device`
    Wav,
    /// Real-time playback on a system output device
    #[default]
    Playback,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackendKind::Null => "null",
            BackendKind::Wav => "wav",
            BackendKind::Playback => "playback",
        })
    }
}

/// Requested driver settings
///
/// Immutable once handed to the driver. The backend may adjust the stream
/// parameters during `init`; read the outcome from the driver's effective
/// parameters rather than from this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Backend to open
    pub backend: BackendKind,
    /// Device identifier ("default" for the system default; a path for `Wav`)
    pub device: String,
    /// Sample rate in Hz; 0 defers to the rate passed to `init`
    pub sample_rate: u32,
    /// Output channels (1 or 2)
    pub channels: u16,
    /// Sample frames per hardware period
    pub period_size: u32,
    /// Output sample width
    pub bit_depth: BitDepth,
    /// Post-mix gain in [0, 1], for backends that support it
    pub volume: f32,
    /// Enable one-shot peak normalization
    pub auto_gain: bool,
    /// Frame queue bound, in frames
    pub max_queue_depth: usize,
}

impl DriverConfig {
    /// Small queue and period: lowest latency, least jitter tolerance
    pub fn low_latency() -> Self {
        DriverConfig {
            period_size: 256,
            max_queue_depth: 8,
            ..Self::default()
        }
    }

    /// Large period: most robust against scheduling hiccups
    pub fn stable() -> Self {
        DriverConfig {
            period_size: 4096,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            ..Self::default()
        }
    }

    /// 48 kHz, 24-bit stereo at reduced volume
    pub fn studio() -> Self {
        DriverConfig {
            sample_rate: 48_000,
            period_size: 1024,
            bit_depth: BitDepth::TwentyFour,
            volume: 0.3,
            ..Self::default()
        }
    }

    /// Replace the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the device identifier
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: DriverConfig = serde_json::from_str(json)
            .map_err(|e| BridgeError::ConfigError(format!("invalid driver config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no backend can honor
    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.channels) {
            return Err(BridgeError::ConfigError(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.period_size == 0 {
            return Err(BridgeError::ConfigError("period_size must be > 0".into()));
        }
        if self.max_queue_depth == 0 {
            return Err(BridgeError::ConfigError(
                "max_queue_depth must be > 0".into(),
            ));
        }
        if !self.volume.is_finite() {
            return Err(BridgeError::ConfigError(format!(
                "volume must be finite, got {}",
                self.volume
            )));
        }
        if self.device.is_empty() {
            return Err(BridgeError::ConfigError("device must not be empty".into()));
        }
        Ok(())
    }

    /// Stream parameters to request for a given `init` rate
    ///
    /// A positive `requested_rate` wins; otherwise the configured rate is
    /// used, falling back to 44.1 kHz.
    pub fn requested_params(&self, requested_rate: u32) -> StreamParams {
        let sample_rate = if requested_rate > 0 {
            requested_rate
        } else if self.sample_rate > 0 {
            self.sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
        StreamParams {
            sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
            period_size: self.period_size,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            backend: BackendKind::default(),
            device: "default".into(),
            sample_rate: 0,
            channels: 2,
            period_size: 256,
            bit_depth: BitDepth::Sixteen,
            volume: 1.0,
            auto_gain: false,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}

/// Stream parameters, either requested or as negotiated with a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Sample width
    pub bit_depth: BitDepth,
    /// Sample frames per device period
    pub period_size: u32,
}

impl StreamParams {
    /// Output format frames must be converted to
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::new(self.bit_depth, self.channels)
    }

    /// Bytes in one device period
    pub fn period_bytes(&self) -> usize {
        self.period_size as usize * self.output_format().bytes_per_frame()
    }

    /// Device period length in milliseconds
    pub fn period_ms(&self) -> f32 {
        (self.period_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device, "default");
        assert_eq!(config.max_queue_depth, 15);
    }

    #[test]
    fn test_presets() {
        assert!(DriverConfig::low_latency().max_queue_depth < DriverConfig::stable().max_queue_depth);
        assert_eq!(DriverConfig::stable().period_size, 4096);

        let studio = DriverConfig::studio();
        assert_eq!(studio.bit_depth, BitDepth::TwentyFour);
        assert_eq!(studio.sample_rate, 48_000);
        assert!(studio.validate().is_ok());
    }

    #[test]
    fn test_requested_rate_precedence() {
        let config = DriverConfig::default();
        assert_eq!(config.requested_params(0).sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.requested_params(50_000).sample_rate, 50_000);

        let studio = DriverConfig::studio();
        assert_eq!(studio.requested_params(0).sample_rate, 48_000);
        assert_eq!(studio.requested_params(32_000).sample_rate, 32_000);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            DriverConfig::from_json_str(r#"{"backend": "null", "channels": 1, "bit_depth": 24}"#)
                .unwrap();
        assert_eq!(config.backend, BackendKind::Null);
        assert_eq!(config.channels, 1);
        assert_eq!(config.bit_depth, BitDepth::TwentyFour);
        assert_eq!(config.period_size, 256);
        assert_eq!(config.volume, 1.0);
    }

    #[test]
    fn test_invalid_bit_depth_rejected() {
        assert!(DriverConfig::from_json_str(r#"{"bit_depth": 20}"#).is_err());
    }

    #[test]
    fn test_invalid_channels_rejected() {
        let err = DriverConfig::from_json_str(r#"{"channels": 6}"#).unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn test_period_bytes() {
        let params = DriverConfig::studio().requested_params(0);
        assert_eq!(params.period_bytes(), 1024 * 6);
        assert!((params.period_ms() - 21.333).abs() < 0.01);
    }
}
