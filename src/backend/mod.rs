//! Audio backend abstraction
//!
//! A backend negotiates stream parameters with a device and hands back the
//! device in either push or pull shape. Which backends exist depends on the
//! crate features; [`probe`] reports availability once at startup and
//! [`create_backend`] builds the one a [`DriverConfig`] asks for.

mod null;
#[cfg(feature = "playback")]
mod playback;
#[cfg(feature = "wav")]
mod wav;

pub use null::NullBackend;
#[cfg(feature = "playback")]
pub use playback::PlaybackBackend;
#[cfg(feature = "wav")]
pub use wav::WavBackend;

use crate::config::{BackendKind, DriverConfig, StreamParams};
use crate::streaming::SinkMode;
use crate::{BridgeError, Result};

/// How a backend honors `set_volume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeControl {
    /// Volume changes are ignored
    Unsupported,
    /// The driver scales samples before queueing them
    Software,
    /// The device applies gain after mixing
    Native,
}

/// Outcome of a backend availability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Backend can be constructed
    Available,
    /// Backend is missing, with the reason
    Unavailable(String),
}

impl Capability {
    /// Whether the backend can be constructed
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available)
    }
}

/// Common interface for audio device backends
///
/// `open` may adjust any requested parameter the device cannot honor; the
/// returned [`StreamParams`] are authoritative for the rest of the session.
pub trait AudioBackend {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// How volume changes are applied
    fn volume_control(&self) -> VolumeControl;

    /// Open the device, returning the effective parameters and the device handle
    ///
    /// Failures are reported as [`BridgeError::DeviceInitFailure`]; the caller
    /// may retry with different parameters.
    fn open(&mut self, requested: &StreamParams) -> Result<(StreamParams, SinkMode)>;
}

/// Check whether a backend can be used in this build and environment
pub fn probe(kind: BackendKind) -> Capability {
    match kind {
        BackendKind::Null => Capability::Available,
        #[cfg(feature = "wav")]
        BackendKind::Wav => Capability::Available,
        #[cfg(not(feature = "wav"))]
        BackendKind::Wav => Capability::Unavailable("built without the \"wav\" feature".into()),
        #[cfg(feature = "playback")]
        BackendKind::Playback => playback::probe_default_output(),
        #[cfg(not(feature = "playback"))]
        BackendKind::Playback => {
            Capability::Unavailable("built without the \"playback\" feature".into())
        }
    }
}

/// Build the backend selected by `config`
///
/// Fails with [`BridgeError::BackendUnavailable`] when [`probe`] does.
pub fn create_backend(config: &DriverConfig) -> Result<Box<dyn AudioBackend>> {
    if let Capability::Unavailable(reason) = probe(config.backend) {
        return Err(BridgeError::BackendUnavailable(format!(
            "{} backend: {reason}",
            config.backend
        )));
    }

    match config.backend {
        BackendKind::Null => Ok(Box::new(NullBackend::new())),
        #[cfg(feature = "wav")]
        BackendKind::Wav => Ok(Box::new(WavBackend::new(&config.device))),
        #[cfg(feature = "playback")]
        BackendKind::Playback => Ok(Box::new(PlaybackBackend::new(&config.device))),
        #[allow(unreachable_patterns)]
        other => Err(BridgeError::BackendUnavailable(format!(
            "{other} backend is not compiled in"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_always_available() {
        assert_eq!(probe(BackendKind::Null), Capability::Available);
        let config = DriverConfig::default().with_backend(BackendKind::Null);
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "null");
    }

    #[cfg(feature = "wav")]
    #[test]
    fn test_wav_backend_created() {
        let config = DriverConfig::default()
            .with_backend(BackendKind::Wav)
            .with_device("out.wav");
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "wav");
        assert_eq!(backend.volume_control(), VolumeControl::Software);
    }

    #[cfg(not(feature = "playback"))]
    #[test]
    fn test_playback_unavailable_without_feature() {
        let config = DriverConfig::default().with_backend(BackendKind::Playback);
        assert!(!probe(BackendKind::Playback).is_available());
        assert!(matches!(
            create_backend(&config),
            Err(BridgeError::BackendUnavailable(_))
        ));
    }
}
