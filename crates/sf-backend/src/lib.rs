//! sf-backend: the backend abstraction and shipped drivers
//!
//! A backend owns the audio clock: it decides when the mixer runs and
//! receives fixed-size interleaved PCM frames. The contract is narrow so
//! the mixer stays portable:
//!
//! - `open` binds a named device (or the default).
//! - `reset` negotiates the stream configuration; the backend may revise
//!   figures downward to hardware capabilities, and the caller treats the
//!   result as authoritative.
//! - `start`/`stop` run the clock against a mix callback.
//! - `clock_latency` reports the device clock and pipeline latency.
//! - Capture entry points have default implementations; no capture driver
//!   ships here.
//!
//! Shipped drivers: `null` (timer-paced), `wave` (RIFF/WAVE writer),
//! `loopback` (application-pulled), and `system` (cpal output stream).

mod loopback;
mod null;
mod ring;
mod system;
mod wave;

pub use loopback::LoopbackBackend;
pub use null::NullBackend;
pub use ring::RingBuffer;
pub use system::SystemBackend;
pub use wave::WaveBackend;

use parking_lot::Mutex;
use sf_core::{ChannelLayout, SampleType};
use std::sync::Arc;
use thiserror::Error;

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The named device does not exist.
    #[error("no such device: {0}")]
    NoDevice(String),

    /// The backend could not agree on any stream configuration.
    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    /// The platform layer failed.
    #[error("backend failure: {0}")]
    Failed(String),

    /// The operation is not supported by this backend.
    #[error("operation not supported")]
    NotSupported,
}

/// Result alias for [`BackendError`].
pub type BackendResult<T> = Result<T, BackendError>;

/// Negotiated stream configuration. `reset` may revise any field downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Sample rate in Hz.
    pub frequency: u32,
    /// Output channel layout.
    pub layout: ChannelLayout,
    /// Sample storage format.
    pub sample_type: SampleType,
    /// Frames per mix iteration.
    pub update_size: usize,
    /// Periods kept in flight.
    pub num_updates: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frequency: 44100,
            layout: ChannelLayout::Stereo,
            sample_type: SampleType::F32,
            update_size: 1024,
            num_updates: 3,
        }
    }
}

impl StreamConfig {
    /// Bytes per interleaved frame.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.layout.count() * self.sample_type.bytes()
    }
}

/// Device clock and latency snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockLatency {
    /// Samples the device clock has consumed.
    pub clock_samples: u64,
    /// Estimated latency in samples between mix and audibility.
    pub latency_samples: u64,
}

/// The mix callback a backend drives: fill `buffer` with `frames` frames
/// of interleaved PCM in the negotiated format.
pub type MixFn = Arc<dyn Fn(&mut [u8], usize) + Send + Sync>;

/// The contract every platform driver satisfies.
pub trait Backend: Send {
    /// Bind a device by name, or the backend's default.
    fn open(&mut self, name: Option<&str>) -> BackendResult<()>;

    /// Negotiate the stream configuration in place. Returns whether the
    /// requested configuration was honoured unmodified.
    fn reset(&mut self, config: &mut StreamConfig) -> BackendResult<bool>;

    /// Start the clock. The backend calls `mix` once per period from its
    /// own thread or device callback.
    fn start(&mut self, mix: MixFn) -> BackendResult<()>;

    /// Stop the clock. Must be callable repeatedly.
    fn stop(&mut self);

    /// The device clock and latency, coherent with each other.
    fn clock_latency(&self) -> ClockLatency {
        ClockLatency::default()
    }

    /// The lock serialising property changes against a callback-driven
    /// backend. Polled backends share the same handle; holders must not
    /// block the mix for long.
    fn lock_handle(&self) -> Arc<Mutex<()>>;

    /// Capture entry point (capture backends only).
    fn capture_samples(&mut self, _dst: &mut [u8]) -> BackendResult<()> {
        Err(BackendError::NotSupported)
    }

    /// Captured samples available (capture backends only).
    fn available_samples(&self) -> usize {
        0
    }
}

/// Backend selector used by device creation and the `drivers` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    System,
    Null,
    Wave,
    Loopback,
}

impl BackendKind {
    /// Parse a `drivers` list entry.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "system" | "cpal" => Some(BackendKind::System),
            "null" => Some(BackendKind::Null),
            "wave" => Some(BackendKind::Wave),
            "loopback" => Some(BackendKind::Loopback),
            _ => None,
        }
    }
}

/// Create a backend of the given kind, consulting `config` for per-backend
/// sections (`[wave] file`, `[system] device`).
pub fn create_backend(
    kind: BackendKind,
    config: &sf_config::Config,
) -> BackendResult<Box<dyn Backend>> {
    match kind {
        BackendKind::System => Ok(Box::new(SystemBackend::new(
            config.get("system", "device").map(str::to_string),
        ))),
        BackendKind::Null => Ok(Box::new(NullBackend::new())),
        BackendKind::Wave => {
            let path = config.get("wave", "file").unwrap_or("").to_string();
            if path.is_empty() {
                return Err(BackendError::ConfigRejected(
                    "[wave] file is not set".into(),
                ));
            }
            Ok(Box::new(WaveBackend::new(path.into())))
        }
        BackendKind::Loopback => Ok(Box::new(LoopbackBackend::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        let config = StreamConfig {
            layout: ChannelLayout::X51,
            sample_type: SampleType::I16,
            ..Default::default()
        };
        assert_eq!(config.frame_size(), 12);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(BackendKind::from_name("wave"), Some(BackendKind::Wave));
        assert_eq!(BackendKind::from_name("NULL"), Some(BackendKind::Null));
        assert_eq!(BackendKind::from_name("asio"), None);
    }
}
