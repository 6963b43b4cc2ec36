//! Loopback backend
//!
//! No clock at all: the application pulls rendered frames itself via
//! [`LoopbackBackend::render`]. The backend is a cheap handle over shared
//! state, so a caller can keep a clone for pulling while the device owns
//! the original. Used for offline rendering and tests.

use crate::{Backend, BackendError, BackendResult, ClockLatency, MixFn, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct LoopbackShared {
    config: Mutex<StreamConfig>,
    mix: Mutex<Option<MixFn>>,
    lock: Arc<Mutex<()>>,
    clock: AtomicU64,
}

/// Application-driven backend.
#[derive(Clone)]
pub struct LoopbackBackend {
    shared: Arc<LoopbackShared>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LoopbackShared {
                config: Mutex::new(StreamConfig::default()),
                mix: Mutex::new(None),
                lock: Arc::new(Mutex::new(())),
                clock: AtomicU64::new(0),
            }),
        }
    }

    /// Pull `frames` frames of interleaved PCM into `buffer`. `buffer`
    /// must hold `frames * config.frame_size()` bytes. Frames are rendered
    /// in `update_size` chunks; `frames` must be a multiple of it.
    pub fn render(&self, buffer: &mut [u8], frames: usize) -> BackendResult<()> {
        let config = *self.shared.config.lock();
        let mix_guard = self.shared.mix.lock();
        let mix = mix_guard
            .as_ref()
            .ok_or_else(|| BackendError::Failed("loopback not started".into()))?;
        let frame_size = config.frame_size();
        let chunk = config.update_size;
        if frames % chunk != 0 || buffer.len() < frames * frame_size {
            return Err(BackendError::Failed(
                "render size must be a multiple of the update size".into(),
            ));
        }
        for block in buffer[..frames * frame_size].chunks_mut(chunk * frame_size) {
            let _guard = self.shared.lock.lock();
            mix(block, chunk);
            self.shared.clock.fetch_add(chunk as u64, Ordering::AcqRel);
        }
        Ok(())
    }

    /// The negotiated configuration.
    pub fn config(&self) -> StreamConfig {
        *self.shared.config.lock()
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LoopbackBackend {
    fn open(&mut self, _name: Option<&str>) -> BackendResult<()> {
        Ok(())
    }

    fn reset(&mut self, config: &mut StreamConfig) -> BackendResult<bool> {
        *self.shared.config.lock() = *config;
        Ok(true)
    }

    fn start(&mut self, mix: MixFn) -> BackendResult<()> {
        *self.shared.mix.lock() = Some(mix);
        Ok(())
    }

    fn stop(&mut self) {
        *self.shared.mix.lock() = None;
    }

    fn clock_latency(&self) -> ClockLatency {
        ClockLatency {
            clock_samples: self.shared.clock.load(Ordering::Acquire),
            latency_samples: 0,
        }
    }

    fn lock_handle(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.shared.lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pulls_mix() {
        let mut backend = LoopbackBackend::new();
        let mut config = StreamConfig {
            update_size: 16,
            ..Default::default()
        };
        backend.reset(&mut config).unwrap();
        backend
            .start(Arc::new(|buffer: &mut [u8], _frames| {
                buffer.fill(0x7f);
            }))
            .unwrap();

        let handle = backend.clone();
        let mut out = vec![0u8; 32 * handle.config().frame_size()];
        handle.render(&mut out, 32).unwrap();
        assert!(out.iter().all(|&b| b == 0x7f));
        assert_eq!(handle.clock_latency().clock_samples, 32);
    }

    #[test]
    fn test_render_requires_start() {
        let backend = LoopbackBackend::new();
        let mut out = vec![0u8; 64];
        assert!(backend.render(&mut out, 8).is_err());
    }

    #[test]
    fn test_render_rejects_partial_chunks() {
        let mut backend = LoopbackBackend::new();
        let mut config = StreamConfig {
            update_size: 16,
            ..Default::default()
        };
        backend.reset(&mut config).unwrap();
        backend.start(Arc::new(|_, _| {})).unwrap();
        let mut out = vec![0u8; 24 * backend.config().frame_size()];
        assert!(backend.render(&mut out, 24).is_err());
    }
}
