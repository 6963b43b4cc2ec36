//! Null backend
//!
//! No device: a timer-paced thread derives the virtual sample count from
//! the wall clock and pulls mixes so output progresses in real time. A
//! clock that fails to advance simply yields no work this tick; frames are
//! never skipped.

use crate::{Backend, BackendResult, ClockLatency, MixFn, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Timer-driven backend producing no audible output.
pub struct NullBackend {
    config: StreamConfig,
    lock: Arc<Mutex<()>>,
    kill: Arc<AtomicBool>,
    clock: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            config: StreamConfig::default(),
            lock: Arc::new(Mutex::new(())),
            kill: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn open(&mut self, _name: Option<&str>) -> BackendResult<()> {
        Ok(())
    }

    fn reset(&mut self, config: &mut StreamConfig) -> BackendResult<bool> {
        // Anything goes; remember the figures for pacing.
        self.config = *config;
        Ok(true)
    }

    fn start(&mut self, mix: MixFn) -> BackendResult<()> {
        self.stop();
        self.kill.store(false, Ordering::Release);

        let kill = Arc::clone(&self.kill);
        let clock = Arc::clone(&self.clock);
        let lock = Arc::clone(&self.lock);
        let config = self.config;

        let thread = std::thread::Builder::new()
            .name("sf-null".into())
            .spawn(move || {
                let frame_size = config.frame_size();
                let mut buffer = vec![0u8; config.update_size * frame_size];
                let start = Instant::now();
                let mut done: u64 = 0;

                while !kill.load(Ordering::Acquire) {
                    // Monotonic clock: elapsed time to virtual samples.
                    let avail = start.elapsed().as_nanos() as u64 * config.frequency as u64
                        / 1_000_000_000;
                    if avail.saturating_sub(done) < config.update_size as u64 {
                        std::thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    while avail.saturating_sub(done) >= config.update_size as u64 {
                        {
                            let _guard = lock.lock();
                            mix(&mut buffer, config.update_size);
                        }
                        done += config.update_size as u64;
                        clock.store(done, Ordering::Release);
                    }
                }
            })
            .map_err(|e| crate::BackendError::Failed(e.to_string()))?;
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.kill.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn clock_latency(&self) -> ClockLatency {
        ClockLatency {
            clock_samples: self.clock.load(Ordering::Acquire),
            latency_samples: (self.config.update_size * self.config.num_updates) as u64,
        }
    }

    fn lock_handle(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }
}

impl Drop for NullBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
