//! Wave-file writer backend
//!
//! Paced like the null backend, but every mixed period is appended to a
//! RIFF/WAVE file. The header's chunk sizes are back-patched when the
//! writer finalizes on stop.

use crate::{Backend, BackendError, BackendResult, ClockLatency, MixFn, StreamConfig};
use parking_lot::Mutex;
use sf_core::SampleType;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Backend writing mixed output to a wave file.
pub struct WaveBackend {
    path: PathBuf,
    config: StreamConfig,
    lock: Arc<Mutex<()>>,
    kill: Arc<AtomicBool>,
    clock: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl WaveBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            config: StreamConfig::default(),
            lock: Arc::new(Mutex::new(())),
            kill: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }
}

impl Backend for WaveBackend {
    fn open(&mut self, _name: Option<&str>) -> BackendResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(BackendError::ConfigRejected("wave file path is empty".into()));
        }
        Ok(())
    }

    fn reset(&mut self, config: &mut StreamConfig) -> BackendResult<bool> {
        // The file format stores integer or float PCM; revise exotic
        // requests to 16-bit.
        let honoured = match config.sample_type {
            SampleType::I16 | SampleType::F32 => true,
            other => {
                log::warn!("wave: revising sample type {other:?} to int16");
                config.sample_type = SampleType::I16;
                false
            }
        };
        self.config = *config;
        Ok(honoured)
    }

    fn start(&mut self, mix: MixFn) -> BackendResult<()> {
        self.stop();
        self.kill.store(false, Ordering::Release);

        let spec = hound::WavSpec {
            channels: self.config.layout.count() as u16,
            sample_rate: self.config.frequency,
            bits_per_sample: match self.config.sample_type {
                SampleType::F32 => 32,
                _ => 16,
            },
            sample_format: match self.config.sample_type {
                SampleType::F32 => hound::SampleFormat::Float,
                _ => hound::SampleFormat::Int,
            },
        };
        let mut writer = hound::WavWriter::create(&self.path, spec)
            .map_err(|e| BackendError::Failed(e.to_string()))?;

        let kill = Arc::clone(&self.kill);
        let clock = Arc::clone(&self.clock);
        let lock = Arc::clone(&self.lock);
        let config = self.config;

        let thread = std::thread::Builder::new()
            .name("sf-wave".into())
            .spawn(move || {
                let frame_size = config.frame_size();
                let channels = config.layout.count();
                let mut buffer = vec![0u8; config.update_size * frame_size];
                let start = Instant::now();
                let mut done: u64 = 0;

                while !kill.load(Ordering::Acquire) {
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

                        let write_failed = match config.sample_type {
                            SampleType::F32 => buffer
                                .chunks_exact(4)
                                .take(config.update_size * channels)
                                .try_for_each(|b| {
                                    writer.write_sample(f32::from_le_bytes([
                                        b[0], b[1], b[2], b[3],
                                    ]))
                                })
                                .is_err(),
                            _ => buffer
                                .chunks_exact(2)
                                .take(config.update_size * channels)
                                .try_for_each(|b| {
                                    writer.write_sample(i16::from_le_bytes([b[0], b[1]]))
                                })
                                .is_err(),
                        };
                        if write_failed {
                            log::error!("wave: error writing to file");
                            kill.store(true, Ordering::Release);
                            break;
                        }

                        done += config.update_size as u64;
                        clock.store(done, Ordering::Release);
                    }
                }

                // Back-patch the RIFF/data sizes.
                if let Err(err) = writer.finalize() {
                    log::error!("wave: finalize failed: {err}");
                }
            })
            .map_err(|e| BackendError::Failed(e.to_string()))?;
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
            latency_samples: self.config.update_size as u64,
        }
    }

    fn lock_handle(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }
}

impl Drop for WaveBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
