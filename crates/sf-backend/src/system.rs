//! System backend over cpal
//!
//! Callback-driven: the platform audio layer invokes the stream callback
//! when the device wants data, and the callback pulls whole periods from
//! the mixer through a small float FIFO. Unsupported figures are revised
//! downward and logged.

use crate::{Backend, BackendError, BackendResult, ClockLatency, MixFn, StreamConfig};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use sf_core::{ChannelLayout, SampleType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// cpal-backed playback driver.
pub struct SystemBackend {
    requested_name: Option<String>,
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    config: StreamConfig,
    lock: Arc<Mutex<()>>,
    clock: Arc<AtomicU64>,
}

// SAFETY: the cpal stream handle is only touched from the thread that owns
// this backend; playback itself runs on cpal's own thread.
unsafe impl Send for SystemBackend {}

impl SystemBackend {
    pub fn new(requested_name: Option<String>) -> Self {
        Self {
            requested_name,
            device: None,
            stream: None,
            config: StreamConfig::default(),
            lock: Arc::new(Mutex::new(())),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Backend for SystemBackend {
    fn open(&mut self, name: Option<&str>) -> BackendResult<()> {
        let host = cpal::default_host();
        let wanted = name
            .map(str::to_string)
            .or_else(|| self.requested_name.clone());

        let device = match &wanted {
            Some(wanted_name) => host
                .output_devices()
                .map_err(|e| BackendError::Failed(e.to_string()))?
                .find(|d| d.name().map(|n| &n == wanted_name).unwrap_or(false))
                .ok_or_else(|| BackendError::NoDevice(wanted_name.clone()))?,
            None => host
                .default_output_device()
                .ok_or_else(|| BackendError::NoDevice("default".into()))?,
        };
        self.device = Some(device);
        Ok(())
    }

    fn reset(&mut self, config: &mut StreamConfig) -> BackendResult<bool> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| BackendError::Failed("device not open".into()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| BackendError::ConfigRejected(e.to_string()))?
            .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
            .collect::<Vec<_>>();
        if supported.is_empty() {
            return Err(BackendError::ConfigRejected(
                "no float32 output configs".into(),
            ));
        }

        let mut honoured = true;
        let rate = cpal::SampleRate(config.frequency);
        let channels = config.layout.count() as u16;

        // Prefer an exact match; otherwise revise channels, then rate.
        let chosen = supported
            .iter()
            .find(|c| {
                c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                honoured = false;
                supported
                    .iter()
                    .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            })
            .or_else(|| supported.first())
            .expect("non-empty");

        if chosen.channels() != channels {
            let layout = match chosen.channels() {
                1 => ChannelLayout::Mono,
                2 => ChannelLayout::Stereo,
                4 => ChannelLayout::Quad,
                6 => ChannelLayout::X51,
                7 => ChannelLayout::X61,
                8 => ChannelLayout::X71,
                n => {
                    log::warn!("system: unusual channel count {n}, using stereo pair");
                    ChannelLayout::Stereo
                }
            };
            log::warn!(
                "system: revising layout {:?} -> {:?}",
                config.layout,
                layout
            );
            config.layout = layout;
            honoured = false;
        }
        if chosen.min_sample_rate() > rate || chosen.max_sample_rate() < rate {
            let revised = chosen.max_sample_rate().0.min(48000).max(chosen.min_sample_rate().0);
            log::warn!("system: revising rate {} -> {revised}", config.frequency);
            config.frequency = revised;
            honoured = false;
        }
        if config.sample_type != SampleType::F32 {
            log::warn!(
                "system: revising sample type {:?} -> float32",
                config.sample_type
            );
            config.sample_type = SampleType::F32;
            honoured = false;
        }

        self.config = *config;
        Ok(honoured)
    }

    fn start(&mut self, mix: MixFn) -> BackendResult<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| BackendError::Failed("device not open".into()))?;

        let config = self.config;
        let stream_config = cpal::StreamConfig {
            channels: config.layout.count() as u16,
            sample_rate: cpal::SampleRate(config.frequency),
            buffer_size: cpal::BufferSize::Fixed(config.update_size as u32),
        };

        let lock = Arc::clone(&self.lock);
        let clock = Arc::clone(&self.clock);
        let frame_size = config.frame_size();
        let mut period = vec![0u8; config.update_size * frame_size];
        // Samples mixed but not yet handed to the device.
        let mut fifo: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut filled = 0usize;
                    while filled < data.len() {
                        if fifo.is_empty() {
                            {
                                let _guard = lock.lock();
                                mix(&mut period, config.update_size);
                            }
                            fifo.extend(period.chunks_exact(4).map(|b| {
                                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
                            }));
                            clock.fetch_add(config.update_size as u64, Ordering::AcqRel);
                        }
                        let take = fifo.len().min(data.len() - filled);
                        data[filled..filled + take].copy_from_slice(&fifo[..take]);
                        fifo.drain(..take);
                        filled += take;
                    }
                },
                move |err| {
                    log::error!("system: output stream error: {err}");
                },
                None,
            )
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        stream
            .play()
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
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
