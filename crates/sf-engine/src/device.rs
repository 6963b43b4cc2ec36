//! Devices
//!
//! A device pairs a backend with the render pipeline: the panner describing
//! the dry bus, the output stage (speaker decode, binaural render, UHJ
//! encode, or raw ambisonic copy), and the listener-scope post-processing.
//! The backend owns the audio clock; the device builds the mix callback it
//! drives.

use crate::context::Context;
use crate::error::{EngineError, EngineResult};
use crate::mixer::{ContextRender, RenderState};
use crate::types::{ContextProps, ListenerProps};
use parking_lot::Mutex;
use sf_backend::{
    Backend, BackendKind, ClockLatency, LoopbackBackend, MixFn, NullBackend, StreamConfig,
    SystemBackend, WaveBackend,
};
use sf_config::Config;
use sf_core::{Channel, ChannelLayout, SampleType, BUFFER_LINE_SIZE};
use sf_dsp::{
    nfc_corner, DistanceComp, FrontStabilizer, Limiter, NfcFilter, ResamplerKind, UhjEncoder,
    UhjQuality,
};
use sf_effects::DeviceInfo;
use sf_spatial::{AmbiOrder, BFormatDecoder, DirectHrtfState, HrtfStore, Panner};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// How the dry bus reaches the output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Matrix decode to a speaker layout.
    Speakers,
    /// Binaural render through an HRTF dataset.
    Hrtf,
    /// 2-channel UHJ encode.
    Uhj,
    /// Raw ambisonic channels (ambi layouts and loopback captures).
    AmbiRaw,
}

/// HRTF engagement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HrtfMode {
    /// Engage on stereo headphone outputs.
    #[default]
    Auto,
    /// Always engage on stereo outputs.
    On,
    /// Never engage.
    Off,
}

impl HrtfMode {
    fn from_config(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => HrtfMode::On,
            "false" | "off" | "0" => HrtfMode::Off,
            _ => HrtfMode::Auto,
        }
    }
}

/// Device creation options, typically filled from the configuration file.
pub struct DeviceOptions {
    pub backend: BackendKind,
    pub device_name: Option<String>,
    /// Path for the wave-writer backend (`[wave] file`).
    pub wave_path: Option<PathBuf>,
    pub stream: StreamConfig,
    pub hrtf: HrtfMode,
    /// Dataset for binaural output; a synthetic head model is built when
    /// absent.
    pub hrtf_store: Option<Arc<HrtfStore>>,
    /// The output is known to be headphones (engages HRTF in auto mode).
    pub headphones: bool,
    /// Encode stereo output as 2-channel UHJ.
    pub stereo_uhj: bool,
    pub uhj_quality: UhjQuality,
    pub limiter: bool,
    pub stabilizer: bool,
    /// Dual-band HF compensation in the speaker decode, for decoders that
    /// need energy equalisation.
    pub hf_compensation: bool,
    /// Near-field control: the speaker-array radius in metres.
    pub nfc_distance: Option<f32>,
    /// Per-channel speaker distances for delay compensation.
    pub speaker_distances: Option<Vec<f32>>,
    /// Default resampler for new sources.
    pub resampler: ResamplerKind,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Null,
            device_name: None,
            wave_path: None,
            stream: StreamConfig::default(),
            hrtf: HrtfMode::Auto,
            hrtf_store: None,
            headphones: false,
            stereo_uhj: false,
            uhj_quality: UhjQuality::default(),
            limiter: true,
            stabilizer: false,
            hf_compensation: false,
            nfc_distance: None,
            speaker_distances: None,
            resampler: ResamplerKind::Linear,
        }
    }
}

impl DeviceOptions {
    /// Derive options from a parsed configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut options = Self::default();

        for name in config.drivers() {
            if let Some(kind) = BackendKind::from_name(&name) {
                options.backend = kind;
                break;
            }
        }
        if config.drivers().is_empty() {
            options.backend = BackendKind::System;
        }

        if let Some(layout) = config
            .get("general", "channels")
            .and_then(ChannelLayout::from_name)
        {
            options.stream.layout = layout;
        }
        if let Some(ty) = config
            .get("general", "sample-type")
            .and_then(SampleType::from_name)
        {
            options.stream.sample_type = ty;
        }
        let freq = config.get_int("general", "frequency", 0);
        if freq > 0 {
            options.stream.frequency = freq as u32;
        }
        let period = config.get_int("general", "period_size", 0);
        if period > 0 {
            options.stream.update_size = period as usize;
        }
        let periods = config.get_int("general", "periods", 0);
        if periods > 0 {
            options.stream.num_updates = periods as usize;
        }
        if let Some(v) = config.get("general", "hrtf") {
            options.hrtf = HrtfMode::from_config(v);
        }
        if let Some(paths) = config.get("general", "hrtf-paths") {
            let wanted = config.get("general", "default-hrtf");
            options.hrtf_store = find_hrtf_dataset(paths, wanted);
        }
        if let Some(r) = config
            .get("general", "resampler")
            .and_then(ResamplerKind::from_name)
        {
            options.resampler = r;
        }
        if config.get_or("general", "stereo-encoding", "") == "uhj" {
            options.stereo_uhj = true;
        }
        let cf_level = config.get_int("general", "cf_level", 0);
        if cf_level > 0 {
            log::warn!("cf_level {cf_level} requested; cross-feed is not implemented");
        }
        if let Some(path) = config.get("wave", "file") {
            options.wave_path = Some(PathBuf::from(path));
        }
        if let Some(name) = config.get("system", "device") {
            options.device_name = Some(name.to_string());
        }
        options
    }
}

/// Scan the comma-separated `hrtf-paths` directories for `.mhr` datasets,
/// preferring one whose file stem matches `wanted`.
fn find_hrtf_dataset(paths: &str, wanted: Option<&str>) -> Option<Arc<HrtfStore>> {
    let mut fallback = None;
    for dir in paths.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            log::warn!("hrtf-paths entry {dir} is not readable");
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mhr") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let matches_wanted = wanted.map(|w| w.eq_ignore_ascii_case(stem)).unwrap_or(false);
            if !matches_wanted && fallback.is_some() {
                continue;
            }
            match std::fs::read(&path).map_err(|e| e.to_string()).and_then(|data| {
                HrtfStore::load(&data).map_err(|e| e.to_string())
            }) {
                Ok(store) => {
                    let store = Arc::new(store);
                    if matches_wanted {
                        return Some(store);
                    }
                    fallback = Some(store);
                }
                Err(err) => {
                    log::warn!("failed to load HRTF dataset {}: {err}", path.display());
                }
            }
        }
    }
    if wanted.is_some() && fallback.is_some() {
        log::info!("default-hrtf dataset not found; using another from hrtf-paths");
    }
    fallback
}

/// State visible to every thread: the seqlock, the connection flag, and the
/// negotiated configuration.
pub struct DeviceShared {
    pub(crate) config: StreamConfig,
    pub(crate) mix_count: AtomicU64,
    connected: AtomicBool,
    pub(crate) resampler: ResamplerKind,
}

impl DeviceShared {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// An open output device.
pub struct Device {
    backend: Box<dyn Backend>,
    loopback: Option<LoopbackBackend>,
    shared: Arc<DeviceShared>,
    render: Arc<Mutex<RenderState>>,
    mode: RenderMode,
    started: bool,
}

impl Device {
    /// Open a device with the given options, negotiating the stream
    /// configuration with the backend.
    pub fn open(options: DeviceOptions) -> EngineResult<Self> {
        let (mut backend, loopback): (Box<dyn Backend>, Option<LoopbackBackend>) =
            match options.backend {
                BackendKind::System => (
                    Box::new(SystemBackend::new(options.device_name.clone())),
                    None,
                ),
                BackendKind::Null => (Box::new(NullBackend::new()), None),
                BackendKind::Wave => {
                    let path = options.wave_path.clone().ok_or_else(|| {
                        EngineError::InvalidValue("wave backend needs a file path".into())
                    })?;
                    (Box::new(WaveBackend::new(path)), None)
                }
                BackendKind::Loopback => {
                    let lb = LoopbackBackend::new();
                    (Box::new(lb.clone()), Some(lb))
                }
            };

        backend.open(options.device_name.as_deref())?;

        let mut config = options.stream;
        config.update_size = config.update_size.clamp(64, BUFFER_LINE_SIZE);
        config.num_updates = config.num_updates.max(1);
        let honoured = backend.reset(&mut config)?;
        if !honoured {
            log::info!(
                "backend revised stream config: {} Hz, {:?}, {:?}",
                config.frequency,
                config.layout,
                config.sample_type
            );
        }
        config.update_size = config.update_size.clamp(64, BUFFER_LINE_SIZE);

        // Pick the render mode and bus shape.
        let hrtf_wanted = matches!(options.hrtf, HrtfMode::On)
            || (matches!(options.hrtf, HrtfMode::Auto) && options.headphones);
        let (mode, panner) = match config.layout {
            ChannelLayout::Ambi1 => (RenderMode::AmbiRaw, Panner::new(AmbiOrder::First, true)),
            ChannelLayout::Ambi2 => (RenderMode::AmbiRaw, Panner::new(AmbiOrder::Second, true)),
            ChannelLayout::Ambi3 => (RenderMode::AmbiRaw, Panner::new(AmbiOrder::Third, true)),
            ChannelLayout::Stereo if hrtf_wanted => {
                (RenderMode::Hrtf, Panner::new(AmbiOrder::First, true))
            }
            ChannelLayout::Stereo if options.stereo_uhj => {
                (RenderMode::Uhj, Panner::new(AmbiOrder::First, false))
            }
            ChannelLayout::Mono | ChannelLayout::Stereo | ChannelLayout::Quad => {
                (RenderMode::Speakers, Panner::new(AmbiOrder::First, false))
            }
            _ => (RenderMode::Speakers, Panner::new(AmbiOrder::Second, false)),
        };

        let hrtf_store = (mode == RenderMode::Hrtf).then(|| {
            options.hrtf_store.clone().unwrap_or_else(|| {
                log::info!("no HRTF dataset supplied; using the synthetic head model");
                Arc::new(HrtfStore::synthetic(config.frequency))
            })
        });
        if let Some(store) = &hrtf_store {
            if store.sample_rate() != config.frequency {
                log::warn!(
                    "HRTF dataset rate {} differs from device rate {}",
                    store.sample_rate(),
                    config.frequency
                );
            }
        }

        let decoder = (mode == RenderMode::Speakers).then(|| {
            BFormatDecoder::new(
                config.layout,
                &panner,
                config.frequency,
                options.hf_compensation,
            )
        });
        let hrtf_renderer = hrtf_store
            .as_ref()
            .map(|store| DirectHrtfState::new(store, &panner, config.frequency));
        let uhj_encoder = (mode == RenderMode::Uhj)
            .then(|| UhjEncoder::new(options.uhj_quality, BUFFER_LINE_SIZE));

        // Near-field compensation, one cascade per bus line, sized by the
        // line's spherical-harmonic order.
        let nfc = match options.nfc_distance {
            Some(distance) if mode == RenderMode::Speakers => {
                let w0 = nfc_corner(distance, config.frequency);
                let w1 = nfc_corner(distance * 8.0, config.frequency);
                panner
                    .line_orders()
                    .iter()
                    .map(|&order| NfcFilter::new(order, w0, w1))
                    .collect()
            }
            _ => Vec::new(),
        };

        let distance_comp = options
            .speaker_distances
            .as_ref()
            .map(|d| DistanceComp::new(d, config.frequency))
            .filter(|c| c.is_active());

        let has_center = config
            .layout
            .speakers()
            .contains(&Channel::FrontCenter);
        let stabilizer = (options.stabilizer && mode == RenderMode::Speakers && has_center)
            .then(|| FrontStabilizer::new(300.0 / config.frequency as f32));

        let out_channels = match mode {
            RenderMode::Hrtf | RenderMode::Uhj => 2,
            _ => config.layout.count(),
        };
        let limiter = options
            .limiter
            .then(|| Limiter::new(out_channels, config.frequency, 1.0, 64, 0.05, 160.0));

        let render = RenderState::new(
            config,
            mode,
            panner,
            hrtf_store,
            decoder,
            hrtf_renderer,
            uhj_encoder,
            nfc,
            distance_comp,
            stabilizer,
            limiter,
        );

        Ok(Self {
            backend,
            loopback,
            shared: Arc::new(DeviceShared {
                config,
                mix_count: AtomicU64::new(0),
                connected: AtomicBool::new(true),
                resampler: options.resampler,
            }),
            render: Arc::new(Mutex::new(render)),
            mode,
            started: false,
        })
    }

    /// Convenience: an application-pulled loopback device.
    pub fn open_loopback(stream: StreamConfig) -> EngineResult<(Self, LoopbackBackend)> {
        let mut device = Device::open(DeviceOptions {
            backend: BackendKind::Loopback,
            stream,
            limiter: false,
            ..Default::default()
        })?;
        device.start()?;
        let handle = device
            .loopback
            .clone()
            .expect("loopback backend present");
        Ok((device, handle))
    }

    /// The negotiated stream configuration.
    pub fn config(&self) -> StreamConfig {
        self.shared.config
    }

    /// The active render mode.
    pub fn render_mode(&self) -> RenderMode {
        self.mode
    }

    /// Start the backend clock.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.started {
            return Ok(());
        }
        let render = Arc::clone(&self.render);
        let shared = Arc::clone(&self.shared);
        let mix: MixFn = Arc::new(move |buffer, frames| {
            render.lock().mix(&shared, buffer, frames);
        });
        self.backend.start(mix)?;
        self.started = true;
        Ok(())
    }

    /// Stop the backend clock.
    pub fn stop(&mut self) {
        self.backend.stop();
        self.started = false;
    }

    /// Create a context bound to this device.
    pub fn new_context(&mut self) -> Context {
        let mut render = self.render.lock();
        let device_info = DeviceInfo {
            sample_rate: self.shared.config.frequency,
            update_size: self.shared.config.update_size,
            bus_channels: render.panner.line_count(),
        };
        let (producer, consumer) = rtrb::RingBuffer::new(1024);
        let context = Context::new(device_info, self.shared.resampler, producer);
        render.contexts.push(ContextRender {
            shared: Arc::clone(&context.inner),
            commands: consumer,
            listener: ListenerProps::default(),
            ctx_props: ContextProps::default(),
            voices: Vec::new(),
            free_voices: Vec::new(),
            slots: Vec::new(),
        });
        context
    }

    /// Whether the device is still connected.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Mark the device lost: the mixer renders silence until a reset.
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::Release);
        log::warn!("device disconnected; output is silent until reset");
    }

    /// Re-negotiate with the backend after a disconnect.
    pub fn reset(&mut self) -> EngineResult<()> {
        let mut config = self.shared.config;
        self.backend.reset(&mut config)?;
        if config != self.shared.config {
            return Err(EngineError::Backend(
                sf_backend::BackendError::ConfigRejected(
                    "backend changed the stream configuration on reset".into(),
                ),
            ));
        }
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// A consistent clock/latency snapshot, using the mix seqlock to avoid
    /// observing a half-finished iteration.
    pub fn clock_latency(&self) -> ClockLatency {
        loop {
            let before = self.shared.mix_count.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let clock = self.backend.clock_latency();
            let after = self.shared.mix_count.load(Ordering::Acquire);
            if before == after {
                return clock;
            }
        }
    }

    /// Completed mix iterations (seqlock value / 2).
    pub fn mix_count(&self) -> u64 {
        self.shared.mix_count.load(Ordering::Acquire) / 2
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = Config::new();
        config.merge_str(
            "[general]\ndrivers = wave,null\nchannels = surround51\nfrequency = 48000\n\
             hrtf = false\nresampler = cubic\n[wave]\nfile = out.wav\n",
        );
        let options = DeviceOptions::from_config(&config);
        assert_eq!(options.backend, BackendKind::Wave);
        assert_eq!(options.stream.layout, ChannelLayout::X51);
        assert_eq!(options.stream.frequency, 48000);
        assert_eq!(options.hrtf, HrtfMode::Off);
        assert_eq!(options.resampler, ResamplerKind::Cubic);
        assert_eq!(options.wave_path.as_deref(), Some(std::path::Path::new("out.wav")));
    }

    #[test]
    fn test_open_loopback_negotiates() {
        let (device, handle) = Device::open_loopback(StreamConfig {
            frequency: 48000,
            layout: ChannelLayout::Stereo,
            sample_type: SampleType::F32,
            update_size: 256,
            num_updates: 1,
        })
        .unwrap();
        assert_eq!(device.config().frequency, 48000);
        assert_eq!(device.render_mode(), RenderMode::Speakers);
        assert_eq!(handle.config().update_size, 256);
    }

    #[test]
    fn test_hrtf_mode_selection() {
        let options = DeviceOptions {
            backend: BackendKind::Loopback,
            hrtf: HrtfMode::On,
            ..Default::default()
        };
        let device = Device::open(options).unwrap();
        assert_eq!(device.render_mode(), RenderMode::Hrtf);
    }

    #[test]
    fn test_disconnect_flag() {
        let device = Device::open(DeviceOptions {
            backend: BackendKind::Loopback,
            ..Default::default()
        })
        .unwrap();
        assert!(device.is_connected());
        device.disconnect();
        assert!(!device.is_connected());
    }
}
