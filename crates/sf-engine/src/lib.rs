//! sf-engine: the SoundField rendering core
//!
//! Devices, contexts, sources, buffers, effect slots, and the per-period
//! mixer. API threads talk to the mix thread exclusively through lock-free
//! property snapshots and a bounded command queue; the mix thread is
//! infallible and never blocks.
//!
//! ```no_run
//! use sf_engine::{Device, DeviceOptions, SampleBuffer, BufferChannels};
//!
//! let mut device = Device::open(DeviceOptions::default())?;
//! let ctx = device.new_context();
//! device.start()?;
//!
//! let buffer = SampleBuffer::from_f32_interleaved(
//!     BufferChannels::Mono, 44100, &vec![0.0; 44100])?;
//! let source = ctx.add_source();
//! ctx.queue_buffer(source, buffer)?;
//! ctx.with_source_props(source, |p| p.position = [1.0, 0.0, 0.0])?;
//! ctx.play(source)?;
//! # Ok::<(), sf_engine::EngineError>(())
//! ```

mod buffer;
mod context;
mod device;
mod error;
mod mixer;
mod props;
mod slot;
mod source;
mod types;
mod voice;

pub use buffer::{BufferChannels, SampleBuffer};
pub use context::Context;
pub use device::{Device, DeviceOptions, DeviceShared, HrtfMode, RenderMode};
pub use error::{EngineError, EngineResult};
pub use source::SourceShared;
pub use types::{
    ContextProps, DistanceModel, ListenerProps, SendProps, SlotProps, SourceProps, SourceState,
    SpatializeMode, StereoMode,
};

// Re-exports callers need to drive the engine without naming every crate.
pub use sf_backend::{BackendKind, ClockLatency, LoopbackBackend, StreamConfig};
pub use sf_core::{AmbiLayout, AmbiScaling, ChannelLayout, SampleType};
pub use sf_dsp::{ResamplerKind, UhjQuality};
pub use sf_effects::{
    ChorusProps, CompressorProps, ConvolutionIr, ConvolutionProps, DedicatedProps, EchoProps,
    EffectKind, EffectProps, EqualizerProps, ReverbProps,
};
pub use sf_spatial::{AmbiOrder, HrtfStore};
