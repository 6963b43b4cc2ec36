//! Property containers and shared enums
//!
//! Plain-old-data snapshots published through the lock-free protocol. All
//! derivation (panning gains, filter coefficients, Doppler pitch) happens
//! on the mix thread when a snapshot is consumed; API threads only fill in
//! raw values.

use crate::buffer::SampleBuffer;
use sf_core::MAX_SENDS;
use sf_dsp::ResamplerKind;
use sf_effects::EffectProcessor;
use std::sync::Arc;

/// Distance-to-gain model, per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// No distance attenuation.
    None,
    Inverse,
    #[default]
    InverseClamped,
    Linear,
    LinearClamped,
    Exponent,
    ExponentClamped,
}

/// Whether a source is spatialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatializeMode {
    /// Mono buffers spatialise; multichannel buffers render at their
    /// canonical positions.
    #[default]
    Auto,
    /// Force spatialisation (multichannel collapses to the source point).
    On,
    /// No spatialisation: channels route directly to matching outputs.
    Off,
}

/// Rendering mode for two-channel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StereoMode {
    /// Virtual sources at the canonical +-30 degree positions.
    #[default]
    Normal,
    /// UHJ-style super-stereo widening.
    SuperStereo,
}

/// Source playback state, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SourceState {
    #[default]
    Initial = 0,
    Playing = 1,
    Paused = 2,
    Stopped = 3,
}

impl SourceState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SourceState::Playing,
            2 => SourceState::Paused,
            3 => SourceState::Stopped,
            _ => SourceState::Initial,
        }
    }
}

/// One auxiliary send: target slot and filter gains.
#[derive(Debug, Clone, Copy)]
pub struct SendProps {
    /// Target slot id; `None` routes through the context's default slot
    /// when send-auto is enabled there.
    pub slot: Option<u32>,
    pub gain: f32,
    pub gain_lf: f32,
    pub gain_hf: f32,
}

impl Default for SendProps {
    fn default() -> Self {
        Self {
            slot: None,
            gain: 1.0,
            gain_lf: 1.0,
            gain_hf: 1.0,
        }
    }
}

/// Source parameter snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SourceProps {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Cone axis; zero vector means omnidirectional.
    pub direction: [f32; 3],
    pub relative: bool,
    pub looping: bool,
    pub gain: f32,
    pub min_gain: f32,
    pub max_gain: f32,
    pub pitch: f32,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
    /// Source extent in units; widens the panning spread with proximity.
    pub radius: f32,
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
    pub cone_outer_gain_hf: f32,
    /// Direct-path filter gains (low/high band).
    pub direct_gain_lf: f32,
    pub direct_gain_hf: f32,
    pub spatialize: SpatializeMode,
    pub stereo_mode: StereoMode,
    pub resampler: ResamplerKind,
    pub sends: [SendProps; MAX_SENDS],
}

impl Default for SourceProps {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            direction: [0.0; 3],
            relative: false,
            looping: false,
            gain: 1.0,
            min_gain: 0.0,
            max_gain: 1.0,
            pitch: 1.0,
            ref_distance: 1.0,
            max_distance: f32::MAX,
            rolloff: 1.0,
            radius: 0.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            cone_outer_gain_hf: 1.0,
            direct_gain_lf: 1.0,
            direct_gain_hf: 1.0,
            spatialize: SpatializeMode::Auto,
            stereo_mode: StereoMode::Normal,
            resampler: ResamplerKind::Linear,
            sends: [SendProps::default(); MAX_SENDS],
        }
    }
}

/// Listener parameter snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ListenerProps {
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// "At" vector of the orientation pair.
    pub forward: [f32; 3],
    /// "Up" vector of the orientation pair.
    pub up: [f32; 3],
    pub gain: f32,
    pub metres_per_unit: f32,
}

impl Default for ListenerProps {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            velocity: [0.0; 3],
            forward: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
            gain: 1.0,
            metres_per_unit: 1.0,
        }
    }
}

/// Context parameter snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ContextProps {
    pub doppler_factor: f32,
    pub speed_of_sound: f32,
    pub distance_model: DistanceModel,
    /// Slot receiving implicit sends from sources without an explicit one.
    pub default_slot: Option<u32>,
}

impl Default for ContextProps {
    fn default() -> Self {
        Self {
            doppler_factor: 1.0,
            speed_of_sound: 343.3,
            distance_model: DistanceModel::InverseClamped,
            default_slot: None,
        }
    }
}

/// Effect slot parameter snapshot.
#[derive(Debug, Clone)]
pub struct SlotProps {
    pub gain: f32,
    /// Output target: another slot, or `None` for the dry bus.
    pub target: Option<u32>,
    /// Whether implicit (default) sends may land here.
    pub send_auto: bool,
    pub effect: sf_effects::EffectProps,
}

impl Default for SlotProps {
    fn default() -> Self {
        Self {
            gain: 1.0,
            target: None,
            send_auto: true,
            effect: sf_effects::EffectProps::Null,
        }
    }
}

/// One-shot commands carried to the mix thread over the context's command
/// queue. Anything that moves ownership (buffer queues, effect kernels)
/// travels here rather than through property snapshots.
pub enum MixCommand {
    /// Begin (or restart) playback of a source with the given queue.
    Play {
        source: u32,
        shared: Arc<crate::source::SourceShared>,
        queue: Vec<Arc<SampleBuffer>>,
    },
    Pause {
        source: u32,
    },
    Resume {
        source: u32,
    },
    Stop {
        source: u32,
    },
    Rewind {
        source: u32,
    },
    /// Drop the source's voice outright (source deleted).
    DestroySource {
        source: u32,
    },
    /// Install a slot processor (creation or effect change).
    SetSlotEffect {
        slot: u32,
        shared: Arc<crate::slot::SlotShared>,
        processor: Box<dyn EffectProcessor>,
    },
    DestroySlot {
        slot: u32,
    },
}
