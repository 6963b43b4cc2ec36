//! sf-effects: effect kernels for SoundField effect slots
//!
//! Every kernel implements [`EffectProcessor`]: a `device_update` that may
//! allocate on device reset, an `update` that consumes a parameter snapshot
//! on the mix thread, and a pure real-time `process`. The mixer only routes
//! buffers and drives these entry points; kernel interiors are opaque.
//!
//! Kernels read their input from the slot's ambisonic accumulator (channel
//! 0 is the omnidirectional W line) and accumulate into the target bus.

mod autowah;
mod chorus;
mod compressor;
mod convolution;
mod dedicated;
mod distortion;
mod echo;
mod equalizer;
mod fshifter;
mod modulator;
mod null;
mod pshifter;
mod reverb;
mod vmorpher;

pub use autowah::Autowah;
pub use chorus::{Chorus, ChorusWaveform};
pub use compressor::Compressor;
pub use convolution::{Convolution, ConvolutionIr};
pub use dedicated::Dedicated;
pub use distortion::Distortion;
pub use echo::Echo;
pub use equalizer::Equalizer;
pub use fshifter::FrequencyShifter;
pub use modulator::{Modulator, ModulatorWaveform};
pub use null::NullEffect;
pub use pshifter::PitchShifter;
pub use reverb::Reverb;
pub use vmorpher::{Phoneme, VocalMorpher};

use sf_core::FloatBufferLine;
use std::sync::Arc;

/// Device figures a kernel may size its state from.
#[derive(Debug, Clone, Copy)]
pub struct DeviceInfo {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per mix iteration.
    pub update_size: usize,
    /// Lines in the ambisonic bus.
    pub bus_channels: usize,
}

/// The four-operation contract every effect satisfies.
pub trait EffectProcessor: Send {
    /// Called once per device reset; may allocate. Never runs concurrently
    /// with `process`.
    fn device_update(&mut self, device: &DeviceInfo);

    /// Consume a parameter snapshot on the mix thread.
    fn update(&mut self, props: &EffectProps);

    /// Real-time processing: read `frames` samples from the slot input
    /// lines and accumulate into the target lines. Must not allocate.
    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    );
}

/// Selects which kernel a slot hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectKind {
    #[default]
    Null,
    Reverb,
    Chorus,
    Flanger,
    Echo,
    Equalizer,
    Distortion,
    Compressor,
    Modulator,
    Autowah,
    FrequencyShifter,
    PitchShifter,
    VocalMorpher,
    Convolution,
    Dedicated,
}

/// Construct a kernel for the given selector, sized for the device.
pub fn create_effect(kind: EffectKind, device: &DeviceInfo) -> Box<dyn EffectProcessor> {
    let mut effect: Box<dyn EffectProcessor> = match kind {
        EffectKind::Null => Box::new(NullEffect::default()),
        EffectKind::Reverb => Box::new(Reverb::default()),
        EffectKind::Chorus => Box::new(Chorus::chorus()),
        EffectKind::Flanger => Box::new(Chorus::flanger()),
        EffectKind::Echo => Box::new(Echo::default()),
        EffectKind::Equalizer => Box::new(Equalizer::default()),
        EffectKind::Distortion => Box::new(Distortion::default()),
        EffectKind::Compressor => Box::new(Compressor::default()),
        EffectKind::Modulator => Box::new(Modulator::default()),
        EffectKind::Autowah => Box::new(Autowah::default()),
        EffectKind::FrequencyShifter => Box::new(FrequencyShifter::default()),
        EffectKind::PitchShifter => Box::new(PitchShifter::default()),
        EffectKind::VocalMorpher => Box::new(VocalMorpher::default()),
        EffectKind::Convolution => Box::new(Convolution::default()),
        EffectKind::Dedicated => Box::new(Dedicated::default()),
    };
    effect.device_update(device);
    effect
}

/// Parameter snapshot published to a slot's kernel.
#[derive(Debug, Clone)]
pub enum EffectProps {
    Null,
    Reverb(ReverbProps),
    Chorus(ChorusProps),
    Echo(EchoProps),
    Equalizer(EqualizerProps),
    Distortion(DistortionProps),
    Compressor(CompressorProps),
    Modulator(ModulatorProps),
    Autowah(AutowahProps),
    FrequencyShifter(FshifterProps),
    PitchShifter(PshifterProps),
    VocalMorpher(VmorpherProps),
    Convolution(ConvolutionProps),
    Dedicated(DedicatedProps),
}

/// Standard reverb parameter set.
#[derive(Debug, Clone, Copy)]
pub struct ReverbProps {
    pub density: f32,
    pub diffusion: f32,
    pub gain: f32,
    pub gain_hf: f32,
    pub decay_time: f32,
    pub decay_hf_ratio: f32,
    pub reflections_gain: f32,
    pub reflections_delay: f32,
    pub late_gain: f32,
    pub late_delay: f32,
    pub air_absorption_gain_hf: f32,
    pub room_rolloff_factor: f32,
    pub decay_hf_limit: bool,
}

/// Chorus/flanger parameter set (the flanger is the same kernel with
/// shorter delays).
#[derive(Debug, Clone, Copy)]
pub struct ChorusProps {
    pub waveform: ChorusWaveform,
    pub phase_deg: i32,
    pub rate: f32,
    pub depth: f32,
    pub feedback: f32,
    pub delay: f32,
}

impl ChorusProps {
    /// OpenAL-style chorus defaults.
    pub fn chorus() -> Self {
        Self {
            waveform: ChorusWaveform::Triangle,
            phase_deg: 90,
            rate: 1.1,
            depth: 0.1,
            feedback: 0.25,
            delay: 0.016,
        }
    }

    /// OpenAL-style flanger defaults.
    pub fn flanger() -> Self {
        Self {
            waveform: ChorusWaveform::Triangle,
            phase_deg: 0,
            rate: 0.27,
            depth: 1.0,
            feedback: -0.5,
            delay: 0.002,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EchoProps {
    pub delay: f32,
    pub lr_delay: f32,
    pub damping: f32,
    pub feedback: f32,
    pub spread: f32,
}

impl Default for EchoProps {
    fn default() -> Self {
        Self {
            delay: 0.1,
            lr_delay: 0.1,
            damping: 0.5,
            feedback: 0.5,
            spread: -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EqualizerProps {
    pub low_gain: f32,
    pub low_cutoff: f32,
    pub mid1_gain: f32,
    pub mid1_center: f32,
    pub mid1_width: f32,
    pub mid2_gain: f32,
    pub mid2_center: f32,
    pub mid2_width: f32,
    pub high_gain: f32,
    pub high_cutoff: f32,
}

impl Default for EqualizerProps {
    fn default() -> Self {
        Self {
            low_gain: 1.0,
            low_cutoff: 200.0,
            mid1_gain: 1.0,
            mid1_center: 500.0,
            mid1_width: 1.0,
            mid2_gain: 1.0,
            mid2_center: 3000.0,
            mid2_width: 1.0,
            high_gain: 1.0,
            high_cutoff: 6000.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistortionProps {
    pub edge: f32,
    pub gain: f32,
    pub lowpass_cutoff: f32,
    pub eq_center: f32,
    pub eq_bandwidth: f32,
}

impl Default for DistortionProps {
    fn default() -> Self {
        Self {
            edge: 0.2,
            gain: 0.05,
            lowpass_cutoff: 8000.0,
            eq_center: 3600.0,
            eq_bandwidth: 3600.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompressorProps {
    pub enabled: bool,
}

impl Default for CompressorProps {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModulatorProps {
    pub frequency: f32,
    pub highpass_cutoff: f32,
    pub waveform: ModulatorWaveform,
}

impl Default for ModulatorProps {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            highpass_cutoff: 800.0,
            waveform: ModulatorWaveform::Sinusoid,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutowahProps {
    pub attack_time: f32,
    pub release_time: f32,
    pub resonance: f32,
    pub peak_gain: f32,
}

impl Default for AutowahProps {
    fn default() -> Self {
        Self {
            attack_time: 0.06,
            release_time: 0.06,
            resonance: 1000.0,
            peak_gain: 11.22,
        }
    }
}

/// Shift direction for one ear of the frequency shifter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShiftDirection {
    #[default]
    Down,
    Up,
    Off,
}

#[derive(Debug, Clone, Copy)]
pub struct FshifterProps {
    pub frequency: f32,
    pub left_direction: ShiftDirection,
    pub right_direction: ShiftDirection,
}

impl Default for FshifterProps {
    fn default() -> Self {
        Self {
            frequency: 0.0,
            left_direction: ShiftDirection::Down,
            right_direction: ShiftDirection::Down,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PshifterProps {
    /// Semitones, -12..=12.
    pub coarse_tune: i32,
    /// Cents, -50..=50.
    pub fine_tune: i32,
}

impl Default for PshifterProps {
    fn default() -> Self {
        Self {
            coarse_tune: 12,
            fine_tune: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VmorpherProps {
    pub phoneme_a: Phoneme,
    pub phoneme_b: Phoneme,
    pub phoneme_a_coarse: i32,
    pub phoneme_b_coarse: i32,
    pub rate: f32,
}

impl Default for VmorpherProps {
    fn default() -> Self {
        Self {
            phoneme_a: Phoneme::A,
            phoneme_b: Phoneme::Er,
            phoneme_a_coarse: 0,
            phoneme_b_coarse: 0,
            rate: 1.41,
        }
    }
}

/// Convolution reverb parameters: a pre-transformed impulse response
/// (build with [`ConvolutionIr::from_samples`] on a non-realtime thread).
#[derive(Debug, Clone, Default)]
pub struct ConvolutionProps {
    pub ir: Option<Arc<ConvolutionIr>>,
}

#[derive(Debug, Clone, Copy)]
pub struct DedicatedProps {
    pub gain: f32,
}

impl Default for DedicatedProps {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_create_all_kinds() {
        let device = DeviceInfo {
            sample_rate: 48000,
            update_size: 256,
            bus_channels: 4,
        };
        let kinds = [
            EffectKind::Null,
            EffectKind::Reverb,
            EffectKind::Chorus,
            EffectKind::Flanger,
            EffectKind::Echo,
            EffectKind::Equalizer,
            EffectKind::Distortion,
            EffectKind::Compressor,
            EffectKind::Modulator,
            EffectKind::Autowah,
            EffectKind::FrequencyShifter,
            EffectKind::PitchShifter,
            EffectKind::VocalMorpher,
            EffectKind::Convolution,
            EffectKind::Dedicated,
        ];
        let input = vec![[0.1f32; BUFFER_LINE_SIZE]; 4];
        for kind in kinds {
            let mut fx = create_effect(kind, &device);
            let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 4];
            // Every kernel must survive a silent and a non-silent block.
            fx.process(256, &input, &mut output);
            fx.process(256, &input, &mut output);
            for line in &output {
                for &s in &line[..256] {
                    assert!(s.is_finite(), "{kind:?} produced non-finite output");
                }
            }
        }
    }
}
