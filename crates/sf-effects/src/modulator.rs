//! Ring modulator
//!
//! Multiplies the input by a carrier oscillator after a high-pass that
//! keeps low frequencies from thumping against the carrier.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;
use sf_dsp::{Biquad, FilterType};

/// Carrier shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModulatorWaveform {
    #[default]
    Sinusoid,
    Sawtooth,
    Square,
}

/// Ring modulation kernel.
#[derive(Debug)]
pub struct Modulator {
    waveform: ModulatorWaveform,
    frequency: f32,
    highpass_cutoff: f32,
    sample_rate: u32,
    phase: f32,
    filters: Vec<Biquad>,
}

impl Default for Modulator {
    fn default() -> Self {
        Self {
            waveform: ModulatorWaveform::Sinusoid,
            frequency: 440.0,
            highpass_cutoff: 800.0,
            sample_rate: 48000,
            phase: 0.0,
            filters: Vec::new(),
        }
    }
}

impl Modulator {
    #[inline]
    fn carrier(&self, phase: f32) -> f32 {
        match self.waveform {
            ModulatorWaveform::Sinusoid => (phase * std::f32::consts::TAU).sin(),
            ModulatorWaveform::Sawtooth => 2.0 * phase - 1.0,
            ModulatorWaveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    fn reconfigure(&mut self) {
        let f0 = self.highpass_cutoff / self.sample_rate as f32;
        for f in self.filters.iter_mut() {
            f.set_params(FilterType::Highpass, 1.0, f0.clamp(0.0001, 0.49), 1.0);
        }
    }
}

impl EffectProcessor for Modulator {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.filters = vec![Biquad::identity(); device.bus_channels];
        self.phase = 0.0;
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Modulator(p) = props {
            self.waveform = p.waveform;
            self.frequency = p.frequency.max(0.01);
            self.highpass_cutoff = p.highpass_cutoff;
            self.reconfigure();
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let step = self.frequency / self.sample_rate as f32;
        for (ch, (inp, out)) in input.iter().zip(output.iter_mut()).enumerate() {
            let mut phase = self.phase;
            for i in 0..frames {
                let filtered = self.filters[ch].process_sample(inp[i]);
                out[i] += filtered * self.carrier(phase);
                phase = (phase + step).fract();
            }
            if ch == input.len() - 1 {
                self.phase = phase;
            }
        }
    }
}
