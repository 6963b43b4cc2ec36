//! Vocal morpher
//!
//! Two 4-band formant filter banks (one per phoneme) run in parallel over
//! every input line, blended by an LFO. Formant centres follow classic
//! vowel tables, shifted by the per-phoneme coarse tuning.

use crate::{DeviceInfo, EffectProcessor, EffectProps, VmorpherProps};
use sf_core::FloatBufferLine;

const NUM_FORMANTS: usize = 4;
const Q_FACTOR: f32 = 5.0;

/// Vowel selector for the two morph targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phoneme {
    #[default]
    A,
    E,
    I,
    O,
    U,
    Er,
}

impl Phoneme {
    /// Formant centre frequencies in Hz.
    fn formant_freqs(self) -> [f32; NUM_FORMANTS] {
        match self {
            Phoneme::A => [800.0, 1150.0, 2900.0, 3900.0],
            Phoneme::E => [350.0, 2000.0, 2800.0, 3600.0],
            Phoneme::I => [270.0, 2140.0, 2950.0, 3900.0],
            Phoneme::O => [450.0, 800.0, 2830.0, 3800.0],
            Phoneme::U => [325.0, 700.0, 2700.0, 3800.0],
            Phoneme::Er => [450.0, 1350.0, 1700.0, 3800.0],
        }
    }

    /// Relative band gains.
    fn formant_gains(self) -> [f32; NUM_FORMANTS] {
        [1.0, 0.501, 0.1, 0.05]
    }
}

/// One state-variable band-pass section from a topology-preserving
/// transform.
#[derive(Debug, Clone, Copy, Default)]
struct FormantFilter {
    f0norm: f32,
    gain: f32,
    s1: f32,
    s2: f32,
}

impl FormantFilter {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let g = (std::f32::consts::PI * self.f0norm).tan();
        let h = 1.0 / (1.0 + (g / Q_FACTOR) + g * g);

        for (out, &x) in output.iter_mut().zip(input.iter()) {
            let hp = h * (x - (1.0 / Q_FACTOR + g) * self.s1 - self.s2);
            let bp = g * hp + self.s1;
            let lp = g * bp + self.s2;
            self.s1 = g * hp + bp;
            self.s2 = g * bp + lp;
            *out += bp * self.gain;
        }
    }

    fn clear(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

/// Morphing formant-filter kernel.
#[derive(Debug, Default)]
pub struct VocalMorpher {
    props: VmorpherProps,
    sample_rate: u32,
    /// Per input line: [vowel A bank, vowel B bank].
    banks: Vec<[[FormantFilter; NUM_FORMANTS]; 2]>,
    lfo_phase: f32,
}

impl VocalMorpher {
    fn reconfigure(&mut self) {
        let sr = self.sample_rate as f32;
        let pitch_a = 2.0f32.powf(self.props.phoneme_a_coarse as f32 / 12.0);
        let pitch_b = 2.0f32.powf(self.props.phoneme_b_coarse as f32 / 12.0);
        let freqs_a = self.props.phoneme_a.formant_freqs();
        let freqs_b = self.props.phoneme_b.formant_freqs();
        let gains_a = self.props.phoneme_a.formant_gains();
        let gains_b = self.props.phoneme_b.formant_gains();

        for bank in self.banks.iter_mut() {
            for f in 0..NUM_FORMANTS {
                bank[0][f].f0norm = (freqs_a[f] * pitch_a / sr).clamp(0.0001, 0.45);
                bank[0][f].gain = gains_a[f];
                bank[1][f].f0norm = (freqs_b[f] * pitch_b / sr).clamp(0.0001, 0.45);
                bank[1][f].gain = gains_b[f];
            }
        }
    }
}

impl EffectProcessor for VocalMorpher {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.banks = vec![Default::default(); device.bus_channels];
        for bank in self.banks.iter_mut() {
            for vowel in bank.iter_mut() {
                for f in vowel.iter_mut() {
                    f.clear();
                }
            }
        }
        self.lfo_phase = 0.0;
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::VocalMorpher(p) = props {
            self.props = *p;
            self.reconfigure();
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let step = self.props.rate / self.sample_rate as f32;
        let start_phase = self.lfo_phase;

        let mut bank_a = [0.0f32; sf_core::BUFFER_LINE_SIZE];
        let mut bank_b = [0.0f32; sf_core::BUFFER_LINE_SIZE];

        for (ch, (inp, out)) in input.iter().zip(output.iter_mut()).enumerate() {
            let banks = &mut self.banks[ch];
            bank_a[..frames].fill(0.0);
            bank_b[..frames].fill(0.0);
            for f in banks[0].iter_mut() {
                f.process(&inp[..frames], &mut bank_a[..frames]);
            }
            for f in banks[1].iter_mut() {
                f.process(&inp[..frames], &mut bank_b[..frames]);
            }

            let mut phase = start_phase;
            for i in 0..frames {
                // Sinusoid LFO mapped to 0..1 blend.
                let blend = 0.5 + 0.5 * (phase * std::f32::consts::TAU).sin();
                out[i] += bank_a[i] + (bank_b[i] - bank_a[i]) * blend;
                phase = (phase + step).fract();
            }
            if ch == input.len() - 1 {
                self.lfo_phase = phase;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_formants_emphasise_vowel_band() {
        let mut fx = VocalMorpher::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });

        // White-ish input (deterministic pseudo-noise).
        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        let mut state = 0x12345u32;
        for s in input[0].iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *s = (state >> 16) as f32 / 32768.0 - 1.0;
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);

        let in_energy: f32 = input[0].iter().map(|x| x * x).sum();
        let out_energy: f32 = output[0].iter().map(|x| x * x).sum();
        // Band-pass banks remove most broadband energy.
        assert!(out_energy > 0.0);
        assert!(out_energy < in_energy, "{out_energy} vs {in_energy}");
    }
}
