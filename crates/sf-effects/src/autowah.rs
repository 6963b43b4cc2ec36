//! Auto-wah
//!
//! An envelope follower sweeps a resonant bandpass up the spectrum as the
//! input gets louder.

use crate::{AutowahProps, DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;
use sf_dsp::{Biquad, FilterType};

const MIN_FREQ: f32 = 20.0;
const MAX_FREQ: f32 = 2500.0;

/// Envelope-driven wah kernel.
#[derive(Debug, Default)]
pub struct Autowah {
    props: Option<AutowahProps>,
    sample_rate: u32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    filter: Biquad,
}

impl Autowah {
    fn recompute_times(&mut self) {
        let p = self.props.unwrap_or_default();
        let sr = self.sample_rate as f32;
        self.attack_coeff = (-1.0 / (p.attack_time.max(0.0001) * sr)).exp();
        self.release_coeff = (-1.0 / (p.release_time.max(0.0001) * sr)).exp();
    }
}

impl EffectProcessor for Autowah {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.envelope = 0.0;
        self.filter.clear();
        self.recompute_times();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Autowah(p) = props {
            self.props = Some(*p);
            self.recompute_times();
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let p = self.props.unwrap_or_default();
        let sr = self.sample_rate as f32;
        // Resonance parameter maps to filter Q.
        let rcp_q = 1.0 / (p.resonance / 250.0).clamp(0.5, 16.0);
        let makeup = p.peak_gain.sqrt().max(1.0);

        for i in 0..frames {
            let x = input[0][i];
            let level = x.abs();
            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = level + (self.envelope - level) * coeff;

            // Sweep the centre with the envelope; retune every 16 samples
            // to keep coefficient updates off the per-sample path.
            if i % 16 == 0 {
                let sweep = self.envelope.min(1.0);
                let freq = MIN_FREQ + (MAX_FREQ - MIN_FREQ) * sweep;
                self.filter
                    .set_params(FilterType::Bandpass, 1.0, (freq / sr).min(0.45), rcp_q);
            }
            output[0][i] += self.filter.process_sample(x) * makeup;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_envelope_rises_with_signal() {
        let mut fx = Autowah::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for (i, s) in input[0].iter_mut().enumerate() {
            *s = (i as f32 * 0.5).sin();
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        assert!(fx.envelope > 0.1);
        let energy: f32 = output[0].iter().map(|x| x * x).sum();
        assert!(energy > 0.0);
    }
}
