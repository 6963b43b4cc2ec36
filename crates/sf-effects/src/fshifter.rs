//! Frequency shifter
//!
//! Single-sideband modulation: a Hilbert pair (all-pass cascade) splits the
//! input into in-phase and quadrature parts, which a complex oscillator
//! rotates to slide the whole spectrum up or down without preserving
//! harmonic ratios.

use crate::{DeviceInfo, EffectProcessor, EffectProps, FshifterProps, ShiftDirection};
use sf_core::FloatBufferLine;
use sf_dsp::{AllPassChain, ALLPASS_BASE_COEFFS, ALLPASS_OFFSET_COEFFS};

/// SSB frequency-shift kernel.
#[derive(Debug, Default)]
pub struct FrequencyShifter {
    props: FshifterProps,
    sample_rate: u32,
    in_phase_chain: AllPassChain,
    quadrature_chain: AllPassChain,
    delay_z: f32,
    phase: f64,
}

impl EffectProcessor for FrequencyShifter {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.in_phase_chain.clear();
        self.quadrature_chain.clear();
        self.delay_z = 0.0;
        self.phase = 0.0;
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::FrequencyShifter(p) = props {
            self.props = *p;
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let sign = match self.props.left_direction {
            ShiftDirection::Down => -1.0f64,
            ShiftDirection::Up => 1.0,
            ShiftDirection::Off => {
                // Unshifted passthrough.
                for i in 0..frames {
                    output[0][i] += input[0][i];
                }
                return;
            }
        };
        let step = self.props.frequency as f64 / self.sample_rate as f64;

        for i in 0..frames {
            let x = input[0][i];

            // Base chain plus one sample delay pairs with the offset chain
            // to form the analytic signal.
            let filtered = self.in_phase_chain.process_sample(&ALLPASS_BASE_COEFFS, x);
            let i_part = self.delay_z;
            self.delay_z = filtered;
            let q_part = self.quadrature_chain.process_sample(&ALLPASS_OFFSET_COEFFS, x);

            // With q leading i by 90 degrees, i*cos + q*sin slides the
            // spectrum upward; negating the quadrature term slides it down.
            let angle = self.phase * std::f64::consts::TAU;
            let shifted =
                i_part * angle.cos() as f32 + sign as f32 * q_part * angle.sin() as f32;
            output[0][i] += shifted;

            self.phase = (self.phase + step).fract();
        }
    }
}
