//! Automatic gain compressor
//!
//! Tracks the peak level of the slot input and rides a slow gain so quiet
//! and loud passages land near a common level.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;

const ATTACK_TIME: f32 = 0.1;
const RELEASE_TIME: f32 = 0.2;

/// One-knob compressor (enable/disable).
#[derive(Debug)]
pub struct Compressor {
    enabled: bool,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            enabled: true,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 1.0,
        }
    }
}

impl EffectProcessor for Compressor {
    fn device_update(&mut self, device: &DeviceInfo) {
        let sr = device.sample_rate as f32;
        self.attack_coeff = (-1.0 / (ATTACK_TIME * sr)).exp();
        self.release_coeff = (-1.0 / (RELEASE_TIME * sr)).exp();
        self.envelope = 1.0;
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Compressor(p) = props {
            self.enabled = p.enabled;
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        if !self.enabled {
            for (inp, out) in input.iter().zip(output.iter_mut()) {
                for i in 0..frames {
                    out[i] += inp[i];
                }
            }
            return;
        }

        for i in 0..frames {
            let mut peak = 0.000976f32;
            for line in input.iter() {
                peak = peak.max(line[i].abs());
            }
            let target = if peak > 0.5 { 0.5 / peak } else { 1.0 };
            let coeff = if target < self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = target + (self.envelope - target) * coeff;

            for (inp, out) in input.iter().zip(output.iter_mut()) {
                out[i] += inp[i] * self.envelope;
            }
        }
    }
}
