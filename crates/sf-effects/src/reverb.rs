//! Algorithmic reverb
//!
//! Early reflections from a multi-tap delay feed a late field built from
//! four parallel damped combs and two series all-passes. Decay time sets
//! the comb feedback for a -60 dB tail, the HF ratio shortens the tail's
//! high band through one-pole damping in each comb loop.

use crate::{DeviceInfo, EffectProcessor, EffectProps, ReverbProps};
use sf_core::FloatBufferLine;

/// Prime-ish comb delays in seconds, spread for low modal overlap.
const COMB_TIMES: [f32; 4] = [0.0297, 0.0371, 0.0411, 0.0437];
/// Series all-pass delays in seconds.
const ALLPASS_TIMES: [f32; 2] = [0.005, 0.0017];
/// Early reflection tap times in seconds.
const EARLY_TAPS: [f32; 4] = [0.0043, 0.0215, 0.0225, 0.0268];
/// Early reflection tap gains.
const EARLY_GAINS: [f32; 4] = [0.841, 0.504, 0.491, 0.379];

#[derive(Debug, Default)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    damp: f32,
    damp_state: f32,
}

impl Comb {
    fn process(&mut self, x: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.damp_state = out + (self.damp_state - out) * self.damp;
        self.buffer[self.pos] = x + self.damp_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

#[derive(Debug, Default)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
}

impl Allpass {
    fn process(&mut self, x: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let y = delayed - self.gain * x;
        self.buffer[self.pos] = x + self.gain * delayed;
        self.pos = (self.pos + 1) % self.buffer.len();
        y
    }
}

/// Standard reverb kernel.
#[derive(Debug, Default)]
pub struct Reverb {
    props: ReverbProps,
    sample_rate: u32,
    early_buffer: Vec<f32>,
    early_pos: usize,
    early_delay: usize,
    combs: [Comb; 4],
    allpasses: [Allpass; 2],
    late_delay_samples: usize,
    late_buffer: Vec<f32>,
    late_pos: usize,
}

impl Default for ReverbProps {
    fn default() -> Self {
        ReverbProps::standard()
    }
}

impl ReverbProps {
    /// The generic-reverb preset.
    pub fn standard() -> Self {
        Self {
            density: 1.0,
            diffusion: 1.0,
            gain: 0.32,
            gain_hf: 0.89,
            decay_time: 1.49,
            decay_hf_ratio: 0.83,
            reflections_gain: 0.05,
            reflections_delay: 0.007,
            late_gain: 1.26,
            late_delay: 0.011,
            air_absorption_gain_hf: 0.994,
            room_rolloff_factor: 0.0,
            decay_hf_limit: true,
        }
    }
}

impl Reverb {
    fn reconfigure(&mut self) {
        let sr = self.sample_rate as f32;
        let p = self.props;

        // Early buffer long enough for the reflection delay plus all taps.
        let early_len = ((p.reflections_delay + EARLY_TAPS[3] + 0.001) * sr) as usize + 1;
        self.early_buffer = vec![0.0; early_len.next_power_of_two()];
        self.early_pos = 0;
        self.early_delay = (p.reflections_delay * sr) as usize;

        // Density scales the comb lengths toward their full size.
        let density_scale = 0.5 + 0.5 * p.density;
        for (comb, &time) in self.combs.iter_mut().zip(COMB_TIMES.iter()) {
            let len = ((time * density_scale * sr) as usize).max(8);
            comb.buffer = vec![0.0; len];
            comb.pos = 0;
            // Feedback for -60 dB after decay_time.
            let loop_time = len as f32 / sr;
            comb.feedback = 10.0f32.powf(-3.0 * loop_time / p.decay_time.max(0.1));
            // HF decays decay_hf_ratio times as fast.
            let hf_decay = p.decay_time * p.decay_hf_ratio.max(0.1);
            let hf_feedback = 10.0f32.powf(-3.0 * loop_time / hf_decay.max(0.05));
            comb.damp = (1.0 - hf_feedback / comb.feedback).clamp(0.0, 0.99);
            comb.damp_state = 0.0;
        }

        for (ap, &time) in self.allpasses.iter_mut().zip(ALLPASS_TIMES.iter()) {
            ap.buffer = vec![0.0; ((time * sr) as usize).max(4)];
            ap.pos = 0;
            ap.gain = 0.5 * p.diffusion;
        }

        self.late_delay_samples = (p.late_delay * sr) as usize;
        self.late_buffer = vec![0.0; (self.late_delay_samples + 1).next_power_of_two()];
        self.late_pos = 0;
    }
}

impl EffectProcessor for Reverb {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Reverb(p) = props {
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
        let p = self.props;
        let sr = self.sample_rate as f32;
        let early_mask = self.early_buffer.len() - 1;
        let late_mask = self.late_buffer.len() - 1;
        let has_y = output.len() > 1;

        for i in 0..frames {
            let x = input[0][i];

            // Early reflections: taps off the delayed input.
            self.early_buffer[self.early_pos & early_mask] = x;
            let mut early = 0.0f32;
            for (&tap, &gain) in EARLY_TAPS.iter().zip(EARLY_GAINS.iter()) {
                let delay = self.early_delay + (tap * sr) as usize;
                early += self.early_buffer[(self.early_pos.wrapping_sub(delay)) & early_mask]
                    * gain;
            }
            early *= p.reflections_gain;
            self.early_pos = self.early_pos.wrapping_add(1);

            // Late field: delayed input through the comb bank and the
            // diffusion all-passes.
            self.late_buffer[self.late_pos & late_mask] = x;
            let late_in = self.late_buffer
                [(self.late_pos.wrapping_sub(self.late_delay_samples.max(1))) & late_mask];
            self.late_pos = self.late_pos.wrapping_add(1);

            let mut late = 0.0f32;
            for comb in self.combs.iter_mut() {
                late += comb.process(late_in);
            }
            late *= 0.25;
            for ap in self.allpasses.iter_mut() {
                late = ap.process(late);
            }
            late *= p.late_gain;

            let wet = (early + late) * p.gain;
            output[0][i] += wet;
            if has_y {
                // Slight lateral decorrelation of the late field.
                output[1][i] += late * p.gain * 0.35;
            }
        }
    }
}
