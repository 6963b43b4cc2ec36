//! Echo effect
//!
//! Two feedback taps: the primary delay feeds a second left/right-offset
//! tap, with damping on the feedback path and a spread control that pans
//! successive repeats to alternating sides of the sound field.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;
use sf_dsp::{Biquad, FilterType};

/// Two-tap feedback echo.
#[derive(Debug, Default)]
pub struct Echo {
    delay: f32,
    lr_delay: f32,
    damping: f32,
    feedback: f32,
    spread: f32,
    sample_rate: u32,
    buffer: Vec<f32>,
    offset: usize,
    tap1: usize,
    tap2: usize,
    filter: Biquad,
}

impl Echo {
    fn reconfigure(&mut self) {
        let sr = self.sample_rate as f32;
        self.tap1 = ((self.delay * sr) as usize).max(1);
        self.tap2 = self.tap1 + ((self.lr_delay * sr) as usize).max(1);

        let len = (self.tap2 + 1).next_power_of_two();
        if self.buffer.len() != len {
            self.buffer = vec![0.0; len];
            self.offset = 0;
        }

        // Damping as a one-pole-ish lowpass on the feedback path.
        let f0 = (1.0 - self.damping).max(0.01) * 0.25;
        self.filter.set_params(FilterType::Lowpass, 1.0, f0, 1.0);
    }
}

impl EffectProcessor for Echo {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        let p = crate::EchoProps::default();
        if self.delay == 0.0 {
            self.delay = p.delay;
            self.lr_delay = p.lr_delay;
            self.damping = p.damping;
            self.feedback = p.feedback;
            self.spread = p.spread;
        }
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Echo(p) = props {
            self.delay = p.delay;
            self.lr_delay = p.lr_delay;
            self.damping = p.damping;
            self.feedback = p.feedback;
            self.spread = p.spread;
            self.reconfigure();
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let mask = self.buffer.len() - 1;
        let has_y = output.len() > 1;
        for i in 0..frames {
            let inp = input[0][i];
            let d1 = self.buffer[(self.offset.wrapping_sub(self.tap1)) & mask];
            let d2 = self.buffer[(self.offset.wrapping_sub(self.tap2)) & mask];

            let fb = self.filter.process_sample(d2) * self.feedback;
            self.buffer[self.offset & mask] = inp + fb;
            self.offset = self.offset.wrapping_add(1);

            // First tap leans one way, second tap the other.
            output[0][i] += d1 + d2;
            if has_y {
                output[1][i] += (d1 - d2) * self.spread;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_impulse_repeats_at_delay() {
        let mut fx = Echo::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 1000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 2,
        });
        fx.update(&EffectProps::Echo(crate::EchoProps {
            delay: 0.05, // 50 samples at 1 kHz
            lr_delay: 0.02,
            damping: 0.0,
            feedback: 0.0,
            spread: 0.0,
        }));

        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 2];
        input[0][0] = 1.0;
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 2];
        fx.process(256, &input, &mut output);

        assert!(output[0][50] > 0.5, "tap1 {}", output[0][50]);
        assert!(output[0][70] > 0.5, "tap2 {}", output[0][70]);
        assert_eq!(output[0][10], 0.0);
    }
}
