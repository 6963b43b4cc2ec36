//! Dedicated output effect: a bare gain stage used for dialog and LFE
//! routing and as the "default" slot's trivial kernel.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;

/// Gain-only kernel.
#[derive(Debug)]
pub struct Dedicated {
    gain: f32,
}

impl Default for Dedicated {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl EffectProcessor for Dedicated {
    fn device_update(&mut self, _device: &DeviceInfo) {}

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Dedicated(p) = props {
            self.gain = p.gain;
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        for (inp, out) in input.iter().zip(output.iter_mut()) {
            for i in 0..frames {
                out[i] += inp[i] * self.gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DedicatedProps;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_gain_applied() {
        let mut fx = Dedicated::default();
        fx.update(&EffectProps::Dedicated(DedicatedProps { gain: 0.5 }));
        let input = vec![[1.0f32; BUFFER_LINE_SIZE]; 1];
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(8, &input, &mut output);
        assert_eq!(output[0][0], 0.5);
        assert_eq!(output[0][8], 0.0);
    }
}
