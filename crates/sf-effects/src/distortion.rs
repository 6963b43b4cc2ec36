//! Distortion effect
//!
//! Drive into a cubic waveshaper, band-limited before shaping and shaped
//! through a post-EQ bandpass that voices the result.

use crate::{DeviceInfo, DistortionProps, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;
use sf_dsp::{rcp_q_from_bandwidth, Biquad, FilterType};

/// Waveshaping distortion kernel.
#[derive(Debug, Default)]
pub struct Distortion {
    props: Option<DistortionProps>,
    sample_rate: u32,
    lowpass: Biquad,
    bandpass: Biquad,
}

impl Distortion {
    fn reconfigure(&mut self) {
        let p = self.props.unwrap_or_default();
        let sr = self.sample_rate as f32;
        let f_lp = (p.lowpass_cutoff / sr).clamp(0.0001, 0.49);
        let f_bp = (p.eq_center / sr).clamp(0.0001, 0.49);
        let bw = (p.eq_bandwidth / p.eq_center).max(0.1);
        self.lowpass.set_params(FilterType::Lowpass, 1.0, f_lp, 1.0);
        self.bandpass
            .set_params(FilterType::Bandpass, 1.0, f_bp, rcp_q_from_bandwidth(f_bp, bw));
    }
}

impl EffectProcessor for Distortion {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.lowpass.clear();
        self.bandpass.clear();
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Distortion(p) = props {
            self.props = Some(*p);
            self.reconfigure();
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let p = self.props.unwrap_or_default();
        // Edge maps to pre-shaper drive.
        let drive = 1.0 + p.edge * 9.0;
        for i in 0..frames {
            let band_limited = self.lowpass.process_sample(input[0][i]);
            let driven = (band_limited * drive).clamp(-1.5, 1.5);
            // Cubic soft clip.
            let shaped = driven - driven * driven * driven / 6.75;
            let voiced = self.bandpass.process_sample(shaped);
            output[0][i] += voiced * p.gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_output_scaled_by_gain() {
        let mut fx = Distortion::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for (i, s) in input[0].iter_mut().enumerate() {
            *s = (i as f32 * 0.4).sin();
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        let peak = output[0].iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!(peak > 0.0);
        assert!(peak < 0.5, "default gain keeps output modest: {peak}");
    }

    #[test]
    fn test_shaper_saturates() {
        // The shaper output never exceeds the soft-clip knee regardless of
        // drive.
        let mut fx = Distortion::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        fx.update(&EffectProps::Distortion(DistortionProps {
            edge: 1.0,
            gain: 1.0,
            ..Default::default()
        }));
        let input = vec![[10.0f32; BUFFER_LINE_SIZE]; 1];
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        for &s in &output[0][..BUFFER_LINE_SIZE] {
            assert!(s.abs() < 2.0);
        }
    }
}
