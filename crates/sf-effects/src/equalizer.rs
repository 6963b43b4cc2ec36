//! Four-band equalizer
//!
//! Low shelf, two peaking bands, and a high shelf, applied to every line of
//! the slot input.

use crate::{DeviceInfo, EffectProcessor, EffectProps, EqualizerProps};
use sf_core::FloatBufferLine;
use sf_dsp::{rcp_q_from_bandwidth, rcp_q_from_slope, Biquad, FilterType};

const BANDS: usize = 4;

/// 4-band EQ kernel.
#[derive(Debug, Default)]
pub struct Equalizer {
    props: Option<EqualizerProps>,
    sample_rate: u32,
    /// `BANDS` filters per bus line.
    filters: Vec<[Biquad; BANDS]>,
}

impl Equalizer {
    fn reconfigure(&mut self) {
        let p = self.props.unwrap_or_default();
        let sr = self.sample_rate as f32;

        let f0_low = (p.low_cutoff / sr).clamp(0.0001, 0.49);
        let f0_mid1 = (p.mid1_center / sr).clamp(0.0001, 0.49);
        let f0_mid2 = (p.mid2_center / sr).clamp(0.0001, 0.49);
        let f0_high = (p.high_cutoff / sr).clamp(0.0001, 0.49);

        let mut reference: [Biquad; BANDS] = Default::default();
        reference[0].set_params(
            FilterType::LowShelf,
            p.low_gain,
            f0_low,
            rcp_q_from_slope(p.low_gain, 0.75),
        );
        reference[1].set_params(
            FilterType::Peaking,
            p.mid1_gain,
            f0_mid1,
            rcp_q_from_bandwidth(f0_mid1, p.mid1_width),
        );
        reference[2].set_params(
            FilterType::Peaking,
            p.mid2_gain,
            f0_mid2,
            rcp_q_from_bandwidth(f0_mid2, p.mid2_width),
        );
        reference[3].set_params(
            FilterType::HighShelf,
            p.high_gain,
            f0_high,
            rcp_q_from_slope(p.high_gain, 0.75),
        );

        for line in self.filters.iter_mut() {
            for (f, r) in line.iter_mut().zip(reference.iter()) {
                f.copy_params_from(r);
            }
        }
    }
}

impl EffectProcessor for Equalizer {
    fn device_update(&mut self, device: &DeviceInfo) {
        self.sample_rate = device.sample_rate;
        self.filters = vec![Default::default(); device.bus_channels];
        self.reconfigure();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Equalizer(p) = props {
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
        for (ch, (inp, out)) in input.iter().zip(output.iter_mut()).enumerate() {
            let filters = &mut self.filters[ch];
            for i in 0..frames {
                let mut x = inp[i];
                for f in filters.iter_mut() {
                    x = f.process_sample(x);
                }
                out[i] += x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut fx = Equalizer::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for (i, s) in input[0].iter_mut().enumerate() {
            *s = (i as f32 * 0.21).sin();
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        for i in 0..BUFFER_LINE_SIZE {
            assert!((output[0][i] - input[0][i]).abs() < 1e-3, "sample {i}");
        }
    }

    #[test]
    fn test_low_cut_removes_dc() {
        let mut fx = Equalizer::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        fx.update(&EffectProps::Equalizer(EqualizerProps {
            low_gain: 0.1,
            ..Default::default()
        }));
        let input = vec![[1.0f32; BUFFER_LINE_SIZE]; 1];
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for _ in 0..8 {
            output[0].fill(0.0);
            fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        }
        assert!(
            output[0][BUFFER_LINE_SIZE - 1] < 0.2,
            "{}",
            output[0][BUFFER_LINE_SIZE - 1]
        );
    }
}
