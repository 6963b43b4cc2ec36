//! Ambisonic bus to speaker decode
//!
//! Matrix decode of the SN3D/ACN dry bus onto a physical speaker layout,
//! optionally dual-band: the high band of each bus line is pre-scaled by a
//! per-order factor before the matrix multiply so the decode stays
//! energy-correct at high frequencies.

use crate::ambi::{
    AmbiOrder, ACN_ORDER, DECODER_HF_SCALE_1O, DECODER_HF_SCALE_2O, DECODER_HF_SCALE_3O,
    SN3D_TO_N3D,
};
use crate::panning::{speaker_direction, direction_from_angles};
use crate::Panner;
use crate::ambi::calc_ambi_coeffs;
use sf_core::{Channel, ChannelLayout, FloatBufferLine};
use sf_dsp::BandSplitter;

/// Matrix decoder from bus lines to output speakers.
pub struct BFormatDecoder {
    /// Per-speaker rows indexed by bus line.
    matrix: Vec<Vec<f32>>,
    /// Dual-band state, one splitter per bus line.
    splitters: Option<Vec<BandSplitter>>,
    /// HF scale per bus line (derived from the per-order table).
    hf_scales: Vec<f32>,
}

/// Crossover for the dual-band decode, as a fraction of the sample rate at
/// 48 kHz reference.
const XOVER_FREQ: f32 = 400.0;

impl BFormatDecoder {
    /// Build a decoder for a speaker layout. `panner` describes the bus
    /// shape. `dual_band` enables the band-split HF compensation.
    pub fn new(
        layout: ChannelLayout,
        panner: &Panner,
        sample_rate: u32,
        dual_band: bool,
    ) -> Self {
        let speakers = layout.speakers();
        let active = panner.active_channels();

        let hf_table = match panner.order() {
            AmbiOrder::First => &DECODER_HF_SCALE_1O,
            AmbiOrder::Second => &DECODER_HF_SCALE_2O,
            AmbiOrder::Third => &DECODER_HF_SCALE_3O,
        };
        let hf_scales: Vec<f32> = active.iter().map(|&acn| hf_table[ACN_ORDER[acn]]).collect();

        let matrix = if layout == ChannelLayout::Mono {
            // Mono takes the omnidirectional channel alone.
            let mut row = vec![0.0f32; active.len()];
            if let Some(line) = panner.line_for_acn(0) {
                row[line] = 1.0;
            }
            vec![row]
        } else if layout == ChannelLayout::Stereo {
            // Stereo gets a fixed first-order matrix that keeps hard-panned
            // sources at full level and the phantom centre mono-compatible.
            let mut rows = vec![vec![0.0f32; active.len()]; 2];
            for (line, &acn) in active.iter().enumerate() {
                match acn {
                    0 => {
                        rows[0][line] = 0.5;
                        rows[1][line] = 0.5;
                    }
                    1 => {
                        rows[0][line] = 0.5;
                        rows[1][line] = -0.5;
                    }
                    _ => {}
                }
            }
            rows
        } else {
            // Projection decode: re-encode each speaker direction and scale
            // by the inverse normalisation, averaged over the array.
            let positioned = speakers
                .iter()
                .filter(|ch| !matches!(ch, Channel::Lfe))
                .count()
                .max(1);
            speakers
                .iter()
                .map(|&ch| {
                    let mut row = vec![0.0f32; active.len()];
                    if let Some((az, el)) = speaker_direction(ch) {
                        let dir = direction_from_angles(az, el);
                        let sh = calc_ambi_coeffs(dir.0, dir.1, dir.2);
                        for (line, &acn) in active.iter().enumerate() {
                            row[line] =
                                sh[acn] * SN3D_TO_N3D[ACN_ORDER[acn]] / positioned as f32;
                        }
                    }
                    row
                })
                .collect()
        };

        let splitters = dual_band.then(|| {
            let f0norm = XOVER_FREQ / sample_rate as f32;
            vec![BandSplitter::new(f0norm); active.len()]
        });

        Self {
            matrix,
            splitters,
            hf_scales,
        }
    }

    /// Number of output channels the decoder produces.
    #[inline]
    pub fn output_count(&self) -> usize {
        self.matrix.len()
    }

    /// Decode `frames` samples of the bus into the output lines. The bus
    /// lines are modified in place when dual-band processing is active.
    pub fn process(
        &mut self,
        output: &mut [FloatBufferLine],
        bus: &mut [FloatBufferLine],
        frames: usize,
    ) {
        if let Some(splitters) = &mut self.splitters {
            for ((line, splitter), &scale) in
                bus.iter_mut().zip(splitters.iter_mut()).zip(self.hf_scales.iter())
            {
                splitter.apply_hf_scale(&mut line[..frames], scale);
            }
        }

        for (row, out) in self.matrix.iter().zip(output.iter_mut()) {
            out[..frames].fill(0.0);
            for (&coeff, line) in row.iter().zip(bus.iter()) {
                if coeff == 0.0 {
                    continue;
                }
                for i in 0..frames {
                    out[i] += line[i] * coeff;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panning::Panner;
    use sf_core::{BUFFER_LINE_SIZE, MAX_AMBI_CHANNELS};

    fn make_bus(count: usize) -> Vec<FloatBufferLine> {
        vec![[0.0; BUFFER_LINE_SIZE]; count]
    }

    #[test]
    fn test_stereo_hard_right() {
        let panner = Panner::new(AmbiOrder::First, false);
        let mut dec = BFormatDecoder::new(ChannelLayout::Stereo, &panner, 48000, false);
        assert_eq!(dec.output_count(), 2);

        // Encode a hard-right source onto the bus.
        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        panner.point_gains(direction_from_angles(90.0, 0.0), 0.0, 1.0, &mut gains);
        let mut bus = make_bus(panner.line_count());
        for (line, bus_line) in bus.iter_mut().enumerate() {
            bus_line[..4].fill(gains[line]);
        }

        let mut out = [[0.0f32; BUFFER_LINE_SIZE]; 2];
        dec.process(&mut out, &mut bus, 4);
        assert!(out[0][0].abs() < 1e-5, "left {}", out[0][0]);
        assert!((out[1][0] - 1.0).abs() < 1e-5, "right {}", out[1][0]);
    }

    #[test]
    fn test_stereo_centre_mono_compatible() {
        let panner = Panner::new(AmbiOrder::First, false);
        let mut dec = BFormatDecoder::new(ChannelLayout::Stereo, &panner, 48000, false);

        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        panner.point_gains(direction_from_angles(0.0, 0.0), 0.0, 1.0, &mut gains);
        let mut bus = make_bus(panner.line_count());
        for (line, bus_line) in bus.iter_mut().enumerate() {
            bus_line[0] = gains[line];
        }

        let mut out = [[0.0f32; BUFFER_LINE_SIZE]; 2];
        dec.process(&mut out, &mut bus, 1);
        assert!((out[0][0] - 0.5).abs() < 1e-5);
        assert!((out[1][0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_mono_takes_w_only() {
        let panner = Panner::new(AmbiOrder::First, false);
        let mut dec = BFormatDecoder::new(ChannelLayout::Mono, &panner, 48000, false);
        assert_eq!(dec.output_count(), 1);

        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        panner.point_gains(direction_from_angles(0.0, 0.0), 0.0, 1.0, &mut gains);
        let mut bus = make_bus(panner.line_count());
        for (line, bus_line) in bus.iter_mut().enumerate() {
            bus_line[0] = gains[line];
        }
        let mut out = [[0.0f32; BUFFER_LINE_SIZE]; 1];
        dec.process(&mut out, &mut bus, 1);
        // Any direction decodes to plain W (gain 1.0).
        assert!((out[0][0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lfe_row_silent() {
        let panner = Panner::new(AmbiOrder::Second, false);
        let mut dec = BFormatDecoder::new(ChannelLayout::X51, &panner, 48000, false);
        assert_eq!(dec.output_count(), 6);

        let mut bus = make_bus(panner.line_count());
        for line in bus.iter_mut() {
            line[0] = 1.0;
        }
        let mut outs = [[0.0f32; BUFFER_LINE_SIZE]; 6];
        dec.process(&mut outs, &mut bus, 1);
        // Channel 3 is the LFE in 5.1 ordering.
        assert_eq!(outs[3][0], 0.0);
        assert!(outs[0][0] != 0.0);
    }

    #[test]
    fn test_projection_peaks_at_matching_speaker() {
        // A source at the back-left speaker position must decode loudest
        // into that speaker.
        let panner = Panner::new(AmbiOrder::Second, false);
        let mut dec = BFormatDecoder::new(ChannelLayout::X51Rear, &panner, 48000, false);

        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        panner.point_gains(direction_from_angles(-110.0, 0.0), 0.0, 1.0, &mut gains);
        let mut bus = make_bus(panner.line_count());
        for (line, bus_line) in bus.iter_mut().enumerate() {
            bus_line[0] = gains[line];
        }

        let mut outs = [[0.0f32; BUFFER_LINE_SIZE]; 6];
        dec.process(&mut outs, &mut bus, 1);
        // X51Rear ordering: FL FR FC LFE BL BR; BL is index 4.
        let bl = outs[4][0];
        for (i, out) in outs.iter().enumerate() {
            if i != 4 {
                assert!(bl > out[0], "speaker {i}: {} vs BL {}", out[0], bl);
            }
        }
    }
}
