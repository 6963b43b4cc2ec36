//! Front stabilizer
//!
//! On layouts with a physical centre speaker, a phantom centre mixed only
//! into the front pair comb-filters off axis. The stabilizer band-splits the
//! front-pair mid signal and moves its low band to the centre speaker,
//! narrowing the phantom image. The splitter is phase-matched IIR, so the
//! recombined paths stay time-aligned without extra delay.

use crate::splitter::BandSplitter;
use sf_core::{FloatBufferLine, BUFFER_LINE_SIZE, INV_SQRT2};

/// Mid/side front stabilizer for layouts with a centre speaker.
pub struct FrontStabilizer {
    mid_filter: BandSplitter,
    mid_lf: FloatBufferLine,
    mid_hf: FloatBufferLine,
    side: FloatBufferLine,
}

impl FrontStabilizer {
    /// Create a stabilizer with the split at `f0norm` (crossover frequency
    /// over sample rate).
    pub fn new(f0norm: f32) -> Self {
        Self {
            mid_filter: BandSplitter::new(f0norm),
            mid_lf: [0.0; BUFFER_LINE_SIZE],
            mid_hf: [0.0; BUFFER_LINE_SIZE],
            side: [0.0; BUFFER_LINE_SIZE],
        }
    }

    /// Apply to the output lines. `left`, `right`, and `center` index into
    /// `channels`. The front pair is rebuilt from its high-band mid plus
    /// side signal; the low-band mid moves to the centre.
    pub fn process(
        &mut self,
        channels: &mut [FloatBufferLine],
        frames: usize,
        left: usize,
        right: usize,
        center: usize,
    ) {
        let frames = frames.min(BUFFER_LINE_SIZE);

        let mut mid = [0.0f32; BUFFER_LINE_SIZE];
        for i in 0..frames {
            mid[i] = (channels[left][i] + channels[right][i]) * 0.5;
            self.side[i] = (channels[left][i] - channels[right][i]) * 0.5;
        }
        self.mid_filter.process(
            &mid[..frames],
            &mut self.mid_hf[..frames],
            &mut self.mid_lf[..frames],
        );

        for i in 0..frames {
            let hf = self.mid_hf[i];
            let lf = self.mid_lf[i];
            let side = self.side[i];
            channels[left][i] = hf + side;
            channels[right][i] = hf - side;
            channels[center][i] += lf * INV_SQRT2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_receives_low_mid() {
        let mut stab = FrontStabilizer::new(0.005);
        let mut chans = [[0.0f32; BUFFER_LINE_SIZE]; 3];
        // Run a few blocks so the splitter settles on the DC input.
        for _ in 0..4 {
            chans[0].fill(1.0);
            chans[1].fill(1.0);
            chans[2].fill(0.0);
            stab.process(&mut chans, BUFFER_LINE_SIZE, 0, 1, 2);
        }
        // DC mid energy must have moved into the centre, out of the fronts.
        assert!(chans[2][BUFFER_LINE_SIZE - 1] > 0.5, "{}", chans[2][BUFFER_LINE_SIZE - 1]);
        assert!(
            chans[0][BUFFER_LINE_SIZE - 1].abs() < 0.05,
            "{}",
            chans[0][BUFFER_LINE_SIZE - 1]
        );
    }

    #[test]
    fn test_side_signal_preserved() {
        // A pure side signal (L = -R) has no mid; the centre must stay
        // silent and the fronts keep their difference.
        let mut stab = FrontStabilizer::new(0.005);
        let mut chans = [[0.0f32; BUFFER_LINE_SIZE]; 3];
        let mut orig_l = [0.0f32; BUFFER_LINE_SIZE];
        for i in 0..BUFFER_LINE_SIZE {
            orig_l[i] = (i as f32 * 0.2).sin();
            chans[0][i] = orig_l[i];
            chans[1][i] = -orig_l[i];
        }
        stab.process(&mut chans, BUFFER_LINE_SIZE, 0, 1, 2);
        let peak = chans[2].iter().fold(0.0f32, |m, x| m.max(x.abs()));
        assert!(peak < 1e-4, "centre peak {peak}");
        for i in 0..BUFFER_LINE_SIZE {
            assert!((chans[0][i] - orig_l[i]).abs() < 1e-4);
            assert!((chans[1][i] + orig_l[i]).abs() < 1e-4);
        }
    }
}
