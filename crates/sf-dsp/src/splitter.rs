//! Phase-matched band splitter
//!
//! Splits a signal into high and low bands that sum back to an all-passed
//! copy of the input. The companion all-pass mode applies the same phase
//! shift without splitting, so unsplit signals stay phase-coherent with
//! split ones.

use std::f32::consts::TAU;

/// Two-band splitter with first-order all-pass phase matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandSplitter {
    coeff: f32,
    lp_z1: f32,
    lp_z2: f32,
    ap_z1: f32,
}

impl BandSplitter {
    /// Create a splitter with the crossover at `f0norm` (frequency as a
    /// fraction of the sample rate).
    pub fn new(f0norm: f32) -> Self {
        let mut s = Self::default();
        s.init(f0norm);
        s
    }

    /// Reconfigure the crossover frequency. State is kept.
    pub fn init(&mut self, f0norm: f32) {
        let w = f0norm * TAU;
        let cw = w.cos();
        self.coeff = if cw > f32::EPSILON {
            (w.sin() - 1.0) / cw
        } else {
            cw * -0.5
        };
    }

    /// Reset the delay memory.
    pub fn clear(&mut self) {
        self.lp_z1 = 0.0;
        self.lp_z2 = 0.0;
        self.ap_z1 = 0.0;
    }

    /// Split `input` into `hp_out` and `lp_out`. All three slices must be
    /// the same length.
    pub fn process(&mut self, input: &[f32], hp_out: &mut [f32], lp_out: &mut [f32]) {
        let ap_coeff = self.coeff;
        let lp_coeff = self.coeff * 0.5 + 0.5;
        let mut lp_z1 = self.lp_z1;
        let mut lp_z2 = self.lp_z2;
        let mut ap_z1 = self.ap_z1;

        for ((&x, hp), lp) in input.iter().zip(hp_out.iter_mut()).zip(lp_out.iter_mut()) {
            // Two cascaded one-pole low-pass sections.
            let d = (x - lp_z1) * lp_coeff;
            let mut lp_y = lp_z1 + d;
            lp_z1 = lp_y + d;
            let d = (lp_y - lp_z2) * lp_coeff;
            lp_y = lp_z2 + d;
            lp_z2 = lp_y + d;
            *lp = lp_y;

            // All-pass, then high-pass by removing the low band.
            let ap_y = x * ap_coeff + ap_z1;
            ap_z1 = x - ap_y * ap_coeff;
            *hp = ap_y - lp_y;
        }

        self.lp_z1 = lp_z1;
        self.lp_z2 = lp_z2;
        self.ap_z1 = ap_z1;
    }

    /// Scale the high band of `samples` by `hf_scale` in place, keeping the
    /// low band and the phase relationship intact.
    pub fn apply_hf_scale(&mut self, samples: &mut [f32], hf_scale: f32) {
        let ap_coeff = self.coeff;
        let lp_coeff = self.coeff * 0.5 + 0.5;
        let mut lp_z1 = self.lp_z1;
        let mut lp_z2 = self.lp_z2;
        let mut ap_z1 = self.ap_z1;

        for x in samples.iter_mut() {
            let inp = *x;
            let d = (inp - lp_z1) * lp_coeff;
            let mut lp_y = lp_z1 + d;
            lp_z1 = lp_y + d;
            let d = (lp_y - lp_z2) * lp_coeff;
            lp_y = lp_z2 + d;
            lp_z2 = lp_y + d;

            let ap_y = inp * ap_coeff + ap_z1;
            ap_z1 = inp - ap_y * ap_coeff;

            *x = (ap_y - lp_y) * hf_scale + lp_y;
        }

        self.lp_z1 = lp_z1;
        self.lp_z2 = lp_z2;
        self.ap_z1 = ap_z1;
    }

    /// The all-pass portion alone. Each call is independent; no history is
    /// tracked between calls.
    pub fn apply_allpass(&self, samples: &mut [f32]) {
        let coeff = self.coeff;
        let mut z1 = 0.0f32;
        for x in samples.iter_mut() {
            let out = *x * coeff + z1;
            z1 = *x - out * coeff;
            *x = out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_sum_to_allpass() {
        // hp + lp must reconstruct the all-passed input exactly.
        let mut split = BandSplitter::new(400.0 / 48000.0);
        let input: Vec<f32> = (0..256)
            .map(|i| (i as f32 * 0.1).sin() + (i as f32 * 1.7).cos() * 0.5)
            .collect();
        let mut hp = vec![0.0f32; 256];
        let mut lp = vec![0.0f32; 256];
        split.process(&input, &mut hp, &mut lp);

        let ap_ref = BandSplitter::new(400.0 / 48000.0);
        let mut ap = input.clone();
        ap_ref.apply_allpass(&mut ap);

        for i in 0..256 {
            assert!((hp[i] + lp[i] - ap[i]).abs() < 1e-5, "sample {i}");
        }
    }

    #[test]
    fn test_dc_goes_to_low_band() {
        let mut split = BandSplitter::new(0.01);
        let input = vec![1.0f32; 2048];
        let mut hp = vec![0.0f32; 2048];
        let mut lp = vec![0.0f32; 2048];
        split.process(&input, &mut hp, &mut lp);
        // After settling, DC must live in the low band.
        assert!(lp[2047] > 0.98, "lp {}", lp[2047]);
        assert!(hp[2047].abs() < 0.02, "hp {}", hp[2047]);
    }

    #[test]
    fn test_hf_scale_unity_is_transparent() {
        let mut a = BandSplitter::new(0.05);
        let mut b = BandSplitter::new(0.05);
        let input: Vec<f32> = (0..128).map(|i| (i as f32 * 0.3).sin()).collect();

        let mut scaled = input.clone();
        a.apply_hf_scale(&mut scaled, 1.0);

        let mut hp = vec![0.0f32; 128];
        let mut lp = vec![0.0f32; 128];
        b.process(&input, &mut hp, &mut lp);
        for i in 0..128 {
            assert!((scaled[i] - (hp[i] + lp[i])).abs() < 1e-6);
        }
    }
}
