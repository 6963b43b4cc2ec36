//! Biquad filter implementation using Transposed Direct Form II
//!
//! TDF-II is numerically optimal for floating-point arithmetic, minimizing
//! quantization noise and ensuring stability.

use std::f32::consts::PI;

/// Biquad filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Peaking,
    LowShelf,
    HighShelf,
}

/// Biquad coefficients, normalised so a0 == 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    /// Identity (pass-through) coefficients.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Compute coefficients for the given response. `f0norm` is the corner
    /// frequency as a fraction of the sample rate, `gain` the linear gain
    /// for shelving/peaking types, `rcp_q` the reciprocal of the quality
    /// factor.
    pub fn new(ty: FilterType, gain: f32, f0norm: f32, rcp_q: f32) -> Self {
        // Limit gain to a usable range; a gain of zero would produce
        // denormal coefficients in the shelf responses.
        let gain = gain.max(0.000_1);

        let w0 = 2.0 * PI * f0norm;
        let sin_w0 = w0.sin();
        let cos_w0 = w0.cos();
        let alpha = sin_w0 / 2.0 * rcp_q;

        let sqrt_gain = gain.sqrt();
        // Shelf slope term for a slope of 1.
        let shelf_beta = 2.0 * sqrt_gain.sqrt() * alpha;

        let (b0, b1, b2, a0, a1, a2) = match ty {
            FilterType::Lowpass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Highpass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Bandpass => (
                alpha,
                0.0,
                -alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Peaking => (
                1.0 + alpha * sqrt_gain,
                -2.0 * cos_w0,
                1.0 - alpha * sqrt_gain,
                1.0 + alpha / sqrt_gain,
                -2.0 * cos_w0,
                1.0 - alpha / sqrt_gain,
            ),
            FilterType::LowShelf => (
                sqrt_gain * ((sqrt_gain + 1.0) - (sqrt_gain - 1.0) * cos_w0 + shelf_beta),
                2.0 * sqrt_gain * ((sqrt_gain - 1.0) - (sqrt_gain + 1.0) * cos_w0),
                sqrt_gain * ((sqrt_gain + 1.0) - (sqrt_gain - 1.0) * cos_w0 - shelf_beta),
                (sqrt_gain + 1.0) + (sqrt_gain - 1.0) * cos_w0 + shelf_beta,
                -2.0 * ((sqrt_gain - 1.0) + (sqrt_gain + 1.0) * cos_w0),
                (sqrt_gain + 1.0) + (sqrt_gain - 1.0) * cos_w0 - shelf_beta,
            ),
            FilterType::HighShelf => (
                sqrt_gain * ((sqrt_gain + 1.0) + (sqrt_gain - 1.0) * cos_w0 + shelf_beta),
                -2.0 * sqrt_gain * ((sqrt_gain - 1.0) + (sqrt_gain + 1.0) * cos_w0),
                sqrt_gain * ((sqrt_gain + 1.0) + (sqrt_gain - 1.0) * cos_w0 - shelf_beta),
                (sqrt_gain + 1.0) - (sqrt_gain - 1.0) * cos_w0 + shelf_beta,
                2.0 * ((sqrt_gain - 1.0) - (sqrt_gain + 1.0) * cos_w0),
                (sqrt_gain + 1.0) - (sqrt_gain - 1.0) * cos_w0 - shelf_beta,
            ),
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter with TDF-II state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl Biquad {
    /// Pass-through filter.
    pub fn identity() -> Self {
        Self {
            coeffs: BiquadCoeffs::IDENTITY,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Replace the coefficients, keeping delay state.
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Configure from a response description.
    pub fn set_params(&mut self, ty: FilterType, gain: f32, f0norm: f32, rcp_q: f32) {
        self.coeffs = BiquadCoeffs::new(ty, gain, f0norm, rcp_q);
    }

    /// Copy another filter's coefficients without touching state.
    #[inline]
    pub fn copy_params_from(&mut self, other: &Biquad) {
        self.coeffs = other.coeffs;
    }

    /// Reset the delay memory.
    #[inline]
    pub fn clear(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Process a single sample.
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let c = self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    /// Process `src` into `dst`. The slices may alias by being the same
    /// length views of one buffer split by the caller.
    pub fn process(&mut self, src: &[f32], dst: &mut [f32]) {
        for (out, &inp) in dst.iter_mut().zip(src.iter()) {
            *out = self.process_sample(inp);
        }
    }

    /// Process a buffer in place.
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    /// Whether the filter currently does anything.
    #[inline]
    pub fn is_identity(&self) -> bool {
        let c = self.coeffs;
        c.b0 == 1.0 && c.b1 == 0.0 && c.b2 == 0.0 && c.a1 == 0.0 && c.a2 == 0.0
    }
}

/// The RcpQ value that gives a Butterworth response for a shelf of slope 1
/// with the given gain.
#[inline]
pub fn rcp_q_from_slope(gain: f32, slope: f32) -> f32 {
    ((gain + 1.0 / gain) * (1.0 / slope - 1.0) + 2.0).sqrt()
}

/// The RcpQ value from a bandwidth in octaves, for peaking filters.
#[inline]
pub fn rcp_q_from_bandwidth(f0norm: f32, bandwidth: f32) -> f32 {
    let w0 = 2.0 * PI * f0norm;
    2.0 * ((2f32.ln() / 2.0) * bandwidth * w0 / w0.sin()).sinh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passthrough() {
        let mut f = Biquad::identity();
        let src = [1.0f32, -0.5, 0.25, 0.0];
        let mut dst = [0.0f32; 4];
        f.process(&src, &mut dst);
        assert_eq!(src, dst);
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut f = Biquad::identity();
        f.set_params(FilterType::Lowpass, 1.0, 0.05, 1.0 / std::f32::consts::FRAC_1_SQRT_2.recip());

        // Alternating +1/-1 is the Nyquist frequency; a lowpass at 0.05*sr
        // should strongly attenuate it after settling.
        let mut peak = 0.0f32;
        for i in 0..512 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = f.process_sample(x);
            if i > 256 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.05, "nyquist peak {peak}");
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut f = Biquad::identity();
        f.set_params(FilterType::Lowpass, 1.0, 0.25, 1.0);
        let mut last = 0.0;
        for _ in 0..1024 {
            last = f.process_sample(1.0);
        }
        assert!((last - 1.0).abs() < 1e-3, "dc gain {last}");
    }

    #[test]
    fn test_highshelf_cuts_highs() {
        let mut f = Biquad::identity();
        // -12 dB high shelf.
        f.set_params(FilterType::HighShelf, 0.25, 0.2, rcp_q_from_slope(0.25, 1.0));
        let mut peak = 0.0f32;
        for i in 0..512 {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let y = f.process_sample(x);
            if i > 256 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.5, "shelf peak {peak}");
    }

    #[test]
    fn test_clear_resets_state() {
        let mut f = Biquad::identity();
        f.set_params(FilterType::Lowpass, 1.0, 0.1, 1.0);
        for _ in 0..32 {
            f.process_sample(1.0);
        }
        f.clear();
        let silent = f.process_sample(0.0);
        assert_eq!(silent, 0.0);
    }
}
