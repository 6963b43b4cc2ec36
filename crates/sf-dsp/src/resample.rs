//! Resampler kernels
//!
//! Each resampler is a pure function from an input window plus a fractional
//! phase to one output sample. The voice advances an integer position and a
//! `FRACTION_BITS`-bit phase per output frame; kernels never touch state.

use std::sync::LazyLock;

/// Bits of fractional phase precision.
pub const FRACTION_BITS: u32 = 12;
/// One sample step in fixed-point phase units.
pub const FRACTION_ONE: u32 = 1 << FRACTION_BITS;
/// Mask extracting the fractional phase.
pub const FRACTION_MASK: u32 = FRACTION_ONE - 1;

/// Largest sample-step the mixer permits, in whole source samples per output
/// frame. Steps beyond this are clamped.
pub const MAX_PITCH: u32 = 255;

/// Number of phase entries in a sinc table.
const SINC_PHASES: usize = 256;

/// Resampling kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerKind {
    /// Nearest input sample.
    Point,
    /// Two-point linear interpolation.
    #[default]
    Linear,
    /// Four-point Catmull-Rom spline.
    Cubic,
    /// 12-point windowed sinc.
    Sinc12,
    /// 24-point windowed sinc.
    Sinc24,
}

impl ResamplerKind {
    /// Input window length in samples.
    #[inline]
    pub const fn taps(self) -> usize {
        match self {
            ResamplerKind::Point => 1,
            ResamplerKind::Linear => 2,
            ResamplerKind::Cubic => 4,
            ResamplerKind::Sinc12 => 12,
            ResamplerKind::Sinc24 => 24,
        }
    }

    /// Samples of history before the read position the window reaches.
    #[inline]
    pub const fn history(self) -> usize {
        match self {
            ResamplerKind::Point | ResamplerKind::Linear => 0,
            ResamplerKind::Cubic => 1,
            ResamplerKind::Sinc12 => 5,
            ResamplerKind::Sinc24 => 11,
        }
    }

    /// Parse a config-file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "point" | "none" => Some(ResamplerKind::Point),
            "linear" => Some(ResamplerKind::Linear),
            "cubic" => Some(ResamplerKind::Cubic),
            "bsinc12" | "fast_bsinc12" | "sinc12" => Some(ResamplerKind::Sinc12),
            "bsinc24" | "fast_bsinc24" | "sinc24" => Some(ResamplerKind::Sinc24),
            _ => None,
        }
    }
}

/// Phase-tabulated windowed-sinc coefficients.
struct SincTable {
    taps: usize,
    /// `SINC_PHASES + 1` rows of `taps` coefficients; the extra row lets the
    /// lookup interpolate across the last phase without wrapping.
    coeffs: Vec<f32>,
}

impl SincTable {
    fn build(taps: usize, beta: f64) -> Self {
        let mut coeffs = vec![0.0f32; (SINC_PHASES + 1) * taps];
        let half = taps as f64 / 2.0;
        let i0_beta = bessel_i0(beta);

        for phase in 0..=SINC_PHASES {
            let frac = phase as f64 / SINC_PHASES as f64;
            let row = &mut coeffs[phase * taps..(phase + 1) * taps];
            let mut sum = 0.0f64;
            for (t, c) in row.iter_mut().enumerate() {
                // Tap offset from the interpolation point.
                let x = (t as f64 - (half - 1.0)) - frac;
                let sinc = if x.abs() < 1e-9 {
                    1.0
                } else {
                    (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
                };
                let w = x / half;
                let window = if w.abs() <= 1.0 {
                    bessel_i0(beta * (1.0 - w * w).sqrt()) / i0_beta
                } else {
                    0.0
                };
                let v = sinc * window;
                *c = v as f32;
                sum += v;
            }
            // Normalise so DC passes at unity regardless of phase.
            let scale = (1.0 / sum) as f32;
            for c in row.iter_mut() {
                *c *= scale;
            }
        }

        Self { taps, coeffs }
    }

    #[inline]
    fn apply(&self, window: &[f32], frac: u32) -> f32 {
        // Map the fixed-point phase onto the table, linearly interpolating
        // between the two nearest phase rows.
        let pos = (frac as usize * SINC_PHASES) as f32 / FRACTION_ONE as f32;
        let pi = pos as usize;
        let pf = pos - pi as f32;
        let row0 = &self.coeffs[pi * self.taps..(pi + 1) * self.taps];
        let row1 = &self.coeffs[(pi + 1) * self.taps..(pi + 2) * self.taps];

        let mut acc = 0.0f32;
        for t in 0..self.taps {
            let c = row0[t] + (row1[t] - row0[t]) * pf;
            acc += window[t] * c;
        }
        acc
    }
}

static SINC12_TABLE: LazyLock<SincTable> = LazyLock::new(|| SincTable::build(12, 8.6));
static SINC24_TABLE: LazyLock<SincTable> = LazyLock::new(|| SincTable::build(24, 8.6));

/// Compute one output sample. `window` must hold `kind.taps()` samples
/// positioned so `window[kind.history()]` is the sample at the integer read
/// position.
#[inline]
pub fn resample_point(kind: ResamplerKind, window: &[f32], frac: u32) -> f32 {
    let mu = frac as f32 / FRACTION_ONE as f32;
    match kind {
        ResamplerKind::Point => window[0],
        ResamplerKind::Linear => window[0] + (window[1] - window[0]) * mu,
        ResamplerKind::Cubic => sf_core::cubic(window[0], window[1], window[2], window[3], mu),
        ResamplerKind::Sinc12 => SINC12_TABLE.apply(window, frac),
        ResamplerKind::Sinc24 => SINC24_TABLE.apply(window, frac),
    }
}

/// Resample a run of samples. `src[0]` must align with
/// `read_position - kind.history()`; `src` must cover the full span the run
/// will touch: `kind.taps() + ((frac + increment*dst.len()) >> FRACTION_BITS)`
/// samples. Returns the final `(whole_advance, frac)` pair.
pub fn resample(
    kind: ResamplerKind,
    src: &[f32],
    mut frac: u32,
    increment: u32,
    dst: &mut [f32],
) -> (usize, u32) {
    let mut idx = 0usize;
    for out in dst.iter_mut() {
        *out = resample_point(kind, &src[idx..idx + kind.taps()], frac);
        frac += increment;
        idx += (frac >> FRACTION_BITS) as usize;
        frac &= FRACTION_MASK;
    }
    (idx, frac)
}

/// Zeroth-order modified Bessel function, for the Kaiser window.
fn bessel_i0(x: f64) -> f64 {
    let mut term = 1.0f64;
    let mut sum = 1.0f64;
    let half_x = x / 2.0;
    for k in 1..32 {
        term *= (half_x / k as f64) * (half_x / k as f64);
        sum += term;
        if term < sum * 1e-16 {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_midpoint() {
        let window = [0.0f32, 1.0];
        let v = resample_point(ResamplerKind::Linear, &window, FRACTION_ONE / 2);
        assert!((v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_point_ignores_frac() {
        let window = [0.7f32];
        assert_eq!(resample_point(ResamplerKind::Point, &window, 0), 0.7);
        assert_eq!(
            resample_point(ResamplerKind::Point, &window, FRACTION_MASK),
            0.7
        );
    }

    #[test]
    fn test_sinc_passes_dc() {
        // A constant signal must come through at unity at every phase.
        for kind in [ResamplerKind::Sinc12, ResamplerKind::Sinc24] {
            let window = vec![1.0f32; kind.taps()];
            for frac in [0u32, 1024, 2048, 3072, FRACTION_MASK] {
                let v = resample_point(kind, &window, frac);
                assert!((v - 1.0).abs() < 1e-4, "{kind:?} frac {frac}: {v}");
            }
        }
    }

    #[test]
    fn test_sinc_interpolates_at_zero_phase() {
        // At phase 0 the kernel should return (very nearly) the sample at
        // the read position.
        let kind = ResamplerKind::Sinc12;
        let mut window = vec![0.0f32; kind.taps()];
        window[kind.history()] = 1.0;
        let v = resample_point(kind, &window, 0);
        assert!((v - 1.0).abs() < 1e-2, "{v}");
    }

    #[test]
    fn test_resample_run_advances() {
        // Doubling pitch (increment = 2.0) over 4 outputs advances 8 input
        // samples.
        let src: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let mut dst = [0.0f32; 4];
        let (adv, frac) = resample(
            ResamplerKind::Linear,
            &src,
            0,
            FRACTION_ONE * 2,
            &mut dst,
        );
        assert_eq!(adv, 8);
        assert_eq!(frac, 0);
        assert_eq!(dst, [0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_zero_increment_holds_position() {
        // A zero step (pitch 0) repeats the current sample and never
        // advances.
        let src = [0.25f32, 0.5, 0.75, 1.0];
        let mut dst = [0.0f32; 8];
        let (adv, frac) = resample(ResamplerKind::Point, &src, 0, 0, &mut dst);
        assert_eq!(adv, 0);
        assert_eq!(frac, 0);
        assert_eq!(dst, [0.25; 8]);
    }

    #[test]
    fn test_resample_half_speed() {
        let src: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let mut dst = [0.0f32; 4];
        let (adv, _) = resample(
            ResamplerKind::Linear,
            &src,
            0,
            FRACTION_ONE / 2,
            &mut dst,
        );
        assert_eq!(adv, 2);
        assert_eq!(dst, [0.0, 0.5, 1.0, 1.5]);
    }
}
