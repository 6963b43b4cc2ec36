//! Real-FFT helpers
//!
//! Thin wrappers over `realfft` plans, pre-allocating scratch so transforms
//! never allocate on the mix thread. The forward/backward pair is
//! unnormalised: a round trip returns the input scaled by the transform
//! length, matching the convention the segmented convolution code expects.

pub use realfft::num_complex::Complex32;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// A forward+inverse real FFT pair of a fixed length.
pub struct RealFftPair {
    len: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    backward: Arc<dyn ComplexToReal<f32>>,
    scratch_fwd: Vec<Complex32>,
    scratch_inv: Vec<Complex32>,
}

impl RealFftPair {
    /// Plan transforms of `len` points. `len` must be even.
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let backward = planner.plan_fft_inverse(len);
        let scratch_fwd = forward.make_scratch_vec();
        let scratch_inv = backward.make_scratch_vec();
        Self {
            len,
            forward,
            backward,
            scratch_fwd,
            scratch_inv,
        }
    }

    /// Transform length in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of complex bins a spectrum holds (`len/2 + 1`).
    #[inline]
    pub fn spectrum_len(&self) -> usize {
        self.len / 2 + 1
    }

    /// Allocate a zeroed spectrum buffer.
    pub fn make_spectrum(&self) -> Vec<Complex32> {
        vec![Complex32::default(); self.spectrum_len()]
    }

    /// Forward transform. `time` is clobbered by the plan; its contents
    /// after the call are unspecified.
    pub fn forward(&mut self, time: &mut [f32], spectrum: &mut [Complex32]) {
        self.forward
            .process_with_scratch(time, spectrum, &mut self.scratch_fwd)
            .expect("forward FFT length mismatch");
    }

    /// Inverse transform, unnormalised (output is `len` times the input
    /// signal). `spectrum` is clobbered.
    pub fn backward(&mut self, spectrum: &mut [Complex32], time: &mut [f32]) {
        self.backward
            .process_with_scratch(spectrum, time, &mut self.scratch_inv)
            .expect("inverse FFT length mismatch");
    }
}

/// Multiply-accumulate two spectra: `acc += a * b` per bin. Used by the
/// segmented overlap-add convolvers.
#[inline]
pub fn spectrum_mac(acc: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
    for ((acc, &x), &y) in acc.iter_mut().zip(a.iter()).zip(b.iter()) {
        *acc += x * y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_scales_by_n() {
        let n = 256;
        let mut fft = RealFftPair::new(n);
        let input: Vec<f32> = (0..n).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();

        let mut time = input.clone();
        let mut spectrum = fft.make_spectrum();
        fft.forward(&mut time, &mut spectrum);
        let mut out = vec![0.0f32; n];
        fft.backward(&mut spectrum, &mut out);

        for i in 0..n {
            let expect = input[i] * n as f32;
            assert!(
                (out[i] - expect).abs() <= n as f32 * f32::EPSILON * 16.0,
                "bin {i}: {} vs {}",
                out[i],
                expect
            );
        }
    }

    #[test]
    fn test_impulse_spectrum_is_flat() {
        let n = 64;
        let mut fft = RealFftPair::new(n);
        let mut time = vec![0.0f32; n];
        time[0] = 1.0;
        let mut spectrum = fft.make_spectrum();
        fft.forward(&mut time, &mut spectrum);
        for bin in &spectrum {
            assert!((bin.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_spectrum_mac() {
        let a = vec![Complex32::new(1.0, 1.0); 4];
        let b = vec![Complex32::new(0.0, 1.0); 4];
        let mut acc = vec![Complex32::new(0.5, 0.0); 4];
        spectrum_mac(&mut acc, &a, &b);
        // (1+i)*(i) = -1+i, plus 0.5 -> (-0.5, 1)
        for v in &acc {
            assert!((v.re + 0.5).abs() < 1e-6 && (v.im - 1.0).abs() < 1e-6);
        }
    }
}
