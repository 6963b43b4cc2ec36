//! Wide-band +90 degree phase shift
//!
//! Two interchangeable implementations, selected by a quality flag at the
//! call sites (UHJ, super-stereo, frequency shifter):
//!
//! - [`PhaseShifter`]: a Blackman-windowed FIR derived from an FFT'd impulse
//!   with every bin rotated +90 degrees. Higher quality, `len/2` samples of
//!   latency. The shifted output needs one sample less delay than the direct
//!   signal (`len/2 - 1` vs `len/2`) to align.
//! - [`AllPassChain`]: a 4-section IIR all-pass cascade. Near-zero latency;
//!   the 90 degree relationship holds between the two coefficient sets, with
//!   the base set delayed one sample relative to the offset set.

/// FIR phase shifter. Every other tap of the underlying filter is zero, so
/// only `len/2` coefficients are stored (reversed) and application
/// double-steps over the input.
#[derive(Debug, Clone)]
pub struct PhaseShifter {
    coeffs: Vec<f32>,
    len: usize,
}

impl PhaseShifter {
    /// Build a shifter with a `len`-tap response. `len` must be a
    /// power of two, at least 16.
    pub fn new(len: usize) -> Self {
        debug_assert!(len >= 16 && len.is_power_of_two());
        let half = len / 2;
        let mut coeffs = vec![0.0f32; half];
        for (i, c) in coeffs.iter_mut().enumerate() {
            let k = (i * 2 + 1) as f64 - half as f64;

            // Blackman-Harris window term for this (odd) tap.
            let w = 2.0 * std::f64::consts::PI / len as f64 * (i * 2 + 1) as f64;
            let window = 0.3635819 - 0.4891775 * w.cos() + 0.1365995 * (2.0 * w).cos()
                - 0.0106411 * (3.0 * w).cos();

            let pk = std::f64::consts::PI * k;
            *c = (window * (1.0 - pk.cos()) / pk) as f32;
        }
        Self { coeffs, len }
    }

    /// Filter length in taps.
    #[inline]
    pub fn filter_len(&self) -> usize {
        self.len
    }

    /// Samples of input padding `process` needs ahead of the output range.
    #[inline]
    pub fn input_padding(&self) -> usize {
        self.len - 2
    }

    /// Apply the shift. `src` must hold at least
    /// `dst.len() + input_padding()` samples; `dst[i]` is computed from
    /// `src[i..i + input_padding() + 1]`.
    pub fn process(&self, dst: &mut [f32], src: &[f32]) {
        debug_assert!(src.len() >= dst.len() + self.input_padding());
        for (i, out) in dst.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (j, &c) in self.coeffs.iter().enumerate() {
                acc += src[i + j * 2] * c;
            }
            *out = acc;
        }
    }
}

/// Coefficients for the base all-pass chain, a frequency-dependent phase
/// shift of N degrees. Output requires a 1-sample delay to align with the
/// offset chain.
pub const ALLPASS_BASE_COEFFS: [f32; 4] = [
    0.479400865589,
    0.876218493539,
    0.976597589508,
    0.997499255936,
];

/// Coefficients for the offset all-pass chain, shifting N+90 degrees.
pub const ALLPASS_OFFSET_COEFFS: [f32; 4] = [
    0.161758498368,
    0.733028932341,
    0.945349700329,
    0.990599156684,
];

/// Four cascaded second-order all-pass sections sharing one coefficient
/// per section.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPassChain {
    state: [[f32; 2]; 4],
}

impl AllPassChain {
    /// Reset the delay memory.
    pub fn clear(&mut self) {
        self.state = [[0.0; 2]; 4];
    }

    /// Process one sample through the chain.
    #[inline]
    pub fn process_sample(&mut self, coeffs: &[f32; 4], mut x: f32) -> f32 {
        for (section, &c) in self.state.iter_mut().zip(coeffs.iter()) {
            let y = x * c + section[0];
            section[0] = section[1];
            section[1] = y * c - x;
            x = y;
        }
        x
    }

    /// Process a buffer. When `update_state` is false the chain state is
    /// restored afterwards, for lookahead passes that must not disturb
    /// streaming history.
    pub fn process(&mut self, coeffs: &[f32; 4], src: &[f32], update_state: bool, dst: &mut [f32]) {
        let saved = self.state;
        for (out, &inp) in dst.iter_mut().zip(src.iter()) {
            *out = self.process_sample(coeffs, inp);
        }
        if !update_state {
            self.state = saved;
        }
    }
}
