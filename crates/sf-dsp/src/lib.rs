//! sf-dsp: DSP primitives for the SoundField mixer
//!
//! Small, replaceable kernels used throughout the render pipeline:
//! - Biquad filters (Transposed Direct Form II)
//! - Phase-matched band splitter with all-pass companion mode
//! - Wide-band +90° phase shifter (FFT-segmented and IIR variants)
//! - UHJ encode/decode and super-stereo
//! - Resampler kernels (point, linear, cubic, windowed sinc)
//! - Look-ahead peak limiter
//! - Near-field control filters, distance compensation, front stabilizer
//! - Real-FFT helpers with segmented overlap-add convolution

mod biquad;
mod distcomp;
mod fft;
mod limiter;
mod nfc;
mod phase_shifter;
mod resample;
mod splitter;
mod stabilizer;
mod uhj;

pub use biquad::*;
pub use distcomp::*;
pub use fft::*;
pub use limiter::*;
pub use nfc::*;
pub use phase_shifter::*;
pub use resample::*;
pub use splitter::*;
pub use stabilizer::*;
pub use uhj::*;
