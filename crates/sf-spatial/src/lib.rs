//! sf-spatial: spatial rendering for the SoundField mixer
//!
//! - Ambisonic definitions: ACN ordering, SN3D/N3D scaling, spherical
//!   harmonic coefficients, order-upsampler matrices
//! - Device panning: point-source encode, multichannel virtual sources,
//!   per-layout decoder matrices
//! - HRTF: dataset store and loader, direction lookup with bilinear
//!   blending, and the dual-band direct binaural renderer

mod ambi;
mod decoder;
mod error;
mod hrtf;
mod hrtf_render;
mod panning;

pub use ambi::*;
pub use decoder::*;
pub use error::*;
pub use hrtf::*;
pub use hrtf_render::*;
pub use panning::*;
