//! Ambisonic definitions
//!
//! ACN channel ordering with SN3D or N3D normalisation. Directions follow
//! the OpenAL convention: the encoder takes `(y, z, x)` with +X right,
//! +Y up, -Z forward, so a unit front vector is `(0, 0, -z) -> x = -z`.
//! Coefficients are computed in N3D and scaled on store when the target is
//! SN3D.

use std::sync::LazyLock;

use crate::error::{SpatialError, SpatialResult};
use sf_core::{AmbiScaling, MAX_AMBI_CHANNELS, MAX_AMBI_ORDER};

/// Ambisonic order (spatial resolution of the bus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AmbiOrder {
    /// First order, 4 channels.
    First = 1,
    /// Second order, 9 channels.
    Second = 2,
    /// Third order, 16 channels.
    Third = 3,
}

impl AmbiOrder {
    /// Channel count for full 3D mixing.
    #[inline]
    pub const fn channels_3d(self) -> usize {
        let n = self as usize;
        (n + 1) * (n + 1)
    }

    /// Channel count for horizontal-only (2D) mixing.
    #[inline]
    pub const fn channels_2d(self) -> usize {
        self as usize * 2 + 1
    }

    /// Numeric order.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self as usize
    }

    /// Create from a numeric order.
    pub fn from_order(order: usize) -> SpatialResult<Self> {
        match order {
            1 => Ok(AmbiOrder::First),
            2 => Ok(AmbiOrder::Second),
            3 => Ok(AmbiOrder::Third),
            _ => Err(SpatialError::InvalidOrder(order)),
        }
    }
}

/// ACN index from (order, degree).
#[inline]
pub const fn acn_index(l: i32, m: i32) -> usize {
    (l * l + l + m) as usize
}

/// Spherical-harmonic order of each ACN channel.
pub const ACN_ORDER: [usize; MAX_AMBI_CHANNELS] =
    [0, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3];

/// The ACN channels used for horizontal-only (2D) mixing, by order. 2D
/// mixing keeps only the sectoral harmonics (|m| == l).
pub const ACN_2D: [usize; 7] = [0, 1, 3, 4, 8, 9, 15];

/// The 2D channel subset for a given order.
#[inline]
pub fn acn_2d_indices(order: AmbiOrder) -> &'static [usize] {
    &ACN_2D[..order.channels_2d()]
}

/// Per-order N3D -> SN3D conversion factors (1/sqrt(2l + 1)).
pub const N3D_TO_SN3D: [f32; MAX_AMBI_ORDER + 1] = [
    1.0,
    0.577350269, // 1/sqrt(3)
    0.447213595, // 1/sqrt(5)
    0.377964473, // 1/sqrt(7)
];

/// Per-order SN3D -> N3D conversion factors (sqrt(2l + 1)).
pub const SN3D_TO_N3D: [f32; MAX_AMBI_ORDER + 1] = [
    1.0,
    1.732050808,
    2.236067977,
    2.645751311,
];

/// Per-ACN conversion factor between the two normalisations for the given
/// target scaling, applied to N3D-computed coefficients.
#[inline]
pub fn ambi_store_scale(acn: usize, scaling: AmbiScaling) -> f32 {
    match scaling {
        AmbiScaling::N3d => 1.0,
        AmbiScaling::Sn3d => N3D_TO_SN3D[ACN_ORDER[acn]],
        // FuMa applies only to first order: W gets 1/sqrt(2), X/Y/Z the
        // SN3D factor.
        AmbiScaling::Fuma => {
            if acn == 0 {
                std::f32::consts::FRAC_1_SQRT_2
            } else {
                N3D_TO_SN3D[ACN_ORDER[acn]]
            }
        }
    }
}

/// Real spherical harmonics up to third order for a unit direction, in ACN
/// order with N3D normalisation. The direction is `(y, z, x)` per the
/// OpenAL axis convention.
pub fn calc_ambi_coeffs(y: f32, z: f32, x: f32) -> [f32; MAX_AMBI_CHANNELS] {
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, yz, xz) = (x * y, y * z, x * z);

    [
        // Zeroth order
        1.0, // ACN 0 = 1
        // First order
        sf_core::SQRT3 * y, // ACN 1 = sqrt(3) * Y
        sf_core::SQRT3 * z, // ACN 2 = sqrt(3) * Z
        sf_core::SQRT3 * x, // ACN 3 = sqrt(3) * X
        // Second order
        3.872983346 * xy,               // ACN 4 = sqrt(15) * X * Y
        3.872983346 * yz,               // ACN 5 = sqrt(15) * Y * Z
        1.118033989 * (3.0 * zz - 1.0), // ACN 6 = sqrt(5)/2 * (3*Z*Z - 1)
        3.872983346 * xz,               // ACN 7 = sqrt(15) * X * Z
        1.936491673 * (xx - yy),        // ACN 8 = sqrt(15)/2 * (X*X - Y*Y)
        // Third order
        2.091650066 * (y * (3.0 * xx - yy)),   // ACN  9 = sqrt(35/8) * Y * (3*X*X - Y*Y)
        10.24695076 * (z * xy),                // ACN 10 = sqrt(105) * Z * X * Y
        1.620185175 * (y * (5.0 * zz - 1.0)),  // ACN 11 = sqrt(21/8) * Y * (5*Z*Z - 1)
        1.322875656 * (z * (5.0 * zz - 3.0)),  // ACN 12 = sqrt(7)/2 * Z * (5*Z*Z - 3)
        1.620185175 * (x * (5.0 * zz - 1.0)),  // ACN 13 = sqrt(21/8) * X * (5*Z*Z - 1)
        5.123475383 * (z * (xx - yy)),         // ACN 14 = sqrt(105)/2 * Z * (X*X - Y*Y)
        2.091650066 * (x * (xx - 3.0 * yy)),   // ACN 15 = sqrt(35/8) * X * (X*X - 3*Y*Y)
    ]
}

/// Matrix row type: one input ambisonic channel's contribution to every
/// output channel.
pub type AmbiUpRow = [f32; MAX_AMBI_CHANNELS];

const CUBE: f32 = 0.57735026919;

/// First-order reference decoder: a cube of eight speakers.
const FIRST_ORDER_DECODER: [[f32; 4]; 8] = [
    [0.125, 0.125, 0.125, 0.125],
    [0.125, 0.125, 0.125, -0.125],
    [0.125, -0.125, 0.125, 0.125],
    [0.125, -0.125, 0.125, -0.125],
    [0.125, 0.125, -0.125, 0.125],
    [0.125, 0.125, -0.125, -0.125],
    [0.125, -0.125, -0.125, 0.125],
    [0.125, -0.125, -0.125, -0.125],
];

/// Cube speaker directions paired with the first-order decoder rows.
const FIRST_ORDER_DIRECTIONS: [[f32; 3]; 8] = [
    [CUBE, CUBE, CUBE],
    [CUBE, CUBE, -CUBE],
    [-CUBE, CUBE, CUBE],
    [-CUBE, CUBE, -CUBE],
    [CUBE, -CUBE, CUBE],
    [CUBE, -CUBE, -CUBE],
    [-CUBE, -CUBE, CUBE],
    [-CUBE, -CUBE, -CUBE],
];

/// Second-order reference decoder: a 14-speaker array (6 face + 8 corner).
const SECOND_ORDER_DECODER: [[f32; 9]; 14] = [
    [0.07142857143, 0.0, 0.0, 0.1237179148, 0.0, 0.0, -0.07453559925, 0.0, 0.1290994449],
    [0.07142857143, 0.0, 0.0, -0.1237179148, 0.0, 0.0, -0.07453559925, 0.0, 0.1290994449],
    [0.07142857143, 0.1237179148, 0.0, 0.0, 0.0, 0.0, -0.07453559925, 0.0, -0.1290994449],
    [0.07142857143, -0.1237179148, 0.0, 0.0, 0.0, 0.0, -0.07453559925, 0.0, -0.1290994449],
    [0.07142857143, 0.0, 0.1237179148, 0.0, 0.0, 0.0, 0.1490711985, 0.0, 0.0],
    [0.07142857143, 0.0, -0.1237179148, 0.0, 0.0, 0.0, 0.1490711985, 0.0, 0.0],
    [0.07142857143, 0.07142857143, 0.07142857143, 0.07142857143, 0.09682458366, 0.09682458366, 0.0, 0.09682458366, 0.0],
    [0.07142857143, 0.07142857143, 0.07142857143, -0.07142857143, -0.09682458366, 0.09682458366, 0.0, -0.09682458366, 0.0],
    [0.07142857143, -0.07142857143, 0.07142857143, 0.07142857143, -0.09682458366, -0.09682458366, 0.0, 0.09682458366, 0.0],
    [0.07142857143, -0.07142857143, 0.07142857143, -0.07142857143, 0.09682458366, -0.09682458366, 0.0, -0.09682458366, 0.0],
    [0.07142857143, 0.07142857143, -0.07142857143, 0.07142857143, 0.09682458366, -0.09682458366, 0.0, -0.09682458366, 0.0],
    [0.07142857143, 0.07142857143, -0.07142857143, -0.07142857143, -0.09682458366, -0.09682458366, 0.0, 0.09682458366, 0.0],
    [0.07142857143, -0.07142857143, -0.07142857143, 0.07142857143, -0.09682458366, 0.09682458366, 0.0, -0.09682458366, 0.0],
    [0.07142857143, -0.07142857143, -0.07142857143, -0.07142857143, 0.09682458366, 0.09682458366, 0.0, 0.09682458366, 0.0],
];

/// Speaker directions paired with the second-order decoder rows.
const SECOND_ORDER_DIRECTIONS: [[f32; 3]; 14] = [
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [CUBE, CUBE, CUBE],
    [CUBE, CUBE, -CUBE],
    [-CUBE, CUBE, CUBE],
    [-CUBE, CUBE, -CUBE],
    [CUBE, -CUBE, CUBE],
    [CUBE, -CUBE, -CUBE],
    [-CUBE, -CUBE, CUBE],
    [-CUBE, -CUBE, -CUBE],
];

/// Build an upsampler matrix as decoder x encoder: decode the lower-order
/// signal to the reference speaker array, then re-encode each feed at the
/// full order. Not perfect, but accurately lifts a lower-order signal into
/// a higher-order bus.
fn calc_upsampler<const IN: usize, const SPK: usize>(
    decoder: &[[f32; IN]; SPK],
    directions: &[[f32; 3]; SPK],
) -> Vec<AmbiUpRow> {
    let encoder: Vec<[f32; MAX_AMBI_CHANNELS]> = directions
        .iter()
        .map(|d| calc_ambi_coeffs(d[0], d[1], d[2]))
        .collect();

    let mut res = vec![[0.0f32; MAX_AMBI_CHANNELS]; IN];
    for (i, row) in res.iter_mut().enumerate() {
        for (j, out) in row.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for k in 0..SPK {
                sum += decoder[k][i] as f64 * encoder[k][j] as f64;
            }
            *out = sum as f32;
        }
    }
    res
}

/// First-order (4 input channels) to full-order upsampler.
pub static FIRST_ORDER_UP: LazyLock<Vec<AmbiUpRow>> =
    LazyLock::new(|| calc_upsampler(&FIRST_ORDER_DECODER, &FIRST_ORDER_DIRECTIONS));

/// Second-order (9 input channels) to full-order upsampler.
pub static SECOND_ORDER_UP: LazyLock<Vec<AmbiUpRow>> =
    LazyLock::new(|| calc_upsampler(&SECOND_ORDER_DECODER, &SECOND_ORDER_DIRECTIONS));

/// Third-order passthrough (identity until a third-order reference decoder
/// exists).
pub static THIRD_ORDER_UP: LazyLock<Vec<AmbiUpRow>> = LazyLock::new(|| {
    let mut res = vec![[0.0f32; MAX_AMBI_CHANNELS]; MAX_AMBI_CHANNELS];
    for (i, row) in res.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    res
});

/// The upsampler for a given input order.
pub fn upsampler_for_order(order: AmbiOrder) -> &'static [AmbiUpRow] {
    match order {
        AmbiOrder::First => &FIRST_ORDER_UP,
        AmbiOrder::Second => &SECOND_ORDER_UP,
        AmbiOrder::Third => &THIRD_ORDER_UP,
    }
}

/// Per-order high-frequency correction for a first-order upsampled decode.
pub const DECODER_HF_SCALE_1O: [f32; MAX_AMBI_ORDER + 1] = [2.0, 1.154700538, 1.0, 1.0];
/// Per-order high-frequency correction for a second-order upsampled decode.
pub const DECODER_HF_SCALE_2O: [f32; MAX_AMBI_ORDER + 1] =
    [1.972026594, 1.527525232, 0.7888106377, 1.0];
/// Per-order high-frequency correction for third-order decodes.
pub const DECODER_HF_SCALE_3O: [f32; MAX_AMBI_ORDER + 1] = [1.0, 1.0, 1.0, 1.0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acn_index() {
        assert_eq!(acn_index(0, 0), 0); // W
        assert_eq!(acn_index(1, -1), 1); // Y
        assert_eq!(acn_index(1, 0), 2); // Z
        assert_eq!(acn_index(1, 1), 3); // X
        assert_eq!(acn_index(3, 3), 15);
    }

    #[test]
    fn test_coeffs_front() {
        // Front is -Z in OpenAL space, passed as (y, z, x) = (0, 0, 1)
        // after the listener transform maps -Z onto the encoder's +X.
        let c = calc_ambi_coeffs(0.0, 0.0, 1.0);
        assert_eq!(c[0], 1.0);
        assert_eq!(c[1], 0.0);
        assert_eq!(c[2], 0.0);
        assert!((c[3] - sf_core::SQRT3).abs() < 1e-6);
    }

    #[test]
    fn test_coeffs_left() {
        let c = calc_ambi_coeffs(1.0, 0.0, 0.0);
        assert!((c[1] - sf_core::SQRT3).abs() < 1e-6);
        assert_eq!(c[3], 0.0);
    }

    #[test]
    fn test_first_order_up_shape() {
        let up = &*FIRST_ORDER_UP;
        assert_eq!(up.len(), 4);
        // W into W is 1 for an energy-preserving upsampler.
        assert!((up[0][0] - 1.0).abs() < 1e-3, "{}", up[0][0]);
        // The upsampled first-order channels keep their identity scale.
        for i in 1..4 {
            assert!((up[i][i] - 1.0).abs() < 0.05, "ch {i}: {}", up[i][i]);
        }
    }

    #[test]
    fn test_upsampler_energy_preserving() {
        // A first-order field lifted to third order must keep its energy in
        // the first-order channels within 0.01 dB (the cube re-encode
        // leaves higher-order residue well below that).
        let up = &*FIRST_ORDER_UP;
        for input in 0..4usize {
            let row = &up[input];
            let first_order_energy: f32 = row[..4].iter().map(|c| c * c).sum();
            let db = 10.0 * first_order_energy.log10();
            assert!(db.abs() < 0.01, "ch {input}: {db} dB");
        }
    }

    #[test]
    fn test_2d_indices() {
        assert_eq!(acn_2d_indices(AmbiOrder::First), &[0, 1, 3]);
        assert_eq!(acn_2d_indices(AmbiOrder::Second), &[0, 1, 3, 4, 8]);
    }

    #[test]
    fn test_store_scale_sn3d() {
        assert_eq!(ambi_store_scale(0, sf_core::AmbiScaling::Sn3d), 1.0);
        // First-order channels scale by 1/sqrt(3): sqrt(3)*y in N3D becomes
        // y in SN3D.
        let c = calc_ambi_coeffs(1.0, 0.0, 0.0);
        let sn3d = c[1] * ambi_store_scale(1, sf_core::AmbiScaling::Sn3d);
        assert!((sn3d - 1.0).abs() < 1e-5);
    }
}
