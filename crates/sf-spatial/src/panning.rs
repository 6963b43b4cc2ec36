//! Device panning
//!
//! Maps source directions onto the device's ambisonic bus. The bus is
//! always ACN-ordered and SN3D-normalised internally; speaker layouts mix
//! horizontal-only (2D) channel subsets, ambisonic and HRTF outputs mix the
//! full 3D set.

use crate::ambi::{
    acn_2d_indices, ambi_store_scale, calc_ambi_coeffs, upsampler_for_order, AmbiOrder, ACN_ORDER,
};
use sf_core::{AmbiScaling, Channel, ChannelLayout, MAX_AMBI_CHANNELS};

/// Canonical azimuth/elevation (degrees) for a speaker identity. Azimuth is
/// positive to the right, 0 at front.
pub fn speaker_direction(ch: Channel) -> Option<(f32, f32)> {
    match ch {
        Channel::FrontLeft => Some((-30.0, 0.0)),
        Channel::FrontRight => Some((30.0, 0.0)),
        Channel::FrontCenter => Some((0.0, 0.0)),
        Channel::BackLeft => Some((-110.0, 0.0)),
        Channel::BackRight => Some((110.0, 0.0)),
        Channel::BackCenter => Some((180.0, 0.0)),
        Channel::SideLeft => Some((-90.0, 0.0)),
        Channel::SideRight => Some((90.0, 0.0)),
        Channel::Lfe => None,
        Channel::Ambi(_) => None,
    }
}

/// Canonical virtual-source direction for one channel of a multichannel
/// buffer. Quad rears sit at +-135 degrees; 7.1 rears at +-150 so they
/// stay distinct from the side pair.
pub fn virtual_source_direction(layout: ChannelLayout, ch: Channel) -> Option<(f32, f32)> {
    match (layout, ch) {
        (ChannelLayout::Quad, Channel::BackLeft) => Some((-135.0, 0.0)),
        (ChannelLayout::Quad, Channel::BackRight) => Some((135.0, 0.0)),
        (ChannelLayout::Quad, Channel::FrontLeft) => Some((-45.0, 0.0)),
        (ChannelLayout::Quad, Channel::FrontRight) => Some((45.0, 0.0)),
        (ChannelLayout::X71, Channel::BackLeft) => Some((-150.0, 0.0)),
        (ChannelLayout::X71, Channel::BackRight) => Some((150.0, 0.0)),
        _ => speaker_direction(ch),
    }
}

/// Unit direction vector in ambisonic (y, z, x) axes from azimuth and
/// elevation in degrees. Positive azimuth is to the listener's right, which
/// is negative ambisonic Y.
pub fn direction_from_angles(azimuth_deg: f32, elevation_deg: f32) -> (f32, f32, f32) {
    let az = azimuth_deg.to_radians();
    let el = elevation_deg.to_radians();
    let y = -az.sin() * el.cos();
    let z = el.sin();
    let x = az.cos() * el.cos();
    (y, z, x)
}

/// Convert a listener-space OpenAL direction (+x right, +y up, -z forward)
/// into the encoder's (y, z, x) axes.
#[inline]
pub fn ambi_axes_from_world(dir: (f32, f32, f32)) -> (f32, f32, f32) {
    (-dir.0, dir.1, -dir.2)
}

/// Per-device panner: knows the bus shape and produces per-line gain sets.
#[derive(Debug, Clone)]
pub struct Panner {
    order: AmbiOrder,
    /// ACN index of each active bus line.
    active: Vec<usize>,
    acn_to_line: [Option<usize>; MAX_AMBI_CHANNELS],
}

impl Panner {
    /// Create a panner. Horizontal speaker layouts pass `mix_3d = false`
    /// to restrict the bus to the sectoral (2D) harmonics.
    pub fn new(order: AmbiOrder, mix_3d: bool) -> Self {
        let active: Vec<usize> = if mix_3d {
            (0..order.channels_3d()).collect()
        } else {
            acn_2d_indices(order).to_vec()
        };
        let mut acn_to_line = [None; MAX_AMBI_CHANNELS];
        for (line, &acn) in active.iter().enumerate() {
            acn_to_line[acn] = Some(line);
        }
        Self {
            order,
            active,
            acn_to_line,
        }
    }

    /// Number of bus lines the device must allocate.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.active.len()
    }

    /// The ambisonic order of the bus.
    #[inline]
    pub fn order(&self) -> AmbiOrder {
        self.order
    }

    /// ACN indices of the active lines, in line order.
    #[inline]
    pub fn active_channels(&self) -> &[usize] {
        &self.active
    }

    /// Bus line index for an ACN channel, if active.
    #[inline]
    pub fn line_for_acn(&self, acn: usize) -> Option<usize> {
        self.acn_to_line[acn]
    }

    /// Per-line gains for a point source in the given ambisonic-axis
    /// direction, scaled by `gain`. `spread` (radians of source extent)
    /// fades the directional components toward an omnidirectional spot.
    pub fn point_gains(
        &self,
        dir: (f32, f32, f32),
        spread: f32,
        gain: f32,
        out: &mut [f32; MAX_AMBI_CHANNELS],
    ) {
        let dirfact = 1.0 - spread / std::f32::consts::TAU;
        let coeffs = calc_ambi_coeffs(dir.0, dir.1, dir.2);
        out.fill(0.0);
        for (line, &acn) in self.active.iter().enumerate() {
            let scale = ambi_store_scale(acn, AmbiScaling::Sn3d);
            let directional = if acn == 0 { 1.0 } else { dirfact };
            out[line] = coeffs[acn] * scale * directional * gain;
        }
    }

    /// Per-line gains for one input channel of an ambisonic (B-Format)
    /// buffer of `in_order`, converting the input's layout/scaling to the
    /// bus convention and upsampling lower orders.
    pub fn bformat_gains(
        &self,
        in_order: AmbiOrder,
        in_scaling: AmbiScaling,
        in_acn: usize,
        gain: f32,
        out: &mut [f32; MAX_AMBI_CHANNELS],
    ) {
        out.fill(0.0);
        if in_acn >= in_order.channels_3d() {
            return;
        }
        // Input channel to N3D, then through the upsampler, then to the
        // bus's SN3D store scale.
        let to_n3d = match in_scaling {
            AmbiScaling::N3d => 1.0,
            AmbiScaling::Sn3d => 1.0 / ambi_store_scale(in_acn, AmbiScaling::Sn3d),
            AmbiScaling::Fuma => 1.0 / ambi_store_scale(in_acn, AmbiScaling::Fuma),
        };
        let up = upsampler_for_order(in_order);
        for (line, &acn) in self.active.iter().enumerate() {
            let store = ambi_store_scale(acn, AmbiScaling::Sn3d);
            out[line] = up[in_acn][acn] * to_n3d * store * gain;
        }
    }

    /// Spherical-harmonic order of each active line, for per-order
    /// processing (NFC).
    pub fn line_orders(&self) -> Vec<usize> {
        self.active.iter().map(|&acn| ACN_ORDER[acn]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2d_panner_shape() {
        let p = Panner::new(AmbiOrder::First, false);
        assert_eq!(p.line_count(), 3);
        assert_eq!(p.active_channels(), &[0, 1, 3]);
        assert_eq!(p.line_for_acn(2), None);
        assert_eq!(p.line_for_acn(3), Some(2));
    }

    #[test]
    fn test_3d_panner_shape() {
        let p = Panner::new(AmbiOrder::Third, true);
        assert_eq!(p.line_count(), 16);
    }

    #[test]
    fn test_point_gains_front() {
        let p = Panner::new(AmbiOrder::First, false);
        let dir = direction_from_angles(0.0, 0.0);
        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        p.point_gains(dir, 0.0, 1.0, &mut gains);
        // W = 1, Y = 0, X = 1 in SN3D.
        assert!((gains[0] - 1.0).abs() < 1e-6);
        assert!(gains[1].abs() < 1e-6);
        assert!((gains[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_gains_right_is_negative_y() {
        let p = Panner::new(AmbiOrder::First, false);
        let dir = direction_from_angles(90.0, 0.0);
        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        p.point_gains(dir, 0.0, 1.0, &mut gains);
        assert!((gains[1] + 1.0).abs() < 1e-6, "Y {}", gains[1]);
    }

    #[test]
    fn test_full_spread_leaves_omni_only() {
        let p = Panner::new(AmbiOrder::First, false);
        let dir = direction_from_angles(90.0, 0.0);
        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        p.point_gains(dir, std::f32::consts::TAU, 1.0, &mut gains);
        assert!((gains[0] - 1.0).abs() < 1e-6);
        assert!(gains[1].abs() < 1e-6);
        assert!(gains[2].abs() < 1e-6);
    }

    #[test]
    fn test_bformat_identity_first_order() {
        // A first-order SN3D ACN input on a first-order bus passes through
        // at (nearly) unit gain.
        let p = Panner::new(AmbiOrder::First, true);
        let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
        p.bformat_gains(AmbiOrder::First, AmbiScaling::Sn3d, 0, 1.0, &mut gains);
        assert!((gains[0] - 1.0).abs() < 1e-3);
        p.bformat_gains(AmbiOrder::First, AmbiScaling::Sn3d, 1, 1.0, &mut gains);
        assert!((gains[1] - 1.0).abs() < 0.05);
        assert!(gains[0].abs() < 1e-3);
    }

    #[test]
    fn test_virtual_positions() {
        assert_eq!(
            virtual_source_direction(ChannelLayout::X51Rear, Channel::BackLeft),
            Some((-110.0, 0.0))
        );
        assert_eq!(
            virtual_source_direction(ChannelLayout::X71, Channel::BackLeft),
            Some((-150.0, 0.0))
        );
        assert_eq!(
            virtual_source_direction(ChannelLayout::X61, Channel::SideLeft),
            Some((-90.0, 0.0))
        );
        assert_eq!(
            virtual_source_direction(ChannelLayout::X51, Channel::Lfe),
            None
        );
    }
}
