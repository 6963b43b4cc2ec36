//! UHJ encoding and decoding
//!
//! UHJ carries 2-4 channels of ambisonic information in a stereo-compatible
//! pair. The encoder produces 2-channel UHJ from first-order B-Format; the
//! decoder recovers B-Format from 3- or 4-channel UHJ; the stereo decoder
//! renders plain stereo as a widened sound field ("super stereo").
//!
//! Every stage exists in two quality variants selected at construction:
//! a windowed-FIR phase shifter (higher quality, half-filter latency) and a
//! 4-section IIR all-pass pair (single-sample latency).

use crate::phase_shifter::{
    AllPassChain, PhaseShifter, ALLPASS_BASE_COEFFS, ALLPASS_OFFSET_COEFFS,
};

/// Phase-shifter quality for UHJ and super-stereo processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UhjQuality {
    /// IIR all-pass cascade, one sample of latency.
    Iir,
    /// 256-tap FIR shifter.
    #[default]
    Fir256,
    /// 512-tap FIR shifter.
    Fir512,
}

impl UhjQuality {
    fn filter_len(self) -> usize {
        match self {
            UhjQuality::Iir => 0,
            UhjQuality::Fir256 => 256,
            UhjQuality::Fir512 => 512,
        }
    }

    /// Input padding (read-ahead samples) the decoders need per call.
    pub fn input_padding(self) -> usize {
        match self {
            UhjQuality::Iir => 1,
            other => other.filter_len() / 2 - 1,
        }
    }
}

/// Simple fixed-length delay used to align direct paths with the FIR
/// shifter's latency.
#[derive(Debug, Clone, Default)]
struct DelayLine {
    hist: Vec<f32>,
}

impl DelayLine {
    fn new(delay: usize) -> Self {
        Self {
            hist: vec![0.0; delay],
        }
    }

    /// Write `src` delayed by the line length into `dst`.
    fn process(&mut self, src: &[f32], dst: &mut [f32]) {
        let delay = self.hist.len();
        if delay == 0 {
            dst.copy_from_slice(src);
            return;
        }
        let frames = src.len();
        if frames >= delay {
            dst[..delay].copy_from_slice(&self.hist);
            dst[delay..].copy_from_slice(&src[..frames - delay]);
            self.hist.copy_from_slice(&src[frames - delay..]);
        } else {
            dst.copy_from_slice(&self.hist[..frames]);
            self.hist.rotate_left(frames);
            self.hist[delay - frames..].copy_from_slice(src);
        }
    }
}

/// Streaming +90 degree branch: history + FIR shift.
///
/// The FIR's inherent delay is `len/2 - 1` samples from its window start;
/// the history length sets the branch latency: `history_len - len/2 + 1`
/// samples relative to `src`. Encoders use `len - 1` (latency `len/2`,
/// matching their direct-path delay); decoders use `len/2 - 1` (zero
/// latency, with the read-ahead padding supplying the window tail).
#[derive(Debug, Clone)]
struct ShiftBranch {
    hist: Vec<f32>,
    tmp: Vec<f32>,
}

impl ShiftBranch {
    fn new(ps: &PhaseShifter, max_frames: usize, history_len: usize) -> Self {
        Self {
            hist: vec![0.0; history_len],
            tmp: vec![0.0; history_len + max_frames + ps.filter_len()],
        }
    }

    /// Shift `src` into `dst[..out_frames]`, carrying history so
    /// consecutive calls form a continuous stream. `src` may extend past
    /// `out_frames` with read-ahead; the overlap is re-supplied next call.
    fn process(&mut self, ps: &PhaseShifter, src: &[f32], dst: &mut [f32], out_frames: usize) {
        let pad = self.hist.len();
        let total = pad + src.len();
        self.tmp[..pad].copy_from_slice(&self.hist);
        self.tmp[pad..total].copy_from_slice(src);
        ps.process(&mut dst[..out_frames], &self.tmp[..total]);

        if out_frames >= pad {
            self.hist.copy_from_slice(&src[out_frames - pad..out_frames]);
        } else {
            self.hist.rotate_left(out_frames);
            let keep = pad - out_frames;
            self.hist[keep..].copy_from_slice(&src[..out_frames]);
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/* Encoding UHJ from B-Format:
 *
 *   S = 0.9396926*W + 0.1855740*X
 *   D = j(-0.3420201*W + 0.5098604*X) + 0.6554516*Y
 *
 *   Left  = (S + D)/2
 *   Right = (S - D)/2
 *   T = j(-0.1432*W + 0.6512*X) - 0.7071068*Y
 *   Q = 0.9772*Z
 *
 * where j is a wide-band +90 degree phase shift. 3-channel UHJ excludes Q,
 * 2-channel additionally excludes T.
 */

/// UHJ encoder from first-order B-Format: always produces the stereo pair,
/// optionally the third (T) and fourth (Q) channels.
pub struct UhjEncoder {
    kind: EncoderKind,
    scratch_s: Vec<f32>,
    scratch_d: Vec<f32>,
    scratch_v: Vec<f32>,
}

enum EncoderKind {
    Fir {
        ps: PhaseShifter,
        w_delay: DelayLine,
        x_delay: DelayLine,
        y_delay: DelayLine,
        z_delay: DelayLine,
        shift: ShiftBranch,
        t_shift: ShiftBranch,
        wd: Vec<f32>,
        xd: Vec<f32>,
        yd: Vec<f32>,
    },
    Iir {
        s_chain: AllPassChain,
        d_chain: AllPassChain,
        y_chain: AllPassChain,
        t_chain: AllPassChain,
        ty_chain: AllPassChain,
        s_z: f32,
        y_z: f32,
        ty_z: f32,
        z_z: f32,
    },
}

impl UhjEncoder {
    /// Create an encoder for blocks of at most `max_frames` samples.
    pub fn new(quality: UhjQuality, max_frames: usize) -> Self {
        let kind = match quality {
            UhjQuality::Iir => EncoderKind::Iir {
                s_chain: AllPassChain::default(),
                d_chain: AllPassChain::default(),
                y_chain: AllPassChain::default(),
                t_chain: AllPassChain::default(),
                ty_chain: AllPassChain::default(),
                s_z: 0.0,
                y_z: 0.0,
                ty_z: 0.0,
                z_z: 0.0,
            },
            fir => {
                let ps = PhaseShifter::new(fir.filter_len());
                let delay = fir.filter_len() / 2;
                let shift = ShiftBranch::new(&ps, max_frames, fir.filter_len() - 1);
                let t_shift = ShiftBranch::new(&ps, max_frames, fir.filter_len() - 1);
                EncoderKind::Fir {
                    ps,
                    w_delay: DelayLine::new(delay),
                    x_delay: DelayLine::new(delay),
                    y_delay: DelayLine::new(delay),
                    z_delay: DelayLine::new(delay),
                    shift,
                    t_shift,
                    wd: vec![0.0; max_frames],
                    xd: vec![0.0; max_frames],
                    yd: vec![0.0; max_frames],
                }
            }
        };
        Self {
            kind,
            scratch_s: vec![0.0; max_frames],
            scratch_d: vec![0.0; max_frames],
            scratch_v: vec![0.0; max_frames],
        }
    }

    /// Encode `frames` samples of W/X/Y into the left/right pair.
    pub fn encode(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        w: &[f32],
        x: &[f32],
        y: &[f32],
        frames: usize,
    ) {
        self.encode_full(left, right, None, None, w, x, y, None, frames);
    }

    /// Encode to 2, 3, or 4 channels: pass `t_out` for 3-channel UHJ and
    /// both `t_out` and `q_out` (plus `z`) for 4-channel.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_full(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        mut t_out: Option<&mut [f32]>,
        mut q_out: Option<&mut [f32]>,
        w: &[f32],
        x: &[f32],
        y: &[f32],
        z: Option<&[f32]>,
        frames: usize,
    ) {
        let s = &mut self.scratch_s[..frames];
        let d = &mut self.scratch_d[..frames];
        let v = &mut self.scratch_v[..frames];

        match &mut self.kind {
            EncoderKind::Fir {
                ps,
                w_delay,
                x_delay,
                y_delay,
                z_delay,
                shift,
                t_shift,
                wd,
                xd,
                yd,
            } => {
                w_delay.process(&w[..frames], &mut wd[..frames]);
                x_delay.process(&x[..frames], &mut xd[..frames]);
                y_delay.process(&y[..frames], &mut yd[..frames]);

                for i in 0..frames {
                    s[i] = 0.9396926 * wd[i] + 0.1855740 * xd[i];
                    v[i] = -0.3420201 * w[i] + 0.5098604 * x[i];
                }
                shift.process(ps, v, d, frames);
                for i in 0..frames {
                    d[i] += 0.6554516 * yd[i];
                }

                if let Some(t) = t_out.as_deref_mut() {
                    // T = j(-0.1432*W + 0.6512*X) - 0.7071068*Y
                    for i in 0..frames {
                        v[i] = -0.1432 * w[i] + 0.6512 * x[i];
                    }
                    t_shift.process(ps, v, t, frames);
                    for i in 0..frames {
                        t[i] -= 0.7071068 * yd[i];
                    }
                }
                if let (Some(q), Some(z)) = (q_out.as_deref_mut(), z) {
                    // Q = 0.9772*Z, aligned with the direct paths.
                    z_delay.process(&z[..frames], &mut q[..frames]);
                    for sample in q[..frames].iter_mut() {
                        *sample *= 0.9772;
                    }
                }
            }
            EncoderKind::Iir {
                s_chain,
                d_chain,
                y_chain,
                t_chain,
                ty_chain,
                s_z,
                y_z,
                ty_z,
                z_z,
            } => {
                // Base chain plus one sample of delay pairs with the offset
                // chain for the +90 degree relationship.
                for i in 0..frames {
                    v[i] = 0.9396926 * w[i] + 0.1855740 * x[i];
                }
                for i in 0..frames {
                    let filtered = s_chain.process_sample(&ALLPASS_BASE_COEFFS, v[i]);
                    s[i] = *s_z;
                    *s_z = filtered;
                }

                for i in 0..frames {
                    v[i] = -0.3420201 * w[i] + 0.5098604 * x[i];
                }
                d_chain.process(&ALLPASS_OFFSET_COEFFS, v, true, d);

                for i in 0..frames {
                    let filtered = y_chain.process_sample(&ALLPASS_BASE_COEFFS, y[i]);
                    let delayed = *y_z;
                    *y_z = filtered;
                    d[i] += 0.6554516 * delayed;
                }

                if let Some(t) = t_out.as_deref_mut() {
                    for i in 0..frames {
                        v[i] = -0.1432 * w[i] + 0.6512 * x[i];
                    }
                    t_chain.process(&ALLPASS_OFFSET_COEFFS, &v[..frames], true, &mut t[..frames]);
                    for i in 0..frames {
                        let filtered = ty_chain.process_sample(&ALLPASS_BASE_COEFFS, y[i]);
                        let delayed = *ty_z;
                        *ty_z = filtered;
                        t[i] -= 0.7071068 * delayed;
                    }
                }
                if let (Some(q), Some(z)) = (q_out.as_deref_mut(), z) {
                    // Q is unshifted; one sample of delay keeps it aligned
                    // with the base-chain branches.
                    for i in 0..frames {
                        let delayed = if i == 0 { *z_z } else { z[i - 1] };
                        q[i] = 0.9772 * delayed;
                    }
                    *z_z = z[frames - 1];
                }
            }
        }

        for i in 0..frames {
            left[i] = (s[i] + d[i]) * 0.5;
            right[i] = (s[i] - d[i]) * 0.5;
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/* Decoding UHJ:
 *
 *   S = Left + Right
 *   D = Left - Right
 *
 *   W = 0.981532*S + 0.197484*j(0.828331*D + 0.767820*T)
 *   X = 0.418496*S -          j(0.828331*D + 0.767820*T)
 *   Y = 0.795968*D - 0.676392*T + j(0.186633*S)
 *   Z = 1.023332*Q
 *
 * 3-channel UHJ excludes Q; 2-channel additionally excludes T.
 */

/// 3-/4-channel UHJ to B-Format decoder. Zero-latency on the direct terms;
/// each call must supply `frames + quality.input_padding()` input samples
/// per channel (read-ahead; zero-pad at end of stream).
pub struct UhjDecoder {
    kind: DecoderKind,
    s: Vec<f32>,
    d: Vec<f32>,
    t: Vec<f32>,
    jdt: Vec<f32>,
    js: Vec<f32>,
}

enum DecoderKind {
    Fir {
        ps: PhaseShifter,
        dt_shift: ShiftBranch,
        s_shift: ShiftBranch,
    },
    Iir {
        dt_offset: AllPassChain,
        s_offset: AllPassChain,
    },
}

impl UhjDecoder {
    /// Create a decoder for blocks of at most `max_frames` samples.
    pub fn new(quality: UhjQuality, max_frames: usize) -> Self {
        let pad = quality.input_padding();
        let kind = match quality {
            UhjQuality::Iir => DecoderKind::Iir {
                dt_offset: AllPassChain::default(),
                s_offset: AllPassChain::default(),
            },
            fir => {
                let ps = PhaseShifter::new(fir.filter_len());
                let dt_shift = ShiftBranch::new(&ps, max_frames + pad, fir.filter_len() / 2 - 1);
                let s_shift = ShiftBranch::new(&ps, max_frames + pad, fir.filter_len() / 2 - 1);
                DecoderKind::Fir {
                    ps,
                    dt_shift,
                    s_shift,
                }
            }
        };
        let cap = max_frames + pad;
        Self {
            kind,
            s: vec![0.0; cap],
            d: vec![0.0; cap],
            t: vec![0.0; cap],
            jdt: vec![0.0; cap],
            js: vec![0.0; cap],
        }
    }

    /// Decode in place: `samples[0..3]` hold L/R/T (plus Q at index 3 for
    /// 4-channel) on input and W/X/Y (plus Z) on output. Each channel must
    /// hold `frames + input_padding` valid samples.
    pub fn decode(&mut self, samples: &mut [&mut [f32]], frames: usize) {
        let pad = match &self.kind {
            DecoderKind::Iir { .. } => UhjQuality::Iir.input_padding(),
            DecoderKind::Fir { ps, .. } => ps.filter_len() / 2 - 1,
        };
        let total = frames + pad;

        {
            let left = &samples[0];
            let right = &samples[1];
            let t_in = &samples[2];
            for i in 0..total {
                self.s[i] = left[i] + right[i];
                self.d[i] = left[i] - right[i];
                self.t[i] = t_in[i];
            }
        }

        // j(0.828331*D + 0.767820*T) and j(S), aligned with the direct terms
        // through the read-ahead padding.
        let mut v = vec![0.0f32; total];
        for i in 0..total {
            v[i] = 0.828331 * self.d[i] + 0.767820 * self.t[i];
        }
        match &mut self.kind {
            DecoderKind::Fir {
                ps,
                dt_shift,
                s_shift,
            } => {
                dt_shift.process(ps, &v, &mut self.jdt, frames);
                s_shift.process(ps, &self.s[..total], &mut self.js, frames);
            }
            DecoderKind::Iir {
                dt_offset,
                s_offset,
            } => {
                // The offset chain alone approximates j relative to the
                // unfiltered direct path at this padding (1 sample).
                dt_offset.process(&ALLPASS_OFFSET_COEFFS, &v[..frames], true, &mut self.jdt[..frames]);
                s_offset.process(
                    &ALLPASS_OFFSET_COEFFS,
                    &self.s[..frames],
                    true,
                    &mut self.js[..frames],
                );
            }
        }

        let four = samples.len() > 3;
        let w_out = &mut *samples[0];
        for i in 0..frames {
            w_out[i] = 0.981532 * self.s[i] + 0.197484 * self.jdt[i];
        }
        let x_out = &mut *samples[1];
        for i in 0..frames {
            x_out[i] = 0.418496 * self.s[i] - self.jdt[i];
        }
        let y_out = &mut *samples[2];
        for i in 0..frames {
            y_out[i] = 0.795968 * self.d[i] - 0.676392 * self.t[i] + 0.186633 * self.js[i];
        }
        if four {
            let z_out = &mut *samples[3];
            for i in 0..frames {
                z_out[i] *= 1.023332;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Super stereo
// ---------------------------------------------------------------------------

/* Super Stereo processing:
 *
 *   S = Left + Right
 *   D = Left - Right
 *
 *   W = 0.6098637*S - 0.6896511*j*w*D
 *   X = 0.8624776*S + 0.7626955*j*w*D
 *   Y = 1.6822415*w*D - 0.2156194*j*S
 *
 * w is the stereo width control, 0 <= w <= 0.7.
 */

/// Stereo to B-Format "super stereo" decoder with a smoothed width control.
pub struct SuperStereoDecoder {
    kind: DecoderKind,
    width_target: f32,
    /// None until the first decode; the first block snaps instead of
    /// interpolating.
    width_current: Option<f32>,
    s: Vec<f32>,
    d: Vec<f32>,
    jd: Vec<f32>,
    js: Vec<f32>,
}

impl SuperStereoDecoder {
    /// Create a decoder for blocks of at most `max_frames` samples.
    pub fn new(quality: UhjQuality, max_frames: usize) -> Self {
        let pad = quality.input_padding();
        let kind = match quality {
            UhjQuality::Iir => DecoderKind::Iir {
                dt_offset: AllPassChain::default(),
                s_offset: AllPassChain::default(),
            },
            fir => {
                let ps = PhaseShifter::new(fir.filter_len());
                let dt_shift = ShiftBranch::new(&ps, max_frames + pad, fir.filter_len() / 2 - 1);
                let s_shift = ShiftBranch::new(&ps, max_frames + pad, fir.filter_len() / 2 - 1);
                DecoderKind::Fir {
                    ps,
                    dt_shift,
                    s_shift,
                }
            }
        };
        let cap = max_frames + pad;
        Self {
            kind,
            width_target: 0.593,
            width_current: None,
            s: vec![0.0; cap],
            d: vec![0.0; cap],
            jd: vec![0.0; cap],
            js: vec![0.0; cap],
        }
    }

    /// Set the stereo width for subsequent blocks. Clamped to [0, 0.7];
    /// changes are interpolated across the next block.
    pub fn set_width(&mut self, width: f32) {
        self.width_target = width.clamp(0.0, 0.7);
    }

    /// Decode in place: `samples[0..2]` hold L/R (index 2 scratch) on input,
    /// W/X/Y on output. Channels need `frames + input_padding` samples.
    pub fn decode(&mut self, samples: &mut [&mut [f32]], frames: usize) {
        let pad = match &self.kind {
            DecoderKind::Iir { .. } => UhjQuality::Iir.input_padding(),
            DecoderKind::Fir { ps, .. } => ps.filter_len() / 2 - 1,
        };
        let total = frames + pad;

        {
            let left = &samples[0];
            let right = &samples[1];
            for i in 0..total {
                self.s[i] = left[i] + right[i];
            }

            // Pre-apply the width factor to D, interpolating when it moved.
            let target = self.width_target;
            let current = self.width_current.unwrap_or(target);
            if current == target {
                for i in 0..total {
                    self.d[i] = (left[i] - right[i]) * current;
                }
            } else {
                let step = (target - current) / frames as f32;
                for i in 0..frames {
                    self.d[i] = (left[i] - right[i]) * (current + step * i as f32);
                }
                for i in frames..total {
                    self.d[i] = (left[i] - right[i]) * target;
                }
            }
            self.width_current = Some(target);
        }

        match &mut self.kind {
            DecoderKind::Fir {
                ps,
                dt_shift,
                s_shift,
            } => {
                dt_shift.process(ps, &self.d[..total], &mut self.jd, frames);
                s_shift.process(ps, &self.s[..total], &mut self.js, frames);
            }
            DecoderKind::Iir {
                dt_offset, s_offset, ..
            } => {
                dt_offset.process(&ALLPASS_OFFSET_COEFFS, &self.d[..frames], true, &mut self.jd[..frames]);
                s_offset.process(&ALLPASS_OFFSET_COEFFS, &self.s[..frames], true, &mut self.js[..frames]);
            }
        }

        let w_out = &mut *samples[0];
        for i in 0..frames {
            w_out[i] = 0.6098637 * self.s[i] - 0.6896511 * self.jd[i];
        }
        let x_out = &mut *samples[1];
        for i in 0..frames {
            x_out[i] = 0.8624776 * self.s[i] + 0.7626955 * self.jd[i];
        }
        let y_out = &mut *samples[2];
        for i in 0..frames {
            y_out[i] = 1.6822415 * self.d[i] - 0.2156194 * self.js[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_delay_line() {
        let mut dl = DelayLine::new(3);
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let mut dst = [0.0f32; 5];
        dl.process(&src, &mut dst);
        assert_eq!(dst, [0.0, 0.0, 0.0, 1.0, 2.0]);
        dl.process(&src, &mut dst);
        assert_eq!(dst, [3.0, 4.0, 5.0, 1.0, 2.0]);
    }

    #[test]
    fn test_encode_centre_is_mono_compatible() {
        // A front-centre source (W=1/sqrt2 scaled signal, X=signal, Y=0)
        // must land essentially equally in both UHJ channels.
        let mut enc = UhjEncoder::new(UhjQuality::Fir256, 256);
        let sig: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let w: Vec<f32> = sig.iter().map(|s| s * std::f32::consts::FRAC_1_SQRT_2).collect();
        let y = vec![0.0f32; 256];
        let mut left = vec![0.0f32; 256];
        let mut right = vec![0.0f32; 256];

        // Run a few blocks to flush the filter delay.
        for _ in 0..4 {
            enc.encode(&mut left, &mut right, &w, &sig, &y, 256);
        }
        for i in 0..256 {
            assert!((left[i] - right[i]).abs() < 1e-4, "sample {i}");
        }
    }

    #[test]
    fn test_decode_recovers_three_channel_signal() {
        // Encode a rotating first-order field, then decode 3-channel UHJ
        // built from the same S/D/T math and check the recovered W energy is
        // in the right ballpark (2-channel UHJ is lossy; this is the
        // 3-channel path which should be much tighter).
        let frames = 512;
        let pad = UhjQuality::Fir256.input_padding();
        let mut dec = UhjDecoder::new(UhjQuality::Fir256, frames);

        // Synthesize a W-only (omnidirectional) field: S = 0.981532-ish
        // inverse is exercised via energy, not exact inversion.
        let total = frames + pad;
        let sig: Vec<f32> = (0..total).map(|i| (i as f32 * 0.07).sin()).collect();
        let mut l: Vec<f32> = sig.iter().map(|s| s * 0.5).collect();
        let mut r: Vec<f32> = sig.iter().map(|s| s * 0.5).collect();
        let mut t = vec![0.0f32; total];
        let mut chans: Vec<&mut [f32]> = vec![&mut l, &mut r, &mut t];
        dec.decode(&mut chans, frames);

        // S = L+R = sig, D = 0: W = 0.981532*S + j-term(0.828*0+...) = 0.981532*sig.
        let w_rms = rms(&chans[0][..frames]);
        let expect = rms(&sig[..frames]) * 0.981532;
        assert!((w_rms - expect).abs() / expect < 0.05, "{w_rms} vs {expect}");
    }

    #[test]
    fn test_four_channel_round_trip() {
        // Encode a first-order field to 4-channel UHJ and decode it back.
        // The recovered B-Format must match the input (delayed by the
        // encoder's half-filter latency) to <= -40 dB residual energy.
        let frames = 4096usize;
        let pad = UhjQuality::Fir256.input_padding();
        let delay = 128usize; // encoder direct-path delay
        let total = frames + pad;

        let mut enc = UhjEncoder::new(UhjQuality::Fir256, total);
        let mut dec = UhjDecoder::new(UhjQuality::Fir256, frames);

        let tone = |freq: f32, i: usize| (std::f32::consts::TAU * freq * i as f32).sin();
        let w: Vec<f32> = (0..total).map(|i| tone(0.053, i)).collect();
        let x: Vec<f32> = (0..total).map(|i| 0.7 * tone(0.089, i)).collect();
        let y: Vec<f32> = (0..total).map(|i| 0.6 * tone(0.131, i)).collect();
        let z: Vec<f32> = (0..total).map(|i| 0.5 * tone(0.071, i)).collect();

        let mut l = vec![0.0f32; total];
        let mut r = vec![0.0f32; total];
        let mut t = vec![0.0f32; total];
        let mut q = vec![0.0f32; total];
        enc.encode_full(
            &mut l,
            &mut r,
            Some(&mut t),
            Some(&mut q),
            &w,
            &x,
            &y,
            Some(&z),
            total,
        );

        let mut chans: Vec<&mut [f32]> = vec![&mut l, &mut r, &mut t, &mut q];
        dec.decode(&mut chans, frames);

        // Compare past the filter warm-up.
        let start = 512usize;
        for (ch, orig) in [(0, &w), (1, &x), (2, &y), (3, &z)] {
            let mut err = 0.0f64;
            let mut energy = 0.0f64;
            for i in start..frames {
                let expect = orig[i - delay] as f64;
                let got = chans[ch][i] as f64;
                err += (got - expect) * (got - expect);
                energy += expect * expect;
            }
            let ratio = err / energy.max(1e-12);
            assert!(
                ratio < 1e-4,
                "channel {ch}: residual {:.1} dB",
                10.0 * ratio.log10()
            );
        }
    }

    #[test]
    fn test_super_stereo_width_snaps_first_block() {
        let mut dec = SuperStereoDecoder::new(UhjQuality::Iir, 64);
        dec.set_width(0.5);
        assert!(dec.width_current.is_none());

        let pad = UhjQuality::Iir.input_padding();
        let mut l = vec![0.25f32; 64 + pad];
        let mut r = vec![-0.25f32; 64 + pad];
        let mut scratch = vec![0.0f32; 64 + pad];
        let mut chans: Vec<&mut [f32]> = vec![&mut l, &mut r, &mut scratch];
        dec.decode(&mut chans, 64);
        assert_eq!(dec.width_current, Some(0.5));
    }

    #[test]
    fn test_super_stereo_zero_width_is_centred() {
        // Width 0 removes the difference signal entirely: Y collapses to
        // the j(S) term only and W/X track S.
        let frames = 128;
        let pad = UhjQuality::Fir256.input_padding();
        let mut dec = SuperStereoDecoder::new(UhjQuality::Fir256, frames);
        dec.set_width(0.0);

        let total = frames + pad;
        let mut l: Vec<f32> = (0..total).map(|i| (i as f32 * 0.2).sin()).collect();
        let mut r = vec![0.0f32; total];
        let mut scratch = vec![0.0f32; total];
        let s: Vec<f32> = l.iter().zip(r.iter()).map(|(a, b)| a + b).collect();
        let mut chans: Vec<&mut [f32]> = vec![&mut l, &mut r, &mut scratch];
        dec.decode(&mut chans, frames);

        for i in 0..frames {
            assert!((chans[0][i] - 0.6098637 * s[i]).abs() < 1e-5);
            assert!((chans[1][i] - 0.8624776 * s[i]).abs() < 1e-5);
        }
    }
}
