//! Sample buffers
//!
//! PCM data is stored deinterleaved (one plane per channel) as f32,
//! immutable once created, and shared between sources through `Arc`. UHJ
//! content is decoded to B-Format at creation so the mix thread only ever
//! sees plain channel or ambisonic data.

use crate::error::{EngineError, EngineResult};
use sf_core::AmbiScaling;
use sf_dsp::{UhjDecoder, UhjQuality};
use sf_spatial::AmbiOrder;
use std::sync::Arc;

/// Channel interpretation of a buffer's planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferChannels {
    Mono,
    Stereo,
    Quad,
    X51,
    X51Rear,
    X61,
    X71,
    /// Ambisonic content in ACN plane order.
    BFormat {
        order: AmbiOrder,
        scaling: AmbiScaling,
    },
    /// 2-channel UHJ (decoded to B-Format on load).
    Uhj2,
    /// 3-channel UHJ.
    Uhj3,
    /// 4-channel UHJ.
    Uhj4,
}

impl BufferChannels {
    /// Number of interleaved channels this format carries on input.
    pub fn count(self) -> usize {
        match self {
            BufferChannels::Mono => 1,
            BufferChannels::Stereo => 2,
            BufferChannels::Quad => 4,
            BufferChannels::X51 | BufferChannels::X51Rear => 6,
            BufferChannels::X61 => 7,
            BufferChannels::X71 => 8,
            BufferChannels::BFormat { order, .. } => order.channels_3d(),
            BufferChannels::Uhj2 => 2,
            BufferChannels::Uhj3 => 3,
            BufferChannels::Uhj4 => 4,
        }
    }

    fn is_uhj(self) -> bool {
        matches!(
            self,
            BufferChannels::Uhj2 | BufferChannels::Uhj3 | BufferChannels::Uhj4
        )
    }
}

/// Immutable PCM data shared by any number of sources.
pub struct SampleBuffer {
    channels: BufferChannels,
    sample_rate: u32,
    frames: usize,
    /// One plane per channel, each `frames` long.
    planes: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Create from interleaved f32 samples. UHJ input is decoded to
    /// first-order B-Format here; the stored buffer reports itself as
    /// B-Format.
    pub fn from_f32_interleaved(
        channels: BufferChannels,
        sample_rate: u32,
        data: &[f32],
    ) -> EngineResult<Arc<Self>> {
        if !(1_000..=200_000).contains(&sample_rate) {
            return Err(EngineError::UnsupportedFormat(format!(
                "sample rate {sample_rate}"
            )));
        }
        let chan_count = channels.count();
        if data.len() % chan_count != 0 {
            return Err(EngineError::UnsupportedFormat(format!(
                "sample count {} not a multiple of {chan_count} channels",
                data.len()
            )));
        }
        let frames = data.len() / chan_count;

        let mut planes = vec![vec![0.0f32; frames]; chan_count];
        for (i, &sample) in data.iter().enumerate() {
            planes[i % chan_count][i / chan_count] = sample;
        }

        let (channels, planes) = if channels.is_uhj() {
            (
                BufferChannels::BFormat {
                    order: AmbiOrder::First,
                    scaling: AmbiScaling::Fuma,
                },
                decode_uhj(channels, planes, frames),
            )
        } else {
            (channels, planes)
        };

        Ok(Arc::new(Self {
            channels,
            sample_rate,
            frames,
            planes,
        }))
    }

    /// Create from interleaved 16-bit samples.
    pub fn from_i16_interleaved(
        channels: BufferChannels,
        sample_rate: u32,
        data: &[i16],
    ) -> EngineResult<Arc<Self>> {
        let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::from_f32_interleaved(channels, sample_rate, &floats)
    }

    /// Channel interpretation (post-decode for UHJ input).
    #[inline]
    pub fn channels(&self) -> BufferChannels {
        self.channels
    }

    /// Stored planes count.
    #[inline]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Source sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in frames.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// One channel's samples.
    #[inline]
    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }
}

/// Decode UHJ planes to first-order B-Format planes in ACN order
/// (W, Y, Z, X) with FuMa scaling.
fn decode_uhj(channels: BufferChannels, planes: Vec<Vec<f32>>, frames: usize) -> Vec<Vec<f32>> {
    let pad = UhjQuality::default().input_padding();
    let mut decoder = UhjDecoder::new(UhjQuality::default(), frames.max(1));

    // The decoder reads ahead; extend every input plane with silence.
    let mut work: Vec<Vec<f32>> = Vec::with_capacity(4);
    for i in 0..4 {
        let mut plane = vec![0.0f32; frames + pad];
        if let Some(src) = planes.get(i) {
            plane[..frames].copy_from_slice(src);
        }
        work.push(plane);
    }

    let four = channels == BufferChannels::Uhj4;
    {
        let mut refs: Vec<&mut [f32]> = work.iter_mut().map(|p| p.as_mut_slice()).collect();
        if !four {
            refs.truncate(3);
        }
        if frames > 0 {
            decoder.decode(&mut refs, frames);
        }
    }

    // Decoded planes are W, X, Y, Z; store ACN order (W, Y, Z, X).
    let mut iter = work.into_iter();
    let mut w = iter.next().unwrap();
    let mut x = iter.next().unwrap();
    let mut y = iter.next().unwrap();
    let mut z = iter.next().unwrap();
    w.truncate(frames);
    x.truncate(frames);
    y.truncate(frames);
    z.truncate(frames);
    if !four {
        z.iter_mut().for_each(|s| *s = 0.0);
    }
    vec![w, y, z, x]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let buf = SampleBuffer::from_f32_interleaved(
            BufferChannels::Stereo,
            44100,
            &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0],
        )
        .unwrap();
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.plane(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.plane(1), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_bad_rate_rejected() {
        assert!(SampleBuffer::from_f32_interleaved(BufferChannels::Mono, 100, &[0.0]).is_err());
    }

    #[test]
    fn test_ragged_data_rejected() {
        assert!(
            SampleBuffer::from_f32_interleaved(BufferChannels::Stereo, 44100, &[0.0, 0.0, 0.0])
                .is_err()
        );
    }

    #[test]
    fn test_i16_scaling() {
        let buf =
            SampleBuffer::from_i16_interleaved(BufferChannels::Mono, 48000, &[16384, -32768])
                .unwrap();
        assert!((buf.plane(0)[0] - 0.5).abs() < 1e-4);
        assert!((buf.plane(0)[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_uhj_decodes_to_bformat() {
        let data = vec![0.25f32; 2 * 512];
        let buf =
            SampleBuffer::from_f32_interleaved(BufferChannels::Uhj2, 48000, &data).unwrap();
        assert!(matches!(
            buf.channels(),
            BufferChannels::BFormat {
                order: AmbiOrder::First,
                ..
            }
        ));
        assert_eq!(buf.plane_count(), 4);
        assert_eq!(buf.frames(), 512);
        // Identical L/R means pure S: W must carry signal, Y (plane 1) only
        // the phase-shift residue of D = 0.
        let w_energy: f32 = buf.plane(0).iter().map(|s| s * s).sum();
        assert!(w_energy > 0.0);
    }
}
