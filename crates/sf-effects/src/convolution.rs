//! Convolution reverb
//!
//! Uniform partitioned convolution: the impulse response is split into
//! 256-sample partitions held in the frequency domain, incoming blocks are
//! transformed once and multiplied against every partition, and an
//! overlap buffer carries the tail between blocks.
//!
//! The partition table is pre-built on a non-realtime thread
//! ([`ConvolutionIr::from_samples`]) and handed to the kernel as a shared
//! handle; the mix-thread `update` only swaps the handle and resets
//! positions, and `process` works entirely out of scratch allocated at
//! construction.

use crate::{DeviceInfo, EffectProcessor, EffectProps};
use sf_core::FloatBufferLine;
use sf_dsp::{spectrum_mac, Complex32, RealFftPair};
use std::sync::Arc;

const PARTITION_SIZE: usize = 256;
const FFT_SIZE: usize = PARTITION_SIZE * 2;
/// Most partitions a response may carry (longer IRs are truncated at
/// build time).
const MAX_PARTITIONS: usize = 256;

/// A pre-transformed impulse response shared between the API thread and
/// the kernel.
pub struct ConvolutionIr {
    /// Frequency-domain partitions, `FFT_SIZE/2 + 1` bins each.
    partitions: Vec<Vec<Complex32>>,
    sample_rate: u32,
}

impl std::fmt::Debug for ConvolutionIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionIr")
            .field("partitions", &self.partitions.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl ConvolutionIr {
    /// Transform an impulse response into its partition table. Runs FFTs
    /// and allocates; call it from a non-realtime thread. Responses longer
    /// than `MAX_PARTITIONS * 256` samples are truncated.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        let mut fft = RealFftPair::new(FFT_SIZE);
        let count = samples
            .len()
            .div_ceil(PARTITION_SIZE)
            .clamp(1, MAX_PARTITIONS);

        let mut partitions = Vec::with_capacity(count);
        for p in 0..count {
            let start = p * PARTITION_SIZE;
            let end = (start + PARTITION_SIZE).min(samples.len());
            let mut time = [0.0f32; FFT_SIZE];
            if start < samples.len() {
                time[..end - start].copy_from_slice(&samples[start..end]);
            }
            let mut spectrum = fft.make_spectrum();
            fft.forward(&mut time, &mut spectrum);
            partitions.push(spectrum);
        }

        Self {
            partitions,
            sample_rate,
        }
    }

    /// Number of 256-sample partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Sample rate the response was captured at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Partitioned FFT convolution kernel.
pub struct Convolution {
    fft: RealFftPair,
    ir: Option<Arc<ConvolutionIr>>,
    /// Ring of past input spectra, aligned with the partitions. Sized for
    /// `MAX_PARTITIONS` up front so an IR swap never allocates.
    input_spectra: Vec<Vec<Complex32>>,
    spectra_pos: usize,
    /// Input accumulation for the current partition.
    input_fifo: [f32; PARTITION_SIZE],
    fifo_fill: usize,
    /// Time-domain overlap from the previous inverse transform.
    overlap: [f32; PARTITION_SIZE],
    /// Output pending delivery.
    output_queue: Vec<f32>,
    spectrum_scratch: Vec<Complex32>,
    accum_scratch: Vec<Complex32>,
}

impl Default for Convolution {
    fn default() -> Self {
        let fft = RealFftPair::new(FFT_SIZE);
        let bins = fft.spectrum_len();
        Self {
            fft,
            ir: None,
            input_spectra: vec![vec![Complex32::default(); bins]; MAX_PARTITIONS],
            spectra_pos: 0,
            input_fifo: [0.0; PARTITION_SIZE],
            fifo_fill: 0,
            overlap: [0.0; PARTITION_SIZE],
            output_queue: Vec::with_capacity(sf_core::BUFFER_LINE_SIZE + PARTITION_SIZE),
            spectrum_scratch: vec![Complex32::default(); bins],
            accum_scratch: vec![Complex32::default(); bins],
        }
    }
}

impl Convolution {
    fn reset_stream(&mut self) {
        self.spectra_pos = 0;
        self.fifo_fill = 0;
        self.overlap.fill(0.0);
        self.output_queue.clear();
        let used = self
            .ir
            .as_ref()
            .map(|ir| ir.partition_count())
            .unwrap_or(0);
        for spec in self.input_spectra[..used].iter_mut() {
            spec.fill(Complex32::default());
        }
    }

    fn process_partition(&mut self, ir: &ConvolutionIr) {
        // Transform the newest input partition.
        let mut time = [0.0f32; FFT_SIZE];
        time[..PARTITION_SIZE].copy_from_slice(&self.input_fifo);
        self.fft
            .forward(&mut time, &mut self.spectrum_scratch);
        self.input_spectra[self.spectra_pos].copy_from_slice(&self.spectrum_scratch);

        // Multiply-accumulate every partition against its aligned input
        // spectrum.
        self.accum_scratch.fill(Complex32::default());
        let count = ir.partitions.len();
        for (p, part) in ir.partitions.iter().enumerate() {
            let spec = &self.input_spectra[(self.spectra_pos + count - p) % count];
            spectrum_mac(&mut self.accum_scratch, spec, part);
        }
        self.spectra_pos = (self.spectra_pos + 1) % count;

        let mut synth = [0.0f32; FFT_SIZE];
        self.fft.backward(&mut self.accum_scratch, &mut synth);
        let scale = 1.0 / FFT_SIZE as f32;

        // First half plus last block's tail is the output; second half is
        // the next tail.
        for i in 0..PARTITION_SIZE {
            self.output_queue.push(synth[i] * scale + self.overlap[i]);
        }
        for i in 0..PARTITION_SIZE {
            self.overlap[i] = synth[PARTITION_SIZE + i] * scale;
        }
        self.fifo_fill = 0;
    }
}

impl EffectProcessor for Convolution {
    fn device_update(&mut self, _device: &DeviceInfo) {
        self.reset_stream();
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::Convolution(p) = props {
            let changed = match (&self.ir, &p.ir) {
                (Some(old), Some(new)) => !Arc::ptr_eq(old, new),
                (None, None) => false,
                _ => true,
            };
            if changed {
                self.ir = p.ir.clone();
                self.reset_stream();
            }
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let Some(ir) = self.ir.clone() else {
            return;
        };

        let mut consumed = 0usize;
        while consumed < frames {
            let want = (PARTITION_SIZE - self.fifo_fill).min(frames - consumed);
            self.input_fifo[self.fifo_fill..self.fifo_fill + want]
                .copy_from_slice(&input[0][consumed..consumed + want]);
            self.fifo_fill += want;
            consumed += want;
            if self.fifo_fill == PARTITION_SIZE {
                self.process_partition(&ir);
            }
        }

        let avail = self.output_queue.len().min(frames);
        let start = frames - avail;
        for (i, s) in self.output_queue.drain(..avail).enumerate() {
            output[0][start + i] += s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConvolutionProps;
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_identity_ir_passthrough() {
        let mut fx = Convolution::default();
        fx.update(&EffectProps::Convolution(ConvolutionProps {
            ir: Some(Arc::new(ConvolutionIr::from_samples(&[1.0], 48000))),
        }));

        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for (i, s) in input[0].iter_mut().enumerate() {
            *s = ((i * 7) % 5) as f32 * 0.1;
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);

        // Whole partitions complete within the block, so a unit IR is an
        // exact passthrough.
        for i in 0..BUFFER_LINE_SIZE {
            assert!(
                (output[0][i] - input[0][i]).abs() < 1e-3,
                "sample {i}: {} vs {}",
                output[0][i],
                input[0][i]
            );
        }
    }

    #[test]
    fn test_long_ir_rings() {
        let mut fx = Convolution::default();
        let mut ir = vec![0.0f32; 1000];
        ir[999] = 0.5;
        fx.update(&EffectProps::Convolution(ConvolutionProps {
            ir: Some(Arc::new(ConvolutionIr::from_samples(&ir, 48000))),
        }));

        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        input[0][0] = 1.0;
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        fx.process(BUFFER_LINE_SIZE, &input, &mut output);
        input[0][0] = 0.0;
        let mut found = output[0].iter().fold(0.0f32, |m, x| m.max(x.abs()));

        for _ in 0..4 {
            output[0].fill(0.0);
            fx.process(BUFFER_LINE_SIZE, &input, &mut output);
            found = found.max(output[0].iter().fold(0.0f32, |m, x| m.max(x.abs())));
        }
        assert!((found - 0.5).abs() < 1e-2, "echo peak {found}");
    }

    #[test]
    fn test_overlong_ir_truncated() {
        let ir = ConvolutionIr::from_samples(&vec![0.1f32; MAX_PARTITIONS * PARTITION_SIZE * 2], 48000);
        assert_eq!(ir.partition_count(), MAX_PARTITIONS);
    }

    #[test]
    fn test_ir_swap_resets_stream() {
        let mut fx = Convolution::default();
        // Three partitions so the spectra ring position cycles visibly.
        let ir_a = Arc::new(ConvolutionIr::from_samples(&[0.1f32; 768], 48000));
        fx.update(&EffectProps::Convolution(ConvolutionProps {
            ir: Some(Arc::clone(&ir_a)),
        }));

        let input = vec![[0.5f32; BUFFER_LINE_SIZE]; 1];
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        // 1000 frames = 3 full partitions plus 232 samples in the FIFO.
        fx.process(1000, &input, &mut output);
        assert_eq!(fx.fifo_fill, 232);
        assert_eq!(fx.spectra_pos, 0);

        // Re-publishing the same handle must not reset the stream state.
        fx.process(256, &input, &mut output);
        let fill_before = fx.fifo_fill;
        let pos_before = fx.spectra_pos;
        assert_ne!(pos_before, 0);
        fx.update(&EffectProps::Convolution(ConvolutionProps {
            ir: Some(Arc::clone(&ir_a)),
        }));
        assert_eq!(fx.fifo_fill, fill_before);
        assert_eq!(fx.spectra_pos, pos_before);

        // A different handle does.
        fx.update(&EffectProps::Convolution(ConvolutionProps {
            ir: Some(Arc::new(ConvolutionIr::from_samples(&[0.5], 48000))),
        }));
        assert_eq!(fx.fifo_fill, 0);
        assert_eq!(fx.spectra_pos, 0);
    }
}
