//! Pitch shifter
//!
//! STFT phase vocoder: analysis estimates each bin's true frequency from
//! its phase advance, bins are scaled by the pitch ratio, and synthesis
//! re-accumulates phase at the shifted frequencies. 1024-point frames with
//! 4x overlap.

use crate::{DeviceInfo, EffectProcessor, EffectProps, PshifterProps};
use sf_core::FloatBufferLine;
use sf_dsp::{Complex32, RealFftPair};

const STFT_SIZE: usize = 1024;
const OVERSAMPLE: usize = 4;
const HOP: usize = STFT_SIZE / OVERSAMPLE;

/// Phase-vocoder pitch-shift kernel.
pub struct PitchShifter {
    pitch: f32,
    fft: RealFftPair,
    window: [f32; STFT_SIZE],
    /// Input accumulation FIFO.
    fifo: [f32; STFT_SIZE],
    fifo_fill: usize,
    /// Output overlap-add buffer.
    out_accum: Vec<f32>,
    /// Ready output samples pending delivery.
    output_queue: Vec<f32>,
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    /// Per-frame analysis/synthesis scratch, one entry per bin.
    ana_mag: Vec<f32>,
    ana_freq: Vec<f32>,
    syn_mag: Vec<f32>,
    syn_freq: Vec<f32>,
    spectrum: Vec<Complex32>,
}

impl Default for PitchShifter {
    fn default() -> Self {
        let mut window = [0.0f32; STFT_SIZE];
        for (i, w) in window.iter_mut().enumerate() {
            *w = 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / STFT_SIZE as f32).cos();
        }
        Self {
            pitch: 2.0,
            fft: RealFftPair::new(STFT_SIZE),
            window,
            fifo: [0.0; STFT_SIZE],
            fifo_fill: 0,
            out_accum: vec![0.0; STFT_SIZE * 2],
            output_queue: Vec::with_capacity(STFT_SIZE + sf_core::BUFFER_LINE_SIZE),
            last_phase: vec![0.0; STFT_SIZE / 2 + 1],
            sum_phase: vec![0.0; STFT_SIZE / 2 + 1],
            ana_mag: vec![0.0; STFT_SIZE / 2 + 1],
            ana_freq: vec![0.0; STFT_SIZE / 2 + 1],
            syn_mag: vec![0.0; STFT_SIZE / 2 + 1],
            syn_freq: vec![0.0; STFT_SIZE / 2 + 1],
            spectrum: vec![Complex32::default(); STFT_SIZE / 2 + 1],
        }
    }
}

impl PitchShifter {
    fn process_frame(&mut self) {
        let bins = STFT_SIZE / 2 + 1;
        let expect = std::f32::consts::TAU / OVERSAMPLE as f32;

        let mut time = [0.0f32; STFT_SIZE];
        for i in 0..STFT_SIZE {
            time[i] = self.fifo[i] * self.window[i];
        }
        self.fft.forward(&mut time, &mut self.spectrum);

        // Analysis: magnitude and deviation from the bin centre frequency.
        for b in 0..bins {
            let mag = self.spectrum[b].norm();
            let phase = self.spectrum[b].arg();
            let mut delta = phase - self.last_phase[b];
            self.last_phase[b] = phase;

            delta -= b as f32 * expect;
            // Wrap into -pi..pi.
            let qpd = (delta / std::f32::consts::PI) as i32;
            let wrap = if qpd >= 0 { qpd + (qpd & 1) } else { qpd - (qpd & 1) };
            delta -= std::f32::consts::PI * wrap as f32;

            self.ana_mag[b] = mag;
            self.ana_freq[b] = (b as f32 + delta * OVERSAMPLE as f32 / std::f32::consts::TAU)
                * (1.0 / STFT_SIZE as f32);
        }

        // Shift bins by the pitch ratio.
        self.syn_mag[..bins].fill(0.0);
        self.syn_freq[..bins].fill(0.0);
        for b in 0..bins {
            let target = (b as f32 * self.pitch) as usize;
            if target < bins {
                self.syn_mag[target] += self.ana_mag[b];
                self.syn_freq[target] = self.ana_freq[b] * self.pitch;
            }
        }

        // Synthesis: re-accumulate phase.
        for b in 0..bins {
            let advance =
                self.syn_freq[b] * STFT_SIZE as f32 * std::f32::consts::TAU / OVERSAMPLE as f32;
            self.sum_phase[b] += advance;
            let (sin, cos) = self.sum_phase[b].sin_cos();
            self.spectrum[b].re = self.syn_mag[b] * cos;
            self.spectrum[b].im = self.syn_mag[b] * sin;
        }

        let mut synth = [0.0f32; STFT_SIZE];
        self.fft.backward(&mut self.spectrum, &mut synth);

        // Overlap-add (the inverse FFT is unnormalised: scale by N, plus
        // the window overlap factor).
        let scale = 1.0 / (STFT_SIZE as f32 * OVERSAMPLE as f32 / 2.0);
        for i in 0..STFT_SIZE {
            self.out_accum[i] += synth[i] * self.window[i] * scale;
        }

        // Emit one hop of output and slide the buffers.
        self.output_queue.extend_from_slice(&self.out_accum[..HOP]);
        self.out_accum.copy_within(HOP.., 0);
        let len = self.out_accum.len();
        self.out_accum[len - HOP..].fill(0.0);
        self.fifo.copy_within(HOP.., 0);
        self.fifo_fill = STFT_SIZE - HOP;
    }
}

impl EffectProcessor for PitchShifter {
    fn device_update(&mut self, _device: &DeviceInfo) {
        self.fifo.fill(0.0);
        self.fifo_fill = 0;
        self.out_accum.fill(0.0);
        self.output_queue.clear();
        self.last_phase.fill(0.0);
        self.sum_phase.fill(0.0);
    }

    fn update(&mut self, props: &EffectProps) {
        if let EffectProps::PitchShifter(p) = props {
            let semitones = p.coarse_tune as f32 + p.fine_tune as f32 / 100.0;
            self.pitch = 2.0f32.powf(semitones / 12.0).clamp(0.25, 4.0);
        }
    }

    fn process(
        &mut self,
        frames: usize,
        input: &[FloatBufferLine],
        output: &mut [FloatBufferLine],
    ) {
        let mut consumed = 0usize;
        while consumed < frames {
            let want = (STFT_SIZE - self.fifo_fill).min(frames - consumed);
            self.fifo[self.fifo_fill..self.fifo_fill + want]
                .copy_from_slice(&input[0][consumed..consumed + want]);
            self.fifo_fill += want;
            consumed += want;
            if self.fifo_fill == STFT_SIZE {
                self.process_frame();
            }
        }

        // Deliver what the vocoder has produced; lead-in stays silent.
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
    use sf_core::BUFFER_LINE_SIZE;

    #[test]
    fn test_unity_pitch_roughly_preserves_energy() {
        let mut fx = PitchShifter::default();
        fx.device_update(&DeviceInfo {
            sample_rate: 48000,
            update_size: BUFFER_LINE_SIZE,
            bus_channels: 1,
        });
        fx.update(&EffectProps::PitchShifter(PshifterProps {
            coarse_tune: 0,
            fine_tune: 0,
        }));

        let mut input = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        for (i, s) in input[0].iter_mut().enumerate() {
            *s = (std::f32::consts::TAU * 40.0 * i as f32 / 1024.0).sin();
        }
        let mut output = vec![[0.0f32; BUFFER_LINE_SIZE]; 1];
        let mut out_energy = 0.0f32;
        for _ in 0..8 {
            output[0].fill(0.0);
            fx.process(BUFFER_LINE_SIZE, &input, &mut output);
            out_energy += output[0].iter().map(|x| x * x).sum::<f32>();
        }
        let in_energy: f32 = input[0].iter().map(|x| x * x).sum::<f32>() * 8.0;
        assert!(out_energy > in_energy * 0.1, "{out_energy} vs {in_energy}");
        assert!(out_energy < in_energy * 4.0, "{out_energy} vs {in_energy}");
    }
}
