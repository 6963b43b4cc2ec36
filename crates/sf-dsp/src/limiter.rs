//! Look-ahead peak limiter for the device output
//!
//! Detects the peak across all channels, smooths a gain envelope with
//! configurable attack/release, and applies it to a delayed copy of the
//! signal so the gain reduction arrives before the peak does.

use sf_core::FloatBufferLine;

/// Multi-channel look-ahead peak limiter.
pub struct Limiter {
    ceiling: f32,
    lookahead: usize,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    /// One delay line per channel, `lookahead` samples each.
    delays: Vec<Vec<f32>>,
    delay_pos: usize,
}

impl Limiter {
    /// Create a limiter. `lookahead` is in samples; `attack_ms` and
    /// `release_ms` shape the gain envelope at `sample_rate`.
    pub fn new(
        channels: usize,
        sample_rate: u32,
        ceiling: f32,
        lookahead: usize,
        attack_ms: f32,
        release_ms: f32,
    ) -> Self {
        let sr = sample_rate as f32;
        Self {
            ceiling: ceiling.max(1e-4),
            lookahead: lookahead.max(1),
            attack_coeff: (-1.0 / (attack_ms.max(0.01) * 0.001 * sr)).exp(),
            release_coeff: (-1.0 / (release_ms.max(1.0) * 0.001 * sr)).exp(),
            envelope: 1.0,
            delays: vec![vec![0.0; lookahead.max(1)]; channels],
            delay_pos: 0,
        }
    }

    /// Latency introduced by the look-ahead delay, in samples.
    #[inline]
    pub fn latency(&self) -> usize {
        self.lookahead
    }

    /// Process the first `frames` samples of every channel line in place.
    pub fn process(&mut self, channels: &mut [FloatBufferLine], frames: usize) {
        for i in 0..frames {
            // Peak across channels at the input point.
            let mut peak = 0.0f32;
            for ch in channels.iter() {
                peak = peak.max(ch[i].abs());
            }

            // Target gain so the delayed output stays under the ceiling.
            let target = if peak > self.ceiling {
                self.ceiling / peak
            } else {
                1.0
            };
            let coeff = if target < self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = target + (self.envelope - target) * coeff;

            // Swap through the delay lines and apply the envelope.
            let pos = self.delay_pos;
            for (ch, delay) in channels.iter_mut().zip(self.delays.iter_mut()) {
                let delayed = delay[pos];
                delay[pos] = ch[i];
                ch[i] = delayed * self.envelope;
            }
            self.delay_pos = (pos + 1) % self.lookahead;
        }
    }
}
