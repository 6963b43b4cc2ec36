//! Source voices
//!
//! A voice is the mix-thread-resident state of a playing source: the
//! buffer cursor, resampler history, filter memory, and the previous
//! iteration's panning gains. Property snapshots are consumed here and all
//! derived values (distance attenuation, cone gains, Doppler pitch, pan
//! coefficients, HRIR selection) are computed on the mix thread.

use crate::buffer::{BufferChannels, SampleBuffer};
use crate::device::RenderMode;
use crate::slot::SlotRender;
use crate::source::SourceShared;
use crate::types::{
    ContextProps, DistanceModel, ListenerProps, SourceProps, SourceState, SpatializeMode,
    StereoMode,
};
use sf_backend::StreamConfig;
use sf_core::{
    Channel, ChannelLayout, FloatBufferLine, BUFFER_LINE_SIZE, MAX_AMBI_CHANNELS,
    MAX_OUTPUT_CHANNELS, MAX_SENDS,
};
use sf_dsp::{
    resample, Biquad, FilterType, SuperStereoDecoder, UhjQuality, FRACTION_BITS, FRACTION_ONE,
    MAX_PITCH,
};
use sf_spatial::{
    ambi_axes_from_world, direction_from_angles, virtual_source_direction, HrirArray, HrtfStore,
    Panner, HRIR_LENGTH,
};
use std::sync::Arc;

/// Gains below this never reach the bus.
const GAIN_SILENCE: f32 = 1e-5;
/// Largest resampler window.
const MAX_TAPS: usize = 24;
/// Source-sample scratch length per sub-block.
const FEED_LEN: usize = 2048;
/// Extra history kept for delayed HRIR mixing.
const HRTF_PAD: usize = 256;
/// Shelf corners for the direct/send filter pairs.
const LF_REFERENCE: f32 = 250.0;
const HF_REFERENCE: f32 = 5000.0;

/// Per-mix environment handed to every voice.
pub(crate) struct MixEnv<'a> {
    pub config: StreamConfig,
    pub mode: RenderMode,
    pub panner: &'a Panner,
    pub listener: &'a ListenerProps,
    pub ctx: &'a ContextProps,
    pub hrtf: Option<&'a Arc<HrtfStore>>,
    /// Listener or context changed: voices must rederive even without new
    /// source props.
    pub force_update: bool,
    /// Defer mode: leave all pending snapshots unconsumed.
    pub skip_updates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Playing,
    Paused,
    /// Fade to zero this iteration, then recycle.
    Stopping,
    Stopped,
}

/// Where the direct path lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathMode {
    /// Ambisonic dry bus.
    Bus,
    /// Straight to matching real output channels (spatialize off).
    Direct,
    /// Per-source HRIR into the binaural pair.
    HrtfDirect,
}

struct HrtfChannelState {
    coeffs: HrirArray,
    delays: [u32; 2],
    /// Delayed input history plus the current block.
    history: Vec<f32>,
}

impl HrtfChannelState {
    fn new() -> Self {
        Self {
            coeffs: [[0.0; 2]; HRIR_LENGTH],
            delays: [0; 2],
            history: vec![0.0; HRTF_PAD + BUFFER_LINE_SIZE],
        }
    }
}

struct VoiceChannel {
    history: [f32; MAX_TAPS],
    direct_lp: Biquad,
    direct_hp: Biquad,
    send_filters: [(Biquad, Biquad); MAX_SENDS],
    current_gains: [f32; MAX_OUTPUT_CHANNELS],
    target_gains: [f32; MAX_OUTPUT_CHANNELS],
    send_current: [[f32; MAX_AMBI_CHANNELS]; MAX_SENDS],
    send_target: [[f32; MAX_AMBI_CHANNELS]; MAX_SENDS],
    hrtf: Option<HrtfChannelState>,
    hrtf_gain_current: f32,
    hrtf_gain_target: f32,
}

impl VoiceChannel {
    fn new() -> Self {
        Self {
            history: [0.0; MAX_TAPS],
            direct_lp: Biquad::identity(),
            direct_hp: Biquad::identity(),
            send_filters: Default::default(),
            current_gains: [0.0; MAX_OUTPUT_CHANNELS],
            target_gains: [0.0; MAX_OUTPUT_CHANNELS],
            send_current: [[0.0; MAX_AMBI_CHANNELS]; MAX_SENDS],
            send_target: [[0.0; MAX_AMBI_CHANNELS]; MAX_SENDS],
            hrtf: None,
            hrtf_gain_current: 0.0,
            hrtf_gain_target: 0.0,
        }
    }
}

/// Mix-thread voice for one playing source.
pub(crate) struct Voice {
    pub source_id: u32,
    shared: Arc<SourceShared>,
    queue: Vec<Arc<SampleBuffer>>,
    queue_index: usize,
    position: usize,
    frac: u32,
    state: RunState,
    props: SourceProps,
    needs_update: bool,
    path: PathMode,
    pitch_mult: f32,
    chans: Vec<VoiceChannel>,
    /// Per-channel resampled output lines (scratch, reused every period).
    lines: Vec<FloatBufferLine>,
    super_stereo: Option<SuperStereoDecoder>,
    super_prev: [f32; 2],
}

impl Voice {
    pub(crate) fn new(
        source_id: u32,
        shared: Arc<SourceShared>,
        queue: Vec<Arc<SampleBuffer>>,
    ) -> Self {
        let channels = queue.first().map(|b| b.plane_count()).unwrap_or(1).max(1);
        Self {
            source_id,
            shared,
            queue,
            queue_index: 0,
            position: 0,
            frac: 0,
            state: RunState::Playing,
            props: SourceProps::default(),
            needs_update: true,
            path: PathMode::Bus,
            pitch_mult: 1.0,
            chans: (0..channels).map(|_| VoiceChannel::new()).collect(),
            lines: vec![[0.0; BUFFER_LINE_SIZE]; channels],
            super_stereo: None,
            super_prev: [0.0; 2],
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SourceShared> {
        &self.shared
    }

    pub(crate) fn pause(&mut self) {
        if self.state == RunState::Playing {
            self.state = RunState::Paused;
            self.shared.set_state(SourceState::Paused);
        }
    }

    pub(crate) fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Playing;
            self.shared.set_state(SourceState::Playing);
        }
    }

    pub(crate) fn stop(&mut self) {
        if self.state != RunState::Stopped {
            self.state = RunState::Stopping;
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.queue_index = 0;
        self.position = 0;
        self.frac = 0;
        self.shared.set_position(0);
        self.shared.set_state(SourceState::Initial);
        self.state = RunState::Stopped;
    }

    /// Rebind a pooled voice to a different source, reusing its channel
    /// and scratch allocations. Filter memory, gain ramps, and histories
    /// are cleared so nothing leaks from the previous owner.
    pub(crate) fn reinit(
        &mut self,
        source_id: u32,
        shared: Arc<SourceShared>,
        queue: Vec<Arc<SampleBuffer>>,
    ) {
        self.source_id = source_id;
        self.shared = shared;
        self.props = SourceProps::default();
        self.path = PathMode::Bus;
        self.pitch_mult = 1.0;
        self.super_prev = [0.0; 2];
        if let Some(decoder) = self.super_stereo.as_mut() {
            decoder.set_width(0.593);
        }
        for ch in self.chans.iter_mut() {
            ch.history = [0.0; MAX_TAPS];
            ch.direct_lp = Biquad::identity();
            ch.direct_hp = Biquad::identity();
            ch.send_filters = Default::default();
            ch.current_gains = [0.0; MAX_OUTPUT_CHANNELS];
            ch.target_gains = [0.0; MAX_OUTPUT_CHANNELS];
            ch.send_current = [[0.0; MAX_AMBI_CHANNELS]; MAX_SENDS];
            ch.send_target = [[0.0; MAX_AMBI_CHANNELS]; MAX_SENDS];
            ch.hrtf_gain_current = 0.0;
            ch.hrtf_gain_target = 0.0;
            if let Some(hrtf) = ch.hrtf.as_mut() {
                hrtf.history.fill(0.0);
                hrtf.delays = [0; 2];
            }
        }
        self.restart(queue);
    }

    /// Restart with a (possibly new) queue.
    pub(crate) fn restart(&mut self, queue: Vec<Arc<SampleBuffer>>) {
        let channels = queue.first().map(|b| b.plane_count()).unwrap_or(1).max(1);
        self.queue = queue;
        self.queue_index = 0;
        self.position = 0;
        self.frac = 0;
        self.state = RunState::Playing;
        self.needs_update = true;
        if self.chans.len() != channels {
            self.chans = (0..channels).map(|_| VoiceChannel::new()).collect();
            self.lines = vec![[0.0; BUFFER_LINE_SIZE]; channels];
        } else {
            for ch in self.chans.iter_mut() {
                ch.history = [0.0; MAX_TAPS];
            }
        }
        self.shared.set_state(SourceState::Playing);
        self.shared.set_position(0);
    }

    fn total_queue_frames(&self) -> usize {
        self.queue.iter().map(|b| b.frames()).sum()
    }

    fn absolute_position(&self) -> u64 {
        let before: u64 = self.queue[..self.queue_index.min(self.queue.len())]
            .iter()
            .map(|b| b.frames() as u64)
            .sum();
        before + self.position as u64
    }

    /// Read `dst.len()` source samples for `channel` starting at the given
    /// cursor, walking the queue and looping as configured. The unfilled
    /// tail is zeroed. Returns the number of real samples.
    fn fetch_into(
        &self,
        channel: usize,
        mut qi: usize,
        mut pos: usize,
        dst: &mut [f32],
    ) -> usize {
        let loopable = self.props.looping && self.total_queue_frames() > 0;
        let mut filled = 0usize;
        while filled < dst.len() {
            if qi >= self.queue.len() {
                if loopable {
                    qi = 0;
                    pos = 0;
                    continue;
                }
                break;
            }
            let buf = &self.queue[qi];
            if buf.frames() == 0 {
                qi += 1;
                pos = 0;
                continue;
            }
            let plane = buf.plane(channel.min(buf.plane_count() - 1));
            let n = (buf.frames() - pos).min(dst.len() - filled);
            dst[filled..filled + n].copy_from_slice(&plane[pos..pos + n]);
            filled += n;
            pos += n;
            if pos >= buf.frames() {
                qi += 1;
                pos = 0;
            }
        }
        dst[filled..].fill(0.0);
        filled
    }

    /// Step a (queue index, position) cursor forward by `count` samples.
    /// Returns the new cursor and whether it ran past a non-looping end.
    fn step_cursor(&self, mut qi: usize, mut pos: usize, count: usize) -> (usize, usize, bool) {
        let loopable = self.props.looping && self.total_queue_frames() > 0;
        let mut remaining = count;
        while remaining > 0 {
            if qi >= self.queue.len() {
                if loopable {
                    qi = 0;
                    pos = 0;
                    continue;
                }
                return (qi, pos, true);
            }
            let frames = self.queue[qi].frames();
            if frames == 0 {
                qi += 1;
                pos = 0;
                continue;
            }
            let n = (frames - pos).min(remaining);
            pos += n;
            remaining -= n;
            if pos >= frames {
                qi += 1;
                pos = 0;
            }
        }
        (qi, pos, false)
    }

    /// Consume a pending snapshot and rederive panning, filters, and pitch.
    fn update_params(&mut self, env: &MixEnv) {
        if !env.skip_updates {
            if let Some(props) = self.shared.props.consume() {
                self.props = props;
                self.needs_update = true;
            }
        }
        if !self.needs_update && !env.force_update {
            return;
        }
        self.needs_update = false;

        let Some(buffer) = self.queue.first().map(Arc::clone) else {
            return;
        };
        let p = self.props;
        let l = env.listener;

        // Listener-space position.
        let rel = if p.relative {
            p.position
        } else {
            let d = [
                p.position[0] - l.position[0],
                p.position[1] - l.position[1],
                p.position[2] - l.position[2],
            ];
            rotate_to_listener(d, l)
        };
        let distance = (rel[0] * rel[0] + rel[1] * rel[1] + rel[2] * rel[2]).sqrt();

        let atten = distance_gain(env.ctx.distance_model, distance, &p);
        let (cone_gain, cone_hf) = cone_gains(&p, l);
        self.pitch_mult = p.pitch.max(0.0) * doppler_shift(&p, l, env.ctx);

        let direct_gain = (atten * cone_gain * p.gain)
            .clamp(p.min_gain, p.max_gain.max(p.min_gain))
            * l.gain;
        let wet_base = atten * cone_gain * p.gain;
        let gain_hf = (p.direct_gain_hf * cone_hf).clamp(0.0001, 1.0);
        let gain_lf = p.direct_gain_lf.clamp(0.0001, 1.0);

        // Spread from the source radius.
        let spread = if p.radius > 0.0 {
            if distance < p.radius {
                std::f32::consts::TAU
            } else {
                2.0 * (p.radius / distance).asin()
            }
        } else {
            0.0
        };

        // Direction for point panning; degenerate distances render ahead.
        let dir = if distance > 0.0001 {
            ambi_axes_from_world((
                rel[0] / distance,
                rel[1] / distance,
                rel[2] / distance,
            ))
        } else {
            (0.0, 0.0, 1.0)
        };

        // Super-stereo needs three mixing channels for the decoded field.
        let is_super = p.stereo_mode == StereoMode::SuperStereo
            && buffer.channels() == BufferChannels::Stereo;
        let wanted = if is_super {
            3
        } else {
            buffer.plane_count().max(1)
        };
        while self.chans.len() < wanted {
            self.chans.push(VoiceChannel::new());
        }
        self.chans.truncate(wanted);
        if self.lines.len() != wanted {
            self.lines = vec![[0.0; BUFFER_LINE_SIZE]; wanted];
        }

        // Pick the direct path.
        let layout = buffer_layout(buffer.channels());
        self.path = match (env.mode, buffer.channels(), p.spatialize) {
            (RenderMode::Speakers, ch, SpatializeMode::Off) if !is_bformat(ch) => PathMode::Direct,
            (RenderMode::Hrtf, BufferChannels::Mono, mode) if mode != SpatializeMode::Off => {
                PathMode::HrtfDirect
            }
            _ => PathMode::Bus,
        };

        // Filter pairs.
        let sr = env.config.frequency as f32;
        let mut ref_lp = Biquad::identity();
        let mut ref_hp = Biquad::identity();
        if gain_hf < 1.0 {
            ref_lp.set_params(FilterType::HighShelf, gain_hf, HF_REFERENCE / sr, 1.0);
        }
        if gain_lf < 1.0 {
            ref_hp.set_params(FilterType::LowShelf, gain_lf, LF_REFERENCE / sr, 1.0);
        }

        for ci in 0..self.chans.len() {
            {
                let ch = &mut self.chans[ci];
                ch.direct_lp.copy_params_from(&ref_lp);
                ch.direct_hp.copy_params_from(&ref_hp);
            }

            match self.path {
                PathMode::Direct => {
                    let idx = direct_output_index(env.config.layout, layout, ci);
                    let ch = &mut self.chans[ci];
                    ch.target_gains = [0.0; MAX_OUTPUT_CHANNELS];
                    if let Some(idx) = idx {
                        ch.target_gains[idx] = direct_gain;
                    }
                }
                PathMode::HrtfDirect => {
                    if let Some(store) = env.hrtf {
                        let metres = distance.max(0.001) * l.metres_per_unit;
                        let ch = &mut self.chans[ci];
                        let hrtf = ch.hrtf.get_or_insert_with(HrtfChannelState::new);
                        // Polar angles from the (y, z, x) direction.
                        let (y, z, x) = dir;
                        let elevation = z.clamp(-1.0, 1.0).asin();
                        let azimuth = (-y).atan2(x);
                        store.get_coeffs(
                            elevation,
                            azimuth,
                            metres,
                            spread,
                            &mut hrtf.coeffs,
                            &mut hrtf.delays,
                        );
                        ch.hrtf_gain_target = direct_gain;
                    }
                }
                PathMode::Bus => {
                    let mut gains = [0.0f32; MAX_AMBI_CHANNELS];
                    compute_bus_gains(
                        env.panner,
                        buffer.channels(),
                        &p,
                        is_super,
                        ci,
                        dir,
                        spread,
                        direct_gain,
                        &mut gains,
                    );
                    let ch = &mut self.chans[ci];
                    ch.target_gains = [0.0; MAX_OUTPUT_CHANNELS];
                    ch.target_gains[..MAX_AMBI_CHANNELS].copy_from_slice(&gains);
                }
            }

            // Send gains: always ambisonic on the slot's wet bus.
            for si in 0..MAX_SENDS {
                let send = p.sends[si];
                let routed =
                    send.slot.is_some() || (si == 0 && env.ctx.default_slot.is_some());
                let mut wet = [0.0f32; MAX_AMBI_CHANNELS];
                if routed && send.gain > GAIN_SILENCE {
                    let wet_gain = (wet_base * send.gain)
                        .clamp(p.min_gain, p.max_gain.max(p.min_gain))
                        * l.gain;
                    compute_bus_gains(
                        env.panner,
                        buffer.channels(),
                        &p,
                        is_super,
                        ci,
                        dir,
                        spread,
                        wet_gain,
                        &mut wet,
                    );
                }

                let shf = send.gain_hf.clamp(0.0001, 1.0);
                let slf = send.gain_lf.clamp(0.0001, 1.0);
                let ch = &mut self.chans[ci];
                ch.send_target[si] = wet;
                let (lp, hp) = &mut ch.send_filters[si];
                let mut f = Biquad::identity();
                if shf < 1.0 {
                    f.set_params(FilterType::HighShelf, shf, HF_REFERENCE / sr, 1.0);
                }
                lp.copy_params_from(&f);
                let mut f = Biquad::identity();
                if slf < 1.0 {
                    f.set_params(FilterType::LowShelf, slf, LF_REFERENCE / sr, 1.0);
                }
                hp.copy_params_from(&f);
            }
        }
    }

    /// Produce this voice's contribution for one period. Returns false when
    /// the voice finished and should be recycled.
    pub(crate) fn mix(
        &mut self,
        env: &MixEnv,
        bus: &mut [FloatBufferLine],
        direct_out: &mut [FloatBufferLine],
        hrtf_out: &mut [FloatBufferLine],
        slots: &mut [SlotRender],
        frames: usize,
    ) -> bool {
        match self.state {
            RunState::Stopped => return false,
            RunState::Paused => return true,
            _ => {}
        }
        if self.queue.is_empty() {
            self.shared.set_state(SourceState::Stopped);
            self.state = RunState::Stopped;
            return false;
        }

        self.update_params(env);

        let buffer = Arc::clone(&self.queue[self.queue_index.min(self.queue.len() - 1)]);
        let stopping = self.state == RunState::Stopping;

        // Step per output frame in fixed point, clamped to the supported
        // pitch range. A zero step holds position without busy-looping.
        let ratio = self.pitch_mult * buffer.sample_rate() as f32 / env.config.frequency as f32;
        let step = ((ratio.max(0.0) * FRACTION_ONE as f32) as u64)
            .min((MAX_PITCH as u64) << FRACTION_BITS) as u32;

        let kind = self.props.resampler;
        let taps = kind.taps();
        let src_channels = buffer.plane_count().min(self.chans.len());

        // Resample each source channel into its scratch line; every channel
        // advances identically, so track the cursor once.
        let mut lines = std::mem::take(&mut self.lines);
        let mut advance_total = 0usize;
        let mut final_frac = self.frac;
        let mut ended = false;

        for (ci, line) in lines.iter_mut().enumerate() {
            if ci >= src_channels {
                line[..frames].fill(0.0);
                continue;
            }
            let mut feed = [0.0f32; FEED_LEN];
            let mut produced = 0usize;
            let mut frac = self.frac;
            let mut qi = self.queue_index;
            let mut pos = self.position;
            let mut adv = 0usize;

            while produced < frames {
                // Bound the sub-block so the source span fits the scratch.
                let span_limit = FEED_LEN - taps;
                let mut sub = frames - produced;
                if step > 0 {
                    let max_sub =
                        (((span_limit as u64) << FRACTION_BITS) / step as u64) as usize;
                    sub = sub.min(max_sub.max(1));
                }
                let need =
                    taps + ((frac as u64 + step as u64 * sub as u64) >> FRACTION_BITS) as usize;

                // History prefix, then fresh samples from the cursor.
                feed[..kind.history()]
                    .copy_from_slice(&self.chans[ci].history[..kind.history()]);
                let real = self.fetch_into(ci, qi, pos, {
                    let end = need.max(taps);
                    &mut feed[kind.history()..end]
                });
                if real < need.max(taps) - kind.history() {
                    ended = true;
                }

                let (whole, new_frac) = resample(
                    kind,
                    &feed[..need.max(taps)],
                    frac,
                    step,
                    &mut line[produced..produced + sub],
                );

                // Carry the resampler history across sub-blocks: the taps
                // window ending at the new read position.
                let hist = kind.history();
                self.chans[ci].history[..hist].copy_from_slice(&feed[whole..whole + hist]);

                let (nqi, npos, _) = self.step_cursor(qi, pos, whole);
                qi = nqi;
                pos = npos;
                produced += sub;
                adv += whole;
                frac = new_frac;
            }

            if ci == 0 {
                advance_total = adv;
                final_frac = frac;
            }
        }

        // Super-stereo: fold the stereo pair into a first-order field.
        let is_super = self.props.stereo_mode == StereoMode::SuperStereo
            && buffer.channels() == BufferChannels::Stereo
            && lines.len() >= 3;
        if is_super {
            self.run_super_stereo(&mut lines, frames);
        }

        // Filter and mix each channel.
        for (ci, line) in lines.iter_mut().enumerate() {
            let ch = &mut self.chans[ci];

            let mut filtered = [0.0f32; BUFFER_LINE_SIZE];
            for i in 0..frames {
                filtered[i] = ch
                    .direct_hp
                    .process_sample(ch.direct_lp.process_sample(line[i]));
            }

            if stopping {
                ch.target_gains = [0.0; MAX_OUTPUT_CHANNELS];
                ch.hrtf_gain_target = 0.0;
                for send in ch.send_target.iter_mut() {
                    *send = [0.0; MAX_AMBI_CHANNELS];
                }
            }

            match self.path {
                PathMode::Bus => {
                    for (li, bus_line) in bus.iter_mut().enumerate() {
                        mix_ramped(
                            bus_line,
                            &filtered,
                            &mut ch.current_gains[li],
                            ch.target_gains[li],
                            frames,
                        );
                    }
                }
                PathMode::Direct => {
                    for (li, out_line) in direct_out.iter_mut().enumerate() {
                        mix_ramped(
                            out_line,
                            &filtered,
                            &mut ch.current_gains[li],
                            ch.target_gains[li],
                            frames,
                        );
                    }
                }
                PathMode::HrtfDirect => {
                    if let Some(hrtf) = ch.hrtf.as_mut() {
                        mix_hrtf(
                            hrtf,
                            &filtered,
                            &mut ch.hrtf_gain_current,
                            ch.hrtf_gain_target,
                            hrtf_out,
                            frames,
                        );
                    }
                }
            }

            // Sends.
            for si in 0..MAX_SENDS {
                let target_slot = self.props.sends[si].slot.or(if si == 0 {
                    env.ctx.default_slot
                } else {
                    None
                });
                let Some(slot_id) = target_slot else { continue };
                let active = ch.send_target[si].iter().any(|&g| g.abs() > GAIN_SILENCE)
                    || ch.send_current[si].iter().any(|&g| g.abs() > GAIN_SILENCE);
                if !active {
                    continue;
                }
                let Some(slot) = slots.iter_mut().find(|s| s.id == slot_id) else {
                    continue;
                };

                let (lp, hp) = &mut ch.send_filters[si];
                let mut wet = [0.0f32; BUFFER_LINE_SIZE];
                for i in 0..frames {
                    wet[i] = hp.process_sample(lp.process_sample(filtered[i]));
                }
                for (li, slot_line) in slot.input.iter_mut().enumerate() {
                    if li >= MAX_AMBI_CHANNELS {
                        break;
                    }
                    mix_ramped(
                        slot_line,
                        &wet,
                        &mut ch.send_current[si][li],
                        ch.send_target[si][li],
                        frames,
                    );
                }
            }
        }
        self.lines = lines;

        // Cursor and lifecycle.
        let (qi, pos, ran_out) = self.step_cursor(self.queue_index, self.position, advance_total);
        self.queue_index = qi;
        self.position = pos;
        self.frac = final_frac;
        self.shared.set_position(self.absolute_position());

        if stopping {
            self.state = RunState::Stopped;
            self.shared.set_state(SourceState::Stopped);
            return false;
        }
        if ended || ran_out {
            // The zero padding already faded the tail; a further block
            // would mix pure silence.
            self.state = RunState::Stopped;
            self.shared.set_state(SourceState::Stopped);
            return false;
        }
        true
    }

    fn run_super_stereo(&mut self, lines: &mut [FloatBufferLine], frames: usize) {
        let decoder = self
            .super_stereo
            .get_or_insert_with(|| SuperStereoDecoder::new(UhjQuality::Iir, BUFFER_LINE_SIZE));

        // The IIR decoder reads one sample ahead; feed a one-sample-delayed
        // stream so the look-ahead is always available.
        let mut l = [0.0f32; BUFFER_LINE_SIZE + 1];
        let mut r = [0.0f32; BUFFER_LINE_SIZE + 1];
        let mut scratch = [0.0f32; BUFFER_LINE_SIZE + 1];
        l[0] = self.super_prev[0];
        r[0] = self.super_prev[1];
        l[1..frames + 1].copy_from_slice(&lines[0][..frames]);
        r[1..frames + 1].copy_from_slice(&lines[1][..frames]);
        self.super_prev = [lines[0][frames - 1], lines[1][frames - 1]];

        {
            let mut chans: [&mut [f32]; 3] = [
                &mut l[..frames + 1],
                &mut r[..frames + 1],
                &mut scratch[..frames + 1],
            ];
            decoder.decode(&mut chans, frames);
        }

        // Decoded planes are W, X, Y.
        lines[0][..frames].copy_from_slice(&l[..frames]);
        lines[1][..frames].copy_from_slice(&r[..frames]);
        lines[2][..frames].copy_from_slice(&scratch[..frames]);
    }
}

#[inline]
fn mix_ramped(dst: &mut [f32], src: &[f32], current: &mut f32, target: f32, frames: usize) {
    if current.abs() <= GAIN_SILENCE && target.abs() <= GAIN_SILENCE {
        *current = target;
        return;
    }
    let delta = (target - *current) / frames as f32;
    let mut gain = *current;
    for i in 0..frames {
        gain += delta;
        dst[i] += src[i] * gain;
    }
    *current = target;
}

fn mix_hrtf(
    state: &mut HrtfChannelState,
    src: &[f32],
    gain_current: &mut f32,
    gain_target: f32,
    out: &mut [FloatBufferLine],
    frames: usize,
) {
    // Append the gained input to the history.
    let delta = (gain_target - *gain_current) / frames as f32;
    let mut gain = *gain_current;
    for i in 0..frames {
        gain += delta;
        state.history[HRTF_PAD + i] = src[i] * gain;
    }
    *gain_current = gain_target;

    // Delayed FIR per ear.
    for ear in 0..2 {
        let delay = (state.delays[ear] as usize).min(HRTF_PAD - HRIR_LENGTH);
        let line = &mut out[ear];
        for i in 0..frames {
            let base = HRTF_PAD + i - delay;
            let mut acc = 0.0f32;
            for (j, pair) in state.coeffs.iter().enumerate() {
                acc += pair[ear] * state.history[base - j];
            }
            line[i] += acc;
        }
    }

    // Slide: keep the last HRTF_PAD samples for the next block.
    state.history.copy_within(frames..frames + HRTF_PAD, 0);
}

/// Rotate a world-space offset into listener space.
fn rotate_to_listener(v: [f32; 3], l: &ListenerProps) -> [f32; 3] {
    let f = normalize(l.forward);
    let mut u = normalize(l.up);
    let r = normalize(cross(f, u));
    u = cross(r, f);
    [dot(v, r), dot(v, u), -dot(v, f)]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-9 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, -1.0]
    }
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn distance_gain(model: DistanceModel, distance: f32, p: &SourceProps) -> f32 {
    let ref_d = p.ref_distance.max(0.0001);
    let max_d = p.max_distance.max(ref_d);
    let rolloff = p.rolloff.max(0.0);
    let d = match model {
        DistanceModel::InverseClamped
        | DistanceModel::LinearClamped
        | DistanceModel::ExponentClamped => distance.clamp(ref_d, max_d),
        _ => distance,
    };
    match model {
        DistanceModel::None => 1.0,
        DistanceModel::Inverse | DistanceModel::InverseClamped => {
            let denom = ref_d + rolloff * (d - ref_d);
            if denom > 0.0001 {
                ref_d / denom
            } else {
                1.0
            }
        }
        DistanceModel::Linear | DistanceModel::LinearClamped => {
            if max_d > ref_d {
                (1.0 - rolloff * (d - ref_d) / (max_d - ref_d)).clamp(0.0, 1.0)
            } else {
                1.0
            }
        }
        DistanceModel::Exponent | DistanceModel::ExponentClamped => {
            if d > 0.0001 {
                (d / ref_d).powf(-rolloff)
            } else {
                1.0
            }
        }
    }
}

fn cone_gains(p: &SourceProps, l: &ListenerProps) -> (f32, f32) {
    let dir_len =
        (p.direction[0].powi(2) + p.direction[1].powi(2) + p.direction[2].powi(2)).sqrt();
    if dir_len < 1e-6 {
        return (1.0, 1.0);
    }
    let sdir = [
        p.direction[0] / dir_len,
        p.direction[1] / dir_len,
        p.direction[2] / dir_len,
    ];
    let to_l = normalize([
        l.position[0] - p.position[0],
        l.position[1] - p.position[1],
        l.position[2] - p.position[2],
    ]);
    // Full-cone angle toward the listener.
    let angle = 2.0 * dot(sdir, to_l).clamp(-1.0, 1.0).acos().to_degrees();
    if angle <= p.cone_inner_angle {
        (1.0, 1.0)
    } else if angle >= p.cone_outer_angle {
        (p.cone_outer_gain, p.cone_outer_gain_hf)
    } else {
        let scale =
            (angle - p.cone_inner_angle) / (p.cone_outer_angle - p.cone_inner_angle).max(1e-6);
        (
            1.0 + (p.cone_outer_gain - 1.0) * scale,
            1.0 + (p.cone_outer_gain_hf - 1.0) * scale,
        )
    }
}

fn doppler_shift(p: &SourceProps, l: &ListenerProps, ctx: &ContextProps) -> f32 {
    let df = ctx.doppler_factor;
    if df <= 0.0 {
        return 1.0;
    }
    let ss = ctx.speed_of_sound.max(0.0001);
    let to_src = normalize([
        p.position[0] - l.position[0],
        p.position[1] - l.position[1],
        p.position[2] - l.position[2],
    ]);
    let limit = ss / df;
    let vls = dot(l.velocity, to_src).min(limit - 0.001);
    let vss = dot(p.velocity, to_src).min(limit - 0.001);
    ((ss - df * vls) / (ss - df * vss)).clamp(0.1, 10.0)
}

fn is_bformat(ch: BufferChannels) -> bool {
    matches!(ch, BufferChannels::BFormat { .. })
}

fn buffer_layout(ch: BufferChannels) -> ChannelLayout {
    match ch {
        BufferChannels::Mono => ChannelLayout::Mono,
        BufferChannels::Stereo | BufferChannels::Uhj2 => ChannelLayout::Stereo,
        BufferChannels::Quad => ChannelLayout::Quad,
        BufferChannels::X51 => ChannelLayout::X51,
        BufferChannels::X51Rear => ChannelLayout::X51Rear,
        BufferChannels::X61 => ChannelLayout::X61,
        BufferChannels::X71 => ChannelLayout::X71,
        _ => ChannelLayout::Stereo,
    }
}

/// Map one buffer channel to the device output channel carrying the same
/// speaker identity, for the non-spatialized direct path.
fn direct_output_index(
    device: ChannelLayout,
    buffer: ChannelLayout,
    channel: usize,
) -> Option<usize> {
    let speakers = buffer.speakers();
    let identity = speakers.get(channel)?;
    let device_speakers = device.speakers();
    if let Some(idx) = device_speakers.iter().position(|c| c == identity) {
        return Some(idx);
    }
    // A centre feed with no centre speaker lands on the front left as the
    // nearest match; other unmatched channels are dropped.
    if *identity == Channel::FrontCenter {
        return device_speakers
            .iter()
            .position(|c| *c == Channel::FrontLeft);
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn compute_bus_gains(
    panner: &Panner,
    channels: BufferChannels,
    p: &SourceProps,
    is_super: bool,
    channel: usize,
    dir: (f32, f32, f32),
    spread: f32,
    gain: f32,
    out: &mut [f32; MAX_AMBI_CHANNELS],
) {
    match channels {
        BufferChannels::Mono => {
            panner.point_gains(dir, spread, gain, out);
        }
        BufferChannels::BFormat { order, scaling } => {
            panner.bformat_gains(order, scaling, channel, gain, out);
        }
        BufferChannels::Stereo if is_super => {
            // Channels hold decoded W/X/Y planes.
            let acn = match channel {
                0 => 0,
                1 => 3, // X
                _ => 1, // Y
            };
            panner.bformat_gains(
                sf_spatial::AmbiOrder::First,
                sf_core::AmbiScaling::Sn3d,
                acn,
                gain,
                out,
            );
        }
        other => {
            if p.spatialize == SpatializeMode::On {
                // Forced spatialisation collapses every channel onto the
                // source point.
                panner.point_gains(dir, spread, gain, out);
                return;
            }
            let layout = buffer_layout(other);
            let speakers = layout.speakers();
            match speakers
                .get(channel)
                .and_then(|&ch| virtual_source_direction(layout, ch))
            {
                Some((az, el)) => {
                    panner.point_gains(direction_from_angles(az, el), 0.0, gain, out);
                }
                None => {
                    // LFE has no position; it stays out of the sound field.
                    out.fill(0.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> SourceProps {
        SourceProps::default()
    }

    #[test]
    fn test_distance_models() {
        let mut p = props();
        p.ref_distance = 1.0;
        p.rolloff = 1.0;
        p.max_distance = 100.0;

        // Inverse: half gain at double the reference distance.
        let g = distance_gain(DistanceModel::Inverse, 2.0, &p);
        assert!((g - 0.5).abs() < 1e-5);

        // Clamped keeps the gain flat inside the reference distance.
        let g = distance_gain(DistanceModel::InverseClamped, 0.5, &p);
        assert_eq!(g, 1.0);

        // Linear hits zero at max distance.
        let g = distance_gain(DistanceModel::LinearClamped, 100.0, &p);
        assert!(g.abs() < 1e-5);

        // Exponent with rolloff 1 matches inverse at the reference scale.
        let g = distance_gain(DistanceModel::Exponent, 2.0, &p);
        assert!((g - 0.5).abs() < 1e-5);

        // Distance zero must not produce NaN.
        for model in [
            DistanceModel::None,
            DistanceModel::Inverse,
            DistanceModel::Linear,
            DistanceModel::Exponent,
        ] {
            let g = distance_gain(model, 0.0, &p);
            assert!(g.is_finite(), "{model:?}");
        }
    }

    #[test]
    fn test_cone_gains() {
        let mut p = props();
        p.position = [0.0, 0.0, 0.0];
        p.direction = [0.0, 0.0, -1.0];
        p.cone_inner_angle = 60.0;
        p.cone_outer_angle = 180.0;
        p.cone_outer_gain = 0.25;
        let mut l = ListenerProps::default();

        // Listener straight down the cone axis.
        l.position = [0.0, 0.0, -10.0];
        assert_eq!(cone_gains(&p, &l), (1.0, 1.0));

        // Listener behind the source: outer gain.
        l.position = [0.0, 0.0, 10.0];
        let (g, _) = cone_gains(&p, &l);
        assert!((g - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_doppler_toward_listener_raises_pitch() {
        let mut p = props();
        let l = ListenerProps::default();
        let ctx = ContextProps::default();
        p.position = [0.0, 0.0, -10.0];
        p.velocity = [0.0, 0.0, 34.33]; // toward the listener at +z
        let shift = doppler_shift(&p, &l, &ctx);
        assert!(shift > 1.05, "{shift}");
    }

    #[test]
    fn test_listener_rotation() {
        let mut l = ListenerProps::default();
        // Listener facing +x: world +x becomes listener forward (-z).
        l.forward = [1.0, 0.0, 0.0];
        let v = rotate_to_listener([1.0, 0.0, 0.0], &l);
        assert!((v[2] + 1.0).abs() < 1e-5, "{v:?}");
    }

    #[test]
    fn test_direct_output_mapping() {
        // Stereo buffer on a 7.1 device: FL/FR map to outputs 0/1.
        assert_eq!(
            direct_output_index(ChannelLayout::X71, ChannelLayout::Stereo, 0),
            Some(0)
        );
        assert_eq!(
            direct_output_index(ChannelLayout::X71, ChannelLayout::Stereo, 1),
            Some(1)
        );
        // Mono maps to the centre on 7.1, front-left on stereo.
        assert_eq!(
            direct_output_index(ChannelLayout::X71, ChannelLayout::Mono, 0),
            Some(2)
        );
        assert_eq!(
            direct_output_index(ChannelLayout::Stereo, ChannelLayout::Mono, 0),
            Some(0)
        );
    }
}
