//! The per-device mixer driver
//!
//! Runs once per device period on the backend's clock: drains one-shot
//! commands, lets every voice contribute to the dry bus and effect sends,
//! processes effect slots in dependency order, applies listener-scope
//! post-processing, decodes to the device layout, and converts to the
//! output sample format. The `mix_count` seqlock brackets the whole body
//! so latency queries can detect a mid-mix read.

use crate::context::ContextInner;
use crate::device::{DeviceShared, RenderMode};
use crate::slot::SlotRender;
use crate::types::{ContextProps, ListenerProps, MixCommand};
use crate::voice::{MixEnv, Voice};
use sf_backend::StreamConfig;
use sf_core::{
    clear_lines, write_sample, Channel, FloatBufferLine, BUFFER_LINE_SIZE, INV_SQRT2,
};
use sf_dsp::{DistanceComp, FrontStabilizer, Limiter, NfcFilter, UhjEncoder};
use sf_spatial::{BFormatDecoder, DirectHrtfState, HrtfStore, Panner};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Per-context mix-thread state.
pub(crate) struct ContextRender {
    pub shared: Arc<ContextInner>,
    pub commands: rtrb::Consumer<MixCommand>,
    pub listener: ListenerProps,
    pub ctx_props: ContextProps,
    pub voices: Vec<Voice>,
    /// Retired voices kept for reuse; stopping a voice never frees its
    /// channel state on the mix thread.
    pub free_voices: Vec<Voice>,
    pub slots: Vec<SlotRender>,
}

/// Everything the mix callback owns.
pub(crate) struct RenderState {
    pub config: StreamConfig,
    pub mode: RenderMode,
    pub panner: Panner,
    pub hrtf_store: Option<Arc<HrtfStore>>,
    /// Dry ambisonic bus.
    bus: Vec<FloatBufferLine>,
    /// Decoded (or binaural/UHJ) output lines.
    real_out: Vec<FloatBufferLine>,
    /// Non-spatialized direct contributions, per output channel.
    direct_out: Vec<FloatBufferLine>,
    /// Per-source HRTF contributions (left, right).
    hrtf_direct: Vec<FloatBufferLine>,
    decoder: Option<BFormatDecoder>,
    hrtf_renderer: Option<DirectHrtfState>,
    uhj_encoder: Option<UhjEncoder>,
    nfc: Vec<NfcFilter>,
    distance_comp: Option<DistanceComp>,
    stabilizer: Option<FrontStabilizer>,
    limiter: Option<Limiter>,
    /// Reusable key buffer for the slot dependency sort.
    sort_scratch: Vec<(usize, u32)>,
    pub contexts: Vec<ContextRender>,
}

impl RenderState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: StreamConfig,
        mode: RenderMode,
        panner: Panner,
        hrtf_store: Option<Arc<HrtfStore>>,
        decoder: Option<BFormatDecoder>,
        hrtf_renderer: Option<DirectHrtfState>,
        uhj_encoder: Option<UhjEncoder>,
        nfc: Vec<NfcFilter>,
        distance_comp: Option<DistanceComp>,
        stabilizer: Option<FrontStabilizer>,
        limiter: Option<Limiter>,
    ) -> Self {
        let out_channels = match mode {
            RenderMode::Hrtf | RenderMode::Uhj => 2,
            _ => config.layout.count(),
        };
        Self {
            config,
            mode,
            bus: vec![[0.0; BUFFER_LINE_SIZE]; panner.line_count()],
            real_out: vec![[0.0; BUFFER_LINE_SIZE]; out_channels],
            direct_out: vec![[0.0; BUFFER_LINE_SIZE]; out_channels],
            hrtf_direct: vec![[0.0; BUFFER_LINE_SIZE]; 2],
            panner,
            hrtf_store,
            decoder,
            hrtf_renderer,
            uhj_encoder,
            nfc,
            distance_comp,
            stabilizer,
            limiter,
            sort_scratch: Vec::with_capacity(32),
            contexts: Vec::new(),
        }
    }

    /// The mix body: produce exactly `frames` interleaved frames.
    pub(crate) fn mix(&mut self, shared: &DeviceShared, out: &mut [u8], frames: usize) {
        let frames = frames.min(BUFFER_LINE_SIZE);

        // A lost device produces silence without touching voice state.
        if !shared.is_connected() {
            self.write_silence(out, frames);
            return;
        }

        // Open the seqlock (odd = mix in progress).
        let count = shared.mix_count.load(Ordering::Relaxed);
        shared.mix_count.store(count | 1, Ordering::Release);

        clear_lines(&mut self.bus, frames);
        clear_lines(&mut self.direct_out, frames);
        clear_lines(&mut self.hrtf_direct, frames);

        for ctx in self.contexts.iter_mut() {
            // One-shot commands first.
            drain_commands(ctx);

            let ContextRender {
                shared: ctx_shared,
                listener,
                ctx_props,
                voices,
                free_voices,
                slots,
                ..
            } = &mut *ctx;

            // Defer mode freezes every property snapshot this iteration.
            let skip_updates = ctx_shared.deferring.load(Ordering::Acquire);
            let mut force_update = false;
            if !skip_updates {
                if let Some(new_listener) = ctx_shared.listener.consume() {
                    *listener = new_listener;
                    force_update = true;
                }
                if let Some(new_props) = ctx_shared.props.consume() {
                    *ctx_props = new_props;
                    force_update = true;
                }
            }

            // The implicit default send only lands on a slot that accepts
            // auto sends.
            let mut effective_props = *ctx_props;
            effective_props.default_slot = effective_props.default_slot.filter(|id| {
                slots
                    .iter()
                    .find(|s| s.id == *id)
                    .map(|s| s.send_auto)
                    .unwrap_or(false)
            });

            let env = MixEnv {
                config: self.config,
                mode: self.mode,
                panner: &self.panner,
                listener,
                ctx: &effective_props,
                hrtf: self.hrtf_store.as_ref(),
                force_update,
                skip_updates,
            };

            // Finished voices retire to the pool at the iteration boundary
            // instead of being freed here.
            let mut vi = 0;
            while vi < voices.len() {
                let alive = voices[vi].mix(
                    &env,
                    &mut self.bus,
                    &mut self.direct_out,
                    &mut self.hrtf_direct,
                    slots,
                    frames,
                );
                if alive {
                    vi += 1;
                } else {
                    free_voices.push(voices.swap_remove(vi));
                }
            }

            // Slot parameters, then slot processing in dependency order.
            if !skip_updates {
                for slot in slots.iter_mut() {
                    if let Some(props) = slot.shared.props.consume() {
                        slot.gain = props.gain;
                        slot.target = props.target;
                        slot.send_auto = props.send_auto;
                        slot.processor.update(&props.effect);
                    }
                }
            }
            sort_slots(slots, &mut self.sort_scratch);

            for i in 0..slots.len() {
                let (head, tail) = slots.split_at_mut(i + 1);
                let slot = &mut head[i];

                // Slot gain scales its accumulated input.
                if slot.gain != 1.0 {
                    for line in slot.input.iter_mut() {
                        for s in line[..frames].iter_mut() {
                            *s *= slot.gain;
                        }
                    }
                }

                match slot.target {
                    Some(target_id) => {
                        if let Some(target) = tail.iter_mut().find(|s| s.id == target_id) {
                            slot.processor.process(frames, &slot.input, &mut target.input);
                        } else {
                            slot.processor.process(frames, &slot.input, &mut self.bus);
                        }
                    }
                    None => {
                        slot.processor.process(frames, &slot.input, &mut self.bus);
                    }
                }
                clear_lines(&mut slot.input, frames);
            }
        }

        // Listener-scope post-processing on the bus.
        for (filter, line) in self.nfc.iter_mut().zip(self.bus.iter_mut()) {
            filter.process(&mut line[..frames]);
        }

        // Decode to the device layout.
        match self.mode {
            RenderMode::Speakers => {
                if let Some(decoder) = &mut self.decoder {
                    decoder.process(&mut self.real_out, &mut self.bus, frames);
                }
            }
            RenderMode::Hrtf => {
                if let Some(renderer) = &mut self.hrtf_renderer {
                    let (left, right) = self.real_out.split_at_mut(1);
                    renderer.process(&mut left[0], &mut right[0], &mut self.bus, frames);
                }
            }
            RenderMode::Uhj => {
                if let Some(encoder) = &mut self.uhj_encoder {
                    // Bus is first-order 2D: lines are W, Y, X. The encoder
                    // wants FuMa-scaled W.
                    let mut w = [0.0f32; BUFFER_LINE_SIZE];
                    for i in 0..frames {
                        w[i] = self.bus[0][i] * INV_SQRT2;
                    }
                    let y = self.bus[1];
                    let x = self.bus[2];
                    let (left, right) = self.real_out.split_at_mut(1);
                    encoder.encode(
                        &mut left[0][..frames],
                        &mut right[0][..frames],
                        &w,
                        &x,
                        &y,
                        frames,
                    );
                }
            }
            RenderMode::AmbiRaw => {
                for (out, line) in self.real_out.iter_mut().zip(self.bus.iter()) {
                    out[..frames].copy_from_slice(&line[..frames]);
                }
            }
        }

        // Fold in the non-bus paths.
        for (out, direct) in self.real_out.iter_mut().zip(self.direct_out.iter()) {
            for i in 0..frames {
                out[i] += direct[i];
            }
        }
        if self.mode == RenderMode::Hrtf {
            for (out, direct) in self.real_out.iter_mut().zip(self.hrtf_direct.iter()) {
                for i in 0..frames {
                    out[i] += direct[i];
                }
            }
        }

        // Real-output post-processing.
        if let Some(comp) = &mut self.distance_comp {
            comp.process(&mut self.real_out, frames);
        }
        if let Some(stab) = &mut self.stabilizer {
            if let Some((left, right, center)) = stabilizer_channels(self.config) {
                stab.process(&mut self.real_out, frames, left, right, center);
            }
        }
        if let Some(limiter) = &mut self.limiter {
            limiter.process(&mut self.real_out, frames);
        }

        // Convert and interleave.
        let channels = self.real_out.len();
        let bytes = self.config.sample_type.bytes();
        for i in 0..frames {
            for (c, line) in self.real_out.iter().enumerate() {
                write_sample(out, (i * channels + c) * bytes, self.config.sample_type, line[i]);
            }
        }

        // Close the seqlock (even again, advanced).
        shared.mix_count.store(count.wrapping_add(2), Ordering::Release);
    }

    fn write_silence(&self, out: &mut [u8], frames: usize) {
        let channels = self.real_out.len();
        let bytes = self.config.sample_type.bytes();
        for i in 0..frames * channels {
            write_sample(out, i * bytes, self.config.sample_type, 0.0);
        }
    }
}

fn drain_commands(ctx: &mut ContextRender) {
    while let Ok(command) = ctx.commands.pop() {
        match command {
            MixCommand::Play {
                source,
                shared,
                queue,
            } => {
                if let Some(voice) = ctx.voices.iter_mut().find(|v| v.source_id == source) {
                    voice.restart(queue);
                } else if let Some(mut voice) = ctx.free_voices.pop() {
                    voice.reinit(source, shared, queue);
                    ctx.voices.push(voice);
                } else {
                    ctx.voices.push(Voice::new(source, shared, queue));
                }
            }
            MixCommand::Pause { source } => {
                if let Some(voice) = ctx.voices.iter_mut().find(|v| v.source_id == source) {
                    voice.pause();
                }
            }
            MixCommand::Resume { source } => {
                if let Some(voice) = ctx.voices.iter_mut().find(|v| v.source_id == source) {
                    voice.resume();
                }
            }
            MixCommand::Stop { source } => {
                if let Some(voice) = ctx.voices.iter_mut().find(|v| v.source_id == source) {
                    voice.stop();
                }
            }
            MixCommand::Rewind { source } => {
                if let Some(voice) = ctx.voices.iter_mut().find(|v| v.source_id == source) {
                    voice.rewind();
                }
            }
            MixCommand::DestroySource { source } => {
                let mut vi = 0;
                while vi < ctx.voices.len() {
                    if ctx.voices[vi].source_id == source {
                        let voice = ctx.voices.swap_remove(vi);
                        ctx.free_voices.push(voice);
                    } else {
                        vi += 1;
                    }
                }
            }
            MixCommand::SetSlotEffect {
                slot,
                shared,
                processor,
            } => {
                if let Some(existing) = ctx.slots.iter_mut().find(|s| s.id == slot) {
                    existing.processor = processor;
                    existing.shared = shared;
                } else {
                    let channels = ctx
                        .shared
                        .device_info
                        .bus_channels;
                    ctx.slots
                        .push(SlotRender::new(slot, shared, processor, channels));
                }
            }
            MixCommand::DestroySlot { slot } => {
                ctx.slots.retain(|s| s.id != slot);
            }
        }
    }
}

/// Order slots so feeders run before their targets: sort by descending
/// depth of the target chain. `scratch` is the caller's reusable key
/// buffer; it only grows when the slot count does.
fn sort_slots(slots: &mut [SlotRender], scratch: &mut Vec<(usize, u32)>) {
    if slots.len() < 2 || slots.iter().all(|s| s.target.is_none()) {
        return;
    }
    let depth = |slots: &[SlotRender], id: u32| -> usize {
        let mut d = 0usize;
        let mut current = slots.iter().find(|s| s.id == id).and_then(|s| s.target);
        while let Some(next) = current {
            d += 1;
            if d > slots.len() {
                break;
            }
            current = slots.iter().find(|s| s.id == next).and_then(|s| s.target);
        }
        d
    };
    scratch.clear();
    scratch.extend(slots.iter().map(|s| (depth(slots, s.id), s.id)));
    scratch.sort_by(|a, b| b.0.cmp(&a.0));
    // Selection-sort the slots into the keyed order (small N).
    for (pos, &(_, id)) in scratch.iter().enumerate() {
        let idx = slots[pos..]
            .iter()
            .position(|s| s.id == id)
            .map(|off| pos + off)
            .expect("slot present");
        slots.swap(pos, idx);
    }
}

/// Front-left/right/centre output indices for the stabilizer, if the
/// layout carries a centre speaker.
fn stabilizer_channels(config: StreamConfig) -> Option<(usize, usize, usize)> {
    let speakers = config.layout.speakers();
    let left = speakers.iter().position(|c| *c == Channel::FrontLeft)?;
    let right = speakers.iter().position(|c| *c == Channel::FrontRight)?;
    let center = speakers.iter().position(|c| *c == Channel::FrontCenter)?;
    Some((left, right, center))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::PropsQueue;
    use crate::slot::{SlotRender, SlotShared};
    use sf_effects::{create_effect, DeviceInfo, EffectKind};

    fn make_slot(id: u32, target: Option<u32>) -> SlotRender {
        let info = DeviceInfo {
            sample_rate: 48000,
            update_size: 64,
            bus_channels: 4,
        };
        let mut slot = SlotRender::new(
            id,
            Arc::new(SlotShared {
                props: PropsQueue::new(),
            }),
            create_effect(EffectKind::Null, &info),
            4,
        );
        slot.target = target;
        slot
    }

    #[test]
    fn test_sort_slots_feeders_first() {
        // c feeds b feeds a (dry). Order must be c, b, a.
        let mut slots = vec![
            make_slot(1, None),
            make_slot(2, Some(1)),
            make_slot(3, Some(2)),
        ];
        let mut scratch = Vec::new();
        sort_slots(&mut slots, &mut scratch);
        assert_eq!(slots[0].id, 3);
        assert_eq!(slots[1].id, 2);
        assert_eq!(slots[2].id, 1);
    }

    #[test]
    fn test_stabilizer_channels() {
        let config = StreamConfig {
            layout: sf_core::ChannelLayout::X51,
            ..Default::default()
        };
        assert_eq!(stabilizer_channels(config), Some((0, 1, 2)));

        let stereo = StreamConfig::default();
        assert_eq!(stabilizer_channels(stereo), None);
    }
}
