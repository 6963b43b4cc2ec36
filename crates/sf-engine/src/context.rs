//! Contexts: the API-facing mixing scene
//!
//! A context owns its sources and effect slots. API threads mutate them
//! through property snapshots (lock-free publish) and one-shot commands
//! (a bounded queue drained by the mixer); nothing here ever blocks the
//! mix thread.

use crate::buffer::SampleBuffer;
use crate::error::{EngineError, EngineResult};
use crate::props::PropsQueue;
use crate::slot::SlotShared;
use crate::source::SourceShared;
use crate::types::{
    ContextProps, ListenerProps, MixCommand, SlotProps, SourceProps, SourceState,
};
use parking_lot::Mutex;
use sf_effects::{create_effect, DeviceInfo, EffectKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

struct SourceEntry {
    shared: Arc<SourceShared>,
    props: SourceProps,
    queue: Vec<Arc<SampleBuffer>>,
}

struct SlotEntry {
    shared: Arc<SlotShared>,
    props: SlotProps,
    kind: EffectKind,
}

pub(crate) struct ContextInner {
    pub(crate) device_info: DeviceInfo,
    default_resampler: sf_dsp::ResamplerKind,
    sources: Mutex<HashMap<u32, SourceEntry>>,
    slots: Mutex<HashMap<u32, SlotEntry>>,
    next_id: AtomicU32,
    pub(crate) listener: PropsQueue<ListenerProps>,
    listener_mirror: Mutex<ListenerProps>,
    pub(crate) props: PropsQueue<ContextProps>,
    props_mirror: Mutex<ContextProps>,
    commands: Mutex<rtrb::Producer<MixCommand>>,
    pub(crate) deferring: AtomicBool,
}

/// A logical mixing scene bound to one device.
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(
        device_info: DeviceInfo,
        default_resampler: sf_dsp::ResamplerKind,
        commands: rtrb::Producer<MixCommand>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                device_info,
                default_resampler,
                sources: Mutex::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU32::new(1),
                listener: PropsQueue::new(),
                listener_mirror: Mutex::new(ListenerProps::default()),
                props: PropsQueue::new(),
                props_mirror: Mutex::new(ContextProps::default()),
                commands: Mutex::new(commands),
                deferring: AtomicBool::new(false),
            }),
        }
    }

    fn send_command(&self, command: MixCommand) {
        let mut producer = self.inner.commands.lock();
        let mut pending = Some(command);
        for _ in 0..100_000 {
            match producer.push(pending.take().expect("command present")) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(returned)) => {
                    pending = Some(returned);
                    std::thread::yield_now();
                }
            }
        }
        log::error!("mix command queue saturated; dropping command");
    }

    // -- Sources ----------------------------------------------------------

    /// Create a source. Its properties start at the defaults.
    pub fn add_source(&self) -> u32 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut props = SourceProps::default();
        props.resampler = self.inner.default_resampler;
        let entry = SourceEntry {
            shared: Arc::new(SourceShared::new()),
            props,
            queue: Vec::new(),
        };
        entry.shared.props.publish(props);
        self.inner.sources.lock().insert(id, entry);
        id
    }

    /// Destroy a source, stopping its voice.
    pub fn remove_source(&self, id: u32) -> EngineResult<()> {
        let removed = self.inner.sources.lock().remove(&id);
        match removed {
            Some(_) => {
                self.send_command(MixCommand::DestroySource { source: id });
                Ok(())
            }
            None => Err(EngineError::NoSuchObject {
                kind: "source",
                id,
            }),
        }
    }

    /// Read-modify-publish a source's properties.
    pub fn with_source_props<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut SourceProps) -> R,
    ) -> EngineResult<R> {
        let mut sources = self.inner.sources.lock();
        let entry = sources.get_mut(&id).ok_or(EngineError::NoSuchObject {
            kind: "source",
            id,
        })?;
        let mut staged = entry.props;
        let result = f(&mut staged);
        validate_source_props(&staged)?;
        entry.props = staged;
        entry.shared.props.publish(staged);
        Ok(result)
    }

    /// A copy of the source's current (API-visible) properties.
    pub fn source_props(&self, id: u32) -> EngineResult<SourceProps> {
        let sources = self.inner.sources.lock();
        sources
            .get(&id)
            .map(|e| e.props)
            .ok_or(EngineError::NoSuchObject {
                kind: "source",
                id,
            })
    }

    /// Append a buffer to the source's queue. All queued buffers must share
    /// the first buffer's channel format and sample rate.
    pub fn queue_buffer(&self, id: u32, buffer: Arc<SampleBuffer>) -> EngineResult<()> {
        let mut sources = self.inner.sources.lock();
        let entry = sources.get_mut(&id).ok_or(EngineError::NoSuchObject {
            kind: "source",
            id,
        })?;
        if let Some(first) = entry.queue.first() {
            if first.channels() != buffer.channels()
                || first.sample_rate() != buffer.sample_rate()
            {
                return Err(EngineError::UnsupportedFormat(
                    "queued buffers must share one format".into(),
                ));
            }
        }
        entry.queue.push(buffer);
        Ok(())
    }

    /// Drop every queued buffer. Only valid while not playing.
    pub fn clear_queue(&self, id: u32) -> EngineResult<()> {
        let mut sources = self.inner.sources.lock();
        let entry = sources.get_mut(&id).ok_or(EngineError::NoSuchObject {
            kind: "source",
            id,
        })?;
        if entry.shared.state() == SourceState::Playing {
            return Err(EngineError::InvalidOperation(
                "cannot clear the queue of a playing source".into(),
            ));
        }
        entry.queue.clear();
        Ok(())
    }

    /// Begin playback from the top of the queue.
    pub fn play(&self, id: u32) -> EngineResult<()> {
        let sources = self.inner.sources.lock();
        let entry = sources.get(&id).ok_or(EngineError::NoSuchObject {
            kind: "source",
            id,
        })?;
        if entry.queue.is_empty() {
            entry.shared.set_state(SourceState::Stopped);
            return Ok(());
        }
        entry.shared.set_state(SourceState::Playing);
        let shared = Arc::clone(&entry.shared);
        let queue = entry.queue.clone();
        drop(sources);
        self.send_command(MixCommand::Play {
            source: id,
            shared,
            queue,
        });
        Ok(())
    }

    /// Pause a playing source.
    pub fn pause(&self, id: u32) -> EngineResult<()> {
        self.expect_source(id)?;
        self.send_command(MixCommand::Pause { source: id });
        Ok(())
    }

    /// Resume a paused source.
    pub fn resume(&self, id: u32) -> EngineResult<()> {
        self.expect_source(id)?;
        self.send_command(MixCommand::Resume { source: id });
        Ok(())
    }

    /// Stop with a one-period fade-out.
    pub fn stop(&self, id: u32) -> EngineResult<()> {
        self.expect_source(id)?;
        self.send_command(MixCommand::Stop { source: id });
        Ok(())
    }

    /// Return the source to its initial state.
    pub fn rewind(&self, id: u32) -> EngineResult<()> {
        self.expect_source(id)?;
        self.send_command(MixCommand::Rewind { source: id });
        Ok(())
    }

    /// Source playback state.
    pub fn source_state(&self, id: u32) -> EngineResult<SourceState> {
        let sources = self.inner.sources.lock();
        sources
            .get(&id)
            .map(|e| e.shared.state())
            .ok_or(EngineError::NoSuchObject {
                kind: "source",
                id,
            })
    }

    /// Playback cursor in source frames.
    pub fn source_position(&self, id: u32) -> EngineResult<u64> {
        let sources = self.inner.sources.lock();
        sources
            .get(&id)
            .map(|e| e.shared.position())
            .ok_or(EngineError::NoSuchObject {
                kind: "source",
                id,
            })
    }

    fn expect_source(&self, id: u32) -> EngineResult<()> {
        if self.inner.sources.lock().contains_key(&id) {
            Ok(())
        } else {
            Err(EngineError::NoSuchObject {
                kind: "source",
                id,
            })
        }
    }

    // -- Listener and context properties ----------------------------------

    /// Read-modify-publish the listener.
    pub fn with_listener<R>(&self, f: impl FnOnce(&mut ListenerProps) -> R) -> R {
        let mut mirror = self.inner.listener_mirror.lock();
        let result = f(&mut mirror);
        self.inner.listener.publish(*mirror);
        result
    }

    /// Read-modify-publish the context parameters (distance model, Doppler,
    /// default slot).
    pub fn with_props<R>(&self, f: impl FnOnce(&mut ContextProps) -> R) -> R {
        let mut mirror = self.inner.props_mirror.lock();
        let result = f(&mut mirror);
        self.inner.props.publish(*mirror);
        result
    }

    /// Stage subsequent property writes; the mixer keeps observing the
    /// pre-defer state until [`Context::process_updates`].
    pub fn defer_updates(&self) {
        self.inner.deferring.store(true, Ordering::Release);
    }

    /// Atomically expose every property written since the defer.
    pub fn process_updates(&self) {
        self.inner.deferring.store(false, Ordering::Release);
    }

    // -- Effect slots ------------------------------------------------------

    /// Create an effect slot hosting the given kernel.
    pub fn add_slot(&self, kind: EffectKind) -> u32 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SlotShared::new());
        let entry = SlotEntry {
            shared: Arc::clone(&shared),
            props: SlotProps::default(),
            kind,
        };
        entry.shared.props.publish(entry.props.clone());
        self.inner.slots.lock().insert(id, entry);

        let processor = create_effect(kind, &self.inner.device_info);
        self.send_command(MixCommand::SetSlotEffect {
            slot: id,
            shared,
            processor,
        });
        id
    }

    /// Destroy a slot. Fails while any source send still targets it.
    pub fn remove_slot(&self, id: u32) -> EngineResult<()> {
        {
            let sources = self.inner.sources.lock();
            let in_use = sources.values().any(|s| {
                s.props
                    .sends
                    .iter()
                    .any(|send| send.slot == Some(id))
            });
            if in_use {
                return Err(EngineError::InvalidOperation(
                    "slot is still targeted by a source send".into(),
                ));
            }
        }
        let removed = self.inner.slots.lock().remove(&id);
        match removed {
            Some(_) => {
                self.send_command(MixCommand::DestroySlot { slot: id });
                Ok(())
            }
            None => Err(EngineError::NoSuchObject { kind: "slot", id }),
        }
    }

    /// Swap the kernel a slot hosts.
    pub fn set_slot_effect(&self, id: u32, kind: EffectKind) -> EngineResult<()> {
        let shared = {
            let mut slots = self.inner.slots.lock();
            let entry = slots.get_mut(&id).ok_or(EngineError::NoSuchObject {
                kind: "slot",
                id,
            })?;
            entry.kind = kind;
            Arc::clone(&entry.shared)
        };
        let processor = create_effect(kind, &self.inner.device_info);
        self.send_command(MixCommand::SetSlotEffect {
            slot: id,
            shared,
            processor,
        });
        Ok(())
    }

    /// Read-modify-publish a slot's parameters. Retargeting that would
    /// close a cycle is refused.
    pub fn with_slot_props<R>(
        &self,
        id: u32,
        f: impl FnOnce(&mut SlotProps) -> R,
    ) -> EngineResult<R> {
        let mut slots = self.inner.slots.lock();
        if !slots.contains_key(&id) {
            return Err(EngineError::NoSuchObject { kind: "slot", id });
        }

        let mut staged = slots.get(&id).map(|e| e.props.clone()).expect("checked");
        let result = f(&mut staged);

        if let Some(target) = staged.target {
            if target == id || would_cycle(&slots, id, target) {
                return Err(EngineError::InvalidOperation(
                    "slot target would form a cycle".into(),
                ));
            }
            if !slots.contains_key(&target) {
                return Err(EngineError::NoSuchObject {
                    kind: "slot",
                    id: target,
                });
            }
        }

        let entry = slots.get_mut(&id).expect("checked");
        entry.props = staged.clone();
        entry.shared.props.publish(staged);
        Ok(result)
    }

    /// The slot's current parameters.
    pub fn slot_props(&self, id: u32) -> EngineResult<SlotProps> {
        let slots = self.inner.slots.lock();
        slots
            .get(&id)
            .map(|e| e.props.clone())
            .ok_or(EngineError::NoSuchObject { kind: "slot", id })
    }
}

/// Walk the target chain from `start`; reaching `needle` closes a cycle.
fn would_cycle(slots: &HashMap<u32, SlotEntry>, needle: u32, start: u32) -> bool {
    let mut current = Some(start);
    let mut hops = 0;
    while let Some(id) = current {
        if id == needle {
            return true;
        }
        hops += 1;
        if hops > slots.len() + 1 {
            return true;
        }
        current = slots.get(&id).and_then(|e| e.props.target);
    }
    false
}

fn validate_source_props(p: &SourceProps) -> EngineResult<()> {
    if !(0.0..=1000.0).contains(&p.gain) || !p.gain.is_finite() {
        return Err(EngineError::InvalidValue(format!("gain {}", p.gain)));
    }
    if p.pitch < 0.0 || !p.pitch.is_finite() {
        return Err(EngineError::InvalidValue(format!("pitch {}", p.pitch)));
    }
    if p.ref_distance < 0.0 || p.rolloff < 0.0 {
        return Err(EngineError::InvalidValue("negative distance factor".into()));
    }
    if !(0.0..=360.0).contains(&p.cone_inner_angle)
        || !(0.0..=360.0).contains(&p.cone_outer_angle)
    {
        return Err(EngineError::InvalidValue("cone angle out of range".into()));
    }
    Ok(())
}
