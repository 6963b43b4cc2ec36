//! Effect slot bookkeeping
//!
//! API threads publish slot parameters through the property queue; the
//! kernel itself (which owns allocations) travels to the mix thread over
//! the command queue. The mix-side [`SlotRender`] pairs the kernel with its
//! ambisonic input accumulator.

use crate::props::PropsQueue;
use crate::types::SlotProps;
use sf_core::FloatBufferLine;
use sf_effects::EffectProcessor;
use std::sync::Arc;

/// Cross-thread state of one effect slot.
pub struct SlotShared {
    pub(crate) props: PropsQueue<SlotProps>,
}

impl SlotShared {
    pub(crate) fn new() -> Self {
        Self {
            props: PropsQueue::new(),
        }
    }
}

/// Mix-thread resident slot: the kernel, its input accumulator, and the
/// last-consumed routing parameters.
pub(crate) struct SlotRender {
    pub id: u32,
    pub shared: Arc<SlotShared>,
    pub processor: Box<dyn EffectProcessor>,
    /// Ambisonic input accumulator, matching the dry bus layout.
    pub input: Vec<FloatBufferLine>,
    pub gain: f32,
    /// Output target slot, or `None` for the dry bus.
    pub target: Option<u32>,
    pub send_auto: bool,
}

impl SlotRender {
    pub(crate) fn new(
        id: u32,
        shared: Arc<SlotShared>,
        processor: Box<dyn EffectProcessor>,
        bus_channels: usize,
    ) -> Self {
        Self {
            id,
            shared,
            processor,
            input: vec![[0.0; sf_core::BUFFER_LINE_SIZE]; bus_channels],
            gain: 1.0,
            target: None,
            send_auto: true,
        }
    }
}
