//! Source bookkeeping shared between the API threads and the mix thread.

use crate::props::PropsQueue;
use crate::types::{SourceProps, SourceState};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Cross-thread state of one source: the property queue plus the read-only
/// feedback the mix thread publishes (state, playback cursor).
pub struct SourceShared {
    pub(crate) props: PropsQueue<SourceProps>,
    state: AtomicU8,
    position: AtomicU64,
}

impl SourceShared {
    pub(crate) fn new() -> Self {
        Self {
            props: PropsQueue::new(),
            state: AtomicU8::new(SourceState::Initial as u8),
            position: AtomicU64::new(0),
        }
    }

    /// Current playback state.
    pub fn state(&self) -> SourceState {
        SourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Playback cursor in source frames from the start of the queue.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub(crate) fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Release);
    }
}
