//! Buffer slot: one fixed queue entry and its ownership state

use crate::buffer::{BufferRequestConfig, Rect, SurfaceBuffer};
use crate::fence::SyncFence;
use std::sync::Arc;

/// Ownership state of a slot. Exactly one of producer, consumer or
/// nobody may touch the slot's buffer, determined solely by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Dequeued,
    Queued,
    Acquired,
}

/// One entry of the queue, owning a reusable buffer.
pub(crate) struct BufferSlot {
    pub(crate) state: SlotState,
    /// None until the first request allocates for this slot.
    pub(crate) buffer: Option<Arc<SurfaceBuffer>>,
    /// Meaning depends on state: the consumer's release fence while FREE,
    /// the producer's acquire fence while QUEUED.
    pub(crate) fence: Option<SyncFence>,
    /// Config of the last allocation, to detect reallocation need.
    pub(crate) config: Option<BufferRequestConfig>,
    pub(crate) timestamp: i64,
    pub(crate) damage: Rect,
}

impl BufferSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: SlotState::Free,
            buffer: None,
            fence: None,
            config: None,
            timestamp: 0,
            damage: Rect::default(),
        }
    }

    /// Whether the slot's current allocation can serve `cfg` unchanged.
    pub(crate) fn reusable_for(&self, cfg: &BufferRequestConfig) -> bool {
        match (&self.buffer, &self.config) {
            (Some(buffer), Some(_)) => buffer.matches(cfg),
            _ => false,
        }
    }

    /// Drop buffer and fence, returning the slot to its unallocated state.
    pub(crate) fn clear(&mut self) {
        self.state = SlotState::Free;
        self.buffer = None;
        self.fence = None;
        self.config = None;
        self.timestamp = 0;
        self.damage = Rect::default();
    }
}
