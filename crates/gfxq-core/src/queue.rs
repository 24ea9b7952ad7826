//! Buffer queue state machine core

use crate::buffer::{BufferRequestConfig, FlushConfig, Rect, SurfaceBuffer};
use crate::fence::SyncFence;
use crate::slot::{BufferSlot, SlotState};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Queues smaller than this cannot double-buffer.
pub const MIN_QUEUE_SIZE: usize = 2;
/// Hard upper bound on slot count.
pub const MAX_QUEUE_SIZE: usize = 32;

/// Callback invoked once per flush, after the frame entered the FIFO.
/// Runs outside the queue lock, so it may acquire immediately.
pub type OnBufferAvailable = Arc<dyn Fn() + Send + Sync>;

/// Construction parameters for a queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_size: usize,
    /// Geometry producers get when they do not override per request.
    pub default_config: BufferRequestConfig,
}

impl QueueConfig {
    pub fn new(queue_size: usize, default_config: BufferRequestConfig) -> Self {
        Self {
            queue_size,
            default_config,
        }
    }
}

/// Result of a successful dequeue.
pub struct RequestedBuffer {
    pub buffer: Arc<SurfaceBuffer>,
    /// Consumer's fence from the previous release of this slot; the
    /// producer must wait on it before reusing the pixel memory.
    pub release_fence: Option<SyncFence>,
}

/// Result of a successful acquire.
pub struct AcquiredBuffer {
    pub buffer: Arc<SurfaceBuffer>,
    /// Producer's fence from flush; the consumer must wait on it before
    /// reading.
    pub fence: Option<SyncFence>,
    pub timestamp: i64,
    pub damage: Rect,
}

struct QueueInner {
    slots: Vec<BufferSlot>,
    /// Queued slot indices in flush order. Delivery order is FIFO order,
    /// never slot-index order.
    fifo: VecDeque<usize>,
    next_seq: u64,
    listener: Option<OnBufferAvailable>,
    producer_gone: bool,
    consumer_gone: bool,
    disconnected: bool,
}

/// The buffer queue: single source of truth for buffer ownership.
///
/// All slot-state transitions are serialized under one mutex. None of the
/// operations block on fences; fence waiting is the caller's explicit
/// follow-up step, done outside the lock.
pub struct BufferQueue {
    name: String,
    default_config: BufferRequestConfig,
    inner: Mutex<QueueInner>,
}

impl BufferQueue {
    pub fn new(name: &str, config: QueueConfig) -> Result<Arc<Self>> {
        if name.is_empty() {
            return Err(Error::InvalidParam("empty queue name"));
        }
        if config.queue_size < MIN_QUEUE_SIZE || config.queue_size > MAX_QUEUE_SIZE {
            return Err(Error::InvalidParam("queue size out of range"));
        }

        let slots = (0..config.queue_size).map(|_| BufferSlot::new()).collect();
        Ok(Arc::new(Self {
            name: name.to_string(),
            default_config: config.default_config,
            inner: Mutex::new(QueueInner {
                slots,
                fifo: VecDeque::new(),
                next_seq: 0,
                listener: None,
                producer_gone: false,
                consumer_gone: false,
                disconnected: false,
            }),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_config(&self) -> BufferRequestConfig {
        self.default_config
    }

    /// FREE → DEQUEUED. Prefers a FREE slot whose existing allocation
    /// matches `cfg`; otherwise takes any FREE slot and reallocates.
    /// `NoBuffer` when every slot is busy. This is the backpressure point.
    pub fn request_buffer(&self, cfg: &BufferRequestConfig) -> Result<RequestedBuffer> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(Error::InvalidParam("zero width or height"));
        }

        let mut inner = self.inner.lock().unwrap();
        Self::check_live(&inner)?;

        let index = Self::pick_free_slot(&inner, cfg).ok_or(Error::NoBuffer)?;

        // Reallocate outside the happy path only; the common case is a
        // producer requesting the same geometry every frame.
        if !inner.slots[index].reusable_for(cfg) {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let buffer = SurfaceBuffer::allocate(&self.name, index, seq, cfg)?;
            let slot = &mut inner.slots[index];
            slot.buffer = Some(Arc::new(buffer));
            slot.config = Some(*cfg);
            slot.fence = None;
        }

        let slot = &mut inner.slots[index];
        slot.state = SlotState::Dequeued;
        let buffer = Arc::clone(slot.buffer.as_ref().unwrap());
        let release_fence = slot.fence.take();
        log::debug!("request: slot={} seq={}", index, buffer.seq_num());
        Ok(RequestedBuffer {
            buffer,
            release_fence,
        })
    }

    /// DEQUEUED → QUEUED. Appends to the FIFO tail and records `fence` as
    /// the buffer's producer-done fence. Rejects stale sequences and
    /// double flushes without touching queue state.
    pub fn flush_buffer(&self, seq: u64, cfg: FlushConfig, fence: SyncFence) -> Result<()> {
        let listener = {
            let mut inner = self.inner.lock().unwrap();
            Self::check_live(&inner)?;

            let index = Self::slot_by_seq(&inner, seq)?;
            let slot = &mut inner.slots[index];
            if slot.state != SlotState::Dequeued {
                return Err(Error::InvalidOperating("flush of a non-dequeued buffer"));
            }
            slot.state = SlotState::Queued;
            slot.fence = Some(fence);
            slot.timestamp = cfg.timestamp;
            slot.damage = cfg.damage;
            inner.fifo.push_back(index);
            log::debug!("flush: slot={} seq={}", index, seq);
            inner.listener.clone()
        };

        // Fires exactly once per flush, after the FIFO append, outside the
        // lock so the listener may acquire right away.
        if let Some(listener) = listener {
            listener();
        }
        Ok(())
    }

    /// DEQUEUED → FREE without queuing. Double cancel fails.
    pub fn cancel_buffer(&self, seq: u64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_live(&inner)?;

        let index = Self::slot_by_seq(&inner, seq)?;
        let slot = &mut inner.slots[index];
        if slot.state != SlotState::Dequeued {
            return Err(Error::InvalidOperating("cancel of a non-dequeued buffer"));
        }
        slot.state = SlotState::Free;
        slot.fence = None;
        log::debug!("cancel: slot={} seq={}", index, seq);
        Ok(())
    }

    /// QUEUED → ACQUIRED. Pops the FIFO head; `NoBuffer` when empty.
    /// Never blocks; callers wanting blocking semantics build it on the
    /// availability listener.
    pub fn acquire_buffer(&self) -> Result<AcquiredBuffer> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_live(&inner)?;

        let index = inner.fifo.pop_front().ok_or(Error::NoBuffer)?;
        let slot = &mut inner.slots[index];
        debug_assert_eq!(slot.state, SlotState::Queued);
        slot.state = SlotState::Acquired;
        let buffer = Arc::clone(slot.buffer.as_ref().unwrap());
        let fence = slot.fence.take();
        log::debug!("acquire: slot={} seq={}", index, buffer.seq_num());
        Ok(AcquiredBuffer {
            buffer,
            fence,
            timestamp: slot.timestamp,
            damage: slot.damage,
        })
    }

    /// ACQUIRED → FREE. Records `fence` as the slot's release fence; the
    /// next request of this slot hands it to the producer.
    pub fn release_buffer(&self, seq: u64, fence: SyncFence) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_live(&inner)?;

        let index = Self::slot_by_seq(&inner, seq)?;
        let slot = &mut inner.slots[index];
        if slot.state != SlotState::Acquired {
            return Err(Error::InvalidOperating("release of a non-acquired buffer"));
        }
        slot.state = SlotState::Free;
        slot.fence = Some(fence);
        log::debug!("release: slot={} seq={}", index, seq);
        Ok(())
    }

    /// Change capacity. Growing always succeeds; shrinking requires every
    /// slot past the new size to be FREE, otherwise the whole resize is
    /// rejected (no partial resize). Torn-down FREE slots drop their
    /// buffers immediately.
    pub fn set_queue_size(&self, n: usize) -> Result<()> {
        if n < MIN_QUEUE_SIZE || n > MAX_QUEUE_SIZE {
            return Err(Error::InvalidParam("queue size out of range"));
        }

        let mut inner = self.inner.lock().unwrap();
        Self::check_live(&inner)?;

        if n < inner.slots.len() {
            if inner.slots[n..].iter().any(|s| s.state != SlotState::Free) {
                return Err(Error::InvalidOperating("busy slots block shrink"));
            }
            inner.slots.truncate(n);
        } else {
            inner.slots.resize_with(n, BufferSlot::new);
        }
        log::debug!("queue size set to {}", n);
        Ok(())
    }

    pub fn register_listener(&self, listener: OnBufferAvailable) {
        let mut inner = self.inner.lock().unwrap();
        inner.listener = Some(listener);
    }

    /// Tear down: releases every slot and its fences regardless of state.
    /// In-flight references become invalid; all further calls fail with
    /// `InvalidOperating`.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.disconnected {
            return;
        }
        inner.disconnected = true;
        inner.fifo.clear();
        inner.listener = None;
        for slot in inner.slots.iter_mut() {
            slot.clear();
        }
        log::debug!("queue {} disconnected", self.name);
    }

    pub fn queue_size(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    /// FREE slots currently available to the producer.
    pub fn free_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .filter(|s| s.state == SlotState::Free)
            .count()
    }

    /// Flushed frames the consumer has not acquired yet.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().fifo.len()
    }

    pub(crate) fn attach_producer(&self) {
        self.inner.lock().unwrap().producer_gone = false;
    }

    pub(crate) fn attach_consumer(&self) {
        self.inner.lock().unwrap().consumer_gone = false;
    }

    pub(crate) fn detach_producer(&self) {
        self.inner.lock().unwrap().producer_gone = true;
    }

    pub(crate) fn detach_consumer(&self) {
        self.inner.lock().unwrap().consumer_gone = true;
    }

    pub(crate) fn ensure_producer_alive(&self) -> Result<()> {
        if self.inner.lock().unwrap().producer_gone {
            Err(Error::PeerDisconnected("producer"))
        } else {
            Ok(())
        }
    }

    pub(crate) fn ensure_consumer_alive(&self) -> Result<()> {
        if self.inner.lock().unwrap().consumer_gone {
            Err(Error::PeerDisconnected("consumer"))
        } else {
            Ok(())
        }
    }

    fn check_live(inner: &QueueInner) -> Result<()> {
        if inner.disconnected {
            Err(Error::InvalidOperating("queue disconnected"))
        } else {
            Ok(())
        }
    }

    fn pick_free_slot(inner: &QueueInner, cfg: &BufferRequestConfig) -> Option<usize> {
        // Matching allocation first, to avoid reallocation churn.
        inner
            .slots
            .iter()
            .position(|s| s.state == SlotState::Free && s.reusable_for(cfg))
            .or_else(|| {
                inner
                    .slots
                    .iter()
                    .position(|s| s.state == SlotState::Free)
            })
    }

    fn slot_by_seq(inner: &QueueInner, seq: u64) -> Result<usize> {
        inner
            .slots
            .iter()
            .position(|s| {
                s.buffer
                    .as_ref()
                    .map(|b| b.seq_num() == seq)
                    .unwrap_or(false)
            })
            .ok_or(Error::InvalidOperating("unknown or stale sequence"))
    }
}
