//! Producer-side facade over the buffer queue

use crate::buffer::{BufferRequestConfig, FlushConfig};
use crate::fence::SyncFence;
use crate::queue::{BufferQueue, RequestedBuffer};
use crate::Result;
use std::sync::Arc;

/// Application-side handle: dequeue, fill, flush.
///
/// Operations fail fast with `PeerDisconnected` once the consumer side
/// has gone away, instead of filling a queue nobody will ever drain.
pub struct Producer {
    queue: Arc<BufferQueue>,
}

impl Producer {
    pub fn new(queue: Arc<BufferQueue>) -> Self {
        queue.attach_producer();
        Self { queue }
    }

    pub fn request_buffer(&self, cfg: &BufferRequestConfig) -> Result<RequestedBuffer> {
        self.queue.ensure_consumer_alive()?;
        self.queue.request_buffer(cfg)
    }

    /// Dequeue with the queue's default geometry.
    pub fn request_default(&self) -> Result<RequestedBuffer> {
        self.request_buffer(&self.queue.default_config())
    }

    pub fn flush_buffer(&self, seq: u64, cfg: FlushConfig, fence: SyncFence) -> Result<()> {
        self.queue.ensure_consumer_alive()?;
        self.queue.flush_buffer(seq, cfg, fence)
    }

    pub fn cancel_buffer(&self, seq: u64) -> Result<()> {
        self.queue.ensure_consumer_alive()?;
        self.queue.cancel_buffer(seq)
    }

    /// Request a capacity change on behalf of the application.
    pub fn set_queue_size(&self, n: usize) -> Result<()> {
        self.queue.set_queue_size(n)
    }

    /// FREE slots left before requests start returning `NoBuffer`.
    pub fn free_count(&self) -> usize {
        self.queue.free_count()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.queue.detach_producer();
    }
}
