//! Consumer-side facade over the buffer queue

use crate::fence::SyncFence;
use crate::queue::{AcquiredBuffer, BufferQueue, OnBufferAvailable};
use crate::Result;
use std::sync::Arc;

/// Compositor-side handle: acquire, composite, release.
pub struct Consumer {
    queue: Arc<BufferQueue>,
}

impl Consumer {
    pub fn new(queue: Arc<BufferQueue>) -> Self {
        queue.attach_consumer();
        Self { queue }
    }

    /// Pop the oldest flushed frame. The caller is responsible for
    /// waiting on the returned fence before reading pixels.
    pub fn acquire_buffer(&self) -> Result<AcquiredBuffer> {
        self.queue.ensure_producer_alive()?;
        self.queue.acquire_buffer()
    }

    pub fn release_buffer(&self, seq: u64, fence: SyncFence) -> Result<()> {
        self.queue.ensure_producer_alive()?;
        self.queue.release_buffer(seq, fence)
    }

    /// Register the on-buffer-available notification. Fires once per
    /// flush; the callback may acquire immediately.
    pub fn register_listener(&self, listener: OnBufferAvailable) {
        self.queue.register_listener(listener);
    }

    /// Flushed frames waiting to be acquired.
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.queue.detach_consumer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferRequestConfig, FlushConfig, PixelFormat};
    use crate::producer::Producer;
    use crate::queue::QueueConfig;
    use crate::Error;

    fn unique_name() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("gfxq_facade_test_{}", ts)
    }

    fn new_pair() -> (Producer, Consumer) {
        let cfg = BufferRequestConfig::new(16, 16, PixelFormat::Rgba8888);
        let queue = BufferQueue::new(&unique_name(), QueueConfig::new(2, cfg)).unwrap();
        (Producer::new(Arc::clone(&queue)), Consumer::new(queue))
    }

    #[test]
    fn test_full_frame_cycle_through_facades() {
        let (producer, consumer) = new_pair();

        let r = producer.request_default().unwrap();
        let seq = r.buffer.seq_num();
        r.buffer.write_at(0, &[0xab; 4]).unwrap();

        let fence = SyncFence::new();
        producer
            .flush_buffer(seq, FlushConfig::default(), fence.clone())
            .unwrap();
        fence.signal();

        let acquired = consumer.acquire_buffer().unwrap();
        acquired
            .fence
            .unwrap()
            .wait(crate::fence::FenceTimeout::Forever)
            .unwrap();
        assert_eq!(&acquired.buffer.as_slice()[..4], &[0xab; 4]);

        consumer.release_buffer(seq, SyncFence::signaled()).unwrap();
        assert_eq!(producer.free_count(), 2);
    }

    #[test]
    fn test_producer_fails_fast_after_consumer_drop() {
        let (producer, consumer) = new_pair();
        drop(consumer);
        assert!(matches!(
            producer.request_default(),
            Err(Error::PeerDisconnected("consumer"))
        ));
    }

    #[test]
    fn test_consumer_fails_fast_after_producer_drop() {
        let (producer, consumer) = new_pair();
        drop(producer);
        assert!(matches!(
            consumer.acquire_buffer(),
            Err(Error::PeerDisconnected("producer"))
        ));
    }
}
