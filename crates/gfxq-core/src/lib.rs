//! gfxq - Producer/consumer graphics buffer queue with fence synchronization

pub mod buffer;
pub mod cache;
pub mod consumer;
pub mod error;
pub mod fence;
pub mod producer;
pub mod queue;
pub mod shm;
pub mod slot;

pub use buffer::{
    BufferRequestConfig, FlushConfig, PixelFormat, Rect, SurfaceBuffer, USAGE_CPU_READ,
    USAGE_CPU_WRITE, USAGE_MEM_SHARED,
};
pub use cache::{BlobCache, CacheConfig};
pub use consumer::Consumer;
pub use error::{Error, Result};
pub use fence::{FenceTimeout, SyncFence};
pub use producer::Producer;
pub use queue::{
    AcquiredBuffer, BufferQueue, OnBufferAvailable, QueueConfig, RequestedBuffer, MAX_QUEUE_SIZE,
    MIN_QUEUE_SIZE,
};
pub use slot::SlotState;
