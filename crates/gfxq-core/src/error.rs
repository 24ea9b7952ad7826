//! Error types for gfxq

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Queue exhausted (no FREE slot) or FIFO empty on acquire.
    /// Retryable backpressure signal, not a protocol violation.
    #[error("no buffer available")]
    NoBuffer,

    /// Protocol violation: stale sequence, double operation, wrong slot
    /// state, or an operation against a disconnected queue.
    #[error("invalid operation: {0}")]
    InvalidOperating(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// Fence wait exceeded its timeout. Distinct from an unsignaled poll
    /// result seen through `is_signaled`.
    #[error("fence wait timed out")]
    FenceTimeout,

    /// The opposite side of the queue went away.
    #[error("{0} disconnected")]
    PeerDisconnected(&'static str),

    #[error("shared memory error: {0}")]
    SharedMemory(String),

    /// Persisted blob cache file failed validation and was rejected whole.
    #[error("blob cache file rejected: {0}")]
    CacheRejected(&'static str),

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
