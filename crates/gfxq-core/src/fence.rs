//! Fence synchronization handles

use crate::{Error, Result};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How long a fence wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceTimeout {
    /// Do not block; an unsignaled fence fails immediately.
    Poll,
    /// Block until the fence signals.
    Forever,
    /// Block for at most the given duration.
    After(Duration),
}

struct FenceInner {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Completion handle for a single read or write pass over a buffer.
///
/// Cloning shares the same underlying event; the producer hands a clone to
/// the queue on flush and signals its own copy when the write is done. The
/// platform "close exactly once" rule is discharged by `Arc` ownership:
/// the event is released when the last clone drops.
#[derive(Clone)]
pub struct SyncFence {
    inner: Arc<FenceInner>,
}

impl SyncFence {
    /// A fence that has not signaled yet.
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// A fence that is already signaled; waits on it short-circuit.
    pub fn signaled() -> Self {
        Self::with_state(true)
    }

    fn with_state(signaled: bool) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                signaled: Mutex::new(signaled),
                cond: Condvar::new(),
            }),
        }
    }

    /// Mark the fence signaled and wake all waiters. Signaling twice is
    /// harmless.
    pub fn signal(&self) {
        let mut signaled = self.inner.signaled.lock().unwrap();
        *signaled = true;
        self.inner.cond.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock().unwrap()
    }

    /// Wait for the fence to signal.
    ///
    /// Returns `Error::FenceTimeout` if the timeout elapses (or, for
    /// `Poll`, if the fence is not yet signaled). An already-signaled
    /// fence returns immediately without touching the condvar.
    pub fn wait(&self, timeout: FenceTimeout) -> Result<()> {
        let mut signaled = self.inner.signaled.lock().unwrap();
        if *signaled {
            return Ok(());
        }

        match timeout {
            FenceTimeout::Poll => Err(Error::FenceTimeout),
            FenceTimeout::Forever => {
                while !*signaled {
                    signaled = self.inner.cond.wait(signaled).unwrap();
                }
                Ok(())
            }
            FenceTimeout::After(d) => {
                let (guard, result) = self
                    .inner
                    .cond
                    .wait_timeout_while(signaled, d, |sig| !*sig)
                    .unwrap();
                drop(guard);
                if result.timed_out() {
                    Err(Error::FenceTimeout)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Default for SyncFence {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncFence")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_presignaled_short_circuits() {
        let fence = SyncFence::signaled();
        assert!(fence.is_signaled());
        assert!(fence.wait(FenceTimeout::Poll).is_ok());
        assert!(fence.wait(FenceTimeout::Forever).is_ok());
    }

    #[test]
    fn test_poll_unsignaled_is_timeout() {
        let fence = SyncFence::new();
        assert!(matches!(
            fence.wait(FenceTimeout::Poll),
            Err(Error::FenceTimeout)
        ));
    }

    #[test]
    fn test_timeout_is_distinct_error() {
        let fence = SyncFence::new();
        let err = fence
            .wait(FenceTimeout::After(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, Error::FenceTimeout));
        // Still unsignaled afterwards.
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let fence = SyncFence::new();
        let waiter = fence.clone();
        let handle = thread::spawn(move || waiter.wait(FenceTimeout::Forever));
        thread::sleep(Duration::from_millis(10));
        fence.signal();
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_double_signal_is_harmless() {
        let fence = SyncFence::new();
        fence.signal();
        fence.signal();
        assert!(fence.wait(FenceTimeout::Poll).is_ok());
    }
}
