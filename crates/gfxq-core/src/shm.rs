//! Named shared memory region used as buffer backing storage

use crate::{Error, Result};
use shared_memory::{Shmem, ShmemConf};

/// OS-named shared memory region.
///
/// Created regions own the name and unlink it on drop; opened regions are
/// borrowers and leave the name in place.
pub struct ShmRegion {
    mem: Shmem,
    os_id: String,
    len: usize,
}

impl ShmRegion {
    /// Create a new region of `len` bytes under `os_id`.
    pub fn create(os_id: &str, len: usize) -> Result<Self> {
        let mem = ShmemConf::new()
            .size(len)
            .os_id(os_id)
            .create()
            .map_err(|e| Error::SharedMemory(e.to_string()))?;

        Ok(Self {
            mem,
            os_id: os_id.to_string(),
            len,
        })
    }

    /// Open an existing region by name.
    pub fn open(os_id: &str) -> Result<Self> {
        let mem = ShmemConf::new()
            .os_id(os_id)
            .open()
            .map_err(|e| Error::SharedMemory(e.to_string()))?;
        let len = mem.len();

        Ok(Self {
            mem,
            os_id: os_id.to_string(),
            len,
        })
    }

    pub fn os_id(&self) -> &str {
        &self.os_id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.mem.as_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem.as_ptr()
    }

    /// Byte view of the whole region.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}
