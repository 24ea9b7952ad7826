//! Bounded LRU blob cache with debounced disk persistence
//!
//! Content-addressed key→value byte store used for shader binaries.
//! Entries live in an index-based arena with an explicit recency list
//! (no intrusive links); a detached worker persists the whole cache to
//! one file after a debounce delay, so bursts of sets cost one write.

use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// File magic, first four bytes of a persisted cache.
const MAGIC: [u8; 4] = *b"OSOH";
/// Magic + CRC-32 of the payload.
const HEADER_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Upper bound on the serialized file size, bytes.
    pub max_total_bytes: usize,
    /// Entries dropped per eviction pass. Deliberately more than one:
    /// over-evicting amortizes the pass over many inserts.
    pub evict_batch: usize,
    /// Debounce window between a set and the background disk write.
    pub flush_delay: Duration,
    pub path: PathBuf,
}

impl CacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            max_entries: 512,
            max_total_bytes: 4 << 20,
            evict_batch: 16,
            flush_delay: Duration::from_millis(100),
            path: path.into(),
        }
    }
}

struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
}

struct CacheState {
    /// Entry storage; `None` slots are reusable via `free`.
    arena: Vec<Option<Entry>>,
    free: Vec<usize>,
    /// Recency list of arena indices, most-recently-used at the front.
    order: VecDeque<usize>,
    index: HashMap<Vec<u8>, usize>,
    /// Serialized size of all records, header excluded.
    total_bytes: usize,
    /// True while a background flush is scheduled but not yet run.
    flush_pending: bool,
}

struct CacheShared {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

/// Cloneable handle to one cache instance. Explicitly constructed and
/// owned by whoever needs it; there is no process-wide singleton.
#[derive(Clone)]
pub struct BlobCache {
    shared: Arc<CacheShared>,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// On-disk length of one record: two u32 sizes, key, value, padding.
fn record_len(key_len: usize, value_len: usize) -> usize {
    align4(8 + key_len + value_len)
}

/// CRC-32, reflected, polynomial 0xEDB88320.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

fn move_to_front(order: &mut VecDeque<usize>, idx: usize) {
    if order.front() == Some(&idx) {
        return;
    }
    if let Some(pos) = order.iter().position(|&i| i == idx) {
        order.remove(pos);
        order.push_front(idx);
    }
}

/// Drop one batch from the LRU tail, never shrinking below `keep` entries.
fn evict_batch_locked(config: &CacheConfig, state: &mut CacheState, keep: usize) {
    let batch = config.evict_batch.max(1);
    let mut dropped = 0;
    for _ in 0..batch {
        if state.order.len() <= keep {
            break;
        }
        let Some(idx) = state.order.pop_back() else {
            break;
        };
        let entry = state.arena[idx].take().unwrap();
        state.index.remove(&entry.key);
        state.total_bytes -= record_len(entry.key.len(), entry.value.len());
        state.free.push(idx);
        dropped += 1;
    }
    log::debug!("blob cache evicted {} entries", dropped);
}

/// Insert or replace, refreshing recency. Does not schedule a flush.
fn insert_locked(config: &CacheConfig, state: &mut CacheState, key: &[u8], value: &[u8]) {
    let new_len = record_len(key.len(), value.len());

    if let Some(&idx) = state.index.get(key) {
        let entry = state.arena[idx].as_mut().unwrap();
        let old_len = record_len(entry.key.len(), entry.value.len());
        entry.value = value.to_vec();
        state.total_bytes = state.total_bytes - old_len + new_len;
        move_to_front(&mut state.order, idx);
        // A grown value can push the cache past max_total_bytes; evict
        // from the tail like the insert path, sparing the entry we just
        // refreshed at the front.
        while state.order.len() > 1
            && state.total_bytes + HEADER_LEN > config.max_total_bytes
        {
            evict_batch_locked(config, state, 1);
        }
        return;
    }

    while !state.order.is_empty()
        && (state.index.len() >= config.max_entries
            || state.total_bytes + new_len + HEADER_LEN > config.max_total_bytes)
    {
        evict_batch_locked(config, state, 0);
    }

    let idx = match state.free.pop() {
        Some(idx) => idx,
        None => {
            state.arena.push(None);
            state.arena.len() - 1
        }
    };
    state.arena[idx] = Some(Entry {
        key: key.to_vec(),
        value: value.to_vec(),
    });
    state.index.insert(key.to_vec(), idx);
    state.order.push_front(idx);
    state.total_bytes += new_len;
}

fn clear_locked(state: &mut CacheState) {
    state.arena.clear();
    state.free.clear();
    state.order.clear();
    state.index.clear();
    state.total_bytes = 0;
}

/// Serialize all records, least-recently-used first, so a later replay
/// through `set` re-establishes the same recency order.
fn serialize_locked(state: &CacheState) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + state.total_bytes);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&[0u8; 4]); // CRC placeholder

    for &idx in state.order.iter().rev() {
        let entry = state.arena[idx].as_ref().unwrap();
        out.extend_from_slice(&(entry.key.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&entry.key);
        out.extend_from_slice(&entry.value);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    let crc = crc32(&out[HEADER_LEN..]);
    out[4..8].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Replace the cache file. Writes a sibling temp file and renames it
/// over the final path, so a loader never sees a half-written file and
/// concurrent writers simply last-write-win.
fn persist(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl BlobCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                config,
                state: Mutex::new(CacheState {
                    arena: Vec::new(),
                    free: Vec::new(),
                    order: VecDeque::new(),
                    index: HashMap::new(),
                    total_bytes: 0,
                    flush_pending: false,
                }),
            }),
        }
    }

    /// Construct and load the persisted file if one is present. A
    /// missing, corrupt or unreadable file degrades to an empty cache.
    pub fn with_warm_start(config: CacheConfig) -> Self {
        let cache = Self::new(config);
        if let Err(err) = cache.read_from_disk() {
            match err {
                Error::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound => {}
                _ => log::warn!("blob cache warm start failed: {}", err),
            }
        }
        cache
    }

    /// Insert or replace `key`. Empty keys or values, and values that can
    /// never fit within `max_total_bytes`, are no-ops returning `false`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> bool {
        if key.is_empty() || value.is_empty() {
            return false;
        }
        if record_len(key.len(), value.len()) + HEADER_LEN > self.shared.config.max_total_bytes {
            return false;
        }

        {
            let mut state = self.shared.state.lock().unwrap();
            insert_locked(&self.shared.config, &mut state, key, value);
        }
        self.schedule_flush();
        true
    }

    /// Copy the value for `key` into `out` and refresh its recency.
    /// Returns the value size, or 0 on miss or when `out` is too small
    /// (never a partial copy; use `value_size` to size the buffer).
    pub fn get(&self, key: &[u8], out: &mut [u8]) -> usize {
        if key.is_empty() {
            return 0;
        }
        let mut state = self.shared.state.lock().unwrap();
        let Some(&idx) = state.index.get(key) else {
            return 0;
        };
        let len = state.arena[idx].as_ref().unwrap().value.len();
        if out.len() < len {
            return 0;
        }
        out[..len].copy_from_slice(&state.arena[idx].as_ref().unwrap().value);
        move_to_front(&mut state.order, idx);
        len
    }

    /// Stored value size for `key`, 0 on miss. Does not refresh recency.
    pub fn value_size(&self, key: &[u8]) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .index
            .get(key)
            .map(|&idx| state.arena[idx].as_ref().unwrap().value.len())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize and write the whole cache now, bypassing the debounce.
    pub fn write_to_disk(&self) -> Result<()> {
        let bytes = {
            let state = self.shared.state.lock().unwrap();
            serialize_locked(&state)
        };
        persist(&self.shared.config.path, &bytes)
    }

    /// Load and validate the persisted file, replacing the in-memory
    /// contents. Any validation failure rejects the whole file and
    /// leaves the cache empty.
    pub fn read_from_disk(&self) -> Result<()> {
        let data = fs::read(&self.shared.config.path)?;

        let mut state = self.shared.state.lock().unwrap();
        clear_locked(&mut state);

        if data.len() < HEADER_LEN {
            return Err(Error::CacheRejected("truncated header"));
        }
        if data[..4] != MAGIC {
            return Err(Error::CacheRejected("bad magic"));
        }
        let stored_crc = u32::from_le_bytes(data[4..8].try_into().unwrap());
        if crc32(&data[HEADER_LEN..]) != stored_crc {
            return Err(Error::CacheRejected("checksum mismatch"));
        }

        let mut offset = HEADER_LEN;
        while offset < data.len() {
            if data.len() - offset < 8 {
                clear_locked(&mut state);
                return Err(Error::CacheRejected("truncated record header"));
            }
            let key_len =
                u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
            let value_len =
                u32::from_le_bytes(data[offset + 4..offset + 8].try_into().unwrap()) as usize;
            let rec_len = record_len(key_len, value_len);
            if key_len == 0 || value_len == 0 || data.len() - offset < rec_len {
                clear_locked(&mut state);
                return Err(Error::CacheRejected("malformed record"));
            }
            let key = &data[offset + 8..offset + 8 + key_len];
            let value = &data[offset + 8 + key_len..offset + 8 + key_len + value_len];
            insert_locked(&self.shared.config, &mut state, key, value);
            offset += rec_len;
        }
        Ok(())
    }

    /// Debounced persist: the first set after a quiet period spawns one
    /// detached worker; further sets inside the window piggyback on it.
    /// The worker holds the lock only to serialize, never during I/O.
    fn schedule_flush(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.flush_pending {
                return;
            }
            state.flush_pending = true;
        }

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            thread::sleep(shared.config.flush_delay);
            let bytes = {
                let mut state = shared.state.lock().unwrap();
                state.flush_pending = false;
                serialize_locked(&state)
            };
            if let Err(err) = persist(&shared.config.path, &bytes) {
                log::warn!("blob cache persist skipped: {}", err);
            }
        });
    }
}
