//! Graphics buffer handle and backing storage

use crate::shm::ShmRegion;
use crate::{Error, Result};

/// Usage flag: CPU reads the mapped memory.
pub const USAGE_CPU_READ: u32 = 1 << 0;
/// Usage flag: CPU writes the mapped memory.
pub const USAGE_CPU_WRITE: u32 = 1 << 1;
/// Usage flag: region must be mappable by another process.
pub const USAGE_MEM_SHARED: u32 = 1 << 2;

/// Pixel formats understood by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFormat {
    Rgba8888 = 0,
    Rgbx8888 = 1,
    Bgra8888 = 2,
    Rgb565 = 3,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 | PixelFormat::Bgra8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Geometry and usage requested by the producer on dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequestConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: u32,
    /// Row stride is rounded up to a multiple of this, in bytes.
    pub stride_align: u32,
}

impl BufferRequestConfig {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            usage: USAGE_CPU_READ | USAGE_CPU_WRITE | USAGE_MEM_SHARED,
            stride_align: 4,
        }
    }
}

/// Screen-space rectangle, used for flush damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

/// Per-flush metadata supplied by the producer.
#[derive(Debug, Clone, Copy)]
pub struct FlushConfig {
    pub damage: Rect,
    /// Presentation timestamp in nanoseconds; 0 means "now".
    pub timestamp: i64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            damage: Rect::default(),
            timestamp: 0,
        }
    }
}

fn align_up(n: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    n.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// One allocated graphics buffer: geometry, a queue-wide sequence number
/// and a named shared-memory backing region.
///
/// The buffer is owned by the slot that allocated it for its whole
/// lifetime; producer and consumer only hold transient `Arc` references
/// identified by sequence number. Exclusive access to the pixel memory is
/// granted by the slot state machine, not by `&mut`, so the byte
/// accessors below take `&self` and are backed by raw pointers.
pub struct SurfaceBuffer {
    seq: u64,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    usage: u32,
    region: ShmRegion,
}

// The raw pointer inside the shm mapping is process-wide valid; access
// discipline comes from the slot state machine.
unsafe impl Send for SurfaceBuffer {}
unsafe impl Sync for SurfaceBuffer {}

impl SurfaceBuffer {
    /// Allocate a fresh backing region for a slot.
    pub(crate) fn allocate(
        queue_name: &str,
        slot: usize,
        seq: u64,
        cfg: &BufferRequestConfig,
    ) -> Result<Self> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(Error::InvalidParam("zero width or height"));
        }
        if cfg.stride_align == 0 || !cfg.stride_align.is_power_of_two() {
            return Err(Error::InvalidParam("stride_align must be a power of two"));
        }

        let stride = cfg
            .width
            .checked_mul(cfg.format.bytes_per_pixel() as u32)
            .and_then(|row| align_up(row, cfg.stride_align))
            .ok_or(Error::InvalidParam("geometry overflows"))?;
        let size = (stride as usize)
            .checked_mul(cfg.height as usize)
            .ok_or(Error::InvalidParam("geometry overflows"))?;

        // Sequence number in the name keeps reallocations collision-free
        // even while a stale reference pins the previous region.
        let os_id = format!("{}_buf_{}_{}", queue_name, slot, seq);
        let region = ShmRegion::create(&os_id, size)?;
        log::debug!(
            "allocated buffer seq={} slot={} {}x{} stride={} size={}",
            seq,
            slot,
            cfg.width,
            cfg.height,
            stride,
            size
        );

        Ok(Self {
            seq,
            width: cfg.width,
            height: cfg.height,
            stride,
            format: cfg.format,
            usage: cfg.usage,
            region,
        })
    }

    /// Sequence number, unique per allocation for the queue's lifetime.
    pub fn seq_num(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    /// Total size of the backing region in bytes.
    pub fn size(&self) -> usize {
        self.region.len()
    }

    /// OS name of the backing region, openable from another process.
    pub fn region_id(&self) -> &str {
        self.region.os_id()
    }

    /// Whether this allocation can be reused as-is for `cfg`.
    pub fn matches(&self, cfg: &BufferRequestConfig) -> bool {
        self.width == cfg.width
            && self.height == cfg.height
            && self.format == cfg.format
            && self.usage == cfg.usage
    }

    /// Mapped virtual address of the pixel memory.
    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    /// Read view over the pixel memory. Only valid to call while the
    /// caller holds the buffer in DEQUEUED (producer) or ACQUIRED
    /// (consumer) state.
    pub fn as_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Bounds-checked write into the pixel memory. Same state discipline
    /// as `as_slice`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .ok_or(Error::InvalidParam("write range overflows"))?;
        if end > self.region.len() {
            return Err(Error::InvalidParam("write past end of buffer"));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.region.as_mut_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for SurfaceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceBuffer")
            .field("seq", &self.seq)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_queue_name() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("gfxq_buf_test_{}", ts)
    }

    #[test]
    fn test_stride_alignment() {
        let name = unique_queue_name();
        let mut cfg = BufferRequestConfig::new(30, 4, PixelFormat::Rgb565);
        cfg.stride_align = 64;
        let buf = SurfaceBuffer::allocate(&name, 0, 1, &cfg).unwrap();
        assert_eq!(buf.stride(), 64); // 30 * 2 = 60, rounded up
        assert_eq!(buf.size(), 64 * 4);
    }

    #[test]
    fn test_zero_geometry_rejected() {
        let name = unique_queue_name();
        let cfg = BufferRequestConfig::new(0, 16, PixelFormat::Rgba8888);
        assert!(matches!(
            SurfaceBuffer::allocate(&name, 0, 1, &cfg),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn test_overflowing_geometry_rejected() {
        let name = unique_queue_name();
        // width * 4 bytes per pixel would wrap a u32.
        let cfg = BufferRequestConfig::new(u32::MAX / 2, 2, PixelFormat::Rgba8888);
        assert!(matches!(
            SurfaceBuffer::allocate(&name, 0, 1, &cfg),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let name = unique_queue_name();
        let cfg = BufferRequestConfig::new(8, 8, PixelFormat::Rgba8888);
        let buf = SurfaceBuffer::allocate(&name, 0, 1, &cfg).unwrap();
        buf.write_at(16, b"pixels").unwrap();
        assert_eq!(&buf.as_slice()[16..22], b"pixels");
    }

    #[test]
    fn test_write_past_end_rejected() {
        let name = unique_queue_name();
        let cfg = BufferRequestConfig::new(2, 2, PixelFormat::Rgb565);
        let buf = SurfaceBuffer::allocate(&name, 0, 1, &cfg).unwrap();
        assert!(buf.write_at(buf.size() - 1, &[0, 0]).is_err());
    }

    #[test]
    fn test_matches_ignores_stride_align() {
        let name = unique_queue_name();
        let cfg = BufferRequestConfig::new(16, 16, PixelFormat::Rgba8888);
        let buf = SurfaceBuffer::allocate(&name, 0, 1, &cfg).unwrap();
        let mut again = cfg;
        again.stride_align = 4;
        assert!(buf.matches(&again));
        again.format = PixelFormat::Rgb565;
        assert!(!buf.matches(&again));
    }
}
