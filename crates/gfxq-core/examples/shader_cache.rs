//! Shader cache demo - warm-start blob cache with background persistence
//!
//! Usage:
//! ```bash
//! RUST_LOG=debug cargo run --example shader_cache
//! ```

use gfxq_core::{BlobCache, CacheConfig};
use std::thread;
use std::time::Duration;

fn main() {
    env_logger::init();

    let path = std::env::temp_dir().join("gfxq_shader_cache.bin");
    let config = CacheConfig::new(&path);
    let delay = config.flush_delay;

    let cache = BlobCache::with_warm_start(config);
    println!("warm start: {} cached shaders from {:?}", cache.len(), path);

    // Pretend to compile a few pipelines.
    for i in 0..4u32 {
        let key = format!("pipeline-{}", i);
        let binary = vec![i as u8; 2048];
        cache.set(key.as_bytes(), &binary);
    }

    let mut out = vec![0u8; 4096];
    let n = cache.get(b"pipeline-2", &mut out);
    println!("pipeline-2: {} bytes", n);

    // Let the debounced background write land before exiting.
    thread::sleep(delay + Duration::from_millis(100));
    println!("persisted {} entries", cache.len());
}
