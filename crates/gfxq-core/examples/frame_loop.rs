//! Frame loop demo - producer and consumer sides over one queue
//!
//! A producer thread dequeues, fills and flushes frames while the main
//! thread plays compositor: it acquires in FIFO order, waits on the
//! producer's fence, reads a pixel and releases with its own fence.
//!
//! Usage:
//! ```bash
//! RUST_LOG=debug cargo run --example frame_loop
//! ```

use gfxq_core::{
    BufferQueue, BufferRequestConfig, Consumer, FenceTimeout, FlushConfig, PixelFormat, Producer,
    QueueConfig, SyncFence,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FRAMES: u32 = 8;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cfg = BufferRequestConfig::new(640, 480, PixelFormat::Rgba8888);
    let queue = BufferQueue::new("gfxq_demo", QueueConfig::new(3, cfg))?;
    let producer = Producer::new(Arc::clone(&queue));
    let consumer = Consumer::new(Arc::clone(&queue));

    let render = thread::spawn(move || -> Result<(), gfxq_core::Error> {
        for frame in 0..FRAMES {
            // Backpressure: retry when the consumer falls behind.
            let requested = loop {
                match producer.request_default() {
                    Ok(r) => break r,
                    Err(gfxq_core::Error::NoBuffer) => {
                        thread::sleep(Duration::from_millis(2));
                    }
                    Err(e) => return Err(e),
                }
            };

            // Wait for the consumer to be done with the old contents.
            if let Some(fence) = &requested.release_fence {
                fence.wait(FenceTimeout::Forever)?;
            }

            let shade = (frame % 0xff) as u8;
            requested.buffer.write_at(0, &[shade, shade, shade, 0xff])?;

            let done = SyncFence::new();
            producer.flush_buffer(
                requested.buffer.seq_num(),
                FlushConfig::default(),
                done.clone(),
            )?;
            done.signal(); // CPU "render" finished immediately
        }
        Ok(())
    });

    let mut composited = 0;
    while composited < FRAMES {
        match consumer.acquire_buffer() {
            Ok(acquired) => {
                if let Some(fence) = acquired.fence {
                    fence.wait(FenceTimeout::Forever)?;
                }
                let first_pixel = &acquired.buffer.as_slice()[..4];
                println!(
                    "composited frame seq={} first_pixel={:?}",
                    acquired.buffer.seq_num(),
                    first_pixel
                );

                let release = SyncFence::new();
                consumer.release_buffer(acquired.buffer.seq_num(), release.clone())?;
                release.signal();
                composited += 1;
            }
            Err(gfxq_core::Error::NoBuffer) => thread::sleep(Duration::from_millis(1)),
            Err(e) => return Err(e.into()),
        }
    }

    render.join().unwrap()?;
    println!("done: {} frames", composited);
    Ok(())
}
