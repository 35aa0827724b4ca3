//! Data model shared between Socket Ingress and the Streaming Source:
//! the fixed-size receive scratch buffer and the streaming-buffer pool.
//!
//! Streaming buffers are modelled as [`gst::Buffer`]s drawn from a
//! [`gst::BufferPool`]: a bounded pool with a fallback allocation on
//! exhaustion rather than blocking the producer.

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::error::{PixelPilotError, Result};

/// Maximum datagram size the ingress scratch buffer accepts.
pub const DATAGRAM_MAX: usize = 4096;

/// Back-pressure watermark on the streaming source's pending-bytes level.
pub const BACKPRESSURE_WATERMARK_BYTES: u64 = 8 * 1024 * 1024;

/// Bounded streaming-buffer pool sizing.
pub const POOL_MIN_BUFFERS: u32 = 8;
pub const POOL_MAX_BUFFERS: u32 = 32;

/// Bounded pool of fixed-capacity streaming buffers with a fresh-allocation
/// fallback on exhaustion. Internally thread-safe — callers never hold a
/// lock across an acquire.
pub struct StreamingBufferPool {
    pool: gst::BufferPool,
    buffer_size: u32,
}

impl StreamingBufferPool {
    pub fn new(buffer_size: usize) -> Result<Self> {
        let pool = gst::BufferPool::new();
        let mut config = pool.config();
        config.set_params(None, buffer_size as u32, POOL_MIN_BUFFERS, POOL_MAX_BUFFERS);
        pool.set_config(config)
            .map_err(|e| PixelPilotError::GraphBuild(format!("buffer pool config: {e}")))?;
        pool.set_active(true)
            .map_err(|e| PixelPilotError::GraphBuild(format!("buffer pool activate: {e}")))?;
        Ok(Self { pool, buffer_size: buffer_size as u32 })
    }

    /// Acquire a buffer from the pool, falling back to a fresh allocation
    /// when the pool is exhausted (max in-flight reached). The returned
    /// buffer's memory is at least `buffer_size` bytes and writable.
    pub fn acquire(&self) -> gst::Buffer {
        match self.pool.acquire_buffer(None) {
            Ok(buf) => buf,
            Err(_) => gst::Buffer::with_size(self.buffer_size as usize)
                .expect("fallback allocation"),
        }
    }
}

impl Drop for StreamingBufferPool {
    fn drop(&mut self) {
        let _ = self.pool.set_active(false);
    }
}

/// Copy `payload` into a writable streaming buffer acquired from `pool`,
/// trimming it to `payload.len()` bytes. Ownership of the returned buffer
/// belongs entirely to the caller — nothing here retains a reference.
pub fn fill_streaming_buffer(pool: &StreamingBufferPool, payload: &[u8]) -> gst::Buffer {
    let mut buffer = pool.acquire();
    {
        let buffer_mut = buffer.make_mut();
        buffer_mut.set_size(payload.len());
        let mut map = buffer_mut.map_writable().expect("streaming buffer is writable");
        map.as_mut_slice()[..payload.len()].copy_from_slice(payload);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_gst() {
        let _ = gst::init();
    }

    #[test]
    fn acquire_returns_buffer_of_requested_capacity() {
        init_gst();
        let pool = StreamingBufferPool::new(DATAGRAM_MAX).unwrap();
        let buf = pool.acquire();
        assert!(buf.size() <= DATAGRAM_MAX);
    }

    #[test]
    fn fill_sets_exact_payload_size() {
        init_gst();
        let pool = StreamingBufferPool::new(DATAGRAM_MAX).unwrap();
        let payload = vec![0xAAu8; 200];
        let buf = fill_streaming_buffer(&pool, &payload);
        assert_eq!(buf.size(), 200);
    }

    #[test]
    fn pool_exhaustion_falls_back_to_fresh_allocation() {
        init_gst();
        let pool = StreamingBufferPool::new(DATAGRAM_MAX).unwrap();
        // Acquire more than POOL_MAX_BUFFERS without releasing any; the
        // pool must still hand back usable buffers via the fallback path.
        let mut held = Vec::new();
        for _ in 0..(POOL_MAX_BUFFERS + 4) {
            held.push(pool.acquire());
        }
        assert_eq!(held.len() as u32, POOL_MAX_BUFFERS + 4);
    }
}
