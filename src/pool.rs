//! Fixed-size frame buffer pool.
//!
//! Divides a fixed set of `FrameBuffer`s into a free queue and (with the
//! encode queue) an in-flight set. Buffers are recycled, never reallocated:
//! the capture loop acquires free buffers, the encode loop releases them back.
//!
//! Pool exhaustion is not an error. It is the backpressure signal that the
//! encoder cannot keep up; the capture loop spin-yields until a buffer
//! returns.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::frame::{FrameBuffer, PixelFormat};

/// Fixed-size pool of reusable frame buffers.
///
/// The free queue is a bounded concurrent FIFO sized to the pool count, so
/// `release` can never block and `acquire` is a single non-blocking pop.
/// Conservation invariant: every buffer is in exactly one place at any
/// instant (free queue, encode queue, or held by one loop).
pub struct FramePool {
    free_tx: Sender<FrameBuffer>,
    free_rx: Receiver<FrameBuffer>,
    capacity: usize,
}

impl FramePool {
    /// Pre-allocate `capacity` buffers for the given frame geometry.
    pub fn new(capacity: usize, width: u32, height: u32, format: PixelFormat) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            // Channel was just created with this capacity; cannot be full.
            let _ = free_tx.send(FrameBuffer::new(width, height, format));
        }
        log::debug!(
            "[POOL] Allocated {} buffers of {}x{} {:?} ({} KiB total)",
            capacity,
            width,
            height,
            format,
            capacity * width as usize * height as usize * format.bytes_per_pixel() / 1024
        );
        Self {
            free_tx,
            free_rx,
            capacity,
        }
    }

    /// Total number of buffers owned by this pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently in the free queue.
    pub fn free_count(&self) -> usize {
        self.free_rx.len()
    }

    /// Take a free buffer without blocking.
    ///
    /// `None` means every buffer is in flight: the caller must yield and
    /// re-poll rather than allocate.
    pub fn acquire(&self) -> Option<FrameBuffer> {
        self.free_rx.try_recv().ok()
    }

    /// Return a buffer to the free queue. Never blocks; safe from any thread.
    pub fn release(&self, frame: FrameBuffer) {
        match self.free_tx.try_send(frame) {
            Ok(()) => {}
            // Full can only happen if a foreign buffer is pushed in; the
            // pool's own buffers always fit. Drop it rather than block.
            Err(TrySendError::Full(_)) => {
                log::warn!("[POOL] Release into full pool, dropping buffer");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
