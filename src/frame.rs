//! Reusable frame buffers.
//!
//! A `FrameBuffer` is an owned block of pixel memory allocated once at pool
//! construction and recycled for the whole session, so the hot capture loop
//! never touches the allocator.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Pixel layout of a frame buffer. Fixed at pool creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit BGRA, the native format of most screen blits.
    Bgra8,
    /// 24-bit packed RGB.
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// FFmpeg rawvideo pix_fmt name.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Bgra8 => "bgra",
            PixelFormat::Rgb8 => "rgb24",
        }
    }
}

/// One reusable capture frame: pixel memory plus a capture timestamp.
#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    /// Monotonic capture time, stamped by the capture loop.
    pub captured_at: Instant,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer for the given dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0u8; size],
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row. Buffers are always tightly packed.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of pixel (x, y), bounds unchecked.
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }
}
