//! Collaborator boundaries consumed by the pipeline.
//!
//! The capture loop talks to the outside world through these traits so the
//! whole pipeline can run against fakes in tests. Real OS-backed
//! implementations live in `system`.

use std::sync::Arc;

use crate::error::RecorderResult;
use crate::frame::FrameBuffer;
use crate::settings::CaptureRegion;

/// Grabs raw pixels for a screen region.
///
/// `capture_region` is synchronous and expected to complete well inside the
/// frame budget. A failure is fatal for the session.
pub trait ScreenSource: Send {
    /// Blit `region` into `dest`. `dest` has the region's exact dimensions.
    fn capture_region(&mut self, region: &CaptureRegion, dest: &mut FrameBuffer)
        -> RecorderResult<()>;
}

/// Pixel payload of a cursor image.
#[derive(Debug, Clone)]
pub enum CursorPixels {
    /// BGRA sprite with per-pixel alpha, `width * height * 4` bytes.
    Color(Vec<u8>),
    /// Legacy monochrome AND/XOR mask bitmap, 1 bit per pixel MSB-first,
    /// rows padded to whole bytes. The bitmap is `2 * height` rows tall:
    /// the top half is the AND plane, the bottom half the XOR plane.
    Mono(Vec<u8>),
}

/// A cursor shape: bitmap plus the hotspot offset inside it.
#[derive(Debug, Clone)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    pub pixels: CursorPixels,
}

impl CursorImage {
    /// Row stride in bytes for a mono mask plane.
    pub fn mono_stride(&self) -> usize {
        (self.width as usize + 7) / 8
    }
}

/// Snapshot of OS cursor state for one capture tick.
#[derive(Debug, Clone, Default)]
pub struct CursorInfo {
    pub visible: bool,
    /// Screen-space position of the hotspot.
    pub x: i32,
    pub y: i32,
    /// Current shape. Shared so per-tick queries do not copy the bitmap.
    pub image: Option<Arc<CursorImage>>,
}

/// Mouse button state for the click-ripple animation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub left: bool,
    pub right: bool,
}

impl ButtonState {
    pub fn any_pressed(&self) -> bool {
        self.left || self.right
    }
}

/// Reads cursor position, shape and button state.
pub trait CursorSource: Send {
    fn cursor(&mut self) -> CursorInfo;
    fn buttons(&mut self) -> ButtonState;
}
