//! OS-backed default providers.
//!
//! `XcapScreenSource` blits screen regions through the `xcap` screenshot
//! crate; `DeviceQueryCursorSource` reads cursor position and button state
//! through `device_query`. Both are plain implementations of the `source`
//! traits; tests inject fakes instead.

use std::sync::Arc;

use device_query::{DeviceQuery, DeviceState};
use xcap::Monitor;

use crate::error::{RecorderError, RecorderResult};
use crate::frame::{FrameBuffer, PixelFormat};
use crate::settings::CaptureRegion;
use crate::source::{
    ButtonState, CursorImage, CursorInfo, CursorPixels, CursorSource, ScreenSource,
};

/// Screen source that grabs whole-monitor screenshots via `xcap` and crops
/// the capture region out of them.
pub struct XcapScreenSource {
    /// Monitor containing the region, with its origin. Resolved on first use.
    monitor: Option<(Monitor, i32, i32)>,
}

impl XcapScreenSource {
    pub fn new() -> Self {
        Self { monitor: None }
    }

    fn monitor_for(&mut self, region: &CaptureRegion) -> RecorderResult<&(Monitor, i32, i32)> {
        let cached = match self.monitor.take() {
            Some(m) => m,
            None => {
                let monitors = Monitor::all()
                    .map_err(|e| RecorderError::Capture(format!("monitor enumeration: {}", e)))?;
                let mut found = None;
                for m in monitors {
                    let mx = m.x().unwrap_or(0);
                    let my = m.y().unwrap_or(0);
                    let mw = m.width().unwrap_or(0) as i32;
                    let mh = m.height().unwrap_or(0) as i32;
                    if region.x >= mx
                        && region.x < mx + mw
                        && region.y >= my
                        && region.y < my + mh
                    {
                        found = Some((m, mx, my));
                        break;
                    }
                }
                found.ok_or_else(|| {
                    RecorderError::Capture(format!(
                        "no monitor contains region origin ({}, {})",
                        region.x, region.y
                    ))
                })?
            }
        };
        Ok(self.monitor.insert(cached))
    }
}

impl Default for XcapScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for XcapScreenSource {
    fn capture_region(
        &mut self,
        region: &CaptureRegion,
        dest: &mut FrameBuffer,
    ) -> RecorderResult<()> {
        let &(ref monitor, mon_x, mon_y) = self.monitor_for(region)?;
        let shot = monitor
            .capture_image()
            .map_err(|e| RecorderError::Capture(format!("monitor blit: {}", e)))?;

        let shot_w = shot.width() as i32;
        let shot_h = shot.height() as i32;
        // Region origin relative to the monitor's screenshot.
        let off_x = region.x - mon_x;
        let off_y = region.y - mon_y;

        let format = dest.format();
        let bpp = format.bytes_per_pixel();
        let frame_w = dest.width() as usize;
        let src = shot.as_raw();
        let data = dest.data_mut();
        for row in 0..region.height as i32 {
            let sy = off_y + row;
            for col in 0..region.width as i32 {
                let sx = off_x + col;
                let dst_idx = (row as usize * frame_w + col as usize) * bpp;
                if sx < 0 || sy < 0 || sx >= shot_w || sy >= shot_h {
                    // Off-monitor pixels render black.
                    for ch in 0..bpp {
                        data[dst_idx + ch] = 0;
                    }
                    continue;
                }
                let src_idx = ((sy * shot_w + sx) * 4) as usize;
                match format {
                    PixelFormat::Bgra8 => {
                        data[dst_idx] = src[src_idx + 2];
                        data[dst_idx + 1] = src[src_idx + 1];
                        data[dst_idx + 2] = src[src_idx];
                        data[dst_idx + 3] = 255;
                    }
                    PixelFormat::Rgb8 => {
                        data[dst_idx] = src[src_idx];
                        data[dst_idx + 1] = src[src_idx + 1];
                        data[dst_idx + 2] = src[src_idx + 2];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Classic arrow pointer, 12x19. 'X' is black fill, '.' the white outline.
const ARROW_PATTERN: [&str; 19] = [
    "X           ",
    "XX          ",
    "X.X         ",
    "X..X        ",
    "X...X       ",
    "X....X      ",
    "X.....X     ",
    "X......X    ",
    "X.......X   ",
    "X........X  ",
    "X.....XXXXX ",
    "X..X..X     ",
    "X.X X..X    ",
    "XX  X..X    ",
    "X    X..X   ",
    "     X..X   ",
    "      X..X  ",
    "      X..X  ",
    "       XX   ",
];

/// Build the built-in arrow sprite. Portable cursor-image query does not
/// exist, so the default source always reports this shape.
pub fn builtin_arrow_cursor() -> CursorImage {
    let width = ARROW_PATTERN[0].len() as u32;
    let height = ARROW_PATTERN.len() as u32;
    let mut bgra = vec![0u8; (width * height * 4) as usize];
    for (y, row) in ARROW_PATTERN.iter().enumerate() {
        for (x, ch) in row.bytes().enumerate() {
            let idx = (y * width as usize + x) * 4;
            match ch {
                b'X' => bgra[idx..idx + 4].copy_from_slice(&[0, 0, 0, 255]),
                b'.' => bgra[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]),
                _ => {}
            }
        }
    }
    CursorImage {
        width,
        height,
        hotspot_x: 0,
        hotspot_y: 0,
        pixels: CursorPixels::Color(bgra),
    }
}

/// Cursor source reading position and buttons via `device_query`.
pub struct DeviceQueryCursorSource {
    state: DeviceState,
    arrow: Arc<CursorImage>,
}

impl DeviceQueryCursorSource {
    pub fn new() -> Self {
        Self {
            state: DeviceState::new(),
            arrow: Arc::new(builtin_arrow_cursor()),
        }
    }
}

impl Default for DeviceQueryCursorSource {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: `CursorSource: Send` requires this type to cross into the capture
// thread. On Linux `DeviceState` holds an `Rc<X11Connection>` that is created
// in `DeviceState::new()` and never cloned out of the struct, so this source
// is the connection's sole owner and only ever uses it from one thread at a
// time after the move.
unsafe impl Send for DeviceQueryCursorSource {}

impl CursorSource for DeviceQueryCursorSource {
    fn cursor(&mut self) -> CursorInfo {
        let mouse = self.state.get_mouse();
        CursorInfo {
            visible: true,
            x: mouse.coords.0,
            y: mouse.coords.1,
            image: Some(Arc::clone(&self.arrow)),
        }
    }

    fn buttons(&mut self) -> ButtonState {
        let pressed = self.state.get_mouse().button_pressed;
        // Button 1 is left everywhere; right is 2 on Windows, 3 on X11.
        ButtonState {
            left: pressed.get(1).copied().unwrap_or(false),
            right: pressed.get(2).copied().unwrap_or(false)
                || pressed.get(3).copied().unwrap_or(false),
        }
    }
}
