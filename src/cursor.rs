//! Cursor compositing onto frame buffers.
//!
//! Burns the system cursor and a transient click-ripple animation directly
//! into a captured frame's pixels. Color cursors alpha-blend as sprites;
//! legacy monochrome cursors (the AND/XOR "I-beam" style) apply
//! `dest = (dest & AND) ^ XOR` so inverse-video rendering is correct over
//! any background.
//!
//! Pure pixel math, no blocking calls. Runs inline in the capture loop and
//! must complete within a small fraction of the frame budget.

use std::time::{Duration, Instant};

use crate::frame::FrameBuffer;
use crate::settings::CaptureRegion;
use crate::source::{CursorImage, CursorPixels, CursorSource};

/// Peak opacity of the click ripple.
const RIPPLE_BASE_ALPHA: f32 = 0.45;

/// Composites cursor and click ripple into frames.
///
/// Owns the cursor source and the click state; both live on the capture
/// thread only.
pub struct CursorCompositor {
    source: Box<dyn CursorSource>,
    ripple_duration: Duration,
    ripple_radius: u32,
    /// Most recent press: when and where (screen coordinates).
    last_click: Option<(Instant, i32, i32)>,
}

impl CursorCompositor {
    pub fn new(
        source: Box<dyn CursorSource>,
        ripple_duration_ms: u32,
        ripple_radius: u32,
    ) -> Self {
        Self {
            source,
            ripple_duration: Duration::from_millis(ripple_duration_ms as u64),
            ripple_radius,
            last_click: None,
        }
    }

    /// Overlay cursor and ripple into `frame`, which maps 1:1 onto `region`.
    pub fn composite(&mut self, frame: &mut FrameBuffer, region: &CaptureRegion) {
        let info = self.source.cursor();

        // A hidden cursor draws nothing, ripple included.
        if !info.visible {
            return;
        }

        // A held button re-arms the ripple every tick, so it tracks drags.
        if self.source.buttons().any_pressed() {
            self.last_click = Some((Instant::now(), info.x, info.y));
        }

        if let Some((when, cx, cy)) = self.last_click {
            let elapsed = when.elapsed();
            if elapsed < self.ripple_duration {
                let progress = elapsed.as_secs_f32() / self.ripple_duration.as_secs_f32();
                render_click_ripple(
                    frame,
                    cx - region.x,
                    cy - region.y,
                    progress,
                    self.ripple_radius,
                );
            } else {
                self.last_click = None;
            }
        }

        let image = match info.image {
            Some(ref img) => img,
            None => return,
        };

        // Hotspot-corrected top-left in frame coordinates.
        let draw_x = info.x - image.hotspot_x - region.x;
        let draw_y = info.y - image.hotspot_y - region.y;

        match image.pixels {
            CursorPixels::Color(_) => overlay_color_cursor(frame, image, draw_x, draw_y),
            CursorPixels::Mono(_) => overlay_mono_cursor(frame, image, draw_x, draw_y),
        }
    }
}

/// Alpha-blend a BGRA cursor sprite at (draw_x, draw_y), clipped to bounds.
pub fn overlay_color_cursor(frame: &mut FrameBuffer, cursor: &CursorImage, draw_x: i32, draw_y: i32) {
    let bgra = match &cursor.pixels {
        CursorPixels::Color(data) => data,
        CursorPixels::Mono(_) => return,
    };

    let clip = match clip_rect(
        draw_x,
        draw_y,
        cursor.width,
        cursor.height,
        frame.width(),
        frame.height(),
    ) {
        Some(c) => c,
        None => return, // Cursor entirely outside the capture rectangle.
    };

    let bpp = frame.format().bytes_per_pixel();
    for row in 0..clip.height {
        for col in 0..clip.width {
            let src_x = clip.src_x + col;
            let src_y = clip.src_y + row;
            let src_idx = ((src_y * cursor.width + src_x) * 4) as usize;
            if src_idx + 3 >= bgra.len() {
                continue;
            }

            let src_a = bgra[src_idx + 3];
            if src_a == 0 {
                continue;
            }

            let dst_idx = frame.pixel_offset(clip.dst_x + col, clip.dst_y + row);
            let data = frame.data_mut();
            if dst_idx + bpp > data.len() {
                continue;
            }

            if src_a == 255 {
                for ch in 0..3.min(bpp) {
                    data[dst_idx + ch] = bgra[src_idx + ch];
                }
            } else {
                let alpha = src_a as f32 / 255.0;
                let inv_alpha = 1.0 - alpha;
                for ch in 0..3.min(bpp) {
                    data[dst_idx + ch] = (bgra[src_idx + ch] as f32 * alpha
                        + data[dst_idx + ch] as f32 * inv_alpha)
                        as u8;
                }
            }
        }
    }
}

/// Apply a monochrome AND/XOR cursor mask at (draw_x, draw_y).
///
/// The mask bitmap is `2 * height` rows tall: top half is the AND plane,
/// bottom half the XOR plane, 1 bit per pixel MSB-first. For each covered
/// pixel and color channel: `dest = (dest & and) ^ xor`.
pub fn overlay_mono_cursor(frame: &mut FrameBuffer, cursor: &CursorImage, draw_x: i32, draw_y: i32) {
    let mask = match &cursor.pixels {
        CursorPixels::Mono(data) => data,
        CursorPixels::Color(_) => return,
    };

    let clip = match clip_rect(
        draw_x,
        draw_y,
        cursor.width,
        cursor.height,
        frame.width(),
        frame.height(),
    ) {
        Some(c) => c,
        None => return,
    };

    let stride = cursor.mono_stride();
    let xor_plane_offset = stride * cursor.height as usize;
    let bpp = frame.format().bytes_per_pixel();

    for row in 0..clip.height {
        for col in 0..clip.width {
            let src_x = (clip.src_x + col) as usize;
            let src_y = (clip.src_y + row) as usize;

            let byte = src_y * stride + src_x / 8;
            let bit = 0x80u8 >> (src_x % 8);
            let and_set = mask.get(byte).map_or(true, |b| b & bit != 0);
            let xor_set = mask
                .get(xor_plane_offset + byte)
                .map_or(false, |b| b & bit != 0);

            // AND=1/XOR=0 leaves the pixel untouched; skip the write.
            if and_set && !xor_set {
                continue;
            }

            let and_byte: u8 = if and_set { 0xFF } else { 0x00 };
            let xor_byte: u8 = if xor_set { 0xFF } else { 0x00 };

            let dst_idx = frame.pixel_offset(clip.dst_x + col, clip.dst_y + row);
            let data = frame.data_mut();
            if dst_idx + bpp > data.len() {
                continue;
            }
            for ch in 0..3.min(bpp) {
                data[dst_idx + ch] = (data[dst_idx + ch] & and_byte) ^ xor_byte;
            }
        }
    }
}

/// Ripple geometry for a given animation progress in [0, 1].
///
/// Radius grows and alpha fades linearly; both are monotonic in progress.
pub fn ripple_params(progress: f32, max_radius: u32) -> (f32, f32) {
    let progress = progress.clamp(0.0, 1.0);
    let radius = max_radius as f32 * progress;
    let alpha = RIPPLE_BASE_ALPHA * (1.0 - progress);
    (radius, alpha)
}

/// Draw a translucent expanding circle centered at (cx, cy).
pub fn render_click_ripple(
    frame: &mut FrameBuffer,
    cx: i32,
    cy: i32,
    progress: f32,
    max_radius: u32,
) {
    let (radius, alpha) = ripple_params(progress, max_radius);
    let radius_i = radius as i32;
    if radius_i <= 0 || alpha <= 0.0 {
        return;
    }

    let width = frame.width() as i32;
    let height = frame.height() as i32;
    let radius_sq = radius * radius;
    // Softer falloff band in the outer 30% of the circle.
    let inner = (radius * 0.7).max(0.0);
    let inner_sq = inner * inner;

    let min_x = (cx - radius_i).max(0);
    let max_x = (cx + radius_i).min(width - 1);
    let min_y = (cy - radius_i).max(0);
    let max_y = (cy + radius_i).min(height - 1);
    if min_x > max_x || min_y > max_y {
        return;
    }

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = (x - cx) as f32;
            let dy = (y - cy) as f32;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > radius_sq {
                continue;
            }

            let edge_alpha = if dist_sq < inner_sq {
                alpha
            } else {
                let edge = (dist_sq - inner_sq) / (radius_sq - inner_sq);
                alpha * (1.0 - edge)
            };

            if edge_alpha > 0.01 {
                blend_pixel(frame, x as u32, y as u32, 255, 255, 255, edge_alpha);
            }
        }
    }
}

/// Blend a solid color into one pixel with the given alpha.
fn blend_pixel(frame: &mut FrameBuffer, x: u32, y: u32, r: u8, g: u8, b: u8, alpha: f32) {
    let bpp = frame.format().bytes_per_pixel();
    let idx = frame.pixel_offset(x, y);
    let data = frame.data_mut();
    if idx + bpp > data.len() {
        return;
    }

    let inv_alpha = 1.0 - alpha;
    // Channel order matches the buffer format: BGR(A) or RGB.
    let (c0, c1, c2) = match bpp {
        3 => (r, g, b),
        _ => (b, g, r),
    };
    data[idx] = (c0 as f32 * alpha + data[idx] as f32 * inv_alpha) as u8;
    data[idx + 1] = (c1 as f32 * alpha + data[idx + 1] as f32 * inv_alpha) as u8;
    data[idx + 2] = (c2 as f32 * alpha + data[idx + 2] as f32 * inv_alpha) as u8;
}

/// Clipped rectangle for cursor compositing.
struct ClipRect {
    /// Source X offset within cursor bitmap
    src_x: u32,
    /// Source Y offset within cursor bitmap
    src_y: u32,
    /// Destination X in frame buffer
    dst_x: u32,
    /// Destination Y in frame buffer
    dst_y: u32,
    /// Width of visible region
    width: u32,
    /// Height of visible region
    height: u32,
}

/// Calculate clipped rectangle when cursor is partially outside frame.
///
/// Returns None if cursor is completely outside frame bounds.
fn clip_rect(
    cursor_x: i32,
    cursor_y: i32,
    cursor_w: u32,
    cursor_h: u32,
    frame_w: u32,
    frame_h: u32,
) -> Option<ClipRect> {
    let src_x = if cursor_x < 0 { (-cursor_x) as u32 } else { 0 };
    let src_y = if cursor_y < 0 { (-cursor_y) as u32 } else { 0 };

    let dst_x = cursor_x.max(0) as u32;
    let dst_y = cursor_y.max(0) as u32;

    let remaining_cursor_w = cursor_w.saturating_sub(src_x);
    let remaining_cursor_h = cursor_h.saturating_sub(src_y);

    let remaining_frame_w = frame_w.saturating_sub(dst_x);
    let remaining_frame_h = frame_h.saturating_sub(dst_y);

    let width = remaining_cursor_w.min(remaining_frame_w);
    let height = remaining_cursor_h.min(remaining_frame_h);

    if width == 0 || height == 0 {
        return None;
    }

    Some(ClipRect {
        src_x,
        src_y,
        dst_x,
        dst_y,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::source::{ButtonState, CursorInfo};
    use std::sync::Arc;

    fn mono_cursor(width: u32, height: u32, and: &[u8], xor: &[u8]) -> CursorImage {
        let mut mask = and.to_vec();
        mask.extend_from_slice(xor);
        CursorImage {
            width,
            height,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels: CursorPixels::Mono(mask),
        }
    }

    #[test]
    fn test_clip_rect_inside_frame() {
        let clip = clip_rect(10, 20, 32, 32, 100, 100).unwrap();
        assert_eq!(clip.src_x, 0);
        assert_eq!(clip.dst_x, 10);
        assert_eq!(clip.dst_y, 20);
        assert_eq!(clip.width, 32);
        assert_eq!(clip.height, 32);
    }

    #[test]
    fn test_clip_rect_partial_left() {
        let clip = clip_rect(-10, 20, 32, 32, 100, 100).unwrap();
        assert_eq!(clip.src_x, 10);
        assert_eq!(clip.dst_x, 0);
        assert_eq!(clip.width, 22);
    }

    #[test]
    fn test_clip_rect_outside_frame() {
        assert!(clip_rect(-50, 20, 32, 32, 100, 100).is_none());
        assert!(clip_rect(20, 150, 32, 32, 100, 100).is_none());
    }

    #[test]
    fn test_mono_xor_glyph_over_black() {
        // 8x2 cursor: AND all ones, XOR is a known glyph. Over a zeroed
        // buffer the output must equal the XOR plane exactly.
        let and = [0xFF, 0xFF];
        let xor = [0b1010_0000, 0b0000_0101];
        let cursor = mono_cursor(8, 2, &and, &xor);

        let mut frame = FrameBuffer::new(8, 2, PixelFormat::Bgra8);
        overlay_mono_cursor(&mut frame, &cursor, 0, 0);

        for y in 0..2u32 {
            for x in 0..8u32 {
                let bit = (xor[y as usize] >> (7 - x)) & 1;
                let expected = if bit == 1 { 0xFF } else { 0x00 };
                let idx = frame.pixel_offset(x, y);
                assert_eq!(frame.data()[idx], expected, "pixel ({}, {})", x, y);
                assert_eq!(frame.data()[idx + 1], expected);
                assert_eq!(frame.data()[idx + 2], expected);
            }
        }
    }

    #[test]
    fn test_mono_invert_mode() {
        // AND=1, XOR=1 inverts whatever is underneath.
        let and = [0x80];
        let xor = [0x80];
        let cursor = mono_cursor(8, 1, &and, &xor);

        let mut frame = FrameBuffer::new(8, 1, PixelFormat::Bgra8);
        frame.data_mut()[0] = 0x5A;
        overlay_mono_cursor(&mut frame, &cursor, 0, 0);
        assert_eq!(frame.data()[0], !0x5Au8);
    }

    #[test]
    fn test_color_cursor_opaque_copy_and_clip() {
        let mut bgra = vec![0u8; 4 * 4 * 4];
        for px in bgra.chunks_exact_mut(4) {
            px.copy_from_slice(&[10, 20, 30, 255]);
        }
        let cursor = CursorImage {
            width: 4,
            height: 4,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels: CursorPixels::Color(bgra),
        };

        let mut frame = FrameBuffer::new(8, 8, PixelFormat::Bgra8);
        overlay_color_cursor(&mut frame, &cursor, 6, 6);

        // Only the top-left 2x2 of the cursor lands inside the frame.
        let idx = frame.pixel_offset(6, 6);
        assert_eq!(&frame.data()[idx..idx + 3], &[10, 20, 30]);
        let untouched = frame.pixel_offset(5, 5);
        assert_eq!(&frame.data()[untouched..untouched + 3], &[0, 0, 0]);
    }

    #[test]
    fn test_color_cursor_transparent_pixels_skipped() {
        let cursor = CursorImage {
            width: 1,
            height: 1,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels: CursorPixels::Color(vec![99, 99, 99, 0]),
        };
        let mut frame = FrameBuffer::new(2, 2, PixelFormat::Bgra8);
        overlay_color_cursor(&mut frame, &cursor, 0, 0);
        assert_eq!(frame.data()[0], 0);
    }

    #[test]
    fn test_ripple_params_monotonic() {
        let mut last_radius = -1.0f32;
        let mut last_alpha = f32::MAX;
        for step in 0..=10 {
            let progress = step as f32 / 10.0;
            let (radius, alpha) = ripple_params(progress, 30);
            assert!(radius >= last_radius, "radius must grow");
            assert!(alpha <= last_alpha, "alpha must fade");
            last_radius = radius;
            last_alpha = alpha;
        }

        let (_, final_alpha) = ripple_params(1.0, 30);
        assert_eq!(final_alpha, 0.0);
        // Clamped past the end.
        let (r_over, a_over) = ripple_params(1.5, 30);
        assert_eq!((r_over, a_over), ripple_params(1.0, 30));
    }

    #[test]
    fn test_ripple_draws_inside_bounds_only() {
        let mut frame = FrameBuffer::new(16, 16, PixelFormat::Bgra8);
        // Center far outside; nothing should be touched.
        render_click_ripple(&mut frame, 200, 200, 0.5, 10);
        assert!(frame.data().iter().all(|&b| b == 0));

        render_click_ripple(&mut frame, 8, 8, 0.5, 6);
        let center = frame.pixel_offset(8, 8);
        assert!(frame.data()[center] > 0);
    }

    struct ScriptedCursor {
        pressed: bool,
        info: CursorInfo,
    }

    impl CursorSource for ScriptedCursor {
        fn cursor(&mut self) -> CursorInfo {
            self.info.clone()
        }
        fn buttons(&mut self) -> ButtonState {
            ButtonState {
                left: self.pressed,
                right: false,
            }
        }
    }

    #[test]
    fn test_hidden_cursor_draws_nothing() {
        // Pressed button with an invisible cursor: no sprite, no ripple.
        let source = ScriptedCursor {
            pressed: true,
            info: CursorInfo {
                visible: false,
                x: 20,
                y: 20,
                image: None,
            },
        };
        let region = CaptureRegion::new(0, 0, 40, 40);
        let mut compositor = CursorCompositor::new(Box::new(source), 400, 8);

        let mut frame = FrameBuffer::new(40, 40, PixelFormat::Bgra8);
        compositor.composite(&mut frame, &region);
        assert!(frame.data().iter().all(|&b| b == 0));
        assert!(compositor.last_click.is_none());
    }

    #[test]
    fn test_compositor_ripple_expires() {
        let cursor_img = Arc::new(CursorImage {
            width: 1,
            height: 1,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels: CursorPixels::Color(vec![255, 255, 255, 255]),
        });
        let source = ScriptedCursor {
            pressed: true,
            info: CursorInfo {
                visible: true,
                x: 20,
                y: 20,
                image: Some(cursor_img),
            },
        };
        let region = CaptureRegion::new(0, 0, 40, 40);
        let mut compositor = CursorCompositor::new(Box::new(source), 100, 8);

        let mut frame = FrameBuffer::new(40, 40, PixelFormat::Bgra8);
        compositor.composite(&mut frame, &region);
        assert!(compositor.last_click.is_some());

        // After the ripple window with the button released, the click clears.
        compositor.source = Box::new(ScriptedCursor {
            pressed: false,
            info: CursorInfo::default(),
        });
        std::thread::sleep(std::time::Duration::from_millis(120));
        let mut frame2 = FrameBuffer::new(40, 40, PixelFormat::Bgra8);
        compositor.composite(&mut frame2, &region);
        assert!(compositor.last_click.is_none());
    }
}
