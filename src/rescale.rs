//! Default rescaler built on the `image` crate.
//!
//! Handles both resampling (when the configured output resolution is smaller
//! than the capture resolution) and pixel format repacking (BGRA <-> RGB).

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::{RecorderError, RecorderResult};
use crate::frame::{FrameBuffer, PixelFormat};
use crate::sink::{Rescaler, ScaleFilter};

fn filter_type(filter: ScaleFilter) -> FilterType {
    match filter {
        ScaleFilter::Nearest => FilterType::Nearest,
        ScaleFilter::Bilinear => FilterType::Triangle,
        ScaleFilter::Bicubic => FilterType::CatmullRom,
    }
}

/// CPU rescaler. Stateless; scratch images are allocated per call on the
/// encode thread, never on the capture thread.
#[derive(Default)]
pub struct ImageRescaler;

impl ImageRescaler {
    pub fn new() -> Self {
        Self
    }
}

impl Rescaler for ImageRescaler {
    fn rescale(
        &mut self,
        src: &FrameBuffer,
        dst: &mut FrameBuffer,
        filter: ScaleFilter,
    ) -> RecorderResult<()> {
        // Fast path: identical geometry and format is a straight copy.
        if src.width() == dst.width()
            && src.height() == dst.height()
            && src.format() == dst.format()
        {
            dst.data_mut().copy_from_slice(src.data());
            return Ok(());
        }

        let rgba = to_rgba(src)?;
        let resized = if src.width() == dst.width() && src.height() == dst.height() {
            rgba
        } else {
            imageops::resize(&rgba, dst.width(), dst.height(), filter_type(filter))
        };
        from_rgba(&resized, dst);
        Ok(())
    }
}

fn to_rgba(src: &FrameBuffer) -> RecorderResult<RgbaImage> {
    let (w, h) = (src.width(), src.height());
    let mut rgba = vec![0u8; w as usize * h as usize * 4];
    let data = src.data();
    match src.format() {
        PixelFormat::Bgra8 => {
            for (out, px) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(4)) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
                out[3] = 255;
            }
        }
        PixelFormat::Rgb8 => {
            for (out, px) in rgba.chunks_exact_mut(4).zip(data.chunks_exact(3)) {
                out[0] = px[0];
                out[1] = px[1];
                out[2] = px[2];
                out[3] = 255;
            }
        }
    }
    RgbaImage::from_raw(w, h, rgba)
        .ok_or_else(|| RecorderError::Rescale(format!("bad source geometry {}x{}", w, h)))
}

fn from_rgba(rgba: &RgbaImage, dst: &mut FrameBuffer) {
    let format = dst.format();
    let data = dst.data_mut();
    match format {
        PixelFormat::Bgra8 => {
            for (out, px) in data.chunks_exact_mut(4).zip(rgba.pixels()) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
                out[3] = 255;
            }
        }
        PixelFormat::Rgb8 => {
            for (out, px) in data.chunks_exact_mut(3).zip(rgba.pixels()) {
                out[0] = px[0];
                out[1] = px[1];
                out[2] = px[2];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copy() {
        let mut src = FrameBuffer::new(8, 8, PixelFormat::Bgra8);
        src.data_mut()[0] = 42;
        let mut dst = FrameBuffer::new(8, 8, PixelFormat::Bgra8);

        ImageRescaler::new()
            .rescale(&src, &mut dst, ScaleFilter::Bilinear)
            .unwrap();
        assert_eq!(dst.data(), src.data());
    }

    #[test]
    fn test_format_repack_bgra_to_rgb() {
        let mut src = FrameBuffer::new(2, 1, PixelFormat::Bgra8);
        // One red pixel in BGRA.
        src.data_mut()[..4].copy_from_slice(&[0, 0, 255, 255]);
        let mut dst = FrameBuffer::new(2, 1, PixelFormat::Rgb8);

        ImageRescaler::new()
            .rescale(&src, &mut dst, ScaleFilter::Nearest)
            .unwrap();
        assert_eq!(&dst.data()[..3], &[255, 0, 0]);
    }

    #[test]
    fn test_downsample_halves_solid_color() {
        let mut src = FrameBuffer::new(16, 16, PixelFormat::Bgra8);
        for px in src.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[10, 200, 30, 255]);
        }
        let mut dst = FrameBuffer::new(8, 8, PixelFormat::Bgra8);

        ImageRescaler::new()
            .rescale(&src, &mut dst, ScaleFilter::Bicubic)
            .unwrap();
        // Solid input stays solid after any resampling filter.
        for px in dst.data().chunks_exact(4) {
            assert_eq!(&px[..3], &[10, 200, 30]);
        }
    }
}
