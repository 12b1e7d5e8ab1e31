//! Recording configuration and encoder policy.
//!
//! Consolidates all recording settings into a single typed struct, plus the
//! resolution and bitrate policy applied when a capture region is opened.

use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, RecorderResult};
use crate::frame::PixelFormat;

/// Rectangular screen region to record, in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner in screen coordinates.
    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

/// Quality knob scaling the bitrate formula linearly.
///
/// The multiplier feeds `width * height * fps * multiplier / 1000`, a
/// simplified pixel-count heuristic for predictable file sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    /// Bitrate multiplier for this preset.
    pub fn multiplier(&self) -> u32 {
        match self {
            QualityPreset::Low => 75,
            QualityPreset::Medium => 100,
            QualityPreset::High => 150,
        }
    }
}

/// Rational timebase: one presentation tick lasts `num / den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timebase {
    pub num: u32,
    pub den: u32,
}

impl Timebase {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Ticks elapsed for a span of `secs` seconds, rounded to nearest.
    pub fn ticks_for_secs(&self, secs: f64) -> i64 {
        (secs * self.den as f64 / self.num as f64).round() as i64
    }
}

impl Default for Timebase {
    fn default() -> Self {
        // Common MPEG timebase; divisible by all the usual frame rates.
        Self { num: 1, den: 90000 }
    }
}

/// Settings handed to the encoder sink. Immutable once encoding starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Output width in pixels. Must be even (chroma subsampling).
    pub width: u32,
    /// Output height in pixels. Must be even.
    pub height: u32,
    /// Presentation timestamp timebase.
    pub timebase: Timebase,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Frames per second the capture loop paces to.
    pub fps: u32,
    /// Pixel format of frames handed to the sink.
    pub pixel_format: PixelFormat,
    /// Forced keyframe interval in frames. None leaves it to the codec.
    pub gop: Option<u32>,
}

impl EncoderSettings {
    /// Reject settings most codecs cannot accept.
    pub fn validate(&self) -> RecorderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::InvalidSettings(format!(
                "zero output dimension: {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(RecorderError::InvalidSettings(format!(
                "odd output dimension: {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(RecorderError::InvalidSettings("fps is zero".to_string()));
        }
        if self.timebase.num == 0 || self.timebase.den == 0 {
            return Err(RecorderError::InvalidSettings(
                "degenerate timebase".to_string(),
            ));
        }
        Ok(())
    }
}

/// Centralized recording configuration.
///
/// All pipeline knobs in one place. `validate()` clamps out-of-range values
/// instead of erroring so a persisted config can never brick a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Frames per second (10-60).
    pub fps: u32,

    /// Quality preset. Scales the bitrate formula.
    pub quality: QualityPreset,

    /// Maximum output height. Capture taller than this is downscaled
    /// preserving aspect ratio. None records at native size.
    pub max_output_height: Option<u32>,

    /// Number of pre-allocated frame buffers (2-32).
    pub pool_size: usize,

    /// Whether to burn the cursor into captured frames.
    pub include_cursor: bool,

    /// Click ripple animation duration in milliseconds.
    pub ripple_duration_ms: u32,

    /// Click ripple radius at full expansion, in pixels.
    pub ripple_radius: u32,

    /// Initial pacer slack in microseconds (the margin left for spin-yield).
    pub pacer_slack_us: u64,

    /// Maximum recording duration in seconds. None = until stopped.
    pub max_duration_secs: Option<u32>,

    /// Directory where output files are created.
    pub output_dir: std::path::PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            quality: QualityPreset::Medium,
            max_output_height: None,
            pool_size: 10,
            include_cursor: true,
            ripple_duration_ms: 400,
            ripple_radius: 28,
            pacer_slack_us: 1000,
            max_duration_secs: None,
            output_dir: std::path::PathBuf::from("."),
        }
    }
}

impl RecordingConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.fps = self.fps.clamp(10, 60);
        self.pool_size = self.pool_size.clamp(2, 32);
        self.ripple_duration_ms = self.ripple_duration_ms.clamp(100, 2000);
    }

    /// Target output resolution for a capture region.
    ///
    /// Scales down preserving aspect ratio when the region is taller than
    /// `max_output_height`, then rounds both dimensions to even integers.
    pub fn target_resolution(&self, region: &CaptureRegion) -> (u32, u32) {
        let (w, h) = match self.max_output_height {
            Some(max_h) if region.height > max_h => {
                let scale = max_h as f64 / region.height as f64;
                ((region.width as f64 * scale).round() as u32, max_h)
            }
            _ => (region.width, region.height),
        };
        (round_even(w), round_even(h))
    }

    /// Bitrate in bits/sec: `round(width * height * fps * multiplier / 1000)`.
    pub fn calculate_bitrate(&self, width: u32, height: u32) -> u32 {
        let pixels = width as u64 * height as u64;
        let raw = pixels as f64 * self.fps as f64 * self.quality.multiplier() as f64 / 1000.0;
        raw.round() as u32
    }

    /// Full encoder settings for a capture region.
    pub fn encoder_settings(&self, region: &CaptureRegion) -> EncoderSettings {
        let (width, height) = self.target_resolution(region);
        EncoderSettings {
            width,
            height,
            timebase: Timebase::default(),
            bitrate: self.calculate_bitrate(width, height),
            fps: self.fps,
            pixel_format: PixelFormat::Bgra8,
            // Keyframe every second for precise seeking.
            gop: Some(self.fps),
        }
    }
}

/// Round to the nearest even integer, never below 2.
fn round_even(v: u32) -> u32 {
    let even = if v % 2 == 0 { v } else { v + 1 };
    even.max(2)
}
