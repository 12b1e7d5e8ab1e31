//! Encoder and rescaler boundaries.
//!
//! The encode loop owns an opaque `EncoderSink` for the session's lifetime
//! and never inspects codec internals. Injecting a fake sink makes the whole
//! pipeline testable without a codec.

use serde::{Deserialize, Serialize};

use crate::error::RecorderResult;
use crate::frame::FrameBuffer;

/// Opaque sink that accepts raw frames and emits an encoded stream.
pub trait EncoderSink: Send {
    /// Encode one frame. `pts` is in the sink's configured timebase units
    /// and is guaranteed monotonically non-decreasing.
    fn encode_frame(&mut self, pixels: &[u8], pts: i64) -> RecorderResult<()>;

    /// Flush and finalize the output container. Called exactly once, after
    /// the last frame.
    fn finish(&mut self) -> RecorderResult<()>;
}

/// Scaling algorithm for the rescale step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleFilter {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

/// Rescales/reformats a captured frame into the encoder's geometry.
pub trait Rescaler: Send {
    /// Convert `src` into `dst`, resampling when dimensions differ and
    /// repacking when pixel formats differ.
    fn rescale(
        &mut self,
        src: &FrameBuffer,
        dst: &mut FrameBuffer,
        filter: ScaleFilter,
    ) -> RecorderResult<()>;
}
