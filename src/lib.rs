//! ReelCap: real-time screen capture and encoding pipeline.
//!
//! The pipeline runs as two threads bridged by a bounded channel: a capture
//! loop that paces itself against the wall clock, burns the cursor into each
//! frame, and recycles buffers through a fixed pool, and an encode loop that
//! rescales, stamps monotonic PTS values, and streams raw frames into an
//! FFmpeg sink. `Recorder` wires it all together.

pub mod capture;
pub mod cursor;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod pool;
pub mod recorder;
pub mod rescale;
pub mod settings;
pub mod sink;
pub mod source;
pub mod system;

pub use error::{RecorderError, RecorderResult};
pub use frame::{FrameBuffer, PixelFormat};
pub use recorder::{Recorder, RecordingSession, StatusReport};
pub use settings::{CaptureRegion, QualityPreset, RecordingConfig};
