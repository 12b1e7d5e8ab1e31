//! Recording session orchestration.
//!
//! `Recorder` turns a `RecordingConfig` into `RecordingSession`s. A session
//! owns the whole pipeline: the frame pool, the capture and encode threads,
//! the shared stop flag, and the optional status reporter. `finish()` joins
//! everything, writes the metadata sidecar, and hands back the output path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use serde::Serialize;

use crate::capture::{run_capture_loop, CaptureContext};
use crate::cursor::CursorCompositor;
use crate::encode::{run_encode_loop, EncodeItem};
use crate::error::{RecorderError, RecorderResult};
use crate::ffmpeg::FfmpegSink;
use crate::pool::FramePool;
use crate::rescale::ImageRescaler;
use crate::settings::{CaptureRegion, EncoderSettings, RecordingConfig};
use crate::sink::{EncoderSink, Rescaler, ScaleFilter};
use crate::source::ScreenSource;
use crate::system::{DeviceQueryCursorSource, XcapScreenSource};

/// How often the reporter thread samples the frame counter.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic progress snapshot delivered to the status callback.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusReport {
    pub elapsed_secs: f64,
    pub frames: u64,
    pub average_fps: f64,
}

pub type StatusCallback = Box<dyn Fn(StatusReport) + Send>;

/// Sidecar metadata written next to the video file on finish.
#[derive(Debug, Serialize)]
struct RecordingMetadata {
    created_at: String,
    output_file: String,
    width: u32,
    height: u32,
    fps: u32,
    bitrate: u32,
    duration_secs: f64,
    frames_captured: u64,
    frames_encoded: u64,
}

/// Entry point for recordings. Holds the validated config and opens sessions.
pub struct Recorder {
    config: RecordingConfig,
}

impl Recorder {
    pub fn new(mut config: RecordingConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Open a session with the default providers: `xcap` screen capture,
    /// `device_query` cursor tracking, and an FFmpeg sink writing a
    /// timestamped MP4 under the configured output directory.
    pub fn open_capture(&self, region: CaptureRegion) -> RecorderResult<RecordingSession> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let filename = format!(
            "recording_{}.mp4",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let output_path = self.config.output_dir.join(filename);

        let settings = self.config.encoder_settings(&region);
        let sink = FfmpegSink::new(&output_path, &settings)?;
        let compositor = if self.config.include_cursor {
            Some(CursorCompositor::new(
                Box::new(DeviceQueryCursorSource::new()),
                self.config.ripple_duration_ms,
                self.config.ripple_radius,
            ))
        } else {
            None
        };

        self.open_capture_with(
            region,
            Box::new(XcapScreenSource::new()),
            compositor,
            Box::new(ImageRescaler::new()),
            Box::new(sink),
            &output_path,
        )
    }

    /// Open a session with injected providers. This is the seam the tests
    /// drive fake sources and sinks through.
    pub fn open_capture_with(
        &self,
        region: CaptureRegion,
        screen: Box<dyn ScreenSource>,
        compositor: Option<CursorCompositor>,
        rescaler: Box<dyn Rescaler>,
        sink: Box<dyn EncoderSink>,
        output_path: &Path,
    ) -> RecorderResult<RecordingSession> {
        let settings = self.config.encoder_settings(&region);
        settings.validate()?;

        let pool = Arc::new(FramePool::new(
            self.config.pool_size,
            region.width,
            region.height,
            settings.pixel_format,
        ));

        log::debug!(
            "[SESSION] Opened: region {}x{}+{}+{}, output {}x{} @ {} fps, {} bps",
            region.width,
            region.height,
            region.x,
            region.y,
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate
        );

        Ok(RecordingSession {
            config: self.config.clone(),
            region,
            settings,
            output_path: output_path.to_path_buf(),
            pool,
            stop: Arc::new(AtomicBool::new(false)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            parts: Some(SessionParts {
                screen,
                compositor,
                rescaler,
                sink,
            }),
            on_status: None,
            handles: None,
            started_at: None,
            finished: false,
        })
    }
}

/// Pipeline pieces consumed when the threads spawn.
struct SessionParts {
    screen: Box<dyn ScreenSource>,
    compositor: Option<CursorCompositor>,
    rescaler: Box<dyn Rescaler>,
    sink: Box<dyn EncoderSink>,
}

struct SessionHandles {
    capture: JoinHandle<RecorderResult<u64>>,
    encode: JoinHandle<RecorderResult<u64>>,
    reporter: Option<JoinHandle<()>>,
}

/// A single recording in progress.
///
/// `start()` spawns the pipeline threads; `finish()` stops them, joins them,
/// writes the metadata sidecar, and returns the output path. `finish()` is
/// idempotent; dropping an unfinished session stops the threads too.
pub struct RecordingSession {
    config: RecordingConfig,
    region: CaptureRegion,
    settings: EncoderSettings,
    output_path: PathBuf,
    pool: Arc<FramePool>,
    stop: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    parts: Option<SessionParts>,
    on_status: Option<StatusCallback>,
    handles: Option<SessionHandles>,
    started_at: Option<Instant>,
    finished: bool,
}

impl RecordingSession {
    /// Register a progress callback. Must be called before `start()`.
    pub fn set_status_callback(&mut self, callback: StatusCallback) {
        self.on_status = Some(callback);
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn encoder_settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Frames captured so far. Safe to poll from any thread via the session.
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::SeqCst)
    }

    /// The frame pool backing this session.
    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    pub fn is_running(&self) -> bool {
        self.handles.is_some() && !self.stop.load(Ordering::SeqCst)
    }

    /// Spawn the capture, encode, and reporter threads.
    pub fn start(&mut self) -> RecorderResult<()> {
        let parts = self
            .parts
            .take()
            .ok_or_else(|| RecorderError::Session("session already started".to_string()))?;

        // Queue depth matches the pool: the pool going empty is the real
        // backpressure signal, the channel just carries ownership across.
        let (frame_tx, frame_rx) = bounded::<EncodeItem>(self.config.pool_size);

        let ctx = CaptureContext {
            screen: parts.screen,
            compositor: parts.compositor,
            region: self.region,
            fps: self.config.fps,
            pacer_slack: Duration::from_micros(self.config.pacer_slack_us),
            max_duration: self
                .config
                .max_duration_secs
                .map(|s| Duration::from_secs(s as u64)),
        };

        let capture = thread::Builder::new().name("capture".to_string()).spawn({
            let pool = Arc::clone(&self.pool);
            let stop = Arc::clone(&self.stop);
            let frames = Arc::clone(&self.frames_captured);
            move || run_capture_loop(ctx, pool, frame_tx, stop, frames)
        })?;

        let encode = thread::Builder::new().name("encode".to_string()).spawn({
            let pool = Arc::clone(&self.pool);
            let stop = Arc::clone(&self.stop);
            let settings = self.settings.clone();
            let rescaler = parts.rescaler;
            let sink = parts.sink;
            move || {
                run_encode_loop(
                    frame_rx,
                    pool,
                    rescaler,
                    sink,
                    &settings,
                    ScaleFilter::default(),
                    stop,
                )
            }
        })?;

        let reporter = match self.on_status.take() {
            Some(callback) => Some(thread::Builder::new().name("reporter".to_string()).spawn({
                let stop = Arc::clone(&self.stop);
                let frames = Arc::clone(&self.frames_captured);
                move || {
                    let started = Instant::now();
                    while !stop.load(Ordering::SeqCst) {
                        thread::sleep(REPORT_INTERVAL);
                        let elapsed = started.elapsed().as_secs_f64();
                        let count = frames.load(Ordering::SeqCst);
                        callback(StatusReport {
                            elapsed_secs: elapsed,
                            frames: count,
                            average_fps: if elapsed > 0.0 {
                                count as f64 / elapsed
                            } else {
                                0.0
                            },
                        });
                    }
                }
            })?),
            None => None,
        };

        self.started_at = Some(Instant::now());
        self.handles = Some(SessionHandles {
            capture,
            encode,
            reporter,
        });
        log::info!("[SESSION] Recording started -> {:?}", self.output_path);
        Ok(())
    }

    /// Stop the pipeline, join all threads, write the metadata sidecar, and
    /// return the output path. Calling it again returns the same path.
    pub fn finish(&mut self) -> RecorderResult<PathBuf> {
        if self.finished {
            return Ok(self.output_path.clone());
        }
        let handles = self
            .handles
            .take()
            .ok_or_else(|| RecorderError::Session("session was never started".to_string()))?;

        self.stop.store(true, Ordering::SeqCst);

        let captured = handles
            .capture
            .join()
            .map_err(|_| RecorderError::ThreadPanic("capture".to_string()))?;
        let encoded = handles
            .encode
            .join()
            .map_err(|_| RecorderError::ThreadPanic("encode".to_string()))?;
        if let Some(reporter) = handles.reporter {
            reporter
                .join()
                .map_err(|_| RecorderError::ThreadPanic("reporter".to_string()))?;
        }

        // Both loops report; the capture error wins since it is the root
        // cause when the whole pipeline unwinds.
        let captured = captured?;
        let encoded = encoded?;
        self.finished = true;

        let duration_secs = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        log::info!(
            "[SESSION] Recording finished: {} captured, {} encoded, {:.1}s",
            captured,
            encoded,
            duration_secs
        );

        self.write_metadata(captured, encoded, duration_secs)?;
        Ok(self.output_path.clone())
    }

    fn write_metadata(
        &self,
        frames_captured: u64,
        frames_encoded: u64,
        duration_secs: f64,
    ) -> RecorderResult<()> {
        let metadata = RecordingMetadata {
            created_at: chrono::Local::now().to_rfc3339(),
            output_file: self.output_path.to_string_lossy().to_string(),
            width: self.settings.width,
            height: self.settings.height,
            fps: self.settings.fps,
            bitrate: self.settings.bitrate,
            duration_secs,
            frames_captured,
            frames_encoded,
        };
        let sidecar = self.output_path.with_extension("json");
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&sidecar, json)?;
        log::debug!("[SESSION] Metadata written to {:?}", sidecar);
        Ok(())
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.handles.is_some() {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handles) = self.handles.take() {
                let _ = handles.capture.join();
                let _ = handles.encode.join();
                if let Some(reporter) = handles.reporter {
                    let _ = reporter.join();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuffer;

    struct NullScreen;

    impl ScreenSource for NullScreen {
        fn capture_region(
            &mut self,
            _region: &CaptureRegion,
            _dest: &mut FrameBuffer,
        ) -> RecorderResult<()> {
            Ok(())
        }
    }

    struct NullSink;

    impl EncoderSink for NullSink {
        fn encode_frame(&mut self, _pixels: &[u8], _pts: i64) -> RecorderResult<()> {
            Ok(())
        }

        fn finish(&mut self) -> RecorderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_recorder_clamps_config() {
        let recorder = Recorder::new(RecordingConfig {
            fps: 500,
            pool_size: 1,
            ..Default::default()
        });
        assert_eq!(recorder.config().fps, 60);
        assert_eq!(recorder.config().pool_size, 2);
    }

    #[test]
    fn test_finish_before_start_is_an_error() {
        let recorder = Recorder::new(RecordingConfig::default());
        let mut session = recorder
            .open_capture_with(
                CaptureRegion::new(0, 0, 64, 64),
                Box::new(NullScreen),
                None,
                Box::new(ImageRescaler::new()),
                Box::new(NullSink),
                Path::new("out.mp4"),
            )
            .unwrap();
        assert!(matches!(
            session.finish(),
            Err(RecorderError::Session(_))
        ));
    }
}
