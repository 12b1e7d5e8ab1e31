//! Encode loop: the worker thread that owns the encoder sink.
//!
//! Pops frames from the capture queue, rescales them into the encoder's
//! geometry, releases the raw buffer back to the pool immediately (so a slow
//! encode never starves the capture loop), derives a monotonic presentation
//! timestamp and forwards the frame to the sink. A tagged `Stop` sentinel
//! terminates the loop deterministically after all real frames drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::error::RecorderResult;
use crate::frame::FrameBuffer;
use crate::pool::FramePool;
use crate::settings::{EncoderSettings, Timebase};
use crate::sink::{EncoderSink, Rescaler, ScaleFilter};

/// Item on the capture -> encode queue.
///
/// Termination is a tagged variant, not a magic frame, so shutdown is
/// explicit and type-safe.
pub enum EncodeItem {
    Frame(FrameBuffer),
    Stop,
}

/// Derives presentation timestamps from capture times.
///
/// The first frame anchors t=0; later frames convert their elapsed capture
/// time into timebase ticks, clamped so the sequence never decreases even
/// when capture timestamps carry jitter.
pub struct PtsTracker {
    timebase: Timebase,
    first: Option<Instant>,
    last_pts: Option<i64>,
}

impl PtsTracker {
    pub fn new(timebase: Timebase) -> Self {
        Self {
            timebase,
            first: None,
            last_pts: None,
        }
    }

    /// PTS for a frame captured at `captured_at`.
    pub fn pts_for(&mut self, captured_at: Instant) -> i64 {
        let first = *self.first.get_or_insert(captured_at);
        let secs = captured_at
            .checked_duration_since(first)
            .map_or(0.0, |d| d.as_secs_f64());
        self.pts_for_secs(secs)
    }

    /// PTS for an elapsed time in seconds since the first frame.
    pub fn pts_for_secs(&mut self, secs: f64) -> i64 {
        let raw = self.timebase.ticks_for_secs(secs.max(0.0));
        let pts = match self.last_pts {
            Some(last) => raw.max(last),
            None => raw.max(0),
        };
        self.last_pts = Some(pts);
        pts
    }
}

/// Run the encode loop until the stop sentinel arrives.
///
/// Returns the number of frames forwarded to the sink. A rescale or sink
/// failure is fatal: the stop flag is raised, queued frames are drained back
/// into the pool, and the error propagates to the session.
pub fn run_encode_loop(
    rx: Receiver<EncodeItem>,
    pool: Arc<FramePool>,
    mut rescaler: Box<dyn Rescaler>,
    mut sink: Box<dyn EncoderSink>,
    settings: &EncoderSettings,
    filter: ScaleFilter,
    stop: Arc<AtomicBool>,
) -> RecorderResult<u64> {
    let mut out = FrameBuffer::new(settings.width, settings.height, settings.pixel_format);
    let mut pts_tracker = PtsTracker::new(settings.timebase);
    let mut encoded: u64 = 0;

    log::debug!(
        "[ENCODE] Loop starting: out {}x{} {:?}, {} tick/s timebase",
        settings.width,
        settings.height,
        settings.pixel_format,
        settings.timebase.den
    );

    loop {
        match rx.recv() {
            Ok(EncodeItem::Frame(frame)) => {
                let captured_at = frame.captured_at;
                let rescaled = rescaler.rescale(&frame, &mut out, filter);
                // Raw buffer goes back before encoding so capture never
                // starves while the codec works.
                pool.release(frame);

                if let Err(e) = rescaled {
                    log::error!("[ENCODE] Rescale failed: {}", e);
                    stop.store(true, Ordering::SeqCst);
                    drain_until_stop(&rx, &pool);
                    return Err(e);
                }

                let pts = pts_tracker.pts_for(captured_at);
                if let Err(e) = sink.encode_frame(out.data(), pts) {
                    log::error!("[ENCODE] Sink failed at pts {}: {}", pts, e);
                    stop.store(true, Ordering::SeqCst);
                    drain_until_stop(&rx, &pool);
                    return Err(e);
                }
                encoded += 1;
            }
            // Disconnect without a sentinel means the capture side died;
            // finalize what we have.
            Ok(EncodeItem::Stop) | Err(_) => break,
        }
    }

    sink.finish()?;
    log::debug!("[ENCODE] Loop complete: {} frames", encoded);
    Ok(encoded)
}

/// After a fatal error, keep receiving until the capture loop's sentinel (or
/// disconnect) so every in-flight buffer returns to the pool.
fn drain_until_stop(rx: &Receiver<EncodeItem>, pool: &FramePool) {
    loop {
        match rx.recv() {
            Ok(EncodeItem::Frame(frame)) => pool.release(frame),
            Ok(EncodeItem::Stop) | Err(_) => return,
        }
    }
}
