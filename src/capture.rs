//! Capture loop: the dedicated thread that grabs frames.
//!
//! Each iteration acquires a free buffer (spin-yielding on pool exhaustion,
//! the backpressure path), blits the capture region, composites the cursor,
//! stamps the frame and pushes it to the encode queue, then paces itself to
//! the frame interval.
//!
//! Naive `sleep(ms_per_frame)` oversleeps on coarse OS timers, so pacing
//! sleeps for the interval minus an adaptive slack and spin-yields the rest.
//! The slack shrinks while wakeups land comfortably early and grows after an
//! overshoot, trading a little busy-wait for bounded jitter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::cursor::CursorCompositor;
use crate::encode::EncodeItem;
use crate::error::RecorderResult;
use crate::pool::FramePool;
use crate::settings::CaptureRegion;
use crate::source::ScreenSource;

/// Slack never shrinks below this; timer noise makes tighter margins useless.
const MIN_SLACK: Duration = Duration::from_micros(50);

/// Wakeups earlier than this before the deadline count as "comfortably
/// ahead" and let the slack shrink.
const COMFORT_MARGIN: Duration = Duration::from_millis(2);

/// Adaptive sleep/spin pacer holding a loop to a fixed interval.
pub struct FramePacer {
    interval: Duration,
    slack: Duration,
    max_slack: Duration,
}

impl FramePacer {
    pub fn new(fps: u32, initial_slack: Duration) -> Self {
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        // Spinning more than a quarter interval defeats the purpose. At
        // extreme rates the quarter interval can undercut MIN_SLACK, so the
        // ceiling wins over the floor.
        let max_slack = interval / 4;
        Self {
            interval,
            slack: initial_slack.max(MIN_SLACK).min(max_slack),
            max_slack,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until one interval has elapsed since `iteration_start`.
    pub fn pace(&mut self, iteration_start: Instant) {
        let deadline = iteration_start + self.interval;
        let now = Instant::now();

        if now < deadline {
            let remaining = deadline - now;
            if remaining > self.slack {
                std::thread::sleep(remaining - self.slack);
                let woke = Instant::now();
                if woke >= deadline {
                    // Overslept past the deadline: widen the margin.
                    self.slack = (self.slack * 2).min(self.max_slack);
                } else if deadline - woke >= self.slack + COMFORT_MARGIN {
                    self.slack = (self.slack / 2).max(MIN_SLACK).min(self.max_slack);
                }
            }
            // Spin-yield the tail for sub-millisecond accuracy.
            while Instant::now() < deadline {
                std::thread::yield_now();
            }
        } else {
            // The iteration itself blew the budget; no sleep, just note it.
            self.slack = (self.slack * 2).min(self.max_slack);
        }
    }
}

/// Everything the capture thread needs, bundled for the spawn call.
pub struct CaptureContext {
    pub screen: Box<dyn ScreenSource>,
    pub compositor: Option<CursorCompositor>,
    pub region: CaptureRegion,
    pub fps: u32,
    pub pacer_slack: Duration,
    pub max_duration: Option<Duration>,
}

/// Run the capture loop until stopped.
///
/// Always sends the `Stop` sentinel on the way out, including on error, so
/// the encode loop terminates deterministically. Returns the number of
/// frames captured.
pub fn run_capture_loop(
    mut ctx: CaptureContext,
    pool: Arc<FramePool>,
    queue: Sender<EncodeItem>,
    stop: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
) -> RecorderResult<u64> {
    let mut pacer = FramePacer::new(ctx.fps, ctx.pacer_slack);
    let started = Instant::now();
    let mut captured: u64 = 0;

    log::debug!(
        "[CAPTURE] Loop starting: {}x{} @ {} fps, pool of {}",
        ctx.region.width,
        ctx.region.height,
        ctx.fps,
        pool.capacity()
    );

    let result = loop {
        let iteration_start = Instant::now();

        if stop.load(Ordering::SeqCst) {
            break Ok(captured);
        }
        if let Some(max) = ctx.max_duration {
            if started.elapsed() >= max {
                log::debug!("[CAPTURE] Max duration reached");
                stop.store(true, Ordering::SeqCst);
                break Ok(captured);
            }
        }

        // Backpressure: pool empty means the encoder is behind. Yield and
        // re-poll instead of allocating.
        let frame = loop {
            match pool.acquire() {
                Some(frame) => break Some(frame),
                None => {
                    if stop.load(Ordering::SeqCst) {
                        break None;
                    }
                    std::thread::yield_now();
                }
            }
        };
        let Some(mut buf) = frame else {
            break Ok(captured);
        };

        if let Err(e) = ctx.screen.capture_region(&ctx.region, &mut buf) {
            // A failed blit is fatal: skipping it would desync timestamps.
            log::error!("[CAPTURE] Blit failed: {}", e);
            stop.store(true, Ordering::SeqCst);
            pool.release(buf);
            break Err(e);
        }

        if let Some(ref mut compositor) = ctx.compositor {
            compositor.composite(&mut buf, &ctx.region);
        }
        buf.captured_at = Instant::now();

        if queue.send(EncodeItem::Frame(buf)).is_err() {
            // Encode side is gone; its own error is the authoritative one.
            log::warn!("[CAPTURE] Encode queue disconnected");
            stop.store(true, Ordering::SeqCst);
            break Ok(captured);
        }
        captured += 1;
        frames_captured.store(captured, Ordering::Relaxed);

        pacer.pace(iteration_start);
    };

    let _ = queue.send(EncodeItem::Stop);
    let elapsed = started.elapsed().as_secs_f64();
    log::debug!(
        "[CAPTURE] Loop complete: {} frames in {:.2}s ({:.1} fps)",
        captured,
        elapsed,
        if elapsed > 0.0 {
            captured as f64 / elapsed
        } else {
            0.0
        }
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_holds_interval() {
        let mut pacer = FramePacer::new(100, Duration::from_millis(1)); // 10ms frames
        let start = Instant::now();
        for _ in 0..20 {
            let iter = Instant::now();
            pacer.pace(iter);
        }
        let elapsed = start.elapsed();
        // 20 frames at 10ms: allow scheduler noise but catch gross drift.
        assert!(elapsed >= Duration::from_millis(195), "ran fast: {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(260), "ran slow: {:?}", elapsed);
    }

    #[test]
    fn test_pacer_jitter_bounded() {
        let mut pacer = FramePacer::new(60, Duration::from_millis(1));
        let interval = pacer.interval();
        let mut worst = Duration::ZERO;
        for _ in 0..30 {
            let iter = Instant::now();
            pacer.pace(iter);
            let drift = iter.elapsed().saturating_sub(interval);
            worst = worst.max(drift);
        }
        assert!(worst < Duration::from_millis(5), "worst jitter {:?}", worst);
    }

    #[test]
    fn test_pacer_slack_adapts_on_overshoot() {
        let mut pacer = FramePacer::new(30, Duration::from_millis(1));
        let before = pacer.slack;
        // An iteration that already blew its budget grows the slack.
        pacer.pace(Instant::now() - Duration::from_millis(100));
        assert!(pacer.slack >= before);
        assert!(pacer.slack <= pacer.max_slack);
    }

    #[test]
    fn test_pacer_slack_clamped() {
        let pacer = FramePacer::new(30, Duration::from_secs(1));
        assert!(pacer.slack <= pacer.max_slack);

        let tiny = FramePacer::new(30, Duration::ZERO);
        assert!(tiny.slack >= MIN_SLACK);
    }

    #[test]
    fn test_pacer_survives_extreme_fps() {
        // A quarter interval below MIN_SLACK must not panic; the interval
        // cap wins.
        let pacer = FramePacer::new(10_000, Duration::from_millis(1));
        assert!(pacer.slack <= pacer.max_slack);
    }
}
