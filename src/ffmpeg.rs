//! FFmpeg encoder sink.
//!
//! Feeds raw frames into an FFmpeg child process over stdin (rawvideo) and
//! lets it handle codec and container. The pipeline never inspects codec
//! internals; this type is just one `EncoderSink` implementation.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;
use std::thread::{self, JoinHandle};

use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::{ffmpeg_is_installed, FfmpegCommand};

use crate::error::{RecorderError, RecorderResult};
use crate::settings::EncoderSettings;
use crate::sink::EncoderSink;

/// `EncoderSink` backed by an FFmpeg child process.
///
/// Runs constant-frame-rate x264, so the incoming PTS is only checked for
/// monotonicity; frame order on stdin is the presentation order.
pub struct FfmpegSink {
    child: FfmpegChild,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<()>>,
    output_path: PathBuf,
    frames_written: u64,
    last_pts: i64,
    finished: bool,
}

/// Consume a child's stderr until EOF, logging each line.
///
/// FFmpeg writes progress stats to stderr for the whole run; left unread,
/// the pipe buffer fills after a few minutes and FFmpeg blocks, which stalls
/// stdin writes and with them the entire pipeline.
fn spawn_stderr_drain<R>(stderr: R) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => log::trace!("[FFMPEG] {}", line),
                    Err(_) => break,
                }
            }
        })
}

impl FfmpegSink {
    /// Spawn FFmpeg configured for `settings`, writing to `output_path`.
    pub fn new(output_path: &Path, settings: &EncoderSettings) -> RecorderResult<Self> {
        settings.validate()?;
        if !ffmpeg_is_installed() {
            return Err(RecorderError::FfmpegNotFound);
        }

        let size = format!("{}x{}", settings.width, settings.height);
        let fps = settings.fps.to_string();
        let bitrate = settings.bitrate.to_string();

        let mut cmd = FfmpegCommand::new();
        cmd.overwrite()
            // Raw frames from stdin
            .args(["-f", "rawvideo"])
            .args(["-pix_fmt", settings.pixel_format.ffmpeg_name()])
            .args(["-s", &size])
            .args(["-r", &fps])
            .input("-")
            // H.264 for broad playback compatibility
            .args(["-c:v", "libx264"])
            .args(["-preset", "veryfast"])
            .args(["-b:v", &bitrate])
            .args(["-pix_fmt", "yuv420p"])
            // Move moov atom to start for fast playback start
            .args(["-movflags", "+faststart"]);
        if let Some(gop) = settings.gop {
            cmd.args(["-g", &gop.to_string()]);
        }
        cmd.output(output_path.to_string_lossy().as_ref());

        log::info!(
            "[FFMPEG] Spawning encoder: {} {} @ {} fps, {} bps -> {}",
            "libx264",
            size,
            fps,
            bitrate,
            output_path.display()
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| RecorderError::Encoder(format!("failed to start FFmpeg: {}", e)))?;
        let stdin = child
            .take_stdin()
            .ok_or_else(|| RecorderError::Encoder("FFmpeg stdin unavailable".to_string()))?;
        let stderr_drain = match child.take_stderr() {
            Some(stderr) => Some(spawn_stderr_drain(stderr).map_err(|e| {
                RecorderError::Encoder(format!("failed to spawn stderr reader: {}", e))
            })?),
            None => None,
        };

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr_drain,
            output_path: output_path.to_path_buf(),
            frames_written: 0,
            last_pts: i64::MIN,
            finished: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl EncoderSink for FfmpegSink {
    fn encode_frame(&mut self, pixels: &[u8], pts: i64) -> RecorderResult<()> {
        debug_assert!(pts >= self.last_pts, "pts regressed: {} < {}", pts, self.last_pts);
        self.last_pts = pts;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::Encoder("encode after finish".to_string()))?;
        stdin
            .write_all(pixels)
            .map_err(|e| RecorderError::Encoder(format!("FFmpeg write failed: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        // Closing stdin signals EOF; FFmpeg then finalizes the container.
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| RecorderError::Encoder(format!("FFmpeg wait failed: {}", e)))?;
        // Stderr hits EOF once the child exits.
        if let Some(drain) = self.stderr_drain.take() {
            let _ = drain.join();
        }
        if !status.success() {
            return Err(RecorderError::Encoder(format!(
                "FFmpeg exited with {}",
                status
            )));
        }
        log::info!(
            "[FFMPEG] Finalized {} ({} frames)",
            self.output_path.display(),
            self.frames_written
        );
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        if let Some(drain) = self.stderr_drain.take() {
            let _ = drain.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stderr_drain_consumes_to_eof() {
        // Well over a pipe buffer's worth of stats-style lines; the reader
        // must swallow all of it and terminate on EOF.
        let mut chatter = String::new();
        for i in 0..4096 {
            chatter.push_str(&format!(
                "frame={:>5} fps=30 q=28.0 size={:>8}kB time=00:00:{:02}\n",
                i,
                i * 40,
                i % 60
            ));
        }
        assert!(chatter.len() > 128 * 1024);

        let drain = spawn_stderr_drain(Cursor::new(chatter.into_bytes())).unwrap();
        drain.join().unwrap();
    }
}
