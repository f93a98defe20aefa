//! FFmpeg subprocess service: probe, transcode, thumbnail, preview clip.
//!
//! All three video derivatives share the CPU-bound decode of one input, so
//! the worker runs them sequentially; this service just shells out per
//! operation. Argument construction is separated from execution so the exact
//! invocations are unit-testable without ffmpeg installed.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Frame offset for the thumbnail, in seconds.
const THUMBNAIL_AT_SECS: f64 = 1.0;
/// Length of the silent preview clip, in seconds.
const PREVIEW_SECS: f64 = 5.0;

#[derive(Clone)]
pub struct FfmpegService {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegService {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Container duration in seconds, probed from the actual bytes.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(probe_duration_args(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to spawn ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        raw.trim()
            .parse::<f64>()
            .with_context(|| format!("unparseable ffprobe duration: {raw:?}"))
    }

    /// Transcode to the standard H.264/AAC MP4 playback rendition.
    pub async fn transcode_mp4(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(transcode_args(input, output), "transcode")
            .await
    }

    /// Extract a single frame at the 1-second mark as a JPEG thumbnail.
    pub async fn extract_thumbnail(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(thumbnail_args(input, output), "thumbnail")
            .await
    }

    /// Cut a fixed-length silent preview clip from the start.
    pub async fn cut_preview(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_ffmpeg(preview_args(input, output), "preview").await
    }

    async fn run_ffmpeg(&self, args: Vec<String>, operation: &str) -> Result<()> {
        let start = std::time::Instant::now();
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to spawn ffmpeg for {operation}"))?;

        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg {} exited with {}: {}",
                operation,
                output.status,
                stderr_tail(&output.stderr)
            );
        }

        tracing::info!(
            operation = operation,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "ffmpeg operation completed"
        );
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn probe_duration_args(input: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path_arg(input),
    ]
}

fn transcode_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(input),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-b:v".into(),
        "2000k".into(),
        "-maxrate".into(),
        "2500k".into(),
        "-bufsize".into(),
        "4000k".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ]
}

fn thumbnail_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{THUMBNAIL_AT_SECS}"),
        "-i".into(),
        path_arg(input),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "3".into(),
        path_arg(output),
    ]
}

fn preview_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(input),
        "-t".into(),
        format!("{PREVIEW_SECS}"),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-b:v".into(),
        "1200k".into(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output),
    ]
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().nth_back(500) {
        Some((idx, _)) => trimmed[idx..].to_string(),
        None => trimmed.to_string(),
    }
}
