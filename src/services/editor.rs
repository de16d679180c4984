//! Transform stage: center-crop to 9:16 and burn in a call-to-action banner.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::services::stages::{TransformError, Transformer};

/// Runs `ffmpeg` with `args`, returning the last stderr line on failure.
pub(crate) async fn run_ffmpeg(args: &[String]) -> Result<(), FfmpegFailure> {
    which::which("ffmpeg").map_err(|_| FfmpegFailure::NotFound)?;

    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegFailure::Io)?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("exit status {}", output.status));
    Err(FfmpegFailure::Exited(message))
}

#[derive(Debug)]
pub(crate) enum FfmpegFailure {
    NotFound,
    Io(std::io::Error),
    Exited(String),
}

/// Backslash-escape every char of `text` found in `special`.
fn escape_with(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape text for the drawtext `text` option inside a filter graph.
///
/// ffmpeg unescapes twice: the filter graph parser first strips one level
/// (`\ ' [ ] , ;`), then the filter's option parser strips the next
/// (`\ ' :`). `%` is left alone since the filter runs with `expansion=none`.
fn escape_drawtext(text: &str) -> String {
    let option_level = escape_with(text, &['\\', '\'', ':']);
    escape_with(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

/// Filter graph: center crop to 9:16 with even dimensions, then a
/// white-on-red banner 20px from the top.
pub fn vertical_filter(overlay_text: &str) -> String {
    let crop = "crop=w='if(gt(iw/ih,9/16),trunc(ih*9/16/2)*2,trunc(iw/2)*2)'\
                :h='if(gt(iw/ih,9/16),trunc(ih/2)*2,trunc(iw*16/9/2)*2)'";
    if overlay_text.trim().is_empty() {
        return crop.to_string();
    }
    format!(
        "{crop},drawtext=expansion=none:text={text}:font=Liberation Sans:fontsize=50\
         :fontcolor=white:box=1:boxcolor=red:boxborderw=10:x=(w-text_w)/2:y=20",
        crop = crop,
        text = escape_drawtext(overlay_text),
    )
}

/// Reformats clips for vertical feeds with ffmpeg.
pub struct FfmpegTransformer {
    overlay_text: String,
}

impl FfmpegTransformer {
    pub fn new(overlay_text: impl Into<String>) -> Self {
        Self {
            overlay_text: overlay_text.into(),
        }
    }

    fn build_args(&self, source: &Path, target: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            source.to_string_lossy().into_owned(),
            "-vf".into(),
            vertical_filter(&self.overlay_text),
        ];
        // low-memory encode: single thread, fast preset, 24 fps
        args.extend(
            [
                "-r", "24", "-c:v", "libx264", "-preset", "ultrafast", "-crf", "28",
                "-threads", "1", "-pix_fmt", "yuv420p", "-c:a", "aac", "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(target.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Transformer for FfmpegTransformer {
    async fn transform(&self, source: &Path, target: &Path) -> Result<PathBuf, TransformError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(TransformError::MissingSource(source.to_path_buf()));
        }

        tracing::info!(source = %source.display(), target = %target.display(), "Reframing video to 9:16");

        run_ffmpeg(&self.build_args(source, target))
            .await
            .map_err(|e| match e {
                FfmpegFailure::NotFound => TransformError::ToolMissing,
                FfmpegFailure::Io(e) => TransformError::Io(e),
                FfmpegFailure::Exited(msg) => TransformError::Ffmpeg(msg),
            })?;

        Ok(target.to_path_buf())
    }
}
