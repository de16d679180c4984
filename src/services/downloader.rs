//! Fetch stage: downloads TikTok, YouTube Shorts and Reels videos with yt-dlp.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::services::stages::{FetchError, Fetcher};

const FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Runs `yt-dlp` as a subprocess.
pub struct YtDlpFetcher {
    cookies_file: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new(cookies_file: Option<PathBuf>) -> Self {
        Self { cookies_file }
    }

    fn build_args(&self, url: &str, target: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "--quiet",
            "--no-warnings",
            "--no-playlist",
            "--no-progress",
            "-f",
            FORMAT,
            "--merge-output-format",
            "mp4",
            "-o",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(target.to_string_lossy().into_owned());

        if let Some(cookies) = self.cookies_file.as_ref().filter(|p| p.exists()) {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf, FetchError> {
        which::which("yt-dlp").map_err(|_| FetchError::ToolMissing)?;

        if tokio::fs::try_exists(target).await? {
            tokio::fs::remove_file(target).await?;
        }

        tracing::info!(url = %url, target = %target.display(), "Downloading video");

        let output = Command::new("yt-dlp")
            .args(self.build_args(url, target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(stderr = %stderr, "yt-dlp stderr");
            return Err(FetchError::Download {
                url: url.to_string(),
                message: stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("yt-dlp exited with an error")
                    .to_string(),
            });
        }

        if !tokio::fs::try_exists(target).await? {
            return Err(FetchError::Download {
                url: url.to_string(),
                message: "yt-dlp did not produce an output file".to_string(),
            });
        }

        let size = tokio::fs::metadata(target).await?.len();
        tracing::info!(target = %target.display(), bytes = size, "Download complete");
        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_end_with_url() {
        let fetcher = YtDlpFetcher::new(None);
        let args = fetcher.build_args("https://www.tiktok.com/@a/video/1", Path::new("/tmp/j/source.mp4"));
        assert_eq!(args.last().unwrap(), "https://www.tiktok.com/@a/video/1");
        assert_eq!(args[args.len() - 2], "--");
        let out = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[out + 1], "/tmp/j/source.mp4");
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_missing_cookies_file_is_skipped() {
        let fetcher = YtDlpFetcher::new(Some(PathBuf::from("/nonexistent/cookies.txt")));
        let args = fetcher.build_args("https://youtu.be/x", Path::new("out.mp4"));
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_cookies_file_passed_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");
        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();

        let fetcher = YtDlpFetcher::new(Some(cookies.clone()));
        let args = fetcher.build_args("https://youtu.be/x", Path::new("out.mp4"));
        let pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[pos + 1], cookies.to_string_lossy());
    }
}
