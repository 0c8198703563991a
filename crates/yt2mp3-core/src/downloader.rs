//! YouTube audio downloader using yt-dlp

use crate::error::DownloadError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Downloader {
    yt_dlp_path: PathBuf,
    temp_dir: PathBuf,
}

#[derive(Debug)]
pub struct DownloadResult {
    pub audio_path: PathBuf,
    pub metadata: VideoMetadata,
    pub thumbnail_path: Option<PathBuf>,
}

/// Download progress parsed from yt-dlp's `--newline` output
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub percent: f32,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub artists: Option<Vec<String>>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub ext: String,
}

impl Downloader {
    pub fn new(yt_dlp_path: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            yt_dlp_path,
            temp_dir,
        }
    }

    /// Fetch metadata for a URL without downloading anything
    pub async fn probe(&self, url: &str) -> Result<VideoMetadata, DownloadError> {
        debug!("Probing metadata for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--skip-download", "--no-playlist", url])
            .output()
            .await
            .map_err(map_spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr, url, output.status.code()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&stdout).map_err(|e| DownloadError::MetadataParse(e.to_string()))
    }

    /// Download the best available audio stream into the temp directory.
    /// Progress percentages are forwarded over `progress` when provided.
    pub async fn download(
        &self,
        url: &str,
        progress: Option<mpsc::Sender<DownloadProgress>>,
    ) -> Result<DownloadResult, DownloadError> {
        info!("Downloading audio from: {}", url);

        let metadata = self.probe(url).await?;
        let output_template = self.temp_dir.join("%(id)s.%(ext)s");

        let mut child = Command::new(&self.yt_dlp_path)
            .args([
                // Format selection: best audio, prefer Opus
                "-f",
                "bestaudio[acodec=opus]/bestaudio[acodec=aac]/bestaudio",
                // Extract audio without re-encoding (keep original codec)
                "--extract-audio",
                "--audio-format",
                "best",
                "--postprocessor-args",
                "ExtractAudio:-acodec copy",
                // Cover art for tagging
                "--write-thumbnail",
                "--convert-thumbnails",
                "jpg",
                "--no-playlist",
                "--no-overwrites",
                // One progress line per update, machine-parseable
                "--progress",
                "--newline",
                "-o",
                output_template.to_str().unwrap_or("%(id)s.%(ext)s"),
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(map_spawn_error)?;

        // Drain stderr concurrently so the child never blocks on a full pipe
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(update) = parse_progress_line(&line) {
                    if let Some(ref tx) = progress {
                        let _ = tx.try_send(update);
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            debug!("yt-dlp stderr: {}", stderr);
            return Err(classify_stderr(&stderr, url, status.code()));
        }

        debug!("Downloaded: {} ({})", metadata.title, metadata.id);

        let audio_path = self.find_audio_file(&metadata.id)?;
        let thumbnail_path = self.find_thumbnail(&metadata.id);

        Ok(DownloadResult {
            audio_path,
            metadata,
            thumbnail_path,
        })
    }

    fn find_audio_file(&self, video_id: &str) -> Result<PathBuf, DownloadError> {
        // Look for common audio extensions
        let extensions = ["opus", "m4a", "webm", "mp3", "ogg", "aac"];

        for ext in extensions {
            let path = self.temp_dir.join(format!("{}.{}", video_id, ext));
            if path.exists() {
                debug!("Found audio file: {}", path.display());
                return Ok(path);
            }
        }

        Err(DownloadError::NoAudioStream)
    }

    fn find_thumbnail(&self, video_id: &str) -> Option<PathBuf> {
        for ext in ["jpg", "png", "webp"] {
            let path = self.temp_dir.join(format!("{}.{}", video_id, ext));
            if path.exists() {
                return Some(path);
            }
        }
        None
    }
}

fn map_spawn_error(e: std::io::Error) -> DownloadError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DownloadError::YtDlpNotFound
    } else {
        DownloadError::Io(e)
    }
}

fn classify_stderr(stderr: &str, url: &str, code: Option<i32>) -> DownloadError {
    if stderr.contains("Video unavailable") || stderr.contains("Private video") {
        DownloadError::VideoUnavailable(url.to_string())
    } else if stderr.contains("is not a valid URL") {
        DownloadError::InvalidUrl(url.to_string())
    } else {
        DownloadError::YtDlpFailed(code)
    }
}

/// Parse a `[download]  42.7% of ~3.52MiB at 1.23MiB/s ETA 00:02` line
fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let re = regex::Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?)%(?:.*?\bat\s+(\S+))?(?:.*?\bETA\s+(\S+))?",
    )
    .ok()?;
    let caps = re.captures(line)?;

    Some(DownloadProgress {
        percent: caps.get(1)?.as_str().parse().ok()?,
        speed: caps.get(2).map(|m| m.as_str().to_string()),
        eta: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

/// Validate a YouTube URL and extract its 11-character video id.
///
/// Validation happens before any subprocess is spawned; a malformed URL never
/// reaches yt-dlp.
pub fn validate_url(url: &str) -> Result<String, DownloadError> {
    let re = regex::Regex::new(
        r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch\?\S*?v=|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})(?:[&?/#]\S*)?$",
    )
    .map_err(|e| DownloadError::MetadataParse(e.to_string()))?;

    re.captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_accepts_watch_urls() {
        assert_eq!(
            validate_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            validate_url("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            validate_url("https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            validate_url("https://youtube.com/shorts/dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_validate_url_rejects_non_youtube() {
        assert!(validate_url("https://example.com/video").is_err());
        assert!(validate_url("not a url at all").is_err());
        assert!(validate_url("").is_err());
        // Right domain, missing id
        assert!(validate_url("https://www.youtube.com/watch").is_err());
        // Id too short
        assert!(validate_url("https://youtu.be/abc").is_err());
    }

    #[test]
    fn test_parse_progress_line() {
        let update =
            parse_progress_line("[download]  42.7% of ~3.52MiB at 1.23MiB/s ETA 00:02").unwrap();
        assert!((update.percent - 42.7).abs() < f32::EPSILON);
        assert_eq!(update.speed.as_deref(), Some("1.23MiB/s"));
        assert_eq!(update.eta.as_deref(), Some("00:02"));

        let update = parse_progress_line("[download] 100% of 3.52MiB in 00:03").unwrap();
        assert!((update.percent - 100.0).abs() < f32::EPSILON);

        assert!(parse_progress_line("[info] Writing video metadata").is_none());
    }

    #[test]
    fn test_metadata_deserializes_partial_json() {
        let json = r#"{"id": "dQw4w9WgXcQ", "title": "Test", "ext": "opus"}"#;
        let meta: VideoMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.id, "dQw4w9WgXcQ");
        assert!(meta.artists.is_none());
        assert!(meta.genres.is_none());
    }
}
