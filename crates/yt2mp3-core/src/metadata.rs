//! Tagging and cover-art embedding using FFmpeg

use crate::downloader::VideoMetadata;
use crate::error::TagError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Tags applied to the finished file. Multi-valued fields (artists, genres)
/// render as a single tag joined with the configured delimiter.
#[derive(Debug, Clone, Default)]
pub struct TrackTags {
    pub title: String,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub video_id: String,
}

/// User-supplied overrides; any set field wins over fetched metadata
#[derive(Debug, Clone, Default)]
pub struct TagOverrides {
    pub title: Option<String>,
    pub artists: Option<Vec<String>>,
    pub genres: Option<Vec<String>>,
}

impl TrackTags {
    pub fn from_video(meta: &VideoMetadata) -> Self {
        let artists = match (&meta.artists, &meta.artist, &meta.uploader) {
            (Some(list), _, _) if !list.is_empty() => list.clone(),
            (_, Some(artist), _) => vec![artist.clone()],
            (_, _, Some(uploader)) => vec![uploader.clone()],
            _ => Vec::new(),
        };

        let genres = match (&meta.genres, &meta.genre) {
            (Some(list), _) if !list.is_empty() => list.clone(),
            (_, Some(genre)) => vec![genre.clone()],
            _ => Vec::new(),
        };

        Self {
            title: meta.title.clone(),
            artists,
            genres,
            album: meta.album.clone(),
            date: meta.upload_date.clone(),
            video_id: meta.id.clone(),
        }
    }

    pub fn apply_overrides(&mut self, overrides: &TagOverrides) {
        if let Some(ref title) = overrides.title {
            self.title = title.clone();
        }
        if let Some(ref artists) = overrides.artists {
            self.artists = artists.clone();
        }
        if let Some(ref genres) = overrides.genres {
            self.genres = genres.clone();
        }
    }
}

/// Join a multi-valued tag field with the configured delimiter
pub fn join_tag(values: &[String], delimiter: char) -> String {
    values.join(&delimiter.to_string())
}

#[derive(Debug)]
pub struct Tagger {
    ffmpeg_path: PathBuf,
}

impl Tagger {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    /// Embed tags and optional cover art. The audio stream is copied, never
    /// re-encoded.
    pub async fn embed(
        &self,
        audio: &Path,
        output: &Path,
        tags: &TrackTags,
        delimiter: char,
        artwork: Option<&Path>,
    ) -> Result<(), TagError> {
        info!("Embedding tags: {}", tags.title);

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        cmd.arg("-i").arg(audio);

        if let Some(art) = artwork {
            cmd.arg("-i").arg(art);
            cmd.args(["-map", "0:a", "-map", "1:v"]);
            cmd.args(["-c:v", "mjpeg"]);
            cmd.args(["-disposition:v", "attached_pic"]);
        }

        cmd.args(["-metadata", &format!("title={}", tags.title)]);

        if !tags.artists.is_empty() {
            cmd.args([
                "-metadata",
                &format!("artist={}", join_tag(&tags.artists, delimiter)),
            ]);
        }

        if !tags.genres.is_empty() {
            cmd.args([
                "-metadata",
                &format!("genre={}", join_tag(&tags.genres, delimiter)),
            ]);
        }

        if let Some(ref album) = tags.album {
            cmd.args(["-metadata", &format!("album={}", album)]);
        }

        if let Some(ref date) = tags.date {
            cmd.args(["-metadata", &format!("date={}", format_date(date))]);
        }

        // Video id in the comment for provenance
        cmd.args(["-metadata", &format!("comment=YouTube: {}", tags.video_id)]);

        cmd.args(["-c:a", "copy"]);
        cmd.arg("-y").arg(output);

        let status = cmd.status().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TagError::FfmpegNotFound
            } else {
                TagError::Io(e)
            }
        })?;

        if !status.success() {
            return Err(TagError::FfmpegFailed(status.code()));
        }

        debug!("Embedded tags to: {}", output.display());
        Ok(())
    }
}

/// YouTube dates are YYYYMMDD; tags want YYYY-MM-DD
fn format_date(date: &str) -> String {
    if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8])
    } else {
        date.to_string()
    }
}

/// Sanitize filename for filesystem
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Find a collision-free path in `dir`, appending `_copyN` before the
/// extension until the name is unused
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let path = dir.join(filename);
    if !path.exists() {
        return path;
    }

    let (base, ext) = match filename.rsplit_once('.') {
        Some((b, e)) => (b.to_string(), format!(".{}", e)),
        None => (filename.to_string(), String::new()),
    };

    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{}_copy{}{}", base, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
