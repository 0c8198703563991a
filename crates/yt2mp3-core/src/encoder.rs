//! MP3 encoder using FFmpeg

use crate::error::EncodeError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Allowed CBR bitrate range in kbps
pub const MIN_BITRATE: u32 = 64;
pub const MAX_BITRATE: u32 = 320;

pub fn bitrate_in_range(kbps: u32) -> bool {
    (MIN_BITRATE..=MAX_BITRATE).contains(&kbps)
}

#[derive(Debug)]
pub struct Encoder {
    ffmpeg_path: PathBuf,
}

impl Encoder {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    /// Encode audio to MP3 at the given CBR bitrate
    pub async fn encode(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
    ) -> Result<(), EncodeError> {
        info!("Encoding to MP3 at {} kbps", bitrate_kbps);

        let bitrate = format!("{}k", bitrate_kbps);

        let status = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .args(["-c:a", "libmp3lame", "-b:a", &bitrate])
            .arg("-y")
            .arg(output)
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncodeError::FfmpegNotFound
                } else {
                    EncodeError::Io(e)
                }
            })?;

        if !status.success() {
            return Err(EncodeError::FfmpegFailed(status.code()));
        }

        debug!("Encoded to: {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_in_range() {
        assert!(bitrate_in_range(64));
        assert!(bitrate_in_range(192));
        assert!(bitrate_in_range(320));
        assert!(!bitrate_in_range(32));
        assert!(!bitrate_in_range(321));
        assert!(!bitrate_in_range(0));
    }
}
