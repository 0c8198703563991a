//! Error types for yt2mp3-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Yt2Mp3Error>;

/// Coarse error classification for the HTTP surface.
///
/// `Input` means the caller sent something we refused before touching any
/// external tool (bad URL, bad option value). `Processing` is everything
/// downstream of validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Input,
    Processing,
}

#[derive(Error, Debug)]
pub enum Yt2Mp3Error {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Audio processing failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Tagging failed: {0}")]
    Tag(#[from] TagError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl Yt2Mp3Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Yt2Mp3Error::Download(DownloadError::InvalidUrl(_)) => ErrorClass::Input,
            Yt2Mp3Error::Process(ProcessError::UnknownStage(_)) => ErrorClass::Input,
            Yt2Mp3Error::InvalidOption(_) => ErrorClass::Input,
            _ => ErrorClass::Processing,
        }
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("yt-dlp not found. Install with: pip install yt-dlp")]
    YtDlpNotFound,

    #[error("yt-dlp failed with exit code: {0:?}")]
    YtDlpFailed(Option<i32>),

    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Video unavailable or private: {0}")]
    VideoUnavailable(String),

    #[error("No audio stream available")]
    NoAudioStream,

    #[error("Failed to parse metadata: {0}")]
    MetadataParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("FFmpeg {stage} stage failed with exit code: {code:?}")]
    FfmpegFailed {
        stage: &'static str,
        code: Option<i32>,
    },

    #[error("Failed to parse loudness stats")]
    LoudnessParseError,

    #[error("Unknown processing stage: {0}")]
    UnknownStage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("FFmpeg encoding failed with exit code: {0:?}")]
    FfmpegFailed(Option<i32>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TagError {
    #[error("FFmpeg not found")]
    FfmpegNotFound,

    #[error("FFmpeg tag embedding failed with exit code: {0:?}")]
    FfmpegFailed(Option<i32>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_classifies_as_input() {
        let err = Yt2Mp3Error::from(DownloadError::InvalidUrl("nope".into()));
        assert_eq!(err.class(), ErrorClass::Input);
    }

    #[test]
    fn test_invalid_option_classifies_as_input() {
        let err = Yt2Mp3Error::InvalidOption("bitrate out of range".into());
        assert_eq!(err.class(), ErrorClass::Input);
    }

    #[test]
    fn test_downstream_failures_classify_as_processing() {
        let err = Yt2Mp3Error::from(DownloadError::YtDlpFailed(Some(1)));
        assert_eq!(err.class(), ErrorClass::Processing);

        let err = Yt2Mp3Error::from(EncodeError::FfmpegFailed(Some(1)));
        assert_eq!(err.class(), ErrorClass::Processing);
    }
}
