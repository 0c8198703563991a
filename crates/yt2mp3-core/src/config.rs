//! Configuration management for yt2mp3
//!
//! Precedence follows the service contract: CLI flag > environment variable >
//! config file > built-in default. The figment layers cover the file and the
//! `YT2MP3_`-prefixed environment; the dedicated `SAVE_DIRECTORY`, `PUID` and
//! `PGID` variables and the CLI flags are applied on top by the caller.

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub output: OutputConfig,
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Path to yt-dlp binary (auto-detected if not set)
    pub yt_dlp: Option<PathBuf>,
    /// Path to FFmpeg binary (auto-detected if not set)
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served at `/` (index.html)
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Save directory. When set, finished files are written here instead of
    /// streamed to the browser.
    pub save_directory: Option<PathBuf>,
    /// Default MP3 bitrate in kbps
    pub default_bitrate: u32,
    /// Default separator for multi-valued tags (artist, genre)
    pub default_delimiter: char,
    /// Ownership applied to saved files (uid, gid)
    pub owner_uid: Option<u32>,
    pub owner_gid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Target LUFS level (default: -14.0)
    pub target_lufs: f32,
    /// True peak limit (default: -1.0)
    pub true_peak: f32,
    /// Loudness range (default: 11.0)
    pub lra: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                yt_dlp: None,
                ffmpeg: None,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                static_dir: PathBuf::from("static"),
            },
            output: OutputConfig {
                save_directory: None,
                default_bitrate: 192,
                default_delimiter: ';',
                owner_uid: None,
                owner_gid: None,
            },
            normalize: NormalizeConfig {
                target_lufs: -14.0,
                true_peak: -1.0,
                lra: 11.0,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Load from default config directory
        if let Some(config_dir) = dirs::config_dir() {
            let default_config = config_dir.join("yt2mp3/config.toml");
            if default_config.exists() {
                figment = figment.merge(Toml::file(&default_config));
            }
        }

        // Load from specified config file
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment
        figment = figment.merge(Env::prefixed("YT2MP3_").split("_"));

        let mut config: Config = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        // Dedicated environment variables from the original service contract.
        // CLI flags override these in the binary.
        if config.output.save_directory.is_none() {
            if let Ok(dir) = std::env::var("SAVE_DIRECTORY") {
                if !dir.is_empty() {
                    config.output.save_directory = Some(PathBuf::from(dir));
                }
            }
        }
        if config.output.owner_uid.is_none() {
            config.output.owner_uid = parse_id_env("PUID")?;
        }
        if config.output.owner_gid.is_none() {
            config.output.owner_gid = parse_id_env("PGID")?;
        }

        Ok(config)
    }

    /// Get yt-dlp path, auto-detecting if not configured
    pub fn yt_dlp_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.yt_dlp {
            Ok(path.clone())
        } else {
            which::which("yt-dlp")
                .map_err(|_| ConfigError::InvalidValue("yt-dlp not found in PATH".to_string()))
        }
    }

    /// Get FFmpeg path, auto-detecting if not configured
    pub fn ffmpeg_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.ffmpeg {
            Ok(path.clone())
        } else {
            which::which("ffmpeg")
                .map_err(|_| ConfigError::InvalidValue("ffmpeg not found in PATH".to_string()))
        }
    }

    /// Whether finished files are saved server-side instead of streamed.
    /// True exactly when a save directory is configured.
    pub fn save_mode(&self) -> bool {
        self.output.save_directory.is_some()
    }

    /// Ownership (uid, gid) applied to saved files, when both are configured
    /// or individually when only one is.
    pub fn owner(&self) -> Option<(Option<u32>, Option<u32>)> {
        match (self.output.owner_uid, self.output.owner_gid) {
            (None, None) => None,
            (uid, gid) => Some((uid, gid)),
        }
    }
}

fn parse_id_env(name: &str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{} must be a numeric id: {}", name, v))),
        _ => Ok(None),
    }
}

/// Expand a leading `~` and absolutize the save directory, creating it if
/// needed. An unwritable or uncreatable directory falls back to a temp
/// location so the service still comes up (common in containers with a bad
/// volume mount).
pub fn resolve_save_dir(raw: &Path) -> PathBuf {
    let expanded = expand_tilde(raw);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };

    if std::fs::create_dir_all(&absolute).is_ok() && dir_is_writable(&absolute) {
        return absolute;
    }

    let fallback = std::env::temp_dir().join("yt2mp3_fallback");
    warn!(
        "Could not use save directory {}. Falling back to: {}",
        absolute.display(),
        fallback.display()
    );
    // Temp dir creation is assumed writable; if even this fails the first
    // save will surface the IO error.
    let _ = std::fs::create_dir_all(&fallback);
    fallback
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn dir_is_writable(dir: &Path) -> bool {
    let probe = dir.join(format!(".yt2mp3_probe_{}", std::process::id()));
    match std::fs::File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_mode_follows_save_directory() {
        let mut config = Config::default();
        assert!(!config.save_mode());

        config.output.save_directory = Some(PathBuf::from("/music"));
        assert!(config.save_mode());
    }

    #[test]
    fn test_owner_requires_at_least_one_id() {
        let mut config = Config::default();
        assert!(config.owner().is_none());

        config.output.owner_uid = Some(1000);
        assert_eq!(config.owner(), Some((Some(1000), None)));

        config.output.owner_gid = Some(100);
        assert_eq!(config.owner(), Some((Some(1000), Some(100))));
    }

    #[test]
    fn test_resolve_save_dir_creates_directory() {
        let base = tempfile::tempdir().unwrap();
        let wanted = base.path().join("saved/music");
        let resolved = resolve_save_dir(&wanted);
        assert_eq!(resolved, wanted);
        assert!(wanted.is_dir());
    }

    #[test]
    fn test_resolve_save_dir_falls_back_when_unwritable() {
        // A path under a regular file can never be created
        let base = tempfile::tempdir().unwrap();
        let file = base.path().join("blocker");
        std::fs::write(&file, b"x").unwrap();

        let resolved = resolve_save_dir(&file.join("nested"));
        assert!(resolved.ends_with("yt2mp3_fallback"));
    }
}
