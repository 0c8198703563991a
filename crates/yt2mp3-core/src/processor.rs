//! Audio processing stages using FFmpeg
//!
//! The pipeline is order-fixed: normalize, EQ, silence trim, stereo enhance.
//! Each stage can be toggled independently but never reordered, and stage
//! selection never affects anything except the audio content itself.

use crate::config::NormalizeConfig;
use crate::error::ProcessError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// A single processing stage, in fixed pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Eq,
    TrimSilence,
    StereoEnhance,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 4] = [
        Stage::Normalize,
        Stage::Eq,
        Stage::TrimSilence,
        Stage::StereoEnhance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Eq => "eq",
            Stage::TrimSilence => "trim-silence",
            Stage::StereoEnhance => "stereo-enhance",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normalize" => Some(Stage::Normalize),
            "eq" => Some(Stage::Eq),
            "trim-silence" => Some(Stage::TrimSilence),
            "stereo-enhance" => Some(Stage::StereoEnhance),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enabled subset of processing stages. Iteration order is always the
/// fixed pipeline order regardless of how the set was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSet {
    enabled: [bool; 4],
}

impl StageSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            enabled: [true; 4],
        }
    }

    pub fn with(mut self, stage: Stage) -> Self {
        self.enabled[stage as usize] = true;
        self
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.enabled[stage as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|&e| e)
    }

    /// Enabled stages in pipeline order
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|s| self.contains(*s))
    }

    /// Parse a comma-separated stage list, e.g. `normalize,trim-silence`.
    /// An empty string yields the empty set.
    pub fn parse(s: &str) -> Result<Self, ProcessError> {
        let mut set = StageSet::none();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let stage =
                Stage::from_str(name).ok_or_else(|| ProcessError::UnknownStage(name.to_string()))?;
            set = set.with(stage);
        }
        Ok(set)
    }
}

#[derive(Debug)]
pub struct Processor {
    ffmpeg_path: PathBuf,
    normalize: NormalizeConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct LoudnormStats {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    target_offset: String,
}

impl Processor {
    pub fn new(ffmpeg_path: PathBuf, normalize: NormalizeConfig) -> Self {
        Self {
            ffmpeg_path,
            normalize,
        }
    }

    /// Decode the downloaded stream to 48kHz 24-bit PCM WAV, the working
    /// format for all stages
    pub async fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<(), ProcessError> {
        debug!("Decoding {} to WAV", input.display());
        self.run_filter_pass("decode", input, output, None).await
    }

    /// Run the enabled stages in fixed order, returning the path of the last
    /// intermediate. With no stages enabled the input passes through.
    pub async fn process(
        &self,
        input: &Path,
        work_dir: &Path,
        stages: StageSet,
    ) -> Result<PathBuf, ProcessError> {
        let mut current = input.to_path_buf();

        for stage in stages.iter() {
            let next = work_dir.join(format!("{}.wav", stage.as_str().replace('-', "_")));
            self.run_stage(stage, &current, &next).await?;
            current = next;
        }

        Ok(current)
    }

    pub async fn run_stage(
        &self,
        stage: Stage,
        input: &Path,
        output: &Path,
    ) -> Result<(), ProcessError> {
        info!("Applying stage: {}", stage);

        match stage {
            Stage::Normalize => self.normalize_two_pass(input, output).await,
            Stage::Eq => {
                // Gentle musical curve: low-shelf warmth plus a presence peak
                let filter = "equalizer=f=100:t=q:w=1:g=2.5,equalizer=f=8000:t=q:w=1:g=2";
                self.run_filter_pass("eq", input, output, Some(filter)).await
            }
            Stage::TrimSilence => {
                // Leading trim, then reverse so the same filter trims the tail
                let filter = "silenceremove=start_periods=1:start_threshold=-50dB:start_silence=0.25,\
                     areverse,\
                     silenceremove=start_periods=1:start_threshold=-50dB:start_silence=0.25,\
                     areverse";
                self.run_filter_pass("trim-silence", input, output, Some(filter))
                    .await
            }
            Stage::StereoEnhance => {
                let filter = "extrastereo=m=1.25";
                self.run_filter_pass("stereo-enhance", input, output, Some(filter))
                    .await
            }
        }
    }

    /// Apply EBU R128 loudness normalization (two-pass for accuracy)
    async fn normalize_two_pass(&self, input: &Path, output: &Path) -> Result<(), ProcessError> {
        let cfg = &self.normalize;
        info!("Normalizing to {:.1} LUFS", cfg.target_lufs);

        // First pass: measure loudness
        let stats = self.measure_loudness(input).await?;

        // Second pass: apply normalization with measured values
        let filter = format!(
            "loudnorm=I={}:TP={}:LRA={}:\
             measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:\
             offset={}:linear=true",
            cfg.target_lufs,
            cfg.true_peak,
            cfg.lra,
            stats.input_i,
            stats.input_tp,
            stats.input_lra,
            stats.input_thresh,
            stats.target_offset
        );

        self.run_filter_pass("normalize", input, output, Some(&filter))
            .await
    }

    async fn measure_loudness(&self, input: &Path) -> Result<LoudnormStats, ProcessError> {
        let cfg = &self.normalize;
        let filter = format!(
            "loudnorm=I={}:TP={}:LRA={}:print_format=json",
            cfg.target_lufs, cfg.true_peak, cfg.lra
        );

        let output = Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-i",
                &input.to_string_lossy(),
                "-af",
                &filter,
                "-f",
                "null",
                "-",
            ])
            .output()
            .await
            .map_err(map_spawn_error)?;

        // loudnorm prints its JSON block to stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stats = parse_loudnorm_output(&stderr)?;

        debug!(
            "Measured loudness: I={}, TP={}, LRA={}",
            stats.input_i, stats.input_tp, stats.input_lra
        );

        Ok(stats)
    }

    /// One ffmpeg pass writing 48kHz 24-bit WAV, optionally through a filter
    async fn run_filter_pass(
        &self,
        stage: &'static str,
        input: &Path,
        output: &Path,
        filter: Option<&str>,
    ) -> Result<(), ProcessError> {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd.arg("-i").arg(input);

        if let Some(f) = filter {
            cmd.args(["-af", f]);
        }

        cmd.args(["-c:a", "pcm_s24le", "-ar", "48000"]);
        cmd.arg("-y").arg(output);

        let status = cmd.status().await.map_err(map_spawn_error)?;

        if !status.success() {
            return Err(ProcessError::FfmpegFailed {
                stage,
                code: status.code(),
            });
        }

        debug!("Stage {} wrote: {}", stage, output.display());
        Ok(())
    }
}

fn map_spawn_error(e: std::io::Error) -> ProcessError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ProcessError::FfmpegNotFound
    } else {
        ProcessError::Io(e)
    }
}

fn parse_loudnorm_output(stderr: &str) -> Result<LoudnormStats, ProcessError> {
    // Find the JSON block at the end of FFmpeg's output
    let json_start = stderr.rfind('{').ok_or(ProcessError::LoudnessParseError)?;
    let json_end = stderr.rfind('}').ok_or(ProcessError::LoudnessParseError)?;

    if json_end <= json_start {
        return Err(ProcessError::LoudnessParseError);
    }

    let json_str = &stderr[json_start..=json_end];

    serde_json::from_str(json_str).map_err(|_| ProcessError::LoudnessParseError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_set_iterates_in_pipeline_order() {
        // Built out of order, iterated in order
        let set = StageSet::none()
            .with(Stage::StereoEnhance)
            .with(Stage::Normalize);

        let order: Vec<Stage> = set.iter().collect();
        assert_eq!(order, vec![Stage::Normalize, Stage::StereoEnhance]);
    }

    #[test]
    fn test_stage_set_parse() {
        let set = StageSet::parse("normalize,trim-silence").unwrap();
        assert!(set.contains(Stage::Normalize));
        assert!(set.contains(Stage::TrimSilence));
        assert!(!set.contains(Stage::Eq));

        assert!(StageSet::parse("").unwrap().is_empty());
        assert!(StageSet::parse(" eq , stereo-enhance ").is_ok());
        assert!(matches!(
            StageSet::parse("reverb"),
            Err(ProcessError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_stage_roundtrip_names() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_str(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn test_parse_loudnorm_output() {
        let stderr = r#"
[Parsed_loudnorm_0 @ 0x7f8]
{
    "input_i" : "-23.52",
    "input_tp" : "-5.95",
    "input_lra" : "6.30",
    "input_thresh" : "-34.13",
    "output_i" : "-14.02",
    "output_tp" : "-1.00",
    "output_lra" : "5.90",
    "output_thresh" : "-24.65",
    "normalization_type" : "linear",
    "target_offset" : "0.02"
}
"#;
        let stats = parse_loudnorm_output(stderr).unwrap();
        assert_eq!(stats.input_i, "-23.52");
        assert_eq!(stats.target_offset, "0.02");
    }

    #[test]
    fn test_parse_loudnorm_output_rejects_garbage() {
        assert!(parse_loudnorm_output("no json here").is_err());
        assert!(parse_loudnorm_output("} {").is_err());
    }
}
