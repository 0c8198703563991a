//! Job orchestration: validate, download, process, encode, tag
//!
//! Each job is a single linear pass with no retry, checkpointing or
//! resumability. A job either fully succeeds (finished file handed back) or
//! fully fails (nothing delivered).

use crate::config::Config;
use crate::downloader::{validate_url, Downloader};
use crate::encoder::{bitrate_in_range, Encoder, MAX_BITRATE, MIN_BITRATE};
use crate::error::Yt2Mp3Error;
use crate::metadata::{sanitize_filename, TagOverrides, Tagger, TrackTags};
use crate::processor::{Processor, Stage, StageSet};

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// How the finished file leaves the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Return the file as the HTTP response body
    Stream,
    /// Write the file into the configured save directory
    Save,
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub stages: StageSet,
    pub bitrate: u32,
    pub delimiter: char,
    pub mode: DeliveryMode,
    /// Custom base filename (sanitized, without extension)
    pub filename: Option<String>,
    /// Name the file `<videoid>_<timestamp>_<shortid>.mp3` instead of the title
    pub use_hash: bool,
    pub overrides: TagOverrides,
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), Yt2Mp3Error> {
        if !bitrate_in_range(self.bitrate) {
            return Err(Yt2Mp3Error::InvalidOption(format!(
                "bitrate must be between {} and {} kbps, got {}",
                MIN_BITRATE, MAX_BITRATE, self.bitrate
            )));
        }
        if let Some(ref name) = self.filename {
            if sanitize_filename(name).is_empty() {
                return Err(Yt2Mp3Error::InvalidOption(
                    "filename is empty after sanitization".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Pipeline progress events
#[derive(Debug, Clone)]
pub enum PipelineStage {
    Downloading {
        percent: f32,
        speed: Option<String>,
        eta: Option<String>,
    },
    Processing {
        stage: Stage,
    },
    Encoding {
        bitrate: u32,
    },
    Tagging,
    Complete {
        output: PathBuf,
        filename: String,
        duration: Duration,
    },
    Failed {
        stage: String,
        error: String,
    },
}

/// A finished job. The temp directory owns the output file in stream mode;
/// dropping the artifact removes it, so callers move or read the file first.
#[derive(Debug)]
pub struct JobArtifact {
    pub path: PathBuf,
    pub filename: String,
    pub tags: TrackTags,
    _work_dir: tempfile::TempDir,
}

/// One request's worth of work
#[derive(Debug)]
pub struct Job {
    config: Config,
    url: String,
    video_id: String,
    options: JobOptions,
}

impl Job {
    /// Validate the URL and options up front. A malformed URL or bad option
    /// fails here, before any subprocess is spawned.
    pub fn new(config: Config, url: &str, options: JobOptions) -> Result<Self, Yt2Mp3Error> {
        let video_id = validate_url(url)?;
        options.validate()?;

        Ok(Self {
            config,
            url: url.to_string(),
            video_id,
            options,
        })
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub async fn run(
        &self,
        progress_tx: mpsc::Sender<PipelineStage>,
    ) -> Result<JobArtifact, Yt2Mp3Error> {
        let start_time = Instant::now();

        let work_dir = tempfile::tempdir()?;
        let work_path = work_dir.path().to_path_buf();

        info!("Starting job for: {}", self.url);
        debug!(
            "Work directory: {} (delivery: {:?})",
            work_path.display(),
            self.options.mode
        );

        let yt_dlp_path = self.config.yt_dlp_path()?;
        let ffmpeg_path = self.config.ffmpeg_path()?;

        // 1. Download
        let _ = progress_tx
            .send(PipelineStage::Downloading {
                percent: 0.0,
                speed: None,
                eta: None,
            })
            .await;

        let (dl_tx, mut dl_rx) = mpsc::channel::<crate::downloader::DownloadProgress>(16);
        let forward_tx = progress_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(update) = dl_rx.recv().await {
                let _ = forward_tx.try_send(PipelineStage::Downloading {
                    percent: update.percent,
                    speed: update.speed,
                    eta: update.eta,
                });
            }
        });

        let downloader = Downloader::new(yt_dlp_path, work_path.clone());
        let download_result = downloader.download(&self.url, Some(dl_tx)).await.map_err(|e| {
            let _ = progress_tx.try_send(PipelineStage::Failed {
                stage: "download".to_string(),
                error: e.to_string(),
            });
            e
        })?;
        let _ = forwarder.await;

        // 2. Decode to the WAV working format
        let processor = Processor::new(ffmpeg_path.clone(), self.config.normalize.clone());
        let decoded_wav = work_path.join("decoded.wav");
        processor
            .decode_to_wav(&download_result.audio_path, &decoded_wav)
            .await
            .map_err(|e| {
                let _ = progress_tx.try_send(PipelineStage::Failed {
                    stage: "decode".to_string(),
                    error: e.to_string(),
                });
                Yt2Mp3Error::from(e)
            })?;

        // 3. Processing stages, fixed order
        let mut current = decoded_wav;
        for stage in self.options.stages.iter() {
            let _ = progress_tx.send(PipelineStage::Processing { stage }).await;

            let next = work_path.join(format!("{}.wav", stage.as_str().replace('-', "_")));
            processor.run_stage(stage, &current, &next).await.map_err(|e| {
                let _ = progress_tx.try_send(PipelineStage::Failed {
                    stage: stage.to_string(),
                    error: e.to_string(),
                });
                Yt2Mp3Error::from(e)
            })?;
            current = next;
        }

        // 4. Encode to MP3
        let _ = progress_tx
            .send(PipelineStage::Encoding {
                bitrate: self.options.bitrate,
            })
            .await;

        let encoder = Encoder::new(ffmpeg_path.clone());
        let encoded_file = work_path.join("encoded.mp3");
        encoder
            .encode(&current, &encoded_file, self.options.bitrate)
            .await
            .map_err(|e| {
                let _ = progress_tx.try_send(PipelineStage::Failed {
                    stage: "encode".to_string(),
                    error: e.to_string(),
                });
                Yt2Mp3Error::from(e)
            })?;

        // 5. Tags and cover art
        let _ = progress_tx.send(PipelineStage::Tagging).await;

        let mut tags = TrackTags::from_video(&download_result.metadata);
        tags.apply_overrides(&self.options.overrides);

        let filename = self.output_filename(&tags.title);
        let final_path = work_path.join(&filename);

        let tagger = Tagger::new(ffmpeg_path);
        tagger
            .embed(
                &encoded_file,
                &final_path,
                &tags,
                self.options.delimiter,
                download_result.thumbnail_path.as_deref(),
            )
            .await
            .map_err(|e| {
                let _ = progress_tx.try_send(PipelineStage::Failed {
                    stage: "tag".to_string(),
                    error: e.to_string(),
                });
                Yt2Mp3Error::from(e)
            })?;

        // The artifact must exist before it is handed back
        if !final_path.exists() {
            let err = Yt2Mp3Error::Pipeline("output file missing after tagging".to_string());
            let _ = progress_tx.try_send(PipelineStage::Failed {
                stage: "finalize".to_string(),
                error: err.to_string(),
            });
            return Err(err);
        }

        let duration = start_time.elapsed();
        info!(
            "Job complete: {} ({:.1}s)",
            final_path.display(),
            duration.as_secs_f32()
        );

        let _ = progress_tx
            .send(PipelineStage::Complete {
                output: final_path.clone(),
                filename: filename.clone(),
                duration,
            })
            .await;

        Ok(JobArtifact {
            path: final_path,
            filename,
            tags,
            _work_dir: work_dir,
        })
    }

    /// The output filename depends only on naming options and metadata, never
    /// on which processing stages ran.
    fn output_filename(&self, title: &str) -> String {
        if let Some(ref name) = self.options.filename {
            return format!("{}.mp3", sanitize_filename(name));
        }

        if self.options.use_hash {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let short_id = uuid::Uuid::new_v4().simple().to_string();
            return format!("{}_{}_{}.mp3", self.video_id, timestamp, &short_id[..6]);
        }

        let clean_title = sanitize_filename(title);
        if clean_title.is_empty() {
            format!("yt_{}.mp3", self.video_id)
        } else {
            format!("{}.mp3", clean_title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_options() -> JobOptions {
        JobOptions {
            stages: StageSet::none(),
            bitrate: 192,
            delimiter: ';',
            mode: DeliveryMode::Stream,
            filename: None,
            use_hash: false,
            overrides: TagOverrides::default(),
        }
    }

    #[test]
    fn test_job_rejects_malformed_url() {
        let err = Job::new(Config::default(), "https://example.com/x", default_options());
        assert!(matches!(err, Err(Yt2Mp3Error::Download(_))));
    }

    #[test]
    fn test_job_rejects_bad_bitrate() {
        let mut options = default_options();
        options.bitrate = 1000;
        let err = Job::new(
            Config::default(),
            "https://youtu.be/dQw4w9WgXcQ",
            options,
        );
        assert!(matches!(err, Err(Yt2Mp3Error::InvalidOption(_))));
    }

    #[test]
    fn test_output_filename_ignores_stages() {
        let url = "https://youtu.be/dQw4w9WgXcQ";

        let mut with_stages = default_options();
        with_stages.stages = StageSet::all();
        let job_a = Job::new(Config::default(), url, with_stages).unwrap();
        let job_b = Job::new(Config::default(), url, default_options()).unwrap();

        assert_eq!(
            job_a.output_filename("Some Title"),
            job_b.output_filename("Some Title")
        );
        assert_eq!(job_a.output_filename("Some Title"), "Some Title.mp3");
    }

    #[test]
    fn test_output_filename_prefers_custom_name() {
        let mut options = default_options();
        options.filename = Some("my:mix".to_string());
        let job = Job::new(Config::default(), "https://youtu.be/dQw4w9WgXcQ", options).unwrap();
        assert_eq!(job.output_filename("Ignored"), "my_mix.mp3");
    }

    #[test]
    fn test_output_filename_hash_naming() {
        let mut options = default_options();
        options.use_hash = true;
        let job = Job::new(Config::default(), "https://youtu.be/dQw4w9WgXcQ", options).unwrap();
        let name = job.output_filename("Ignored");
        assert!(name.starts_with("dQw4w9WgXcQ_"));
        assert!(name.ends_with(".mp3"));
    }

    #[test]
    fn test_output_filename_falls_back_to_video_id() {
        let job = Job::new(
            Config::default(),
            "https://youtu.be/dQw4w9WgXcQ",
            default_options(),
        )
        .unwrap();
        assert_eq!(job.output_filename("   "), "yt_dQw4w9WgXcQ.mp3");
    }
}
