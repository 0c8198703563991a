//! In-memory per-session progress tracking
//!
//! Sessions are transient: the browser polls `/progress/{id}` while a job
//! runs, and nothing survives a restart.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use yt2mp3_core::pipeline::PipelineStage;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub status: String,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    fn with_status(status: &str, progress: f32) -> Self {
        Self {
            status: status.to_string(),
            progress,
            message: None,
            speed: None,
            eta: None,
            path: None,
            filename: None,
            error: None,
        }
    }

    pub fn not_started() -> Self {
        Self::with_status("not_started", 0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, ProgressSnapshot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> ProgressSnapshot {
        self.inner
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(ProgressSnapshot::not_started)
    }

    pub fn start(&self, id: &str) {
        self.inner
            .write()
            .insert(id.to_string(), ProgressSnapshot::with_status("starting", 0.0));
    }

    /// Drop a session, keeping any file it produced
    pub fn remove(&self, id: &str) {
        self.inner.write().remove(id);
    }

    /// Record the final saved location
    pub fn finish(&self, id: &str, path: &str, filename: &str) {
        let mut snapshot = ProgressSnapshot::with_status("finished", 100.0);
        snapshot.path = Some(path.to_string());
        snapshot.filename = Some(filename.to_string());
        self.inner.write().insert(id.to_string(), snapshot);
    }

    /// Translate a pipeline event into the snapshot the browser polls for
    pub fn apply(&self, id: &str, stage: &PipelineStage) {
        let snapshot = match stage {
            PipelineStage::Downloading {
                percent,
                speed,
                eta,
            } => {
                let mut s = ProgressSnapshot::with_status("downloading", *percent);
                s.speed = speed.clone();
                s.eta = eta.clone();
                s
            }
            PipelineStage::Processing { stage } => {
                let mut s = ProgressSnapshot::with_status("processing", 100.0);
                s.message = Some(format!("Applying {}...", stage));
                s
            }
            PipelineStage::Encoding { bitrate } => {
                let mut s = ProgressSnapshot::with_status("processing", 100.0);
                s.message = Some(format!("Converting to MP3 at {} kbps...", bitrate));
                s
            }
            PipelineStage::Tagging => {
                let mut s = ProgressSnapshot::with_status("processing", 100.0);
                s.message = Some("Embedding tags...".to_string());
                s
            }
            PipelineStage::Complete {
                output, filename, ..
            } => {
                let mut s = ProgressSnapshot::with_status("finished", 100.0);
                s.path = Some(output.display().to_string());
                s.filename = Some(filename.clone());
                s
            }
            PipelineStage::Failed { stage, error } => {
                let mut s = ProgressSnapshot::with_status("error", 0.0);
                s.error = Some(format!("{}: {}", stage, error));
                s
            }
        };

        self.inner.write().insert(id.to_string(), snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_is_not_started() {
        let store = SessionStore::new();
        let snapshot = store.get("nope");
        assert_eq!(snapshot.status, "not_started");
        assert_eq!(snapshot.progress, 0.0);
    }

    #[test]
    fn test_apply_download_progress() {
        let store = SessionStore::new();
        store.start("s1");
        store.apply(
            "s1",
            &PipelineStage::Downloading {
                percent: 42.5,
                speed: Some("1.2MiB/s".to_string()),
                eta: Some("00:05".to_string()),
            },
        );

        let snapshot = store.get("s1");
        assert_eq!(snapshot.status, "downloading");
        assert_eq!(snapshot.progress, 42.5);
        assert_eq!(snapshot.speed.as_deref(), Some("1.2MiB/s"));
    }

    #[test]
    fn test_remove_forgets_session() {
        let store = SessionStore::new();
        store.start("s1");
        store.remove("s1");
        assert_eq!(store.get("s1").status, "not_started");
    }

    #[test]
    fn test_failed_stage_records_error() {
        let store = SessionStore::new();
        store.start("s1");
        store.apply(
            "s1",
            &PipelineStage::Failed {
                stage: "download".to_string(),
                error: "boom".to_string(),
            },
        );

        let snapshot = store.get("s1");
        assert_eq!(snapshot.status, "error");
        assert_eq!(snapshot.error.as_deref(), Some("download: boom"));
    }
}
