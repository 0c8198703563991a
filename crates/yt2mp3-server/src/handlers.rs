//! HTTP request handlers

use crate::delivery;
use crate::error::ApiError;
use crate::state::AppState;
use actix_web::{get, http::header, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;
use yt2mp3_core::downloader::{validate_url, Downloader};
use yt2mp3_core::metadata::TagOverrides;
use yt2mp3_core::pipeline::{DeliveryMode, Job, JobArtifact, JobOptions};
use yt2mp3_core::processor::StageSet;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(info_route)
        .service(progress)
        .service(stream)
        .service(save);
}

/// Serves the browser UI when present, otherwise a usage banner
#[get("/")]
async fn index(state: web::Data<AppState>) -> impl Responder {
    let index_path = state.config.server.static_dir.join("index.html");

    match tokio::fs::read(&index_path).await {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(_) => HttpResponse::Ok().json(json!({
            "message": "yt2mp3 audio downloader is running",
            "usage": "GET /stream?url=YOUR_YT_URL",
            "save_mode": state.config.save_mode(),
        })),
    }
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    url: String,
}

/// Video metadata for a URL, without downloading anything
#[get("/info")]
async fn info_route(
    state: web::Data<AppState>,
    query: web::Query<InfoQuery>,
) -> Result<impl Responder, ApiError> {
    validate_url(&query.url).map_err(yt2mp3_core::Yt2Mp3Error::from)?;

    let yt_dlp = state
        .config
        .yt_dlp_path()
        .map_err(yt2mp3_core::Yt2Mp3Error::from)?;
    let downloader = Downloader::new(yt_dlp, std::env::temp_dir());
    let metadata = downloader
        .probe(&query.url)
        .await
        .map_err(yt2mp3_core::Yt2Mp3Error::from)?;

    Ok(web::Json(metadata))
}

/// Progress polling for a running session
#[get("/progress/{session_id}")]
async fn progress(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    web::Json(state.sessions.get(&path.into_inner()))
}

/// Options shared by /stream and /save
#[derive(Debug, Deserialize)]
struct JobQuery {
    url: String,
    /// Comma-separated subset of normalize,eq,trim-silence,stereo-enhance
    #[serde(default)]
    stages: Option<String>,
    #[serde(default)]
    bitrate: Option<u32>,
    /// Single separator character for multi-valued tags
    #[serde(default)]
    delimiter: Option<String>,
    /// Custom base filename (without extension)
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    /// Use hash+timestamp naming instead of the cleaned title
    #[serde(default)]
    use_hash: Option<bool>,
    // Tag overrides; artists/genres are delimiter-separated lists
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artists: Option<String>,
    #[serde(default)]
    genres: Option<String>,
}

/// Download, process and return the MP3 as the response body
#[get("/stream")]
async fn stream(
    state: web::Data<AppState>,
    query: web::Query<JobQuery>,
) -> Result<HttpResponse, ApiError> {
    let (artifact, session_id) = run_job(&state, &query, DeliveryMode::Stream).await?;

    let body = tokio::fs::read(&artifact.path)
        .await
        .map_err(|e| ApiError::processing(format!("failed to read finished file: {}", e)))?;

    // Session is done once the bytes leave; scratch files go with the artifact
    state.sessions.remove(&session_id);

    Ok(HttpResponse::Ok()
        .content_type("audio/mpeg")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.filename),
        ))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(body))
}

/// Download, process and save the MP3 into the configured directory
#[post("/save")]
async fn save(
    state: web::Data<AppState>,
    query: web::Query<JobQuery>,
) -> Result<impl Responder, ApiError> {
    let save_dir = state.config.output.save_directory.clone().ok_or_else(|| {
        ApiError::input("save mode is not configured; set SAVE_DIRECTORY or --save-dir")
    })?;

    let (artifact, session_id) = run_job(&state, &query, DeliveryMode::Save).await?;

    let saved_path = delivery::save_file(
        &artifact.path,
        &artifact.filename,
        &save_dir,
        state.config.owner(),
    )
    .await
    .map_err(|e| ApiError::processing(format!("failed to save file: {}", e)))?;

    let filename = saved_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.filename.clone());

    // Session survives save so the UI can show where the file went
    state
        .sessions
        .finish(&session_id, &saved_path.display().to_string(), &filename);

    Ok(web::Json(json!({
        "status": "success",
        "message": format!("Saved to {}", saved_path.display()),
        "path": saved_path.display().to_string(),
        "filename": filename,
    })))
}

/// Build options, run the pipeline and pump progress into the session store
async fn run_job(
    state: &AppState,
    query: &JobQuery,
    mode: DeliveryMode,
) -> Result<(JobArtifact, String), ApiError> {
    let options = build_options(query, state, mode)?;
    let job = Job::new(state.config.clone(), &query.url, options)?;

    let session_id = query
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());

    info!("Job {} accepted for video {}", session_id, job.video_id());
    state.sessions.start(&session_id);

    let (tx, mut rx) = mpsc::channel(32);
    let sessions = state.sessions.clone();
    let pump_id = session_id.clone();
    let pump = tokio::spawn(async move {
        while let Some(stage) = rx.recv().await {
            sessions.apply(&pump_id, &stage);
        }
    });

    let result = job.run(tx).await;
    let _ = pump.await;

    match result {
        Ok(artifact) => Ok((artifact, session_id)),
        // Failure already landed in the session via the Failed event
        Err(e) => Err(e.into()),
    }
}

fn build_options(
    query: &JobQuery,
    state: &AppState,
    mode: DeliveryMode,
) -> Result<JobOptions, ApiError> {
    let stages = match query.stages.as_deref() {
        Some(list) => StageSet::parse(list).map_err(yt2mp3_core::Yt2Mp3Error::from)?,
        None => StageSet::none(),
    };

    let delimiter = match query.delimiter.as_deref() {
        Some(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ApiError::input(format!(
                        "delimiter must be a single character, got {:?}",
                        s
                    )))
                }
            }
        }
        None => state.config.output.default_delimiter,
    };

    let overrides = TagOverrides {
        title: query.title.clone(),
        artists: query.artists.as_deref().map(|s| split_list(s, delimiter)),
        genres: query.genres.as_deref().map(|s| split_list(s, delimiter)),
    };

    Ok(JobOptions {
        stages,
        bitrate: query.bitrate.unwrap_or(state.config.output.default_bitrate),
        delimiter,
        mode,
        filename: query.filename.clone(),
        use_hash: query.use_hash.unwrap_or(false),
        overrides,
    })
}

fn split_list(s: &str, delimiter: char) -> Vec<String> {
    s.split(delimiter)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use yt2mp3_core::Config;

    fn test_state(config: Config) -> web::Data<AppState> {
        web::Data::new(AppState::new(config))
    }

    #[actix_web::test]
    async fn test_index_reports_usage_without_static_dir() {
        let mut config = Config::default();
        config.server.static_dir = std::path::PathBuf::from("/nonexistent");

        let app = test::init_service(
            App::new()
                .app_data(test_state(config))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["save_mode"], serde_json::Value::Bool(false));
    }

    #[actix_web::test]
    async fn test_stream_rejects_malformed_url_without_processing() {
        // Config points the tools at nothing; validation must fail first
        let mut config = Config::default();
        config.paths.yt_dlp = Some(std::path::PathBuf::from("/nonexistent/yt-dlp"));
        config.paths.ffmpeg = Some(std::path::PathBuf::from("/nonexistent/ffmpeg"));

        let app = test::init_service(
            App::new()
                .app_data(test_state(config))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/stream?url=https%3A%2F%2Fexample.com%2Fvideo")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "input");
    }

    #[actix_web::test]
    async fn test_stream_rejects_unknown_stage() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(Config::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/stream?url=https%3A%2F%2Fyoutu.be%2FdQw4w9WgXcQ&stages=reverb")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_save_requires_configured_directory() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(Config::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/save?url=https%3A%2F%2Fyoutu.be%2FdQw4w9WgXcQ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_progress_unknown_session() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(Config::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/progress/abc123").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "not_started");
        assert_eq!(body["progress"], 0.0);
    }

    #[actix_web::test]
    async fn test_info_rejects_malformed_url() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(Config::default()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/info?url=not-a-url")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_build_options_rejects_long_delimiter() {
        let state = AppState::new(Config::default());
        let query = JobQuery {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            stages: None,
            bitrate: None,
            delimiter: Some(";;".to_string()),
            filename: None,
            session_id: None,
            use_hash: None,
            title: None,
            artists: None,
            genres: None,
        };

        assert!(build_options(&query, &state, DeliveryMode::Stream).is_err());
    }

    #[actix_web::test]
    async fn test_build_options_defaults() {
        let state = AppState::new(Config::default());
        let query = JobQuery {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            stages: Some("normalize,eq".to_string()),
            bitrate: None,
            delimiter: None,
            filename: None,
            session_id: None,
            use_hash: None,
            title: None,
            artists: Some("A; B".to_string()),
            genres: None,
        };

        let options = build_options(&query, &state, DeliveryMode::Stream).unwrap();
        assert_eq!(options.bitrate, 192);
        assert_eq!(options.delimiter, ';');
        assert_eq!(
            options.overrides.artists,
            Some(vec!["A".to_string(), "B".to_string()])
        );
    }
}
