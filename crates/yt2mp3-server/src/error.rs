//! HTTP error mapping

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use yt2mp3_core::{ErrorClass, Yt2Mp3Error};

/// The two error kinds the API surfaces: bad input (400) and anything that
/// went wrong downstream (500). Neither is retried.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Processing(String),
}

impl ApiError {
    pub fn input(detail: impl Into<String>) -> Self {
        ApiError::Input(detail.into())
    }

    pub fn processing(detail: impl Into<String>) -> Self {
        ApiError::Processing(detail.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Input(_) => "input",
            ApiError::Processing(_) => "processing",
        }
    }
}

impl From<Yt2Mp3Error> for ApiError {
    fn from(err: Yt2Mp3Error) -> Self {
        match err.class() {
            ErrorClass::Input => ApiError::Input(err.to_string()),
            ErrorClass::Processing => ApiError::Processing(err.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "detail": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yt2mp3_core::error::DownloadError;

    #[test]
    fn test_invalid_url_maps_to_400() {
        let err = ApiError::from(Yt2Mp3Error::from(DownloadError::InvalidUrl("x".into())));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "input");
    }

    #[test]
    fn test_processing_failure_maps_to_500() {
        let err = ApiError::from(Yt2Mp3Error::from(DownloadError::YtDlpFailed(Some(1))));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "processing");
    }
}
