//! HTTP error type.
//!
//! Every failure is rendered as `{"success": false, "message", "error"}`.
//! Validation problems are 400s; provider and storage failures are 500s.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sprout_rs::media::MediaError;
use sprout_rs::tutor::TutorError;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by every handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input. No provider call was made.
    #[error("{0}")]
    Validation(String),

    /// The provider call failed.
    #[error("{context}: {detail}")]
    Upstream { context: &'static str, detail: String },

    /// Writing media to disk failed.
    #[error("{context}: {detail}")]
    Storage { context: &'static str, detail: String },

    /// A 500 whose detail is withheld from the client.
    #[error("{0}")]
    Redacted(&'static str),
}

impl ApiError {
    /// Map a tutor failure, labelling it with what the handler was doing.
    pub fn from_tutor(context: &'static str, err: TutorError) -> Self {
        match err {
            TutorError::Upstream(detail) => ApiError::Upstream { context, detail },
            TutorError::Storage(media) => ApiError::from_media(context, media),
        }
    }

    pub fn from_media(context: &'static str, err: MediaError) -> Self {
        if err.is_rejection() {
            ApiError::Validation(err.to_string())
        } else {
            ApiError::Storage {
                context,
                detail: err.to_string(),
            }
        }
    }

    /// Strip provider/storage detail from 500s.
    pub fn redact(self) -> Self {
        match self {
            ApiError::Upstream { context, .. } | ApiError::Storage { context, .. } => {
                ApiError::Redacted(context)
            }
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream { .. } | ApiError::Storage { .. } | ApiError::Redacted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(format!("invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Validation(format!("invalid multipart body: {}", err.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = match &self {
            ApiError::Validation(msg) => {
                warn!("rejected request: {msg}");
                (msg.clone(), msg.clone())
            }
            ApiError::Upstream { context, detail } | ApiError::Storage { context, detail } => {
                error!("{context}: {detail}");
                (context.to_string(), detail.clone())
            }
            ApiError::Redacted(context) => {
                error!("{context} (detail redacted)");
                (context.to_string(), "internal error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
            "error": detail,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let upstream = ApiError::Upstream {
            context: "Error analyzing image",
            detail: "HTTP 502".into(),
        };
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.to_string(), "Error analyzing image: HTTP 502");
    }

    #[test]
    fn media_rejections_are_validation_errors() {
        let err = ApiError::from_tutor(
            "Error uploading image",
            TutorError::Storage(MediaError::TooLarge { size: 10, limit: 5 }),
        );
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn io_failures_are_storage_errors() {
        let err = ApiError::from_media(
            "Error uploading image",
            MediaError::Io {
                path: "/nope".into(),
                source: std::io::Error::other("disk full"),
            },
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn redaction_keeps_context_only() {
        let err = ApiError::Upstream {
            context: "Error processing response",
            detail: "sk-secret leaked".into(),
        }
        .redact();
        assert!(matches!(err, ApiError::Redacted("Error processing response")));
        assert!(!err.to_string().contains("sk-secret"));

        let validation = ApiError::Validation("missing".into()).redact();
        assert!(matches!(validation, ApiError::Validation(_)));
    }
}
