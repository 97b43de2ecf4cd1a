use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use reel_types::models::{UserId, VideoId};

pub const SUCCESS_CODE: i32 = 0;
pub const SUCCESS_MSG: &str = "success";

/// Everything a handler can report to a client. Storage, file-system and
/// subprocess failures collapse into `Internal` after being logged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service error")]
    Internal,

    #[error("invalid parameter: {0}")]
    Validation(String),

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("authorization failed")]
    Unauthorized,

    #[error("user {0} does not exist")]
    UserNotFound(UserId),

    #[error("video {0} does not exist")]
    VideoNotFound(VideoId),

    #[error("upload exceeds the size limit")]
    UploadTooLarge,
}

impl ServiceError {
    /// Logs `err` with `context` and returns the opaque `Internal` variant.
    pub fn internal(context: impl Display, err: impl Display) -> Self {
        error!("{}: {}", context, err);
        Self::Internal
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub const fn code(&self) -> i32 {
        match self {
            Self::Internal => 10001,
            Self::Validation(_) => 10002,
            Self::UserAlreadyExists => 10003,
            Self::Unauthorized => 10004,
            Self::UserNotFound(_) => 10005,
            Self::VideoNotFound(_) => 10006,
            Self::UploadTooLarge => 10007,
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UserAlreadyExists => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UserNotFound(_) | Self::VideoNotFound(_) => StatusCode::NOT_FOUND,
            Self::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = json!({
            "status_code": self.code(),
            "status_msg": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_do_not_leak_their_cause() {
        let err = ServiceError::internal("insert video", "disk I/O error at /srv/reel.db");
        assert_eq!(err.to_string(), "service error");
        assert_eq!(err.code(), 10001);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_is_distinct_from_service_error() {
        let err = ServiceError::UserNotFound(7);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_ne!(err.code(), ServiceError::Internal.code());
        assert_eq!(err.to_string(), "user 7 does not exist");
    }

    #[test]
    fn oversized_upload_is_not_a_validation_error() {
        let err = ServiceError::UploadTooLarge;
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), 10007);
        assert_ne!(err.code(), ServiceError::validation("x").code());
    }
}
