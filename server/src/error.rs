use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tagstation_shared::{InvalidHexInput, SessionError};
use thiserror::Error;

/// Failure of an API request, rendered as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidHex(#[from] InvalidHexInput),
    #[error("Timeout: No NFC tag found within {} seconds", .0.as_secs())]
    TagNotFound(std::time::Duration),
    #[error("No data could be read from the tag")]
    NothingRead,
    #[error("No valid hex data found (all null bytes)")]
    OnlyPadding,
    #[error("Error reading NFC tag: {0}")]
    Read(SessionError),
    #[error("Error writing to NFC tag: {0}")]
    Write(SessionError),
    #[error("NFC worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn from_read(err: SessionError) -> Self {
        match err {
            SessionError::TagNotFound(timeout) => ApiError::TagNotFound(timeout),
            SessionError::NoDataFound { blocks_read: 0 } => ApiError::NothingRead,
            SessionError::NoDataFound { .. } => ApiError::OnlyPadding,
            other => ApiError::Read(other),
        }
    }

    pub fn from_write(err: SessionError) -> Self {
        match err {
            SessionError::TagNotFound(timeout) => ApiError::TagNotFound(timeout),
            other => ApiError::Write(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidHex(_) => StatusCode::BAD_REQUEST,
            ApiError::TagNotFound(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::NothingRead | ApiError::OnlyPadding => StatusCode::NOT_FOUND,
            ApiError::Read(_) | ApiError::Write(_) | ApiError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
