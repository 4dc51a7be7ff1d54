use axum::{response::IntoResponse, Json};
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures surfaced by the token cache and the catalog client.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("credential exchange failed: {0}")]
    UpstreamAuth(String),

    #[error("upstream unavailable{}: {message}", fmt_status(.status))]
    UpstreamUnavailable {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed upstream data in `{field}`: {reason}")]
    MalformedUpstreamData { field: &'static str, reason: String },

    #[error("not found: {0}")]
    NotFound(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl UpstreamError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedUpstreamData {
            field,
            reason: reason.into(),
        }
    }

    /// Transient failures the caller may retry after a delay.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamAuth(_) | Self::UpstreamUnavailable { .. }
        )
    }

    const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamAuth(_)
            | Self::UpstreamUnavailable { .. }
            | Self::MalformedUpstreamData { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamUnavailable {
            status: err.status().map(|s| s.as_u16()),
            message: if err.is_timeout() {
                format!("request timed out: {err}")
            } else {
                err.to_string()
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum WishlistError {
    #[error("wishlist entry {0} not found")]
    NotFound(i64),

    #[error("wishlist entry {0} has already been deleted")]
    AlreadyDeleted(i64),

    #[error("item {0} is already on the wishlist")]
    Duplicate(String),

    #[error("{0}")]
    Invalid(String),
}

impl WishlistError {
    const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyDeleted(_) | Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug)]
pub struct AppError(pub color_eyre::eyre::Error);

impl AppError {
    fn status_code(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<UpstreamError>() {
            err.status_code()
        } else if let Some(err) = self.0.downcast_ref::<WishlistError>() {
            err.status_code()
        } else if self.0.downcast_ref::<validator::ValidationErrors>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed with {status}: {:#}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<color_eyre::eyre::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
