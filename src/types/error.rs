use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Application-wide error taxonomy. Adapter-specific error types are mapped
/// into one of these variants at the adapter boundary; nothing propagates
/// past a trait method as a foreign error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request or a reference to an entity that is syntactically
    /// valid but semantically wrong for the caller's context.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown document/session/workspace.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violation (e.g. duplicate workspace name).
    #[error("conflict: {0}")]
    Conflict(String),

    /// MIME type not covered by the extraction factory.
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    /// Request body exceeded the configured upload limit.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Timeout, connection reset, or throttling from an adapter. Retried
    /// with capped exponential backoff inside the core; only surfaced to
    /// callers once the retry budget is exhausted.
    #[error("transient error: {0}")]
    Transient(String),

    /// Schema/config mismatch, vector-dimension mismatch, or a document
    /// corrupt beyond retry. Not retried automatically.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Invariant violation (e.g. a raw-storage path collision). Logged at
    /// error level, never retried.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Permanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self, AppError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;
