//! Error taxonomy for the generate pipeline.
//!
//! Each stage owns a small error enum.  They roll up into [`GenerateError`],
//! the only type the handler turns into an HTTP response, so every failure
//! leaves the service in the same `{success:false, error, detail?}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::util::truncate_chars;
use crate::GenerationResponse;

/// Upper bound (in characters) for any `detail` string returned to callers.
pub const DETAIL_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Input text is empty")]
    EmptyInput,
    #[error("Input must be {max} characters or fewer")]
    TooLong { max: usize },
    #[error("Request body must be a JSON object with an \"input\" string")]
    InvalidBody(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body_snippet: String },
    #[error("upstream body is not JSON: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("upstream returned no text")]
    EmptyUpstreamText,
    #[error("no JSON object could be recovered from upstream text")]
    UnparsableResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("recovered object has no non-empty \"posts\" array")]
    MissingPostsArray,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("rate limited")]
    RateLimited,
    /// Carries the *name* of the missing variable, never a value.
    #[error("credential variable {0} is not set")]
    Configuration(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GenerateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GenerateError::Validation(_) => StatusCode::BAD_REQUEST,
            GenerateError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GenerateError::Configuration(_) | GenerateError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GenerateError::Upstream(_)
            | GenerateError::Extraction(_)
            | GenerateError::Schema(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message shown in the client's error banner.
    pub fn public_message(&self) -> String {
        match self {
            GenerateError::Validation(v) => v.to_string(),
            GenerateError::RateLimited => {
                "Rate limit reached. Please try again in a minute.".to_string()
            }
            GenerateError::Configuration(_) => "API key is not configured".to_string(),
            GenerateError::Upstream(UpstreamError::Http { status, .. }) => {
                format!("AI generation failed ({})", status)
            }
            GenerateError::Upstream(_) => "AI generation failed".to_string(),
            GenerateError::Extraction(ExtractionError::EmptyUpstreamText) => {
                "AI returned an empty response".to_string()
            }
            GenerateError::Extraction(_) | GenerateError::Schema(_) => {
                "Generated result was malformed".to_string()
            }
            GenerateError::Internal(_) => "Generation failed unexpectedly".to_string(),
        }
    }

    /// Truncated diagnostic.  Only transient upstream faults and internal
    /// errors expose one; parse failures never echo model output.
    pub fn detail(&self) -> Option<String> {
        let raw = match self {
            GenerateError::Upstream(UpstreamError::Http { body_snippet, .. }) => {
                body_snippet.clone()
            }
            GenerateError::Upstream(UpstreamError::Transport(msg))
            | GenerateError::Upstream(UpstreamError::Decode(msg))
            | GenerateError::Internal(msg) => msg.clone(),
            _ => return None,
        };
        Some(truncate_chars(&raw, DETAIL_MAX_CHARS))
    }

    /// Short label used for logs and the per-outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::Validation(_) => "validation",
            GenerateError::RateLimited => "rate_limited",
            GenerateError::Configuration(_) => "configuration",
            GenerateError::Upstream(_) => "upstream",
            GenerateError::Extraction(ExtractionError::EmptyUpstreamText) => "empty_upstream",
            GenerateError::Extraction(_) => "extraction",
            GenerateError::Schema(_) => "schema",
            GenerateError::Internal(_) => "internal",
        }
    }

    pub fn to_body(&self) -> GenerationResponse {
        GenerationResponse::failure(self.public_message(), self.detail())
    }
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}
