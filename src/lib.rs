//! Core library for buzzmaker.  This module wires the generate pipeline
//! (rate limit, validation, prompt, upstream call, extraction,
//! normalization) to the HTTP surface and owns the response contract.

mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod normalize;
pub mod prompt;
pub mod rate_limit;
pub mod upstream;
pub mod util;

pub use config::{ApiKeySource, AppConfig};
pub use error::GenerateError;
pub use normalize::{PostVariant, ScoreBreakdown};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::{ValidationError, DETAIL_MAX_CHARS};
use crate::extract::ResponseExtractor;
use crate::metrics::Metrics;
use crate::normalize::ResultNormalizer;
use crate::prompt::{validate_input, PromptBuilder, MAX_INPUT_CHARS};
use crate::rate_limit::{Clock, MemoryStore, RateLimiter, SystemClock};
use crate::upstream::{GeminiClient, GenerativeClient};
use crate::util::{caller_key, truncate_chars};

/// Body of `POST /api/generate`.  A missing or null `input` is treated as
/// empty and rejected by validation.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct GenerateRequest {
    #[serde(default)]
    pub input: Option<String>,
}

impl GenerateRequest {
    /// Parse a raw body.  Only a JSON object is accepted; serde would
    /// otherwise read `["text"]` positionally as `{"input": "text"}`.
    pub fn from_body(body: &[u8]) -> Result<Self, ValidationError> {
        let invalid = |e: serde_json::Error| {
            tracing::debug!(error = %e, "request body rejected");
            ValidationError::InvalidBody(e.to_string())
        };
        let value: serde_json::Value = serde_json::from_slice(body).map_err(invalid)?;
        if !value.is_object() {
            tracing::debug!("request body is not a JSON object");
            return Err(ValidationError::InvalidBody(
                "body is not a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(invalid)
    }
}

/// The one response shape every branch of the generate route returns.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<PostVariant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GenerationResponse {
    pub fn ok(posts: Vec<PostVariant>) -> Self {
        Self {
            success: true,
            posts: Some(posts),
            error: None,
            detail: None,
        }
    }

    pub fn failure(error: String, detail: Option<String>) -> Self {
        Self {
            success: false,
            posts: None,
            error: Some(error),
            detail,
        }
    }
}

/// Application state shared across handlers.  Only the rate limiter and
/// the metrics hold mutable state; everything else is immutable per process.
#[derive(Clone)]
pub struct AppState {
    pub limiter: RateLimiter,
    pub prompt: PromptBuilder,
    pub upstream: Arc<dyn GenerativeClient>,
    pub extractor: ResponseExtractor,
    pub normalizer: ResultNormalizer,
    pub api_key: ApiKeySource,
    pub client_ip_header: String,
    pub max_request_bytes: usize,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        upstream: Arc<dyn GenerativeClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit, clock, Arc::new(MemoryStore::new()))
            .with_max_tracked_keys(config.rate_max_keys);
        Self {
            limiter,
            prompt: PromptBuilder::new(config.prompt_version),
            upstream,
            extractor: ResponseExtractor::default(),
            normalizer: ResultNormalizer::new(config.prompt_version),
            api_key: config.api_key.clone(),
            client_ip_header: config.client_ip_header.clone(),
            max_request_bytes: config.max_request_bytes,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

/// Build state from environment variables (see [`AppConfig::from_env`]).
/// The provider credential itself is not read here; it is resolved on
/// every request.
pub fn build_state_from_env() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;
    let client =
        GeminiClient::new(config.upstream.clone()).context("Failed to build upstream HTTP client")?;
    if config.api_key.resolve().is_none() {
        tracing::warn!(
            var = %config.api_key.describe(),
            "API key not set; generate requests will fail with 500 until it is"
        );
    }
    tracing::info!(
        model = %config.upstream.model,
        prompt_version = %config.prompt_version,
        rate_limit = config.rate_limit.limit,
        rate_window_secs = config.rate_limit.window.num_seconds(),
        "state initialised"
    );
    Ok(AppState::new(&config, Arc::new(client), Arc::new(SystemClock)))
}

/// Build the Axum router.  CORS and content-type headers are stamped on
/// every response of the generate route, panics included.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let generate = Router::new()
        .route(
            "/api/generate",
            post(generate_handler).options(preflight_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("POST, OPTIONS"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                ))
                .layer(CatchPanicLayer::custom(panic_response)),
        );

    Router::new()
        .merge(generate)
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

/// Preflight: empty 200, headers come from the route layers.
async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

/// Handler for `POST /api/generate`.
async fn generate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Bytes, BytesRejection>,
) -> Response {
    let start = Instant::now();
    state.metrics.record_request();
    let caller = caller_key(&headers, &state.client_ip_header);

    let result = if state.limiter.allow(&caller) {
        AssertUnwindSafe(run_generation(&state, payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(&*panic);
                tracing::error!(panic = %message, "generation panicked");
                Err(GenerateError::Internal(message))
            })
    } else {
        Err(GenerateError::RateLimited)
    };

    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(posts) => {
            state.metrics.record_outcome("success", latency_ms);
            tracing::info!(
                caller = %caller,
                status = 200u16,
                posts = posts.len(),
                latency_ms,
                "generation succeeded"
            );
            (StatusCode::OK, Json(GenerationResponse::ok(posts))).into_response()
        }
        Err(err) => {
            state.metrics.record_outcome(err.kind(), latency_ms);
            let status = err.status();
            if status.is_server_error() {
                tracing::warn!(caller = %caller, status = status.as_u16(), kind = err.kind(), error = %err, latency_ms, "generation failed");
            } else {
                tracing::info!(caller = %caller, status = status.as_u16(), kind = err.kind(), latency_ms, "generation rejected");
            }
            err.into_response()
        }
    }
}

/// Everything after the rate-limit gate.  Each stage returns a typed error
/// that `?` lifts into [`GenerateError`].
async fn run_generation(
    state: &AppState,
    payload: Result<Bytes, BytesRejection>,
) -> Result<Vec<PostVariant>, GenerateError> {
    let body = payload.map_err(body_rejection)?;
    let request = GenerateRequest::from_body(&body)?;
    let input = validate_input(request.input.as_deref().unwrap_or(""))?;

    let api_key = state.api_key.resolve().ok_or_else(|| {
        tracing::error!(var = %state.api_key.describe(), "API key is not configured");
        GenerateError::Configuration(state.api_key.describe())
    })?;

    let prompt = state.prompt.build(&input);
    state.metrics.record_upstream_call();
    let envelope = state.upstream.generate(&prompt, &api_key).await?;

    let object = state.extractor.extract(&envelope)?;
    let posts = state.normalizer.normalize(&object)?;
    Ok(posts)
}

fn body_rejection(rejection: BytesRejection) -> GenerateError {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            tracing::warn!("request body exceeded configured limit");
            ValidationError::TooLong {
                max: MAX_INPUT_CHARS,
            }
            .into()
        }
        other => ValidationError::InvalidBody(other.body_text()).into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    };
    truncate_chars(&message, DETAIL_MAX_CHARS)
}

/// Backstop for panics outside the pipeline (extractors, response writing).
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(&*payload);
    tracing::error!(panic = %message, "handler panicked");
    GenerateError::Internal(message).into_response()
}

/// Health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.upstream.model(),
        "promptVersion": state.prompt.version().as_str(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render(state.limiter.tracked_keys());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
