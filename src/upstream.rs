use std::time::Duration;

use crate::error::{UpstreamError, DETAIL_MAX_CHARS};
use crate::prompt::Prompt;
use crate::util::truncate_chars;

/// Connection settings for the Gemini `generateContent` endpoint.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiDefinition {
    #[serde(default = "gemini_default_base_url")]
    pub base_url: String,
    #[serde(default = "gemini_default_model")]
    pub model: String,
    #[serde(default = "gemini_default_timeout")]
    pub timeout_ms: u64,
}

pub fn gemini_default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
pub fn gemini_default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}
pub fn gemini_default_timeout() -> u64 {
    10_000
}

impl Default for GeminiDefinition {
    fn default() -> Self {
        Self {
            base_url: gemini_default_base_url(),
            model: gemini_default_model(),
            timeout_ms: gemini_default_timeout(),
        }
    }
}

/// Largest provider envelope read into memory.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// A single-shot text generation backend.  Returns the provider envelope
/// untouched; digging the text out is the extractor's job.
#[async_trait::async_trait]
pub trait GenerativeClient: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &Prompt,
        api_key: &str,
    ) -> Result<serde_json::Value, UpstreamError>;
}

/// GeminiClient POSTs the prompt once, with no retry, and surfaces every
/// failure as an [`UpstreamError`].
pub struct GeminiClient {
    def: GeminiDefinition,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(def: GeminiDefinition) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(def.timeout_ms);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { def, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.def.base_url.trim_end_matches('/'),
            self.def.model
        )
    }

    /// Buffer the response body, refusing anything over
    /// [`MAX_ENVELOPE_BYTES`].
    async fn read_capped(&self, resp: &mut reqwest::Response) -> Result<Vec<u8>, UpstreamError> {
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|err| self.transport_error(err))? {
            if buf.len() + chunk.len() > MAX_ENVELOPE_BYTES {
                tracing::warn!(model = %self.def.model, limit = MAX_ENVELOPE_BYTES, "upstream body too large");
                return Err(UpstreamError::Decode(format!(
                    "upstream body exceeded {} bytes",
                    MAX_ENVELOPE_BYTES
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        // detail is caller-visible: no URL
        let err = err.without_url();
        if err.is_timeout() {
            UpstreamError::Transport(format!(
                "upstream timed out after {}ms",
                self.def.timeout_ms
            ))
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl GenerativeClient for GeminiClient {
    fn model(&self) -> &str {
        &self.def.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        api_key: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        let mut resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&prompt.to_wire())
            .send()
            .await
            .map_err(|err| {
                let err = self.transport_error(err);
                tracing::warn!(model=%self.def.model, error=%err, "upstream request failed");
                err
            })?;

        let status = resp.status();
        if !status.is_success() {
            let raw = self.read_capped(&mut resp).await.unwrap_or_default();
            let body_snippet = truncate_chars(&String::from_utf8_lossy(&raw), DETAIL_MAX_CHARS);
            tracing::warn!(
                model = %self.def.model,
                upstream_status = status.as_u16(),
                body = %body_snippet,
                "upstream returned error status"
            );
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body_snippet,
            });
        }

        let raw = self.read_capped(&mut resp).await?;
        serde_json::from_slice(&raw).map_err(|err| {
            tracing::warn!(model=%self.def.model, error=%err, "upstream body is not JSON");
            UpstreamError::Decode(err.to_string())
        })
    }
}
