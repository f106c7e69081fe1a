//! Recovery of the JSON payload from provider output.
//!
//! The model is told to answer with bare JSON but regularly wraps it in
//! markdown fences or prose.  Each [`ExtractStrategy`] is one pure way of
//! recovering an object from text; [`ResponseExtractor`] tries them in order
//! and stops at the first success.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ExtractionError;

pub mod brace_scan;
pub mod direct;
pub mod fenced;

use self::brace_scan::BalancedBraceScan;
use self::direct::DirectParse;
use self::fenced::FencedBlock;

pub type JsonObject = serde_json::Map<String, Value>;

/// JSON pointer to the generated text inside a `generateContent` envelope.
const TEXT_POINTER: &str = "/candidates/0/content/parts/0/text";

/// Implemented by every recovery strategy.  Returning `None` means the
/// strategy found nothing usable and the next one should run.
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str) -> Option<JsonObject>;
}

/// Parse `candidate` and keep it only if it is a JSON object.
pub fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Pull the first candidate's first text part out of the envelope.
pub fn upstream_text(envelope: &Value) -> Result<&str, ExtractionError> {
    match envelope
        .pointer(TEXT_POINTER)
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
    {
        Some(text) => Ok(text),
        None => {
            let block_reason = envelope
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str);
            let finish_reason = envelope
                .pointer("/candidates/0/finishReason")
                .and_then(Value::as_str);
            tracing::warn!(
                block_reason = ?block_reason,
                finish_reason = ?finish_reason,
                "upstream envelope carried no text"
            );
            Err(ExtractionError::EmptyUpstreamText)
        }
    }
}

/// Ordered list of strategies.
#[derive(Clone)]
pub struct ResponseExtractor {
    strategies: Vec<Arc<dyn ExtractStrategy>>,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(DirectParse),
            Arc::new(FencedBlock),
            Arc::new(BalancedBraceScan),
        ])
    }
}

impl ResponseExtractor {
    pub fn new(strategies: Vec<Arc<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn extract(&self, envelope: &Value) -> Result<JsonObject, ExtractionError> {
        let text = upstream_text(envelope)?;
        self.recover(text)
    }

    /// Run the strategies over raw text.
    pub fn recover(&self, text: &str) -> Result<JsonObject, ExtractionError> {
        for strategy in &self.strategies {
            if let Some(object) = strategy.extract(text) {
                tracing::debug!(strategy = strategy.name(), "recovered JSON object");
                return Ok(object);
            }
            tracing::trace!(strategy = strategy.name(), "strategy found nothing");
        }
        tracing::warn!(
            text_chars = text.chars().count(),
            "no strategy recovered a JSON object"
        );
        Err(ExtractionError::UnparsableResponse)
    }
}
