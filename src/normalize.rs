//! Validation and repair of the recovered object.
//!
//! `validate` is the only step allowed to reject a batch, and only when
//! there is no usable `posts` array.  `repair` never fails: every field it
//! cannot use is replaced by a default so one bad variant cannot take the
//! others down with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::extract::JsonObject;
use crate::prompt::PromptVersion;

/// Label for variants whose `type` is missing or unusable.
pub const UNKNOWN_TYPE: &str = "unknown";
pub const NEUTRAL_SCORE: u8 = 3;
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostVariant {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub empathy: u8,
    pub surprise: u8,
    pub shareability: u8,
}

impl Default for ScoreBreakdown {
    fn default() -> Self {
        Self {
            empathy: NEUTRAL_SCORE,
            surprise: NEUTRAL_SCORE,
            shareability: NEUTRAL_SCORE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultNormalizer {
    version: PromptVersion,
}

impl ResultNormalizer {
    pub fn new(version: PromptVersion) -> Self {
        Self { version }
    }

    /// The batch must carry a non-empty `posts` array.
    pub fn validate<'a>(&self, object: &'a JsonObject) -> Result<&'a [Value], SchemaError> {
        match object.get("posts").and_then(Value::as_array) {
            Some(posts) if !posts.is_empty() => Ok(posts.as_slice()),
            _ => Err(SchemaError::MissingPostsArray),
        }
    }

    /// Coerce one element into a field-complete variant.
    pub fn repair(&self, post: &Value) -> PostVariant {
        let kind = coerce_text(post.get("type"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
        let score = self
            .version
            .expects_score()
            .then(|| repair_score(post.get("score")));
        PostVariant {
            kind,
            text: coerce_text(post.get("text")).unwrap_or_default(),
            tip: coerce_text(post.get("tip")).unwrap_or_default(),
            score,
        }
    }

    pub fn normalize(&self, object: &JsonObject) -> Result<Vec<PostVariant>, SchemaError> {
        let posts = self.validate(object)?;
        Ok(posts.iter().map(|p| self.repair(p)).collect())
    }
}

/// Strings pass through; numbers and booleans are rendered; anything else
/// is treated as missing.
fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn repair_score(value: Option<&Value>) -> ScoreBreakdown {
    let Some(obj) = value.and_then(Value::as_object) else {
        return ScoreBreakdown::default();
    };
    let axis = |name: &str| obj.get(name).and_then(score_value).unwrap_or(NEUTRAL_SCORE);
    ScoreBreakdown {
        empathy: axis("empathy"),
        surprise: axis("surprise"),
        shareability: axis("shareability"),
    }
}

fn score_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(MIN_SCORE as f64, MAX_SCORE as f64) as u8)
}
