//! Prompt construction.
//!
//! Everything in here is pure: the same input and template version always
//! produce byte-identical payloads.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

/// Maximum accepted input length, in characters, after trimming.
pub const MAX_INPUT_CHARS: usize = 500;

/// Caller input that passed [`validate_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput(String);

impl ValidatedInput {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn validate_input(raw: &str) -> Result<ValidatedInput, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    if trimmed.chars().count() > MAX_INPUT_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_INPUT_CHARS,
        });
    }
    Ok(ValidatedInput(trimmed.to_string()))
}

/// Template revision.  `V2` adds a per-post score the normalizer must fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptVersion {
    V1,
    #[default]
    V2,
}

impl PromptVersion {
    pub fn expects_score(self) -> bool {
        matches!(self, PromptVersion::V2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromptVersion::V1 => "v1",
            PromptVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for PromptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(PromptVersion::V1),
            "v2" | "2" => Ok(PromptVersion::V2),
            other => Err(format!("unknown prompt version '{}'", other)),
        }
    }
}

const RULES: &str = "You are an expert at writing posts that take off on X (formerly Twitter).
Turn the user's passing thought or idea into posts that are likely to go viral.

## Rules
1. Write 3 posts, one per pattern: empathy, surprise, story
2. Each post is at most 140 characters and uses the same language as the user's input
3. The first line must hook the reader
4. Use line breaks to keep the rhythm brisk
5. Add 2-3 relevant hashtags
6. For each pattern, explain in one line why it should take off";

const SCORE_RULE: &str = "
7. Rate each post from 1 to 5 on empathy, surprise and shareability";

const SHAPE_V1: &str = r#"
## Output format
Respond with this JSON only, no other text:
{
  "posts": [
    {"type": "empathy", "text": "post body (hashtags included)", "tip": "why it takes off"},
    {"type": "surprise", "text": "post body (hashtags included)", "tip": "why it takes off"},
    {"type": "story", "text": "post body (hashtags included)", "tip": "why it takes off"}
  ]
}"#;

const SHAPE_V2: &str = r#"
## Output format
Respond with this JSON only, no other text:
{
  "posts": [
    {"type": "empathy", "text": "post body (hashtags included)", "tip": "why it takes off", "score": {"empathy": 1, "surprise": 1, "shareability": 1}},
    {"type": "surprise", "text": "post body (hashtags included)", "tip": "why it takes off", "score": {"empathy": 1, "surprise": 1, "shareability": 1}},
    {"type": "story", "text": "post body (hashtags included)", "tip": "why it takes off", "score": {"empathy": 1, "surprise": 1, "shareability": 1}}
  ]
}"#;

const USER_WRAPPER: &str = "Turn this passing thought into X posts that will take off:";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub max_output_tokens: u32,
    pub response_mime_type: &'static str,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.95,
            max_output_tokens: 1024,
            response_mime_type: "application/json",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub version: PromptVersion,
    pub system_instruction: String,
    pub user_message: String,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [Part<'a>; 1],
}

/// Request body for `generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationConfig,
}

impl Prompt {
    pub fn to_wire(&self) -> WireRequest<'_> {
        WireRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &self.system_instruction,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part {
                    text: &self.user_message,
                }],
            }],
            generation_config: &self.generation_config,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    version: PromptVersion,
}

impl PromptBuilder {
    pub fn new(version: PromptVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> PromptVersion {
        self.version
    }

    pub fn system_instruction(&self) -> String {
        match self.version {
            PromptVersion::V1 => format!("{}{}", RULES, SHAPE_V1),
            PromptVersion::V2 => format!("{}{}{}", RULES, SCORE_RULE, SHAPE_V2),
        }
    }

    pub fn build(&self, input: &ValidatedInput) -> Prompt {
        Prompt {
            version: self.version,
            system_instruction: self.system_instruction(),
            user_message: format!("{}\n\n\"{}\"", USER_WRAPPER, input.as_str()),
            generation_config: GenerationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_trims_and_bounds() {
        assert_eq!(validate_input("  hi \n").unwrap().as_str(), "hi");
        assert_eq!(validate_input(" \t\n"), Err(ValidationError::EmptyInput));
        let max = "あ".repeat(MAX_INPUT_CHARS);
        assert!(validate_input(&max).is_ok());
        let over = "a".repeat(MAX_INPUT_CHARS + 1);
        assert_eq!(
            validate_input(&over),
            Err(ValidationError::TooLong {
                max: MAX_INPUT_CHARS
            })
        );
    }

    #[test]
    fn build_is_deterministic_and_embeds_input_verbatim() {
        let input = validate_input("coffee tastes better on Mondays {\"odd\"}").unwrap();
        let builder = PromptBuilder::new(PromptVersion::V2);
        let a = builder.build(&input);
        let b = builder.build(&input);
        assert_eq!(a, b);
        assert!(a.user_message.starts_with(USER_WRAPPER));
        assert!(a
            .user_message
            .contains("\"coffee tastes better on Mondays {\"odd\"}\""));
    }

    #[test]
    fn score_rubric_only_in_v2() {
        let v1 = PromptBuilder::new(PromptVersion::V1).system_instruction();
        let v2 = PromptBuilder::new(PromptVersion::V2).system_instruction();
        assert!(!v1.contains("shareability"));
        assert!(v2.contains("\"score\""));
        assert!(v2.contains("shareability"));
    }

    #[test]
    fn wire_body_matches_provider_shape() {
        let input = validate_input("hello").unwrap();
        let prompt = PromptBuilder::default().build(&input);
        let wire = serde_json::to_value(prompt.to_wire()).unwrap();
        assert_eq!(
            wire["generationConfig"],
            json!({
                "temperature": 0.9,
                "topP": 0.95,
                "maxOutputTokens": 1024,
                "responseMimeType": "application/json"
            })
        );
        assert_eq!(wire["contents"][0]["role"], "user");
        assert_eq!(wire["contents"][0]["parts"][0]["text"], prompt.user_message);
        assert_eq!(
            wire["systemInstruction"]["parts"][0]["text"],
            prompt.system_instruction
        );
        assert!(wire["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn version_parses_from_env_style_strings() {
        assert_eq!("V1".parse::<PromptVersion>(), Ok(PromptVersion::V1));
        assert_eq!("2".parse::<PromptVersion>(), Ok(PromptVersion::V2));
        assert!("v9".parse::<PromptVersion>().is_err());
    }
}
