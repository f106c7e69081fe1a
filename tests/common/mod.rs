#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use buzzmaker::error::UpstreamError;
use buzzmaker::prompt::Prompt;
use buzzmaker::rate_limit::ManualClock;
use buzzmaker::upstream::GenerativeClient;
use buzzmaker::{ApiKeySource, AppConfig, AppState};
use chrono::TimeZone;
use serde_json::{json, Value};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

type Reply = Box<dyn Fn() -> Result<Value, UpstreamError> + Send + Sync>;

/// In-process stand-in for the provider.  Counts calls and remembers the
/// last prompt and key it saw.
pub struct ScriptedUpstream {
    reply: Reply,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<Prompt>>,
    last_key: Mutex<Option<String>>,
}

impl ScriptedUpstream {
    pub fn new(reply: impl Fn() -> Result<Value, UpstreamError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_key: Mutex::new(None),
        })
    }

    /// Always answers with an envelope wrapping `text`.
    pub fn text(text: &str) -> Arc<Self> {
        let envelope = envelope(text);
        Self::new(move || Ok(envelope.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn last_key(&self) -> Option<String> {
        self.last_key.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerativeClient for ScriptedUpstream {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt, api_key: &str) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        *self.last_key.lock().unwrap() = Some(api_key.to_string());
        (self.reply)()
    }
}

/// A `generateContent` envelope with `text` as the first part.
pub fn envelope(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

pub const TEST_KEY: &str = "test-key-do-not-leak";

pub fn test_config() -> AppConfig {
    AppConfig {
        api_key: ApiKeySource::Fixed(Some(TEST_KEY.to_string())),
        ..AppConfig::default()
    }
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ))
}

pub fn state_with(config: &AppConfig, upstream: Arc<ScriptedUpstream>, clock: Arc<ManualClock>) -> AppState {
    AppState::new(config, upstream, clock)
}

/// Three well-formed variants, as the provider is asked to return them.
pub fn three_posts_json() -> String {
    json!({"posts": [
        {"type": "empathy", "text": "Mondays need coffee ☕ #coffee #monday", "tip": "relatable", "score": {"empathy": 5, "surprise": 2, "shareability": 4}},
        {"type": "surprise", "text": "Coffee tastes better on Mondays. Science? No. #coffee", "tip": "twist", "score": {"empathy": 3, "surprise": 5, "shareability": 4}},
        {"type": "story", "text": "7:00 alarm. 7:05 kettle. 7:06 hope. #morning", "tip": "narrative", "score": {"empathy": 4, "surprise": 3, "shareability": 3}}
    ]})
    .to_string()
}
