//! Utility helpers for buzzmaker.
//!
//! Small request-scoped helpers shared by the handler and the pipeline
//! stages: caller identification and character-safe truncation.

use axum::http::HeaderMap;

/// Caller key used when the trusted proxy header is missing or unreadable.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Derive the rate-limit bucket for a request from the trusted proxy
/// header (for example `CF-Connecting-IP`).  Header lookup is
/// case-insensitive; blank values count as missing.
pub fn caller_key(headers: &HeaderMap, header_name: &str) -> String {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_CALLER)
        .to_string()
}

/// Keep at most `max` characters of `value`, never splitting a UTF-8
/// sequence.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn caller_key_prefers_proxy_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(caller_key(&headers, "CF-Connecting-IP"), "203.0.113.9");
    }

    #[test]
    fn caller_key_falls_back_to_sentinel() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_key(&headers, "cf-connecting-ip"), UNKNOWN_CALLER);
        headers.insert("cf-connecting-ip", HeaderValue::from_static("   "));
        assert_eq!(caller_key(&headers, "cf-connecting-ip"), UNKNOWN_CALLER);
    }

    #[test]
    fn truncation_respects_multibyte_chars() {
        assert_eq!(truncate_chars("あいうえお", 3), "あいう");
        assert_eq!(truncate_chars("short", 200), "short");
    }
}
