use buzzmaker::prompt::PromptVersion;
use buzzmaker::AppConfig;
use once_cell::sync::Lazy;
use std::sync::Mutex;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[test]
fn rejects_invalid_numeric_env_values() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::remove_var("BUZZ_RATE_LIMIT");
    std::env::remove_var("BUZZ_UPSTREAM_TIMEOUT_MS");

    std::env::set_var("BUZZ_UPSTREAM_TIMEOUT_MS", "soon");
    let err = AppConfig::from_env().expect_err("expected invalid timeout to error");
    assert!(format!("{}", err).contains("BUZZ_UPSTREAM_TIMEOUT_MS"));
    std::env::remove_var("BUZZ_UPSTREAM_TIMEOUT_MS");

    std::env::set_var("BUZZ_RATE_LIMIT", "-1");
    let err = AppConfig::from_env().expect_err("expected negative limit to error");
    assert!(format!("{}", err).contains("BUZZ_RATE_LIMIT"));
    std::env::remove_var("BUZZ_RATE_LIMIT");
}

#[test]
fn rejects_unusable_client_ip_header() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("BUZZ_CLIENT_IP_HEADER", "not a header");
    let err = AppConfig::from_env().expect_err("expected invalid header name to error");
    assert!(format!("{}", err).contains("BUZZ_CLIENT_IP_HEADER"));
    std::env::remove_var("BUZZ_CLIENT_IP_HEADER");
}

#[test]
fn blank_values_fall_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("BUZZ_MODEL", "   ");
    std::env::set_var("BUZZ_PROMPT_VERSION", "");
    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.upstream.model, "gemini-2.0-flash-lite");
    assert_eq!(cfg.prompt_version, PromptVersion::V2);
    std::env::remove_var("BUZZ_MODEL");
    std::env::remove_var("BUZZ_PROMPT_VERSION");
}
