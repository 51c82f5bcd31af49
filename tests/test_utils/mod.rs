//! Test utilities for integration tests
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{Router, body::Body};

use quickal::api::AppState;
use quickal::api::app;
use quickal::core::AppConfig;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Config pointing the calendar service and the completion API at
/// the given mock server URLs.
pub fn test_config(calendar_url: &str, llm_url: &str) -> AppConfig {
    AppConfig {
        google_calendar_api_url: calendar_url.to_string(),
        calendar_id: String::from("primary"),
        time_zone: chrono_tz::Europe::Madrid,
        openai_model: String::from("gpt-4.1-mini"),
        openai_api_hostname: llm_url.to_string(),
        openai_api_key: String::from("test-api-key"),
        ai_max_duration: Duration::from_secs(10),
    }
}

/// Creates a test application router using `config`.
pub fn test_app(config: AppConfig) -> Router {
    let app_state = AppState::new(config);
    app(Arc::new(RwLock::new(app_state)))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

/// Parses the JSON payloads out of a server-sent events body.
pub fn sse_events(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}
