use crate::core::AppConfig;

pub struct AppState {
    pub config: AppConfig,
    // Shared so connections to the calendar service are pooled across
    // requests
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}
