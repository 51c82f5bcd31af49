use std::env;
use std::time::Duration;

use chrono_tz::Tz;

const DEFAULT_TIME_ZONE: Tz = chrono_tz::Europe::Madrid;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_calendar_api_url: String,
    pub calendar_id: String,
    // Zone attached to every start/end instant written upstream and used
    // to tell the assistant what "now" is
    pub time_zone: Tz,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub ai_max_duration: Duration,
}

impl AppConfig {
    /// Name of the reference time zone as the calendar service expects
    /// it e.g. "Europe/Madrid".
    pub fn time_zone_name(&self) -> &'static str {
        self.time_zone.name()
    }
}

fn parse_time_zone(value: &str) -> Tz {
    value.parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!(
            "Invalid time zone {}, falling back to {}",
            value,
            DEFAULT_TIME_ZONE.name()
        );
        DEFAULT_TIME_ZONE
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        let google_calendar_api_url = env::var("QUICKAL_GOOGLE_CALENDAR_API_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string());
        let calendar_id = env::var("QUICKAL_CALENDAR_ID").unwrap_or_else(|_| "primary".to_string());
        let time_zone = env::var("QUICKAL_TIME_ZONE")
            .map(|tz| parse_time_zone(&tz))
            .unwrap_or(DEFAULT_TIME_ZONE);
        let openai_api_hostname =
            env::var("QUICKAL_LLM_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("QUICKAL_LLM_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        // Upper bound on how long a single assistant response may run
        let ai_max_duration = env::var("QUICKAL_AI_MAX_DURATION_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Self {
            google_calendar_api_url,
            calendar_id,
            time_zone,
            openai_model,
            openai_api_hostname,
            openai_api_key,
            ai_max_duration,
        }
    }
}
