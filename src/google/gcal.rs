//! Google Calendar API client for listing, creating, updating and
//! deleting events on a single calendar. The calendar service is the
//! only source of truth so nothing here is cached between calls.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::AppConfig;

pub const DEFAULT_DAYS_AHEAD: i64 = 30;
pub const DEFAULT_MAX_RESULTS: u32 = 50;

const MEET_SOLUTION_TYPE: &str = "hangoutsMeet";
const VIDEO_ENTRY_POINT_TYPE: &str = "video";

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Not authenticated")]
    Unauthenticated,
    #[error("{0}")]
    Unauthorized(String),
    #[error("Event {event_id} not found")]
    NotFound { event_id: String },
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Calendar service responded with {status}")]
    Upstream {
        status: StatusCode,
        message: Option<String>,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl CalendarError {
    /// Message that can be shown to a user as is. Upstream failures
    /// without an error message from the service have none.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Upstream { message, .. } => message.clone(),
            other => Some(other.to_string()),
        }
    }
}

// Error payload returned by Google APIs e.g.
// {"error": {"code": 400, "message": "Bad Request", "errors": [...]}}
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Event resource from the Calendar API documentation. Fields that
/// aren't used here are kept in `extra` so that a fetched event can be
/// written back without losing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<ConferenceData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// The video join link of the event's conference, if it has one.
    /// Entry points are matched by type rather than position since a
    /// conference can also have phone and SIP entry points.
    pub fn meet_link(&self) -> Option<&str> {
        self.conference_data
            .as_ref()?
            .entry_points
            .as_ref()?
            .iter()
            .find(|entry| entry.entry_point_type == VIDEO_ENTRY_POINT_TYPE)
            .map(|entry| entry.uri.as_str())
    }
}

/// Either a timestamp with a zone or, for all-day events, a date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn zoned(date_time: &str, time_zone: &str) -> Self {
        Self {
            date_time: Some(date_time.to_string()),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }

    #[cfg(test)]
    pub fn all_day(date: &str) -> Self {
        Self {
            date_time: None,
            date: Some(date.to_string()),
            time_zone: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attendee {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_request: Option<CreateConferenceRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<EntryPoint>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConferenceData {
    /// Asks the calendar service to provision a Google Meet link. Each
    /// request gets a fresh ID, the service uses it to deduplicate
    /// retries of the same request.
    pub fn meet_request() -> Self {
        Self {
            create_request: Some(CreateConferenceRequest {
                request_id: format!("meet-{}", Uuid::new_v4()),
                conference_solution_key: ConferenceSolutionKey {
                    r#type: MEET_SOLUTION_TYPE.to_string(),
                },
                extra: Map::new(),
            }),
            entry_points: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConferenceRequest {
    pub request_id: String,
    pub conference_solution_key: ConferenceSolutionKey,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceSolutionKey {
    pub r#type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub entry_point_type: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

/// Trims addresses and drops blank entries.
fn to_attendees(emails: &[String]) -> Vec<Attendee> {
    emails
        .iter()
        .map(|email| email.trim())
        .filter(|email| !email.is_empty())
        .map(Attendee::new)
        .collect()
}

/// Everything needed to create an event. Start and end are ISO 8601
/// strings and are written in the configured zone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_date_time: String,
    pub end_date_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_meet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
}

impl NewEvent {
    pub fn wants_meet(&self) -> bool {
        self.add_meet.unwrap_or(false)
    }

    pub fn into_event(self, time_zone: &str) -> Result<Event, CalendarError> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::InvalidRequest(
                "Event title is required".to_string(),
            ));
        }

        let conference_data = self.wants_meet().then(ConferenceData::meet_request);
        let attendees = self
            .attendees
            .as_deref()
            .map(to_attendees)
            .filter(|attendees| !attendees.is_empty());

        Ok(Event {
            summary: Some(self.summary),
            description: self.description,
            location: self.location,
            start: Some(EventDateTime::zoned(&self.start_date_time, time_zone)),
            end: Some(EventDateTime::zoned(&self.end_date_time, time_zone)),
            attendees,
            conference_data,
            ..Default::default()
        })
    }
}

/// A partial update. Only the fields that are set replace the stored
/// event's values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_meet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
}

impl EventPatch {
    /// A conference is only requested when the stored event doesn't
    /// already have one.
    pub fn requests_conference(&self, existing: &Event) -> bool {
        self.add_meet.unwrap_or(false) && existing.conference_data.is_none()
    }

    /// Merges the patch over `event`, the representation fetched from
    /// the calendar service.
    pub fn apply(self, mut event: Event, time_zone: &str) -> Event {
        if self.requests_conference(&event) {
            event.conference_data = Some(ConferenceData::meet_request());
        }
        if let Some(summary) = self.summary {
            event.summary = Some(summary);
        }
        if let Some(description) = self.description {
            event.description = Some(description);
        }
        if let Some(location) = self.location {
            event.location = Some(location);
        }
        if let Some(start) = self.start_date_time.filter(|s| !s.is_empty()) {
            event.start = Some(EventDateTime::zoned(&start, time_zone));
        }
        if let Some(end) = self.end_date_time.filter(|s| !s.is_empty()) {
            event.end = Some(EventDateTime::zoned(&end, time_zone));
        }
        // An empty list means the attendees weren't supplied
        if let Some(attendees) = self.attendees.as_deref().map(to_attendees)
            && !attendees.is_empty()
        {
            event.attendees = Some(attendees);
        }
        event
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub query: Option<String>,
    pub max_results: u32,
    pub days_ahead: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            query: None,
            max_results: DEFAULT_MAX_RESULTS,
            days_ahead: DEFAULT_DAYS_AHEAD,
        }
    }
}

/// Client for the events of one calendar, authorized with the access
/// token of the current session. Construct one per request.
#[derive(Clone)]
pub struct CalendarClient {
    http: Client,
    base_url: String,
    calendar_id: String,
    access_token: String,
    time_zone: String,
}

impl CalendarClient {
    pub fn new(
        http: Client,
        base_url: &str,
        calendar_id: &str,
        access_token: &str,
        time_zone: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            calendar_id: calendar_id.to_string(),
            access_token: access_token.to_string(),
            time_zone: time_zone.to_string(),
        }
    }

    pub fn from_config(http: Client, config: &AppConfig, access_token: &str) -> Self {
        Self::new(
            http,
            &config.google_calendar_api_url,
            &config.calendar_id,
            access_token,
            config.time_zone_name(),
        )
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    // Every operation needs a token so fail before making any request
    fn token(&self) -> Result<&str, CalendarError> {
        if self.access_token.trim().is_empty() {
            return Err(CalendarError::Unauthenticated);
        }
        Ok(&self.access_token)
    }

    /// Lists single instances of events starting within
    /// `days_ahead` days of `now`, ordered by start time.
    pub async fn list_events(
        &self,
        options: &ListOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        let token = self.token()?;
        if options.max_results == 0 {
            return Err(CalendarError::InvalidRequest(
                "max_results must be positive".to_string(),
            ));
        }
        if options.days_ahead <= 0 {
            return Err(CalendarError::InvalidRequest(
                "days_ahead must be positive".to_string(),
            ));
        }

        let time_min = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let time_max = Duration::try_days(options.days_ahead)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| CalendarError::InvalidRequest("days_ahead is too large".to_string()))?
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut params = vec![
            ("timeMin", time_min),
            ("timeMax", time_max),
            ("maxResults", options.max_results.to_string()),
            ("singleEvents", String::from("true")),
            ("orderBy", String::from("startTime")),
        ];
        if let Some(query) = options.query.as_ref().filter(|q| !q.trim().is_empty()) {
            params.push(("q", query.clone()));
        }

        let res = self
            .http
            .get(self.events_url())
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        let list: EventList = check_response(res, None).await?.json().await?;
        Ok(list.items)
    }

    pub async fn get_event(&self, event_id: &str) -> Result<Event, CalendarError> {
        let token = self.token()?;
        require_event_id(event_id)?;

        let res = self
            .http
            .get(self.event_url(event_id))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(check_response(res, Some(event_id)).await?.json().await?)
    }

    pub async fn create_event(&self, new_event: NewEvent) -> Result<Event, CalendarError> {
        let token = self.token()?;
        let with_meet = new_event.wants_meet();
        let body = new_event.into_event(&self.time_zone)?;

        let mut req = self.http.post(self.events_url()).bearer_auth(token);
        // The service ignores conference data unless this is set
        if with_meet {
            req = req.query(&[("conferenceDataVersion", "1")]);
        }
        let res = req.json(&body).send().await?;
        let event: Event = check_response(res, None).await?.json().await?;
        tracing::debug!("Created event {:?}", event.id);
        Ok(event)
    }

    /// Updates an event by fetching the stored representation, merging
    /// the patch over it, and writing the whole event back. The service
    /// replaces the full event on update.
    pub async fn update_event(
        &self,
        event_id: &str,
        patch: EventPatch,
    ) -> Result<Event, CalendarError> {
        let token = self.token()?;
        let existing = self.get_event(event_id).await?;
        let with_meet = patch.requests_conference(&existing);
        let body = patch.apply(existing, &self.time_zone);

        let mut req = self.http.put(self.event_url(event_id)).bearer_auth(token);
        if with_meet {
            req = req.query(&[("conferenceDataVersion", "1")]);
        }
        let res = req.json(&body).send().await?;
        let event: Event = check_response(res, Some(event_id)).await?.json().await?;
        tracing::debug!("Updated event {}", event_id);
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let token = self.token()?;
        require_event_id(event_id)?;

        let res = self
            .http
            .delete(self.event_url(event_id))
            .bearer_auth(token)
            .send()
            .await?;
        check_response(res, Some(event_id)).await?;
        tracing::debug!("Deleted event {}", event_id);
        Ok(())
    }
}

fn require_event_id(event_id: &str) -> Result<(), CalendarError> {
    if event_id.trim().is_empty() {
        return Err(CalendarError::InvalidRequest(
            "Event ID is required".to_string(),
        ));
    }
    Ok(())
}

/// Turns non-success responses into a `CalendarError`, using the error
/// message from the response body when there is one.
async fn check_response(res: Response, event_id: Option<&str>) -> Result<Response, CalendarError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.message)
        .filter(|m| !m.trim().is_empty());
    tracing::debug!("Calendar API error {}: {}", status, body);

    let err = match (status, event_id) {
        (StatusCode::UNAUTHORIZED, _) => CalendarError::Unauthorized(
            message.unwrap_or_else(|| "Invalid credentials".to_string()),
        ),
        (StatusCode::NOT_FOUND | StatusCode::GONE, Some(id)) => CalendarError::NotFound {
            event_id: id.to_string(),
        },
        _ => CalendarError::Upstream { status, message },
    };
    Err(err)
}
