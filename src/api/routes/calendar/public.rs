//! Public types for the calendar API
use serde::{Deserialize, Serialize};

use crate::google::gcal::Event;
pub use crate::google::gcal::{EventPatch as UpdateEventRequest, NewEvent as CreateEventRequest};

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub q: Option<String>,
    pub days_ahead: Option<i64>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub event: Event,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteEventResponse {
    pub success: bool,
}
