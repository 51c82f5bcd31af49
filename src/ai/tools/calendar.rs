//! Calendar operations exposed to the assistant as tools.

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::google::gcal::{
    CalendarClient, CalendarError, DEFAULT_DAYS_AHEAD, Event, EventDateTime, EventPatch,
    ListOptions, NewEvent,
};
use crate::openai::{Function, Parameters, Property, Tool, Toolbox};

/// Number of events returned to the model when it lists events
pub const TOOL_MAX_RESULTS: u32 = 20;

const DESCRIPTION_PREVIEW_CHARS: usize = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventProps {
    pub summary: Property,
    pub description: Property,
    pub location: Property,
    pub start_date_time: Property,
    pub end_date_time: Property,
    pub add_meet: Property,
    pub attendees: Property,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventProps {
    pub event_id: Property,
    pub summary: Property,
    pub description: Property,
    pub location: Property,
    pub start_date_time: Property,
    pub end_date_time: Property,
    pub add_meet: Property,
    pub attendees: Property,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventProps {
    pub event_id: Property,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsProps {
    pub query: Property,
    pub days_ahead: Property,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventArgs {
    pub event_id: String,
    #[serde(flatten)]
    pub patch: EventPatch,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEventArgs {
    pub event_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEventsArgs {
    #[serde(default)]
    pub query: Option<String>,
    // Models sometimes send whole numbers as floats like `7.0`
    #[serde(default)]
    pub days_ahead: Option<f64>,
}

/// A calendar operation requested by the model, with its arguments.
#[derive(Debug, Deserialize)]
#[serde(tag = "name", content = "arguments")]
pub enum CalendarToolCall {
    #[serde(rename = "createEvent")]
    CreateEvent(NewEvent),
    #[serde(rename = "updateEvent")]
    UpdateEvent(UpdateEventArgs),
    #[serde(rename = "deleteEvent")]
    DeleteEvent(DeleteEventArgs),
    #[serde(rename = "listEvents")]
    ListEvents(ListEventsArgs),
}

fn object<Props: Serialize>(properties: Props, required: &[&str]) -> Parameters<Props> {
    Parameters {
        r#type: String::from("object"),
        properties,
        required: required.iter().map(|r| r.to_string()).collect(),
        additional_properties: false,
    }
}

impl CalendarToolCall {
    /// Parses a tool call from the model. Unknown tool names and
    /// arguments that don't match the tool's schema are errors.
    pub fn parse(name: &str, args: &str) -> Result<Self, Error> {
        let arguments: Value = if args.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(args).map_err(|e| anyhow!("Invalid arguments for {}: {}", name, e))?
        };
        serde_json::from_value(json!({"name": name, "arguments": arguments}))
            .map_err(|e| anyhow!("Invalid tool call {}: {}", name, e))
    }

    pub fn definitions() -> Vec<Tool> {
        let create = Function {
            name: String::from("createEvent"),
            description: String::from("Create a new Google Calendar event."),
            parameters: object(
                CreateEventProps {
                    summary: Property::string("Event title"),
                    description: Property::string("Event description"),
                    location: Property::string("Event location"),
                    start_date_time: Property::string("Start in ISO 8601"),
                    end_date_time: Property::string("End in ISO 8601"),
                    add_meet: Property::boolean("Add a Google Meet video call"),
                    attendees: Property::string_array("Attendee emails"),
                },
                &["summary", "startDateTime", "endDateTime"],
            ),
        };
        let update = Function {
            name: String::from("updateEvent"),
            description: String::from(
                "Update an existing Google Calendar event. Only the fields given are changed.",
            ),
            parameters: object(
                UpdateEventProps {
                    event_id: Property::string("Event ID to update"),
                    summary: Property::string("New title"),
                    description: Property::string("New description"),
                    location: Property::string("New location"),
                    start_date_time: Property::string("New start in ISO 8601"),
                    end_date_time: Property::string("New end in ISO 8601"),
                    add_meet: Property::boolean("Add a Google Meet video call"),
                    attendees: Property::string_array("Updated attendee emails"),
                },
                &["eventId"],
            ),
        };
        let delete = Function {
            name: String::from("deleteEvent"),
            description: String::from("Delete a Google Calendar event."),
            parameters: object(
                DeleteEventProps {
                    event_id: Property::string("Event ID to delete"),
                },
                &["eventId"],
            ),
        };
        let list = Function {
            name: String::from("listEvents"),
            description: String::from(
                "List or search upcoming calendar events. Use when the user asks about their schedule.",
            ),
            parameters: object(
                ListEventsProps {
                    query: Property::string("Search query"),
                    days_ahead: Property::integer("Days to look ahead (default 30)"),
                },
                &[],
            ),
        };

        vec![
            Tool::function(create),
            Tool::function(update),
            Tool::function(delete),
            Tool::function(list),
        ]
    }
}

/// What the model gets to see of an event
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meet_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            summary: event.summary.clone(),
            start: event.start.clone(),
            end: event.end.clone(),
            location: event.location.clone(),
            description: event
                .description
                .as_ref()
                .map(|d| d.chars().take(DESCRIPTION_PREVIEW_CHARS).collect()),
            meet_link: event.meet_link().map(String::from),
            html_link: event.html_link.clone(),
        }
    }
}

/// Runs calendar tool calls against the calendar of the current
/// session.
pub struct CalendarToolbox {
    client: CalendarClient,
    max_results: u32,
}

impl CalendarToolbox {
    pub fn new(client: CalendarClient) -> Self {
        Self {
            client,
            max_results: TOOL_MAX_RESULTS,
        }
    }

    pub async fn execute(&self, call: CalendarToolCall) -> Result<Value, CalendarError> {
        let result = match call {
            CalendarToolCall::CreateEvent(new_event) => {
                let event = self.client.create_event(new_event).await?;
                json!({"success": true, "event": EventSummary::from(&event)})
            }
            CalendarToolCall::UpdateEvent(UpdateEventArgs { event_id, patch }) => {
                let event = self.client.update_event(&event_id, patch).await?;
                json!({"success": true, "event": EventSummary::from(&event)})
            }
            CalendarToolCall::DeleteEvent(DeleteEventArgs { event_id }) => {
                self.client.delete_event(&event_id).await?;
                json!({"success": true, "deletedId": event_id})
            }
            CalendarToolCall::ListEvents(ListEventsArgs { query, days_ahead }) => {
                let options = ListOptions {
                    query,
                    max_results: self.max_results,
                    days_ahead: days_ahead
                        .map(|days| days.trunc() as i64)
                        .filter(|days| *days > 0)
                        .unwrap_or(DEFAULT_DAYS_AHEAD),
                };
                let events = self.client.list_events(&options, Utc::now()).await?;
                let events: Vec<EventSummary> = events.iter().map(EventSummary::from).collect();
                json!({"events": events})
            }
        };
        Ok(result)
    }
}

#[async_trait]
impl Toolbox for CalendarToolbox {
    fn definitions(&self) -> Vec<Tool> {
        CalendarToolCall::definitions()
    }

    async fn call(&self, name: &str, args: &str) -> Result<Value, Error> {
        let call = CalendarToolCall::parse(name, args)?;
        tracing::debug!("Running calendar tool {:?}", call);
        Ok(self.execute(call).await?)
    }
}
