//! Reusable prompts using Handlebars for templating. Handlebars adds
//! additional security controls since it can't do much out of the box
//! without registering your own helpers.

use std::fmt;

use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use handlebars::{Handlebars, TemplateError};
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    CalendarAssistant,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const CALENDAR_ASSISTANT_PROMPT: &str = r#"You are the assistant of Quickal, a smart calendar app.
You help manage Google Calendar using natural language (Spanish or English). Answer in the language the user writes in.

Today: {{date}} ({{iso_date}}). Time: {{time}}. Time zone: {{time_zone}}.

Rules:
- Extract as much information as possible from the user's message.
- If the date or time is missing, ask for it instead of guessing.
- Use ISO 8601 for dates. If the user says "tomorrow", "on Monday", "next week", etc., calculate the date from today's date.
- Only use addMeet: true when the user asks for a video call or Google Meet.
- To update or delete an event you need its ID. List the events first if you don't have it.
- Be concise. Confirm each action with a brief summary.
- If the user only says hello, answer briefly and ask what they need help with."#;

pub fn templates<'a>() -> Result<Handlebars<'a>, TemplateError> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_template_string(
        &Prompt::CalendarAssistant.to_string(),
        CALENDAR_ASSISTANT_PROMPT,
    )?;
    Ok(registry)
}

/// Builds the assistant's system prompt for the moment `now`. The
/// caller supplies the time so relative dates like "tomorrow" are
/// resolved against a known reference.
pub fn system_prompt(now: DateTime<Tz>) -> Result<String> {
    let context = json!({
        "date": now.format("%A, %B %-d, %Y").to_string(),
        "iso_date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M").to_string(),
        "time_zone": now.timezone().name(),
    });
    let prompt = templates()?.render(&Prompt::CalendarAssistant.to_string(), &context)?;
    Ok(prompt)
}
