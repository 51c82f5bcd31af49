//! The core models for managing a stateful chat with an LLM.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::openai::Message;

#[derive(Default)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn push(&mut self, msg: Message) {
        self.0.push(msg)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Incremental updates of an assistant turn sent to the client as it
/// happens. Serialized with a `type` tag e.g.
/// `{"type":"tool-call","toolCallId":"call_1","toolName":"listEvents","input":{}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    TextDelta {
        delta: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: Value,
    },
    Error {
        error_text: String,
    },
    Finish,
}
