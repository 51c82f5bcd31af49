use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "tool")]
    Tool,
}

// Object {
//     "content": Null,
//     "role": String("assistant"),
//     "tool_calls": Array [
//         Object {
//             "function": Object {
//                 "arguments": String("{\"eventId\":\"abc123\"}"),
//                 "name": String("deleteEvent")
//             },
//             "id": String("call_KCg5V0N5E7hHHrUwdefHBfgL"),
//             "type": String("function")
//         }
//     ]
// }
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCallFn {
    pub arguments: String,
    pub name: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCall {
    pub function: FunctionCallFn,
    pub id: String,
    pub r#type: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<FunctionCall>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
    pub fn new_tool_call_request(tool_calls: Vec<FunctionCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
    pub fn new_tool_call_response(content: &str, tool_call_id: &str) -> Self {
        Message {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }
    pub fn tool_calls(&self) -> &[FunctionCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

#[derive(Serialize, Debug)]
pub struct PropertyItems {
    pub r#type: String,
}

#[derive(Serialize, Debug)]
pub struct Property {
    pub r#type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<PropertyItems>,
}

impl Property {
    fn of_type(r#type: &str, description: &str) -> Self {
        Self {
            r#type: r#type.to_string(),
            description: description.to_string(),
            items: None,
        }
    }
    pub fn string(description: &str) -> Self {
        Self::of_type("string", description)
    }
    pub fn boolean(description: &str) -> Self {
        Self::of_type("boolean", description)
    }
    pub fn integer(description: &str) -> Self {
        Self::of_type("integer", description)
    }
    pub fn string_array(description: &str) -> Self {
        Self {
            items: Some(PropertyItems {
                r#type: String::from("string"),
            }),
            ..Self::of_type("array", description)
        }
    }
}

#[derive(Serialize)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Serialize)]
pub struct Function<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// A tool definition as sent in the `tools` field of a completion
/// request. Each tool has its own properties type so the function is
/// stored already serialized.
#[derive(Serialize, Debug, Clone)]
pub struct Tool {
    pub r#type: ToolType,
    pub function: Value,
}

impl Tool {
    pub fn function<Props: Serialize>(function: Function<Props>) -> Self {
        Self {
            r#type: ToolType::Function,
            function: json!(function),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.function["name"].as_str()
    }
}

/// A set of tools the model can call. Implementors decide how a tool
/// name and its JSON arguments map to an action.
#[async_trait]
pub trait Toolbox: Send + Sync {
    fn definitions(&self) -> Vec<Tool>;
    async fn call(&self, name: &str, args: &str) -> Result<Value, Error>;
}

pub type BoxedToolbox = Box<dyn Toolbox + Send + Sync + 'static>;

/// The assistant's reply for one completion request. Either content,
/// tool calls to run before the next completion, or both.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<FunctionCall>,
}

fn payload(messages: &[Message], tools: &[Tool], model: &str, stream: bool) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": messages,
    });
    if stream {
        payload["stream"] = json!(true);
    }
    if !tools.is_empty() {
        payload["tools"] = json!(tools);
    }
    payload
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<FunctionCall>>,
}

pub async fn completion(
    messages: &[Message],
    tools: &[Tool],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Completion, Error> {
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response: CompletionResponse = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload(messages, tools, model, false))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or(anyhow!("Completion response has no choices"))?
        .message;

    Ok(Completion {
        content: message.content,
        tool_calls: message.tool_calls.unwrap_or_default(),
    })
}

// Tool calls are streamed as an initial chunk with the ID and name
// followed by chunks that only carry more of the arguments.
#[derive(Debug, Deserialize)]
struct ToolCallChunk {
    index: usize,
    id: Option<String>,
    function: Option<FunctionChunk>,
}

#[derive(Debug, Deserialize)]
struct FunctionChunk {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<ToolCallChunk>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Accumulates streamed tool call chunks keyed by index so calls come
/// out in the order the model emitted them.
#[derive(Default)]
struct ToolCallBuffer(BTreeMap<usize, FunctionCall>);

impl ToolCallBuffer {
    fn push(&mut self, chunk: &ToolCallChunk) {
        let call = self.0.entry(chunk.index).or_insert_with(|| FunctionCall {
            function: FunctionCallFn {
                arguments: String::new(),
                name: String::new(),
            },
            id: String::new(),
            r#type: String::from("function"),
        });
        if let Some(id) = &chunk.id {
            call.id = id.clone();
        }
        if let Some(function) = &chunk.function {
            if let Some(name) = &function.name {
                call.function.name += name;
            }
            if let Some(arguments) = &function.arguments {
                call.function.arguments += arguments;
            }
        }
    }

    fn into_calls(self) -> Vec<FunctionCall> {
        self.0.into_values().collect()
    }
}

// Removes the first complete SSE event from `buffer`, without its
// separator. Events end with a blank line using either LF or CRLF.
fn next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (end, separator_len) = [&b"\r\n\r\n"[..], &b"\n\n"[..]]
        .into_iter()
        .filter_map(|separator| {
            buffer
                .windows(separator.len())
                .position(|window| window == separator)
                .map(|pos| (pos, separator.len()))
        })
        .min_by_key(|(pos, _)| *pos)?;
    let mut event: Vec<u8> = buffer.drain(..end + separator_len).collect();
    event.truncate(end);
    Some(event)
}

/// Requests a streamed completion. Each piece of content is passed to
/// `on_delta` as soon as it arrives and the full reply is returned
/// once the stream ends.
pub async fn completion_stream<F>(
    mut on_delta: F,
    messages: &[Message],
    tools: &[Tool],
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Completion, Error>
where
    F: FnMut(&str) + Send,
{
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload(messages, tools, model, true))
        .send()
        .await?
        .error_for_status()?;

    let mut stream = response.bytes_stream();

    let mut content_buf = String::new();
    let mut reasoning_buf = String::new();
    let mut tool_calls = ToolCallBuffer::default();
    let mut buffer: Vec<u8> = Vec::new();

    'outer: while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // Bytes are buffered until an event is complete. A chunk can end
        // in the middle of an SSE event or of a multi-byte character.
        buffer.extend_from_slice(&chunk);

        // Process all complete SSE events from the buffer
        while let Some(event) = next_sse_event(&mut buffer) {
            let event_data = std::str::from_utf8(&event)?;

            let Some(data) = event_data.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                break 'outer;
            }

            let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
                tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
            })?;
            // The final usage chunk has no choices
            let Some(choice) = chunk.choices.first() else {
                continue;
            };

            if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
                content_buf += content;
                on_delta(content);
            }
            if let Some(reasoning) = &choice.delta.reasoning {
                reasoning_buf += reasoning;
            }
            for tool_call_chunk in choice.delta.tool_calls.iter().flatten() {
                tool_calls.push(tool_call_chunk);
            }
            if choice.finish_reason.is_some() {
                break 'outer;
            }
        }
    }

    if !reasoning_buf.is_empty() {
        tracing::debug!("Model reasoning: {}", reasoning_buf);
    }

    Ok(Completion {
        content: (!content_buf.is_empty()).then_some(content_buf),
        tool_calls: tool_calls.into_calls(),
    })
}
