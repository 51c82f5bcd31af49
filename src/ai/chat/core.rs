use anyhow::{Error, Result, anyhow, bail};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::models::{StreamEvent, Transcript};
use crate::openai::{
    BoxedToolbox, Completion, FunctionCall, Message, Role, Tool, completion, completion_stream,
};

/// Upper bound on completion requests in a single turn so a model that
/// keeps calling tools can't loop forever.
const MAX_TOOL_ROUNDS: usize = 8;

/// The core abstraction around interacting with an LLM in a chat
/// completion style using an OpenAI compatible API.
///
/// Supports the following features:
/// - Streaming
/// - Tool calling, one call at a time in the order the model emits them
///
/// Use `ChatBuilder` to construct a valid `Chat`.
pub struct Chat {
    api_hostname: String,
    api_key: String,
    model: String,
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
    toolbox: Option<BoxedToolbox>,
    transcript: Transcript,
}

impl Chat {
    fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.tx {
            // The receiver going away is handled by `is_cancelled`
            let _ = tx.send(event);
        }
    }

    // A streaming chat is abandoned once nobody is listening anymore
    fn is_cancelled(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Runs a single tool call. Failures are folded into the result so
    /// the model can tell the user what went wrong.
    async fn run_tool_call(toolbox: Option<&BoxedToolbox>, call: &FunctionCall) -> Value {
        let name = &call.function.name;
        let args = &call.function.arguments;
        tracing::debug!("\nTool call: {}\nargs: {}", name, args);

        let result = match toolbox {
            Some(toolbox) => toolbox.call(name, args).await,
            None => Err(anyhow!(
                "Received tool call {} but no tools were specified",
                name
            )),
        };
        match result {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!("Tool call {} failed: {}", name, err);
                json!({"success": false, "error": err.to_string()})
            }
        }
    }

    async fn complete(&self, tools: &[Tool]) -> Result<Completion, Error> {
        let messages = self.transcript.messages();
        match &self.tx {
            Some(tx) => {
                let on_delta = |delta: &str| {
                    let _ = tx.send(StreamEvent::TextDelta {
                        delta: delta.to_string(),
                    });
                };
                completion_stream(
                    on_delta,
                    messages,
                    tools,
                    &self.api_hostname,
                    &self.api_key,
                    &self.model,
                )
                .await
            }
            None => {
                completion(
                    messages,
                    tools,
                    &self.api_hostname,
                    &self.api_key,
                    &self.model,
                )
                .await
            }
        }
    }

    /// Runs the next turn in chat by adding `msg` to the transcript and
    /// getting the next response. Can return multiple messages when
    /// there are tool calls.
    pub async fn next_msg(&mut self, msg: Message) -> Result<Vec<Message>, Error> {
        self.transcript.push(msg);
        self.respond().await
    }

    /// Gets the assistant's response to the transcript as it is. Tool
    /// calls are run and their results fed back to the model until it
    /// replies with content. Returns the new messages, which are also
    /// added to the transcript.
    pub async fn respond(&mut self) -> Result<Vec<Message>, Error> {
        let tools = self
            .toolbox
            .as_ref()
            .map(|toolbox| toolbox.definitions())
            .unwrap_or_default();
        let start = self.transcript.len();

        for _ in 0..MAX_TOOL_ROUNDS {
            let Completion {
                content,
                tool_calls,
            } = self.complete(&tools).await?;

            if tool_calls.is_empty() {
                self.transcript.push(Message::new(
                    Role::Assistant,
                    &content.unwrap_or_default(),
                ));
                return Ok(self.transcript.messages()[start..].to_vec());
            }

            if self.is_cancelled() {
                bail!("Chat cancelled, the client went away");
            }

            self.transcript
                .push(Message::new_tool_call_request(tool_calls.clone()));

            for call in tool_calls.iter() {
                let input = if call.function.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| Value::String(call.function.arguments.clone()))
                };
                self.emit(StreamEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    input,
                });

                let output = Self::run_tool_call(self.toolbox.as_ref(), call).await;

                self.emit(StreamEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    output: output.clone(),
                });
                self.transcript
                    .push(Message::new_tool_call_response(&output.to_string(), &call.id));

                if self.is_cancelled() {
                    bail!("Chat cancelled, the client went away");
                }
            }
        }

        bail!("No reply from the model after {} rounds of tool calls", MAX_TOOL_ROUNDS)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

#[derive(Default)]
pub struct ChatBuilder {
    api_hostname: String,
    api_key: String,
    model: String,
    toolbox: Option<BoxedToolbox>,
    transcript: Transcript,
    tx: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl ChatBuilder {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn build(self) -> Chat {
        Chat {
            api_hostname: self.api_hostname,
            api_key: self.api_key,
            model: self.model,
            tx: self.tx,
            toolbox: self.toolbox,
            transcript: self.transcript,
        }
    }

    pub fn transcript(mut self, messages: Vec<Message>) -> Self {
        self.transcript = Transcript::new_with_messages(messages);
        self
    }

    /// Streams the response as `StreamEvent`s to `transmitter`.
    pub fn streaming(mut self, transmitter: mpsc::UnboundedSender<StreamEvent>) -> Self {
        self.tx = Some(transmitter);
        self
    }

    pub fn toolbox(mut self, toolbox: BoxedToolbox) -> Self {
        self.toolbox = Some(toolbox);
        self
    }
}
