//! Public types for the assistant API
use serde::Deserialize;

pub use crate::ai::chat::StreamEvent;
use crate::openai::Message;

/// The conversation so far, oldest message first. The server keeps no
/// history of its own so every request carries all of it.
#[derive(Debug, Deserialize)]
pub struct AiRequest {
    pub messages: Vec<Message>,
}
