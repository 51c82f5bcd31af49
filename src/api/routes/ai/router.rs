//! Router for the calendar assistant. Responses are streamed as
//! server-sent events, each carrying a JSON `StreamEvent`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::public::{self, StreamEvent};
use crate::ai::chat::ChatBuilder;
use crate::ai::prompt::system_prompt;
use crate::ai::tools::CalendarToolbox;
use crate::api::Session;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::api::utils::DetectDisconnect;
use crate::google::CalendarClient;
use crate::openai::{Message, Role};

type SharedState = Arc<RwLock<AppState>>;

/// The system prompt always comes from the server so any system
/// messages sent by the client are dropped.
fn with_system_prompt(prompt: &str, messages: Vec<Message>) -> Vec<Message> {
    let mut transcript = vec![Message::new(Role::System, prompt)];
    transcript.extend(messages.into_iter().filter(|msg| msg.role != Role::System));
    transcript
}

/// Respond to the latest message in the conversation and stream the
/// response
async fn ai_handler(
    State(state): State<SharedState>,
    session: Session,
    Json(payload): Json<public::AiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (config, http) = {
        let shared_state = state
            .read()
            .map_err(|_| anyhow!("Unable to read shared state"))?;
        (shared_state.config.clone(), shared_state.http.clone())
    };

    let now = Utc::now().with_timezone(&config.time_zone);
    let transcript = with_system_prompt(&system_prompt(now)?, payload.messages);

    let toolbox = CalendarToolbox::new(CalendarClient::from_config(
        http,
        &config,
        &session.access_token,
    ));

    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    let sse_stream = UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    let (disconnect_notifier, mut disconnect_receiver) = broadcast::channel::<()>(1);
    let wrapped_sse_stream = DetectDisconnect::new(sse_stream, disconnect_notifier);

    let mut chat = ChatBuilder::new(
        &config.openai_api_hostname,
        &config.openai_api_key,
        &config.openai_model,
    )
    .transcript(transcript)
    .streaming(tx.clone())
    .toolbox(Box::new(toolbox))
    .build();
    let max_duration = config.ai_max_duration;

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::time::timeout(max_duration, chat.respond()) => {
                let last_event = match result {
                    Ok(Ok(_)) => StreamEvent::Finish,
                    Ok(Err(e)) => {
                        tracing::error!("Assistant error: {}. Root cause: {}", e, e.root_cause());
                        StreamEvent::Error {
                            error_text: format!("Something went wrong: {}", e),
                        }
                    }
                    Err(_) => {
                        tracing::warn!("Assistant response exceeded {:?}", max_duration);
                        StreamEvent::Error {
                            error_text: String::from("The assistant took too long to respond"),
                        }
                    }
                };
                let _ = tx.send(last_event);
            }
            // Anything already written to the calendar stays written
            _ = disconnect_receiver.recv() => {
                tracing::debug!("Client disconnected, abandoning the response");
            }
        }
    });

    let resp = Sse::new(wrapped_sse_stream)
        .keep_alive(
            KeepAlive::default()
                .text("keep-alive")
                .interval(Duration::from_secs(15)),
        )
        .into_response();

    Ok(resp)
}

/// Create the assistant router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(ai_handler))
}
