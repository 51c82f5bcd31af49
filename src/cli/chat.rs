use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::ai::chat::{ChatBuilder, StreamEvent};
use crate::ai::prompt::system_prompt;
use crate::ai::tools::CalendarToolbox;
use crate::core::AppConfig;
use crate::google::CalendarClient;
use crate::openai::{Message, Role};

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::TextDelta { delta } => {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        StreamEvent::ToolCall {
            tool_name, input, ..
        } => println!("[{}] {}", tool_name, input),
        StreamEvent::ToolResult { output, .. } => println!("[result] {}", output),
        StreamEvent::Error { error_text } => eprintln!("Error: {}", error_text),
        StreamEvent::Finish => println!(),
    }
}

pub async fn run(access_token: &str, stream: bool) -> Result<()> {
    let config = AppConfig::default();
    let mut rl = DefaultEditor::new()?;

    let toolbox = CalendarToolbox::new(CalendarClient::from_config(
        reqwest::Client::new(),
        &config,
        access_token,
    ));
    let now = Utc::now().with_timezone(&config.time_zone);
    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();
    let mut builder = ChatBuilder::new(
        &config.openai_api_hostname,
        &config.openai_api_key,
        &config.openai_model,
    )
    .transcript(vec![Message::new(Role::System, &system_prompt(now)?)])
    .toolbox(Box::new(toolbox));
    if stream {
        builder = builder.streaming(tx);
    }
    let mut chat = builder.build();

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                // Print the response as it streams in
                let turn = chat.next_msg(Message::new(Role::User, &line));
                tokio::pin!(turn);
                let result = loop {
                    tokio::select! {
                        result = &mut turn => break result,
                        Some(event) = rx.recv() => print_event(&event),
                    }
                };
                while let Ok(event) = rx.try_recv() {
                    print_event(&event);
                }
                match result {
                    Ok(_) if stream => println!(),
                    Ok(messages) => {
                        if let Some(reply) = messages.last().and_then(|m| m.content.as_deref()) {
                            println!("{}", reply);
                        }
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
