use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod serve;

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Manage the calendar by chatting with the assistant
    Chat {
        /// Google OAuth access token with calendar access
        #[arg(long)]
        access_token: String,

        /// Print each reply once it's complete instead of streaming it
        #[arg(long, action, default_value = "false")]
        no_stream: bool,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port).await?;
        }
        Some(Command::Chat {
            access_token,
            no_stream,
        }) => {
            chat::run(&access_token, !no_stream).await?;
        }
        None => {}
    }

    Ok(())
}
