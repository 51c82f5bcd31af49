use anyhow::Result;
use quickal::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
