use anyhow::Result;
use clap::{Parser, Subcommand};
use gemchat_core::llm::MockProvider;
use gemchat_core::state::ChatState;
use gemchat_core::telemetry;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Gemchat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the Gemchat core logic.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let state = ChatState::new(Arc::new(MockProvider::echo()));
    state.initialize()?;

    runtime.block_on(state.submit("ping from xtask"))?;
    let snapshot = state.snapshot();
    for message in &snapshot.messages {
        info!(author = ?message.author, content = %message.content, "message");
    }
    info!(
        messages = snapshot.messages.len(),
        busy = snapshot.status.busy,
        "smoke test conversation complete"
    );

    Ok(())
}
