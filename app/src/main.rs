use clap::Parser;
use eframe::egui;
use gemchat::{GemchatEguiApp, ThemeMode};
use gemchat_core::config::AiRuntimeSettings;
use gemchat_core::llm::provider_from_settings;
use gemchat_core::state::ChatState;
use gemchat_core::telemetry;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "Gemchat", version, about = "Chat with Gemini from a desktop window")]
struct Cli {
    /// Answer from the built-in mock provider instead of Gemini.
    #[arg(long)]
    mock: bool,
    #[arg(long, value_enum, default_value_t = ThemeMode::Dark)]
    theme: ThemeMode,
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(EnvFilter::from_default_env())?;

    let cli = Cli::parse();
    let settings = if cli.mock {
        Ok(AiRuntimeSettings::mock())
    } else {
        AiRuntimeSettings::load()
    };
    let state = ChatState::new(provider_from_settings(settings));
    if let Err(err) = state.initialize() {
        tracing::warn!(%err, "starting without a chat session");
    }

    let runtime = Arc::new(Runtime::new()?);
    let theme = cli.theme;
    tracing::info!(theme = theme.label(), "opening chat window");

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(egui::vec2(900.0, 720.0))
            .with_min_inner_size(egui::vec2(480.0, 360.0)),
        default_theme: theme.fallback_theme(),
        ..Default::default()
    };

    eframe::run_native(
        "Gemini Code Assistant",
        native_options,
        Box::new(move |_cc| Box::new(GemchatEguiApp::new(state, runtime, theme))),
    )
    .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    Ok(())
}
