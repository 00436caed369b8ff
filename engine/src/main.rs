// Concierge
// Main entry point for the concierge binary

use clap::Parser;
use concierge_engine::cli::{Cli, Command};
use concierge_engine::config::{Config, MemoryBackend};
use concierge_engine::handlers::{
    build_app, handle_ask, handle_chat, handle_memory, handle_status, OutputFormat,
};
use concierge_engine::telemetry::init_telemetry_with_level;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!(
        "Concierge v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    if cli.ephemeral {
        config.memory.backend = MemoryBackend::Memory;
    }

    let session_id = cli
        .session
        .clone()
        .unwrap_or_else(|| config.core.default_session.clone());

    let app = build_app(&config).await?;

    let result = match cli.command {
        Command::Ask { text } => {
            handle_ask(&app.coordinator, &text.join(" "), &session_id, format).await
        }

        Command::Chat => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            handle_chat(&app.coordinator, &session_id, format, stdin, &mut stdout).await
        }

        Command::Memory { action } => {
            handle_memory(&app.coordinator, action, &session_id, format).await
        }

        Command::Status => handle_status(&app.coordinator, format).await,
    };

    app.shutdown().await?;
    result
}
