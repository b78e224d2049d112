//! ollagate — one local model, one user at a time, over Telegram.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ollagate_bot::channels::{TelegramChannel, TelegramConfig};
use ollagate_bot::engines::OllamaEngine;
use ollagate_bot::runtime::GateRuntime;
use ollagate_bot::texts;
use ollagate_core::config::GateConfig;
use ollagate_core::engine::InferenceEngine;
use ollagate_core::idle::IdleTimer;
use ollagate_core::registry::ActiveUserRegistry;
use ollagate_core::session::SessionManager;
use ollagate_core::turn::TurnConfig;

/// ollagate — Telegram gatekeeper for a single local Ollama instance.
#[derive(Parser)]
#[command(name = "ollagate", version, about, long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Telegram bot token (overrides config).
    #[arg(short, long, env = "TELEGRAM_BOT_TOKEN")]
    token: Option<String>,

    /// Ollama base URL (overrides config).
    #[arg(long, env = "OLLAMA_HOST")]
    ollama_host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(GateConfig::default_path);
    let mut config = GateConfig::load(&config_path)?;
    if let Some(token) = cli.token {
        config.telegram.bot_token = token;
    }
    if let Some(host) = cli.ollama_host {
        config.engine.base_url = host;
    }
    if config.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "No Telegram bot token. Set TELEGRAM_BOT_TOKEN or add it to {}.",
            config_path.display()
        );
    }

    let sessions = Arc::new(SessionManager::new());
    let engine = Arc::new(OllamaEngine::new(
        &config.engine.base_url,
        Duration::from_secs(config.engine.chat_timeout_secs),
    ));
    let registry = Arc::new(ActiveUserRegistry::load(&config.registry_path())?);

    let mut channel = TelegramChannel::new(TelegramConfig {
        bot_token: config.telegram.bot_token.clone(),
        poll_timeout: config.telegram.poll_timeout,
    });
    let transport = channel.transport();

    let timer = Arc::new(IdleTimer::new(
        sessions.clone(),
        engine.clone(),
        transport.clone(),
        Duration::from_secs(config.session.idle_timeout_secs),
        texts::INACTIVITY_ENDED.to_string(),
    ));
    let runtime = Arc::new(GateRuntime::new(
        sessions,
        engine.clone(),
        transport,
        timer,
        registry,
        TurnConfig {
            history_window: config.session.history_window,
            chunk_size: config.session.chunk_size,
        },
    ));

    println!("  {} {}", "Mode:".dimmed(), "Telegram bot".green().bold());
    println!("  {} {}", "Engine:".dimmed(), config.engine.base_url.green());
    match engine.ping().await {
        Some(version) => info!("inference engine reachable: {}", version),
        None => warn!(
            "inference engine not responding at {}; continuing anyway",
            config.engine.base_url
        ),
    }
    println!("\n  {}", "Press Ctrl+C to stop".dimmed());

    channel.start(runtime.clone()).await?;
    runtime.startup_notify().await;

    tokio::signal::ctrl_c().await?;
    println!("\n{}", "Shutting down...".yellow());
    channel.stop().await;
    runtime.shutdown_sweep().await;
    println!("{}", "Goodbye!".cyan());

    Ok(())
}
