//! Fusion command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use fusion_agent::{extract_final_answer, AgentLoop, ToolRegistry};
use fusion_config::{self, Config, LlmSettings};
use fusion_provider::{LlmRegistry, OllamaProvider};
use fusion_swarm::SwarmCoordinator;

use crate::server::{self, AppState};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Initialize config and data directory
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing Fusion...");
    println!("{}", RULE);

    let config = fusion_config::init().await?;
    let settings = config.default_llm()?;

    println!("Config:   {}", fusion_config::config_path().display());
    println!("Data dir: {}", fusion_config::data_dir().display());
    println!("\n◆ Fusion initialized");
    println!("\nNext steps:");
    println!("  1. Pull the default model: ollama pull {}", settings.model);
    println!("  2. Check the endpoint:     fusion check");
    println!("  3. Ask something:          fusion run -m \"What is 2+2?\"");

    Ok(())
}

/// Probe the default endpoint
pub async fn check_command() -> Result<()> {
    let config = Config::load().await?;
    let settings = config.default_llm()?;

    println!("◆ Endpoint Status");
    println!("{}", RULE);
    println!("Endpoint: {} ({})", settings.base_url, settings.api_type);
    println!("Model:    {}", settings.model);

    if !settings.is_ollama() {
        println!("Status:   [Skipped] only ollama endpoints can be probed");
        return Ok(());
    }

    let provider = OllamaProvider::from_settings(settings);
    match provider.list_models().await {
        Ok(models) => {
            println!("Models:   {}", models.len());
            for model in &models {
                println!("  - {} ({:.1} GB)", model.name, model.size as f64 / 1e9);
            }
        }
        Err(e) => {
            println!("Status:   [NOT REACHABLE]");
            anyhow::bail!("Endpoint {} not reachable: {}", settings.base_url, e);
        }
    }

    if provider.ping(&settings.model).await {
        println!("Status:   [OK]");
        Ok(())
    } else {
        println!("Status:   [MODEL NOT RESPONDING]");
        anyhow::bail!("Model {} is not responding", settings.model)
    }
}

/// Startup probe shared by `run` and `serve`; other endpoint types are trusted
pub async fn endpoint_ready(settings: &LlmSettings) -> bool {
    if !settings.is_ollama() {
        return true;
    }

    info!("Checking Ollama connection...");
    let provider = OllamaProvider::from_settings(settings);
    match provider.list_models().await {
        Ok(models) if !models.is_empty() => {}
        Ok(_) | Err(_) => {
            warn!("No Ollama models found. Make sure Ollama is running and models are pulled.");
            info!("You can pull models with: ollama pull {}", settings.model);
            return false;
        }
    }

    if !provider.ping(&settings.model).await {
        warn!(
            "Could not connect to Ollama with model {}. Check if Ollama is running.",
            settings.model
        );
        return false;
    }

    info!("Successfully connected to Ollama using {}", settings.model);
    true
}

fn read_prompt() -> Result<String> {
    print!("Enter your prompt: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn print_banner(title: &str, body: &str) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("{:^60}", title);
    println!("{}", rule);
    println!("{}", body);
    println!("{}\n", rule);
}

/// Answer one question with the think/act agent
pub async fn run_command(
    message: Option<String>,
    tool_choice: Option<String>,
    max_steps: Option<usize>,
) -> Result<()> {
    let mut config = Config::load().await?;
    if let Some(tool_choice) = tool_choice {
        config.agent.tool_choice = tool_choice;
    }
    if let Some(max_steps) = max_steps {
        config.agent.max_steps = max_steps;
    }

    let registry = LlmRegistry::ollama(&config);
    let llm = registry.default_llm()?;
    let mut agent = AgentLoop::new(llm.clone(), llm, ToolRegistry::with_defaults())
        .with_settings(&config.agent)
        .context("Invalid agent settings")?;

    let prompt = match message {
        Some(message) => message.trim().to_string(),
        None => read_prompt()?,
    };
    if prompt.is_empty() {
        warn!("Empty prompt provided.");
        return Ok(());
    }

    if !endpoint_ready(config.default_llm()?).await {
        return Ok(());
    }

    info!("Processing your request...");
    tokio::select! {
        result = agent.run(&prompt) => {
            match extract_final_answer(&result) {
                Some(answer) => print_banner("FINAL ANSWER", answer),
                None => println!("\nResult: {}", result),
            }
            info!("Request processing completed.");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Operation interrupted.");
        }
    }

    Ok(())
}

/// Answer one question with the multi-agent pipeline
pub async fn swarm_command(message: String) -> Result<()> {
    let query = message.trim();
    if query.is_empty() {
        warn!("Empty prompt provided.");
        return Ok(());
    }

    let config = Config::load().await?;
    let registry = LlmRegistry::ollama(&config);
    let mut coordinator = SwarmCoordinator::from_settings(registry.default_llm()?, &config.swarm);

    tokio::select! {
        answer = coordinator.process_query(query) => print_banner("FINAL ANSWER", &answer),
        _ = tokio::signal::ctrl_c() => warn!("Operation interrupted."),
    }

    Ok(())
}

/// Start the REST server
pub async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = Config::load().await?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let ready = endpoint_ready(config.default_llm()?).await;
    if ready {
        info!("Agent initialized and server is ready to process requests");
    }

    let state = Arc::new(AppState::new(
        LlmRegistry::ollama(&config),
        config.agent.clone(),
        ready,
    ));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("◆ Fusion server listening on http://{}", addr);
    println!("Press Ctrl+C to stop");

    axum::serve(listener, server::build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("◆ Shutdown signal received");
        })
        .await?;

    println!("◆ Server shutdown complete");
    Ok(())
}
