//! Fusion - a tool-using agent over plain text-completion endpoints

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod server;

use commands::{check_command, init_command, run_command, serve_command, swarm_command};

/// Fusion - agent for text-only completion endpoints
#[derive(Parser)]
#[command(name = "fusion")]
#[command(about = "◆ A tool-using agent for text-only completion endpoints")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and data directory
    Init,
    /// Check that the completion endpoint is reachable
    Check,
    /// Answer one question with the think/act agent
    Run {
        /// Question to answer (prompted for when absent)
        #[arg(short, long)]
        message: Option<String>,
        /// Tool choice: none, auto or required
        #[arg(long)]
        tool_choice: Option<String>,
        /// Maximum think/act steps
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Answer one question with the multi-agent pipeline
    Swarm {
        /// Question to answer
        #[arg(short, long)]
        message: String,
    },
    /// Start the REST server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Check => check_command().await,
        Commands::Run {
            message,
            tool_choice,
            max_steps,
        } => run_command(message, tool_choice, max_steps).await,
        Commands::Swarm { message } => swarm_command(message).await,
        Commands::Serve { host, port } => serve_command(host, port).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
