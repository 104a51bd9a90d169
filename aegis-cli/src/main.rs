//! Aegis Command Line Interface
//!
//! Usage:
//!   aegis start                    - Start the firewall proxy
//!   aegis status                   - Probe a running firewall
//!   aegis policy <user> <agent>    - Inspect one policy
//!   aegis anchor                   - Trigger a one-shot anchor iteration

use clap::{Parser, Subcommand};
use std::time::Duration;

use aegis_anchor::spawn_runner;
use aegis_core::config::FirewallConfig;
use aegis_gateway::{run_server, AppState};

#[derive(Parser)]
#[command(name = "aegis")]
#[command(about = "Economic firewall proxy for autonomous agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the firewall (configuration from AEGIS_* environment)
    Start,

    /// Show firewall health and metrics
    Status {
        /// Running firewall base URL
        #[arg(short, long, default_value = "http://localhost:8547")]
        api_url: String,
    },

    /// Inspect the policy and ledger state for one (user, agent) pair
    Policy {
        /// User address
        user: String,
        /// Agent address
        agent: String,
        /// Running firewall base URL
        #[arg(short, long, default_value = "http://localhost:8547")]
        api_url: String,
    },

    /// Run one anchor iteration on a running firewall
    Anchor {
        /// Running firewall base URL
        #[arg(short, long, default_value = "http://localhost:8547")]
        api_url: String,
        /// Bearer token (defaults to AEGIS_ANCHOR_SECRET)
        #[arg(short, long)]
        secret: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match cli.command {
        Commands::Start => start_firewall().await,

        Commands::Status { api_url } => {
            let client = reqwest::Client::new();
            let health: serde_json::Value = client
                .get(format!("{api_url}/health"))
                .send()
                .await?
                .json()
                .await?;
            let metrics: serde_json::Value = client
                .get(format!("{api_url}/metrics"))
                .send()
                .await?
                .json()
                .await?;

            println!("Health:  {}", serde_json::to_string_pretty(&health)?);
            println!("Metrics: {}", serde_json::to_string_pretty(&metrics)?);
            Ok(())
        }

        Commands::Policy {
            user,
            agent,
            api_url,
        } => {
            let client = reqwest::Client::new();
            let response = client
                .get(format!("{api_url}/policy/{user}/{agent}"))
                .send()
                .await?;
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }

        Commands::Anchor { api_url, secret } => {
            let secret = secret
                .or_else(|| std::env::var("AEGIS_ANCHOR_SECRET").ok())
                .ok_or("no anchor secret: pass --secret or set AEGIS_ANCHOR_SECRET")?;

            let client = reqwest::Client::new();
            let response = client
                .post(format!("{api_url}/anchor/run"))
                .bearer_auth(secret)
                .send()
                .await?;

            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            if status.is_success() {
                println!("{}", serde_json::to_string_pretty(&body)?);
                Ok(())
            } else {
                Err(format!("anchor trigger failed ({status}): {body}").into())
            }
        }
    }
}

async fn start_firewall() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = FirewallConfig::from_env()?;
    let epoch = Duration::from_secs(config.anchor_epoch_seconds);

    let state = AppState::from_config(config)?;

    // The worker exists only when a facilitator key is configured;
    // without one the proxy still admits and queues, and anchoring is
    // deferred to an instance that holds the key.
    let runner = state
        .worker
        .clone()
        .map(|worker| spawn_runner(worker, epoch));
    if runner.is_none() {
        tracing::warn!("no facilitator key configured; anchoring disabled on this instance");
    }

    run_server(state, shutdown_signal()).await?;

    // The server has drained; wind the worker down too.
    if let Some(runner) = runner {
        runner.stop().await;
    }

    tracing::info!("aegis firewall stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
