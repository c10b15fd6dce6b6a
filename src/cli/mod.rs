//! Command-line interface for waprovision.

mod doctor;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::auth::StaticTokenAuthenticator;
use crate::config::Config;
use crate::credentials::lookup_from_config;
use crate::db::{ConnectionStore, CredentialStore, Database};
use crate::gateway::HttpGatewayFactory;
use crate::provisioning::{ConnectOrchestrator, ConnectRequest};
use crate::server::{ServerState, start_server};

pub use self::doctor::run_doctor_command;

#[derive(Parser, Debug)]
#[command(
    name = "waprovision",
    version,
    about = "Provision and authenticate messaging gateway sessions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    /// TOML config file (defaults to ~/.waprovision/config.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API.
    Serve,
    /// Apply the database schema and exit.
    Migrate,
    /// Run one connect flow and print the JSON envelope.
    Connect {
        /// Bearer token identifying the tenant.
        #[arg(long, env = "WAPROVISION_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long)]
        session_name: String,
        #[arg(long)]
        phone_number: Option<String>,
    },
    /// Check configuration, database and gateway reachability.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },
}

/// Wire the orchestrator from resolved config and an open database.
pub fn build_orchestrator(
    config: &Config,
    db: Arc<dyn Database>,
) -> crate::Result<ConnectOrchestrator> {
    let credential_store: Arc<dyn CredentialStore> = db.clone();
    let connection_store: Arc<dyn ConnectionStore> = db;

    if config.http.api_tokens.is_empty() {
        tracing::warn!("API_TOKENS is empty; every connect request will be rejected");
    }

    Ok(ConnectOrchestrator::new(
        Arc::new(StaticTokenAuthenticator::new(config.http.api_tokens.clone())),
        lookup_from_config(&config.gateway, credential_store),
        Arc::new(HttpGatewayFactory::new(config.gateway.request_timeout)?),
        connection_store,
        config.polling,
    ))
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Doctor { strict } = cli.command {
        return run_doctor_command(cli.config.as_deref(), strict).await;
    }

    let config = Config::from_env_with_toml(cli.config.as_deref())?;
    let db = crate::db::connect_from_config(&config.database).await?;

    match cli.command {
        Command::Migrate => {
            println!("Migrations applied ({:?} backend)", config.database.backend);
            Ok(())
        }
        Command::Serve => serve(&config, db).await,
        Command::Connect {
            token,
            session_name,
            phone_number,
        } => {
            let orchestrator = build_orchestrator(&config, db)?;
            let response = orchestrator
                .connect(
                    Some(&token),
                    ConnectRequest {
                        session_name,
                        phone_number,
                    },
                )
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                anyhow::bail!("connect failed (HTTP {})", response.http_status());
            }
            Ok(())
        }
        Command::Doctor { .. } => Ok(()),
    }
}

async fn serve(config: &Config, db: Arc<dyn Database>) -> anyhow::Result<()> {
    let orchestrator = Arc::new(build_orchestrator(config, db)?);
    let state = Arc::new(ServerState::new(orchestrator));

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid HTTP_HOST/HTTP_PORT: {e}"))?;
    start_server(addr, state.clone()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    state.shutdown().await;
    Ok(())
}
