//! # PDV Agent
//!
//! Headless host for the sync layer of one PDV terminal.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           pdv-agent                                     │
//! │                                                                         │
//! │   stdin (JSON lines) ──► SyncCommand ──► SyncAgentHandle                │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                   SyncAgent ──► SyncEngine ──► backend  │
//! │                                              │                          │
//! │   stdout (JSON lines) ◄── SyncEvent ◄────────┘                          │
//! │   stderr              ◄── tracing                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Startup Sequence
//! 1. Initialize tracing (stderr)
//! 2. Load `SyncConfig` (file at `PDV_CONFIG` or the default path, then env)
//! 3. Open the local store and run migrations
//! 4. Sign in with `PDV_EMAIL`/`PDV_PASSWORD` when no session is stored
//! 5. Spawn the sync agent (starts at once in `auto` mode)
//! 6. Relay commands until Ctrl+C or a `SHUTDOWN` command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pdv_db::{Database, DbConfig};
use pdv_sync::{
    Connectivity, SyncAgent, SyncAgentHandle, SyncCommand, SyncConfig, SyncEngine, SyncEvent,
    SyncEventEmitter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var_os("PDV_CONFIG").map(PathBuf::from);
    let config = SyncConfig::load(config_path).context("loading sync configuration")?;
    info!(
        base_url = %config.api.base_url,
        mode = ?config.mode(),
        interval_secs = config.sync.interval_secs,
        "Configuration loaded"
    );

    let db_path = config.database_path();
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening local store at {}", db_path.display()))?;
    info!(path = %db_path.display(), "Local store ready");

    let engine = SyncEngine::from_config(db.clone(), &config, Connectivity::default())
        .context("building sync engine")?;
    sign_in_from_env(&engine).await?;

    let agent = SyncAgent::spawn_with_emitter(engine, &config, Arc::new(StdoutEmitter));
    relay_commands(&agent).await;

    agent.shutdown().await.context("stopping sync agent")?;
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pdv=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn sign_in_from_env(engine: &SyncEngine) -> anyhow::Result<()> {
    let gateway = engine.gateway();
    if gateway.is_authenticated().await? {
        return Ok(());
    }

    let (Ok(email), Ok(password)) = (std::env::var("PDV_EMAIL"), std::env::var("PDV_PASSWORD")) else {
        warn!("No stored session and no PDV_EMAIL/PDV_PASSWORD, sync will fail until sign-in");
        return Ok(());
    };

    match gateway.authenticate(&email, &password).await {
        Ok(_) => info!(%email, "Signed in"),
        Err(e) if e.is_offline() => warn!("Offline, sign-in postponed"),
        Err(e) => return Err(e).context("signing in"),
    }
    Ok(())
}

/// Forwards stdin commands to the agent until Ctrl+C or `SHUTDOWN`.
async fn relay_commands(agent: &SyncAgentHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                return;
            }

            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<SyncCommand>(&line) {
                    Ok(SyncCommand::Shutdown) => return,
                    Ok(command) => {
                        if let Err(e) = agent.send(command).await {
                            error!(error = %e, "Sync agent is gone");
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, %line, "Ignoring unknown command"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Command input failed, ignoring stdin");
                    stdin_open = false;
                }
            },
        }
    }
}

/// Writes every event to stdout as one JSON line.
struct StdoutEmitter;

impl SyncEventEmitter for StdoutEmitter {
    fn emit(&self, event: &SyncEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!(error = %e, "Failed to encode sync event"),
        }
    }
}
