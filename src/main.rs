//! topicd - horizontally scalable instant-messaging server.
//!
//! Each node runs a `Hub` of topic actors plus a `Cluster` RPC plane that
//! routes requests for topics owned by other nodes.

mod cluster;
mod config;
mod db;
mod error;
mod hub;
mod http;
mod metrics;
mod session;
mod telemetry;
mod topic;
mod usercache;
mod push;
mod ws;

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::cluster::failover::Failover;
use crate::cluster::Cluster;
use crate::config::Config;
use crate::db::Database;
use crate::hub::Hub;
use crate::session::auth::{AuthRegistry, TokenAuth};
use crate::session::SessionStore;

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        crate::config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        crate::config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }

    if let Err(errors) = crate::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!("configuration validation failed with {} error(s)", errors.len()));
    }

    info!(server = %config.server.name, data_center = %config.server.data_center, "starting topicd");

    let db_path = config.database.as_ref().map(|d| d.path.as_str()).unwrap_or("topicd.db");
    let db = Database::new(db_path).await?;

    let cluster = Cluster::new(config.server.name.clone(), config.cluster.clone());
    let call_timeout = std::time::Duration::from_secs(config.calls.establishment_timeout_secs);
    let hub = Hub::spawn(db.clone(), cluster.clone(), call_timeout);
    let sessions = SessionStore::new(cluster.clone());
    cluster.bind_runtime(&hub, &sessions);

    let auth = Arc::new(AuthRegistry::new(db.clone(), &config.security.token_secret, config.security.token_expires_in_secs));
    let token_auth = Arc::new(TokenAuth::new(&config.security.token_secret, config.security.token_expires_in_secs));
    let uid_key = session::uid_key_from_secret(&config.security.token_secret);

    {
        let cluster = cluster.clone();
        tokio::spawn(async move {
            if let Err(e) = cluster.serve().await {
                error!(error = %e, "cluster RPC listener stopped");
            }
        });
    }
    info!(addr = %config.cluster.listen, "cluster RPC listener started");

    if let Some(ws_config) = config.websocket.clone() {
        let hub = hub.clone();
        let db = db.clone();
        let cluster = cluster.clone();
        let auth = auth.clone();
        let token_auth = token_auth.clone();
        let limits = config.limits.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = ws::serve(ws_config, hub, db, cluster, auth, token_auth, limits, uid_key, sessions).await {
                error!(error = %e, "websocket listener stopped");
            }
        });
    } else {
        info!("websocket transport disabled (no [websocket] configured)");
    }

    let metrics_port = config.server.metrics_port.unwrap_or(0);
    if metrics_port == 0 {
        info!("metrics/file-transfer HTTP server disabled");
    } else {
        metrics::init(&cluster);
        metrics::spawn_sampler(hub.clone(), sessions.clone());
        let db = db.clone();
        let token_auth = token_auth.clone();
        let max_file_upload_size = config.limits.max_file_upload_size;
        tokio::spawn(async move {
            http::run_http_server(metrics_port, db, token_auth, max_file_upload_size).await;
        });
        info!(port = metrics_port, "HTTP server started (metrics + file transfer)");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    if !config.cluster.peers.is_empty() {
        let failover = Failover::new(cluster.clone(), hub.clone(), sessions.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(failover.run(shutdown_rx));
        info!("failover loop started");
    }

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
        let _ = shutdown_tx.send(());
    });

    let mut shutdown_rx = shutdown_rx;
    shutdown_rx.recv().await.ok();

    info!("shutting down, waiting for tasks to flush");
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    Ok(())
}
