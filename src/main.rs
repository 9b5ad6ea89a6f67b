//! keyholder-proxy - a filtering SSH agent proxy

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use keyholder_proxy::agent::{Proxy, Server, Upstream};
use keyholder_proxy::cli::Cli;
use keyholder_proxy::logging::{self, LogConfig, LogEvent};
use keyholder_proxy::policy;
use keyholder_proxy::utils::path::expand_path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::new();
    if cli.verbose {
        log_config = log_config.verbose();
    }
    if cli.quiet {
        log_config = log_config.quiet();
    }
    if let Some(log_path) = &cli.log {
        log_config = log_config.with_jsonl_path(log_path);
    }
    let log_guard = logging::init_with_config(log_config);

    let bind_path = expand_path(&cli.bind.to_string_lossy())
        .context("failed to expand --bind path")?;
    let connect_path = expand_path(&cli.connect.to_string_lossy())
        .context("failed to expand --connect path")?;
    let auth_dir = expand_path(&cli.auth_dir.to_string_lossy())
        .context("failed to expand --auth-dir path")?;
    let pubkey_dir = cli.pubkey_dir();

    let policy = policy::load_policy(std::path::Path::new(&auth_dir), &pubkey_dir).map_err(|e| {
        error!(error = %e, "failed to load policy, exiting");
        e
    })?;
    log_guard.log_event(&LogEvent::policy_load(policy.len() as u32));
    info!(fingerprints = policy.len(), "policy loaded");

    let mut server = Server::new(&bind_path);
    server.bind().await.map_err(|e| {
        error!(error = %e, path = %bind_path, "failed to bind listener, exiting");
        e
    })?;
    log_guard.log_event(&LogEvent::server_start(bind_path.clone()));

    let upstream = Upstream::new(&connect_path);
    let mut proxy_builder = Proxy::new(upstream, Arc::new(policy)).with_socket_name(bind_path.clone());
    if let Some(jsonl_writer) = log_guard.jsonl_writer_handle() {
        proxy_builder = proxy_builder.with_logger(jsonl_writer);
    }
    let proxy = Arc::new(proxy_builder);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler_proxy = Arc::clone(&proxy);
    let handler = move |stream| {
        let proxy = Arc::clone(&handler_proxy);
        async move { proxy.handle_client(stream).await }
    };

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt, shutting down");
        let _ = shutdown_tx.send(true);
    });

    server.run(handler, shutdown_rx).await?;

    log_guard.log_event(&LogEvent::server_stop(bind_path));
    Ok(())
}
