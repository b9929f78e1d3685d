mod cli;

use crate::cli::CLI;
use anyhow::Context;
use clap::Parser;
use snip_gateway::{App, AppState, CookieSigner};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = CLI::parse();
    let storage_config = config.storage_config();

    info!(
        server_address = %config.server_address,
        base_url = %config.base_url,
        storage_backend = %storage_config.backend(),
        "starting gateway http server"
    );

    let storage = storage_config
        .open()
        .await
        .context("failed to open storage")?;

    let signer = match &config.cookie_secret {
        Some(secret) => CookieSigner::new(secret),
        None => {
            warn!("no cookie secret configured, identities will not survive a restart");
            CookieSigner::ephemeral()
        }
    }
    .map_err(|err| anyhow::anyhow!("invalid cookie secret: {err}"))?;

    let (deletes, deleter) = snip_deleter::spawn(storage.clone(), config.deleter_settings());
    let state = AppState::new(
        storage.clone(),
        deletes,
        signer,
        &config.base_url,
        config.cookie_domain.as_str(),
    );

    let listener = TcpListener::bind(&config.server_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server_address))?;
    info!(listen_addr = %listener.local_addr()?, "listening");

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    info!("http server stopped, flushing pending deletions");

    match deleter.shutdown().await {
        Ok(report) => info!(
            flushed = report.flushed,
            dropped = report.dropped,
            "delete worker finished"
        ),
        Err(err) => error!(error = %err, "delete worker did not finish cleanly"),
    }

    if let Err(err) = storage.close().await {
        error!(error = %err, "failed to close storage");
        return Err(err).context("failed to close storage");
    }

    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
