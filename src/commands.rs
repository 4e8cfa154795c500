//! CLI command handlers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use axum::{Router, extract::ConnectInfo, http::StatusCode};
use futures::StreamExt;
use pcapture::{Capture, CaptureConfig};
use pgo_server::{ServerConfig, run_server};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::cli::ServeArgs;

/// Build the server configuration from the optional file and CLI overrides.
pub fn resolve_server_config(args: &ServeArgs) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.bind_address = listen;
    }
    if let Some(db) = &args.db {
        config.database_path.clone_from(db);
    }
    if let Some(secs) = args.grace_secs {
        config.shutdown_grace = Duration::from_secs(secs);
    }
    if args.in_memory {
        config.in_memory = true;
    }

    Ok(config)
}

/// Run the ingestion server until SIGINT/SIGTERM, then close the store.
pub async fn cmd_serve(config: ServerConfig) -> Result<()> {
    let store = config
        .store_config()
        .open()
        .context("Failed to setup store")?;

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    let served = run_server(
        listener,
        Arc::clone(&store),
        shutdown_signal(),
        config.shutdown_grace,
    )
    .await;

    store.close().await.context("Failed to close store")?;
    served.context("Server error")?;

    info!("Successfully shutdown gracefully");
    Ok(())
}

/// Download the profile stored under `tag` to `output`.
pub async fn cmd_fetch(tag: &str, server: &str, output: &Path) -> Result<()> {
    let url = CaptureConfig::with_server(server)?.profile_url(tag)?;
    info!(url = %url, "Fetching profile");

    let response = reqwest::get(url.clone())
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server answered {status}: {body}");
    }

    let partial = partial_path(output);
    let written = download(response, &partial).await;
    match written {
        Ok(bytes) => {
            tokio::fs::rename(&partial, output)
                .await
                .with_context(|| format!("Failed to move profile to {}", output.display()))?;
            info!(tag, bytes, output = %output.display(), "Profile saved");
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn download(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Failed to read profile body")?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Serve 200 on every request while profiling, publish on shutdown.
pub async fn cmd_demo(server: &str, listen: SocketAddr, tag: &str) -> Result<()> {
    let config = CaptureConfig {
        server_url: server.to_string(),
        ..CaptureConfig::from_env()
    };
    let capture = Capture::start(tag, config).context("Failed to start capture")?;
    info!(tag, "Capturing CPU profile");

    let app = Router::new().fallback(|ConnectInfo(remote): ConnectInfo<SocketAddr>| async move {
        info!(remote = %remote, "Request served");
        StatusCode::OK
    });

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!("Demo service listening on {}", listen);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = capture.emit(None).await {
        warn!(error = %e, "Failed to emit profile");
    }

    served.context("Demo server error")?;
    info!("Successfully shutdown gracefully");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
