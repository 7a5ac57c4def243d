//! Voice-clone HTTP server.
//!
//! Usage:
//!     VOICE_UPLOAD_DIR=/srv/voice/uploads TTS_SERVICE_PORT=5001 serve
//!     serve --host 127.0.0.1 --port 8080

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voice_clone_service::config::{debug_from_env, log_directive};
use voice_clone_service::{create_router, load_cloner, AppState, ServiceConfig, Workspace};

/// HTTP service for voice-sample validation, preprocessing and cloned-voice synthesis
#[derive(Parser, Debug)]
#[command(name = "serve", version, about, long_about = None)]
struct Args {
    /// Host to bind to (overrides TTS_SERVICE_HOST)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on (overrides TTS_SERVICE_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_directive(debug_from_env()).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServiceConfig::from_env().context("invalid configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if config.debug {
        warn!("DEBUG is enabled");
    }

    Workspace::from_config(&config).init()?;

    let loader_config = config.clone();
    let cloner = tokio::task::spawn_blocking(move || load_cloner(&loader_config)).await?;
    if cloner.is_none() {
        warn!("Starting without a TTS model; /synthesize will return 503");
    }

    let addr = config.bind_addr()?;

    let state = AppState::new(config, cloner);
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // the model is released only after in-flight requests have drained
    drop(state);
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
