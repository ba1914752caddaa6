//! sttag-cover - soundtrack cover-art tagger
//!
//! `populate` downloads missing album covers into the cover folder, `apply`
//! embeds cached covers into the audio files, `serve` exposes both over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sttag_common::config::{default_config_path, load_toml_config, FolderResolver, TomlConfig};
use sttag_common::events::{EventBus, TaggerEvent};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sttag_cover::services::{
    BatchProcessor, CoverCacheService, HttpAssetFetcher, JikanClient, LoftyOpener,
};
use sttag_cover::{AppState, TaggerError};

/// Command-line arguments for sttag-cover
#[derive(Parser, Debug)]
#[command(name = "sttag-cover")]
#[command(about = "Fetch and embed soundtrack cover art")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to <config dir>/sttag/config.toml)
    #[arg(short, long, env = "STTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Folder scanned for audio files
    #[arg(short, long, global = true)]
    music_folder: Option<PathBuf>,

    /// Folder holding cached cover images
    #[arg(long, global = true)]
    cover_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download missing covers for managed albums
    Populate,
    /// Embed cached covers into audio files
    Apply,
    /// Run the HTTP control API
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "STTAG_PORT")]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_toml_config(&config_path)?;

    init_tracing(&config)?;
    info!("Starting sttag-cover {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let resolver = FolderResolver::new(config.clone());
    let music_folder = resolver.music_folder(args.music_folder.as_deref());
    let cover_folder = resolver.cover_folder(args.cover_folder.as_deref());

    let event_bus = EventBus::new(256);
    let service = Arc::new(build_service(&config, event_bus.clone())?);

    match args.command {
        Command::Populate | Command::Apply => {
            run_once(&args.command, &service, &event_bus, music_folder, cover_folder).await
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            serve(service, event_bus, music_folder, cover_folder, port).await
        }
    }
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn build_service(config: &TomlConfig, event_bus: EventBus) -> Result<CoverCacheService> {
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let lookup = JikanClient::new(config.jikan_base_url.clone(), timeout)
        .context("Failed to build Jikan client")?;
    let fetcher = HttpAssetFetcher::new(timeout).context("Failed to build HTTP client")?;
    let processor = BatchProcessor::new(Arc::new(LoftyOpener::new()), event_bus);

    Ok(CoverCacheService::new(
        Arc::new(processor),
        Arc::new(lookup),
        Arc::new(fetcher),
        config.album_artist.clone(),
    ))
}

/// Run one populate/apply pass with a console progress line
async fn run_once(
    command: &Command,
    service: &CoverCacheService,
    event_bus: &EventBus,
    music_folder: PathBuf,
    cover_folder: PathBuf,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            eprintln!();
            info!("Received Ctrl+C, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let mut rx = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let TaggerEvent::ProgressChanged { steps_text, .. } = event {
                eprint!("\r{}", steps_text);
            }
        }
    });

    let result = match command {
        Command::Populate => {
            service
                .populate_cache(&music_folder, &cover_folder, &cancel)
                .await
        }
        _ => service.apply_cache(&music_folder, &cover_folder, &cancel).await,
    };
    printer.abort();
    eprintln!();

    match result {
        Ok(outcome) => {
            println!("{}", outcome.counters.steps_text());
            if let Some(report) = outcome.failure_report() {
                println!("{}", report);
            }
            Ok(())
        }
        Err(TaggerError::Cancelled(outcome)) => {
            println!("Cancelled: {}", outcome.counters.steps_text());
            if let Some(report) = outcome.failure_report() {
                println!("{}", report);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn serve(
    service: Arc<CoverCacheService>,
    event_bus: EventBus,
    music_folder: PathBuf,
    cover_folder: PathBuf,
    port: u16,
) -> Result<()> {
    let state = AppState::new(service.clone(), event_bus, music_folder, cover_folder);
    let app = sttag_cover::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler; also cancels any active run
async fn shutdown_signal(service: Arc<CoverCacheService>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    service.cancel();
}
