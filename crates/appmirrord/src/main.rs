//! appmirrord: the AppMirror daemon.
//!
//! Assembles the simulator into one process:
//! - Entity store (in-memory redb)
//! - Blob store for uploaded builds
//! - Session, build and install services with their transition timers
//! - REST API
//!
//! # Usage
//!
//! ```text
//! appmirrord serve --port 8082 --upload-dir ./uploads/builds
//! appmirrord default-config > appmirror.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use appmirror_core::config::CorsConfig;
use appmirror_core::{BlobBackend, MirrorConfig};
use appmirror_session::{MirrorServices, Timings};
use appmirror_state::StateStore;
use appmirror_storage::{BlobStore, LocalBlobStore, MemoryBlobStore};

#[derive(Parser)]
#[command(name = "appmirrord", about = "AppMirror simulated device backend")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve(ServeArgs),

    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Path to an appmirror.toml file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory for uploaded build artifacts.
    #[arg(long, env = "APPMIRROR_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Extra allowed CORS origins, comma separated.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS")]
    cors_origins: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::DefaultConfig => {
            print!("{}", MirrorConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,appmirrord=debug,appmirror=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File config (or defaults) with command-line and environment overrides applied.
fn resolve_config(args: &ServeArgs) -> anyhow::Result<MirrorConfig> {
    let mut config = match &args.config {
        Some(path) => MirrorConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MirrorConfig::default(),
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = &args.upload_dir {
        config.storage.upload_dir = dir.clone();
    }
    if let Some(list) = &args.cors_origins {
        config
            .cors
            .allowed_origins
            .extend(CorsConfig::from_env_list(list).allowed_origins);
    }

    config.validate()?;
    Ok(config)
}

fn blob_store(config: &MirrorConfig) -> Arc<dyn BlobStore> {
    match config.storage.backend {
        BlobBackend::Local => Arc::new(LocalBlobStore::new(config.storage.upload_dir.clone())),
        BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("AppMirror daemon starting");

    let config = resolve_config(&args)?;

    // ── Initialize subsystems ──────────────────────────────────

    let state = StateStore::open_in_memory()?;
    info!("entity store opened");

    let blobs = blob_store(&config);
    info!(
        backend = ?config.storage.backend,
        upload_dir = ?config.storage.upload_dir,
        "blob store initialized"
    );

    let timings = Timings::from_config(&config)?;
    let services = MirrorServices::new(state, blobs, timings);
    info!(
        ready_delay = ?timings.ready_delay,
        install_delay = ?timings.install_delay,
        "session services initialized"
    );

    // ── Start API server ───────────────────────────────────────

    let router = appmirror_api::build_router(
        services.clone(),
        &config.cors,
        config.storage.max_upload_bytes,
    );
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    services.shutdown().await;

    info!("AppMirror daemon stopped");
    Ok(())
}
