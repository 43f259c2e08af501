//! Chroma Server
//!
//! Axum backend for the level editor and player: authoring and release level
//! storage, publishing, and beam tracing through the native engine or the
//! built-in tracer.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chroma_studio::StudioConfig;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::handler::build_router;
use crate::service::Studio;

mod handler;
mod service;

#[derive(Parser, Debug)]
#[command(name = "chroma-server", about = "Level storage and tracing backend")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CHROMA_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Directory of authoring levels
    #[arg(long, env = "CHROMA_LEVELS_DIR", default_value = "shared/levels")]
    levels_dir: PathBuf,

    /// Directory of released levels
    #[arg(long, env = "CHROMA_RELEASE_DIR", default_value = "shared/levels_release")]
    release_dir: PathBuf,

    /// Native tracing engine; the built-in tracer is used when unset
    #[arg(long, env = "CHROMA_ENGINE_EXE")]
    engine_exe: Option<PathBuf>,

    /// JSON file with studio timing and engine settings
    #[arg(long, env = "CHROMA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };

    let studio = Studio::from_dirs(
        args.levels_dir.clone(),
        args.release_dir.clone(),
        args.engine_exe.clone(),
        &config,
    );

    // Warm the engine up front; a failure here is retried on first trace.
    match studio.orchestrator().engine().init().await {
        Ok(engine) => tracing::info!(engine = engine.name(), "engine ready"),
        Err(err) => tracing::warn!(error = %err, "engine unavailable, will retry on demand"),
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;

    tracing::info!("Server listening on {}", args.addr);
    tracing::info!("  - levels: {}", args.levels_dir.display());
    tracing::info!("  - release: {}", args.release_dir.display());

    axum::serve(listener, build_router(studio)).await?;
    Ok(())
}
