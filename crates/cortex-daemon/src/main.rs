//! Cortex Daemon
//!
//! Local semantic memory service for coding assistants. Serves the tool
//! channel (`POST /mcp/tools/call`), the browse/maintenance surface, and
//! the capture/admin endpoints over HTTP, with background workers for
//! async ingestion and session auto-capture.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cortex_core::config::{self, load_yaml_config};
use cortex_core::embed::LocalEmbedder;
use cortex_core::{Services, TaskQueue};

use cortex_daemon::http::{self, AppState};
use cortex_daemon::workers;

/// Cortex semantic memory daemon
#[derive(Parser, Debug)]
#[command(name = "cortex-daemon", version, about)]
struct Args {
    /// Custom data directory (default: ~/.cortex, or /app/cortex_data in
    /// containers)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// HTTP port (overrides CORTEX_HTTP_PORT and config.yaml)
    #[arg(long)]
    port: Option<u16>,
}

fn resolve_port(args: &Args, configured: Option<u16>) -> u16 {
    if let Some(port) = args.port {
        return port;
    }
    if let Ok(v) = std::env::var("CORTEX_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            return port;
        }
    }
    configured.unwrap_or(8080)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => config::ensure_data_dir()?,
    };

    let debug_env = std::env::var("CORTEX_DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_level = if debug_env { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // CORTEX_LOG_FILE routes the append-only log to a file; stderr
    // otherwise (stdout stays free for shells wrapping the daemon)
    let log_file = std::env::var("CORTEX_LOG_FILE")
        .ok()
        .filter(|p| !p.is_empty())
        .map(|_| config::log_file_path(&data_dir))
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| eprintln!("cannot open log file {}: {e}", path.display()))
                .ok()
        });

    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_target(false)
            .with_ansi(false)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(false)
            .init(),
    }

    info!("Cortex daemon v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", data_dir.display());

    let yaml = load_yaml_config();
    let port = resolve_port(&args, yaml.http_port);

    let embedder = Arc::new(LocalEmbedder::new());
    if let Err(e) = embedder.init() {
        warn!("Embedding model unavailable: {} - documents will index keyword-only", e);
    } else {
        info!("Embedding model initialized");
    }

    let services = match Services::new(data_dir.clone(), embedder, yaml) {
        Ok(services) => Arc::new(services),
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };
    info!("Store initialized ({} documents)", services.store.count().unwrap_or(0));

    // Load the cross-encoder in the background (downloads ~150MB on first
    // run); search falls back to term overlap until it is ready.
    {
        let services = Arc::clone(&services);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            services.init_reranker();
        });
    }

    // Task queues + single worker per queue
    let ingest_queue = Arc::new(TaskQueue::load(data_dir.join("ingest_tasks.json")));
    let capture_queue = Arc::new(TaskQueue::load(data_dir.join("capture_queue.json")));

    tokio::spawn(workers::run_ingest_worker(
        Arc::clone(&services),
        Arc::clone(&ingest_queue),
    ));
    tokio::spawn(workers::run_capture_worker(
        Arc::clone(&services),
        Arc::clone(&capture_queue),
    ));

    let state = Arc::new(AppState::new(services, ingest_queue, capture_queue));
    let app = http::router(state);

    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Cortex daemon listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Cortex daemon shutting down");
    Ok(())
}

/// Graceful shutdown on ctrl-c / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
