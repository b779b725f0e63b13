mod routes;
mod storage;
mod models;
mod arrow_io;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use clap::Parser;
use logparser::{LogEngine, LogTypeRegistry};
use routes::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storage::SessionStorage;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "logparser-service", about = "Upload log files and browse them as Arrow tables")]
struct Config {
    /// Address to listen on
    #[arg(long, env = "LOGPARSER_ADDR", default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Directory holding one sub-directory per session
    #[arg(long, env = "LOGPARSER_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// TOML file with additional log types
    #[arg(long, env = "LOGPARSER_LOG_TYPES")]
    log_types: Option<PathBuf>,

    /// Upload size limit in MiB
    #[arg(long, env = "LOGPARSER_MAX_UPLOAD_MB", default_value_t = 1024)]
    max_upload_mb: usize,
}

fn build_engine(config: &Config) -> anyhow::Result<LogEngine> {
    let Some(path) = &config.log_types else {
        return Ok(LogEngine::builtin());
    };
    let registry = LogTypeRegistry::from_path(path)
        .with_context(|| format!("loading log types from {}", path.display()))?;
    Ok(LogEngine::new(registry)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logparser_service=debug,logparser=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    tracing::debug!("Configuration: {:?}", config);

    let state = AppState {
        storage: Arc::new(
            SessionStorage::new(&config.data_dir)
                .with_context(|| format!("creating data dir {}", config.data_dir.display()))?,
        ),
        engine: Arc::new(build_engine(&config)?),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::create_routes(state))
        .layer(DefaultBodyLimit::max(config.max_upload_mb * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Starting log parser service on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
