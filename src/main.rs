use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walpanel_server::api::{build_routes, common};
use walpanel_server::core::scheduler::start_scheduler;
use walpanel_server::core::{DefaultStorageConfig, StorageConfig};
use walpanel_server::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    #[arg(short, long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Default filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let storage = match &args.data_dir {
        Some(dir) => DefaultStorageConfig::with_path(dir.clone()),
        None => DefaultStorageConfig::new(),
    }
    .map_err(anyhow::Error::msg)?;

    // 日志：stdout + 按天滚动文件
    let file_appender = tracing_appender::rolling::daily(storage.logs_dir(), "walpanel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    let state = AppState::with_data_dir(storage.data_dir())
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to init state")?;
    let app_state = Arc::new(state);

    {
        let config = app_state.config.read().await;
        tracing::info!(
            "Data directory {:?}, API key {}…",
            app_state.storage.data_dir(),
            config.api_key.chars().take(7).collect::<String>()
        );
    }

    start_scheduler(app_state.clone());

    let app = build_routes(app_state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(common::request_logger));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
