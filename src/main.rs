pub mod config;
pub mod error;
pub mod gemini;
pub mod media_ingestion;
pub mod processing;
pub mod request_counter;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::post,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::gemini::{GeminiClient, ReportModel};
use crate::media_ingestion::analyze_report;
use crate::request_counter::RequestCounter;

/// Room for multipart boundaries and the text fields on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ReportModel>,
    pub request_counter: RequestCounter,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(model: Arc<dyn ReportModel>, max_upload_bytes: usize) -> Self {
        Self {
            model,
            request_counter: RequestCounter::new(),
            max_upload_bytes,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/analyze-report/", post(analyze_report))
        .route("/analyze-report", post(analyze_report))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mediscan_api=info,tower_http=info".into());

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;

    let client = GeminiClient::from_config(&config)
        .await
        .context("Failed to initialize Gemini client")?;

    let state = AppState::new(Arc::new(client), config.max_upload_bytes);
    let request_counter = state.request_counter.clone();
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr()?)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    request_counter.print_summary();
    Ok(())
}
