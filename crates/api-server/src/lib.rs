pub mod config;
pub mod sentiment_routes;

use anyhow::Context;
use axum::Router;
use finnhub_client::{FetchConfig, FinnhubClient};
use ml_client::SentimentClient;
use sentiment_analysis::{FinBertScorer, LexiconScorer, NewsTextCleaner};
use sentiment_core::SentimentScorer;
use sentiment_orchestrator::SentimentPipeline;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::{AppConfig, ScorerBackend};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SentimentPipeline>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let fetch = FetchConfig::new(config.finnhub_api_key.clone())
            .with_base_url(config.finnhub_base_url.clone());
        let news = Arc::new(FinnhubClient::new(fetch));

        let scorer: Arc<dyn SentimentScorer> = match config.backend {
            ScorerBackend::FinBert => Arc::new(FinBertScorer::new(config.ml.client())),
            ScorerBackend::Lexicon => Arc::new(LexiconScorer::new()),
        };

        let pipeline = SentimentPipeline::new(news, Arc::new(NewsTextCleaner::new()), scorer)
            .with_news_limit(Some(config.news_limit));

        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    sentiment_routes::sentiment_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

    tracing::info!("Shutdown signal received, draining connections");
}

/// Startup check of the FinBERT service. The server starts either way;
/// requests fail with a 500 until the service comes up.
async fn check_ml_service(client: &SentimentClient) -> bool {
    match client.health().await {
        Ok(true) => {
            tracing::info!("FinBERT service at {} is healthy", client.base_url());
            true
        }
        Ok(false) => {
            tracing::warn!("FinBERT service at {} reports unhealthy", client.base_url());
            false
        }
        Err(e) => {
            tracing::warn!("FinBERT service at {} is unreachable: {}", client.base_url(), e);
            false
        }
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    if config.backend == ScorerBackend::FinBert {
        check_ml_service(&config.ml.client()).await;
    }
    let state = AppState::from_config(&config);
    tracing::info!(
        "Sentiment backend: {}, news limit: {}",
        state.pipeline.scorer_backend(),
        config.news_limit
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}
