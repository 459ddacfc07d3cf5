//! Application startup and lifecycle management.

use crate::config::RelayConfig;
use crate::handlers::{
    chat, health_check, metrics_handler, readiness_check, root, summarize_history,
};
use crate::middleware::metrics_middleware;
use crate::services::providers::elevenlabs::{ElevenLabsConfig, ElevenLabsSpeechProvider};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::{SpeechProvider, TextProvider};
use axum::{
    body::Body,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{make_request_span, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub text_provider: Arc<dyn TextProvider>,
    pub speech_provider: Arc<dyn SpeechProvider>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        text_provider: Arc<dyn TextProvider>,
        speech_provider: Arc<dyn SpeechProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            text_provider,
            speech_provider,
        }
    }

    /// Wire up the Gemini and ElevenLabs providers from configuration.
    pub fn from_config(config: RelayConfig) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.upstream.timeout_secs);

        let text_provider: Arc<dyn TextProvider> = Arc::new(GeminiTextProvider::new(
            GeminiConfig::new(
                config.google.api_key.clone(),
                config.models.text_model.clone(),
                timeout,
            ),
        )?);

        tracing::info!(
            model = %config.models.text_model,
            search_grounding = config.models.search_grounding,
            "Initialized Gemini text provider"
        );

        let speech_provider: Arc<dyn SpeechProvider> = Arc::new(ElevenLabsSpeechProvider::new(
            ElevenLabsConfig::new(config.speech.api_key.clone(), timeout),
        )?);

        tracing::info!(
            voice_id = %config.speech.voice_id,
            audio_enabled = config.chat.audio_enabled,
            "Initialized ElevenLabs speech provider"
        );

        Ok(Self::new(config, text_provider, speech_provider))
    }
}

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/chat", post(chat))
        .route("/api/summarize-history", post(summarize_history))
        .layer(CorsLayer::permissive())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RelayConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config)?;
        Self::with_state(state).await
    }

    /// Bind a listener for prebuilt state (port 0 = random port for testing).
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "relay-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "HTTP server error");
                e
            })
    }
}
