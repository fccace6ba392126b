//! API server wiring
//!
//! Builds the router, applies the middleware layers selected in
//! configuration, and serves with graceful shutdown.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::create_router;
use crate::config::ApiConfig;
use crate::scheduler::{ConfigStore, SchedulerLoop};
use crate::storage::ArticleRepository;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("server error: {0}")]
    Serve(String),
}

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Durable scheduler configuration
    pub config_store: Arc<dyn ConfigStore>,

    /// Article storage
    pub articles: Arc<dyn ArticleRepository>,

    /// The control loop, for status reporting
    pub scheduler: Arc<SchedulerLoop>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        articles: Arc<dyn ArticleRepository>,
        scheduler: Arc<SchedulerLoop>,
    ) -> Self {
        Self {
            config_store,
            articles,
            scheduler,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// API Server
// ============================================================================

/// HTTP server for the configuration and content APIs
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes and configured layers
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until the shutdown future resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.config.bind_address;

        tracing::info!(%addr, "starting API server");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("API server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
