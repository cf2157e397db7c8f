//! Application startup and lifecycle management.
//!
//! The HTTP surface is operational only (health, readiness, metrics); fee
//! operations are reached through [`FeeService`].

use crate::config::FeeConfig;
use crate::services::{get_metrics, FeeService, SessionRegistry};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: FeeConfig,
    pub registry: Arc<SessionRegistry>,
    pub fees: FeeService,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": state.config.service_version
        })),
    )
}

/// Readiness check: the default session store must answer.
async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let default_session = state.registry.default_session().to_string();
    let store = state.registry.resolve(&default_session).await?;
    store.health_check().await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "status": "ready", "default_session": default_session })),
    ))
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: FeeConfig) -> Result<Self, AppError> {
        let registry = Arc::new(
            SessionRegistry::new(
                &config.sessions.dir,
                &config.sessions.default_session,
                config.database.store_options(),
            )
            .map_err(|e| {
                tracing::error!(
                    "Failed to prepare sessions directory {}: {}",
                    config.sessions.dir.display(),
                    e
                );
                e
            })?,
        );

        registry.provision_default().await.map_err(|e| {
            tracing::error!("Failed to open default session store: {}", e);
            e
        })?;

        let state = AppState {
            config: config.clone(),
            fees: FeeService::new(registry.clone()),
            registry,
        };

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            "Fee service: HTTP on port {}, default session {}",
            http_port,
            config.sessions.default_session
        );

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get the application state.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_endpoint))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state);

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
