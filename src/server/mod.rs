//! HTTP server: router, shared state and lifecycle

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::{self, Dispatcher};
use crate::engine::WorkflowEngine;

#[cfg(test)]
mod tests;

/// State shared by every request. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn WorkflowEngine>) -> Result<Self> {
        let dispatcher = Dispatcher::from_config(&config, engine)?;
        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            started_at: Utc::now(),
        })
    }
}

/// Create the gateway router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/:workflow_type/:workflow_name", post(dispatch::handle_workflow))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unauthenticated liveness probe
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<JsonValue>) {
    let uptime = Utc::now() - state.started_at;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": uptime.num_seconds(),
        })),
    )
}

/// Gateway server bound to one engine
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: Config, engine: Arc<dyn WorkflowEngine>) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config, engine)?,
        })
    }

    /// Serve until Ctrl+C or SIGTERM, then close the engine
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.listen_addr();
        let engine = self.state.dispatcher.engine().clone();

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        tracing::info!(
            %addr,
            auth_header = %self.state.config.auth.header,
            default_task_queue = %self.state.config.workflow.task_queue,
            "Rhythm gateway listening"
        );

        let app = create_router(self.state);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error");

        tracing::info!("Rhythm gateway shutting down");
        engine.close().await;

        served
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
