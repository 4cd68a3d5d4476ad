//! Annie server library logic.
//!
//! Accepts telephony media streams on `/ws` and bridges each one to a
//! hosted speech-agent session for the duration of the call.

pub mod api_ws;
pub mod bridge;
pub mod call_target;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod functions;
pub mod lifecycle;
pub mod relay;
pub mod telephony;

use std::sync::Arc;
use std::time::Duration;

use annie_db::{DbPool, StoreError};
use annie_voice::{AgentConfig, PromptLibrary};
use axum::{routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::{BridgeConfig, Config};
use crate::error::{BridgeError, FunctionError};
use crate::functions::EmergencyApiClient;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Speech-agent connection settings, including the credential.
    pub agent: Arc<AgentConfig>,
    /// Per-session bridge settings.
    pub bridge: Arc<BridgeConfig>,
    /// Persona instruction files.
    pub prompts: Arc<PromptLibrary>,
    /// Internal emergency API; `None` writes emergencies to the store.
    pub emergency_api: Option<Arc<EmergencyApiClient>>,
    /// Cancelled on server shutdown. Every session's hangup token is a
    /// child of this one.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the shared state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `FunctionError::Http` if the emergency API client cannot be
    /// constructed.
    pub fn from_config(
        pool: DbPool,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<Self, FunctionError> {
        let emergency_api = config
            .emergency
            .api_base
            .as_deref()
            .map(|base| {
                EmergencyApiClient::new(base, Duration::from_secs(config.emergency.timeout_secs))
            })
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            pool,
            agent: Arc::new(config.agent.clone()),
            bridge: Arc::new(config.bridge.clone()),
            prompts: Arc::new(PromptLibrary::new(
                &config.bridge.prompts_dir,
                &config.bridge.default_persona,
            )),
            emergency_api,
            shutdown,
        })
    }
}

/// Runs a store operation on a pooled connection off the async runtime.
///
/// Each call checks out its own connection; nothing is held between calls.
pub async fn run_store_op<T, F>(pool: &DbPool, op: F) -> Result<T, BridgeError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        Ok(op(&conn)?)
    })
    .await?
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api_ws::ws_handler))
        .route("/ws/{*rest}", get(api_ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
