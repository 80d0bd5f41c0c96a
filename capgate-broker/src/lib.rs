// capgate-broker/src/lib.rs
// ============================================================================
// Module: CapGate Broker Library
// Description: HTTP transport for the capability enforcement core.
// Purpose: Bind an axum server exposing token, rule, violation, usage, and
//          capability-check endpoints over `capgate-core::domain`.
// Dependencies: axum, axum-server, capgate-core, tokio
// ============================================================================

//! ## Overview
//! CapGate Broker is the HTTP front door for the capability enforcement
//! core: it loads a [`config::ServeConfig`], builds an [`state::AppState`]
//! over process-local store adapters ([`memory_stores`]), and serves the
//! [`http::router`] surface until the process receives a shutdown signal.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod http;
pub mod memory_stores;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::ServeConfig;
pub use config::enforce_bind_policy;
pub use error::ApiError;
pub use state::AppState;

use std::net::SocketAddr;

/// Errors starting the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The configured bind address was rejected by [`enforce_bind_policy`].
    #[error("{0}")]
    BindRejected(String),
    /// The listener or server loop failed.
    #[error("server error: {0}")]
    Server(String),
}

/// Builds the application state and serves the HTTP surface at
/// `config.bind` until the process is asked to shut down.
///
/// # Errors
/// Returns [`ServeError::BindRejected`] when [`enforce_bind_policy`] rejects
/// the configured address, or [`ServeError::Server`] if the listener fails.
pub async fn serve(config: ServeConfig) -> Result<(), ServeError> {
    enforce_bind_policy(&config).map_err(ServeError::BindRejected)?;
    let state = AppState::new(config.signing_seed);
    let router = http::router(state);
    serve_router(config.bind, router).await
}

async fn serve_router(bind: SocketAddr, router: axum::Router) -> Result<(), ServeError> {
    axum_server::bind(bind)
        .serve(router.into_make_service())
        .await
        .map_err(|err| ServeError::Server(err.to_string()))
}
