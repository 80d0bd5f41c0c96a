// capgate-broker/src/state.rs
// ============================================================================
// Module: Application State
// Description: Shared, clonable handle to the broker's collaborators.
// Purpose: Give every axum handler access to the signer and in-memory stores
//          behind `Arc`, and a consistent clock/correlation-id source.
// Dependencies: std::sync::Arc, std::time, capgate-core::domain, uuid
// ============================================================================

//! ## Overview
//! [`AppState`] is cheap to clone (every field is an `Arc`) and is handed to
//! axum via `Router::with_state`. It owns the process-local store adapters in
//! `crate::memory_stores` and a [`TokenSigner`] built from the configured
//! seed at startup.

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use capgate_core::domain::token::TokenSigner;

use crate::memory_stores::MemoryAuditSink;
use crate::memory_stores::MemoryReplayProtector;
use crate::memory_stores::MemoryRuleStore;
use crate::memory_stores::MemoryTokenStore;
use crate::memory_stores::MemoryUsageStore;
use crate::memory_stores::MemoryViolationStore;

/// Shared handle to every collaborator an HTTP handler needs.
#[derive(Clone)]
pub struct AppState {
    /// Ed25519 token signer, built once at startup from the configured seed.
    pub signer: Arc<TokenSigner>,
    /// Token rows.
    pub tokens: Arc<MemoryTokenStore>,
    /// Tool allow-list rules.
    pub rules: Arc<MemoryRuleStore>,
    /// Recorded violations.
    pub violations: Arc<MemoryViolationStore>,
    /// Recorded usage.
    pub usage: Arc<MemoryUsageStore>,
    /// Audit trail sink.
    pub audit: Arc<MemoryAuditSink>,
    /// Replay protector.
    pub replay: Arc<MemoryReplayProtector>,
    /// Unix-seconds timestamp captured when the server started, for
    /// `/health`'s `uptime_seconds`.
    pub started_at: i64,
}

impl AppState {
    /// Builds a fresh, empty state from a signing seed.
    #[must_use]
    pub fn new(signing_seed: [u8; 32]) -> Self {
        Self {
            signer: Arc::new(TokenSigner::from_seed(signing_seed)),
            tokens: Arc::new(MemoryTokenStore::default()),
            rules: Arc::new(MemoryRuleStore::default()),
            violations: Arc::new(MemoryViolationStore::default()),
            usage: Arc::new(MemoryUsageStore::default()),
            audit: Arc::new(MemoryAuditSink::default()),
            replay: Arc::new(MemoryReplayProtector::default()),
            started_at: unix_now(),
        }
    }

    /// Returns the current unix-seconds timestamp.
    #[must_use]
    pub fn now(&self) -> i64 {
        unix_now()
    }

    /// Generates a fresh correlation id for a single request.
    #[must_use]
    pub fn correlation_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
