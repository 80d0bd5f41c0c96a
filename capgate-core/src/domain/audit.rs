// capgate-core/src/domain/audit.rs
// ============================================================================
// Module: Audit Log
// Description: Append-only record of token lifecycle operations.
// Purpose: Give operators a durable trail independent of violation/usage
//          records, per spec §3 `AuditLogEntry`.
// Dependencies: tracing, crate::core::identifiers, crate::domain::ids
// ============================================================================

//! ## Overview
//! Audit writes are best-effort: a failure to append an audit entry must
//! never fail the operation it is describing (spec §7 recovery policy). The
//! default [`AuditSink`] implementation logs through `tracing` and keeps an
//! in-memory tail for tests and local inspection; a durable sink would wrap
//! a `capgate-store-sqlite` table behind the same trait.

use std::cell::RefCell;

use crate::core::identifiers::TenantId;
use crate::domain::ids::AuditId;
use crate::domain::ids::TokenId;

/// The token lifecycle operation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
    /// A token was issued.
    Issue,
    /// A token was presented for verification.
    Verify,
    /// A token was revoked.
    Revoke,
    /// An expired token batch was swept.
    Cleanup,
}

impl AuditOperation {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Verify => "verify",
            Self::Revoke => "revoke",
            Self::Cleanup => "cleanup",
        }
    }
}

/// Outcome recorded alongside an [`AuditOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    /// The operation completed as expected.
    Success,
    /// The operation completed but something noteworthy happened (e.g. a
    /// replay, or revoking an already-revoked token).
    Warning,
    /// The operation failed.
    Failure,
}

impl AuditStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failure => "failure",
        }
    }
}

/// A single append-only audit row (spec §3 `AuditLogEntry`).
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    /// Entry identifier.
    pub audit_id: AuditId,
    /// Tenant the entry belongs to.
    pub tenant_id: TenantId,
    /// The token the entry concerns, if any (cleanup sweeps have none).
    pub token_id: Option<TokenId>,
    /// The operation performed.
    pub operation: AuditOperation,
    /// The outcome of that operation.
    pub status: AuditStatus,
    /// Error detail, present iff `status == Failure`.
    pub error: Option<String>,
    /// Caller-supplied correlation id, threaded from the originating request.
    pub correlation_id: String,
    /// Unix-seconds timestamp supplied by the caller.
    pub recorded_at: i64,
}

/// Accepts audit writes. Implementations must not propagate their own
/// failures to the caller: logging an audit entry is always best-effort.
pub trait AuditSink {
    /// Records one audit entry.
    #[allow(clippy::too_many_arguments, reason = "mirrors the full AuditLogEntry shape")]
    fn write(
        &self,
        audit_id: AuditId,
        tenant_id: TenantId,
        token_id: Option<TokenId>,
        operation: AuditOperation,
        status: AuditStatus,
        error: Option<String>,
        correlation_id: &str,
        recorded_at: i64,
    );
}

/// Logs every entry through `tracing` at a level derived from its
/// [`AuditStatus`], and keeps a bounded in-memory tail for inspection.
pub struct TracingAuditSink {
    tail: RefCell<Vec<AuditLogEntry>>,
    tail_capacity: usize,
}

impl TracingAuditSink {
    /// Builds a sink that retains up to `tail_capacity` recent entries.
    #[must_use]
    pub fn new(tail_capacity: usize) -> Self {
        Self {
            tail: RefCell::new(Vec::new()),
            tail_capacity,
        }
    }

    /// Returns a snapshot of the retained tail, oldest first.
    #[must_use]
    pub fn tail(&self) -> Vec<AuditLogEntry> {
        self.tail.borrow().clone()
    }
}

impl Default for TracingAuditSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl AuditSink for TracingAuditSink {
    fn write(
        &self,
        audit_id: AuditId,
        tenant_id: TenantId,
        token_id: Option<TokenId>,
        operation: AuditOperation,
        status: AuditStatus,
        error: Option<String>,
        correlation_id: &str,
        recorded_at: i64,
    ) {
        match status {
            AuditStatus::Success => tracing::info!(
                audit_id = %audit_id,
                tenant_id = %tenant_id,
                token_id = token_id.as_ref().map(TokenId::as_str),
                operation = operation.as_str(),
                correlation_id,
                "token audit event",
            ),
            AuditStatus::Warning => tracing::warn!(
                audit_id = %audit_id,
                tenant_id = %tenant_id,
                token_id = token_id.as_ref().map(TokenId::as_str),
                operation = operation.as_str(),
                correlation_id,
                detail = error.as_deref(),
                "token audit event",
            ),
            AuditStatus::Failure => tracing::error!(
                audit_id = %audit_id,
                tenant_id = %tenant_id,
                token_id = token_id.as_ref().map(TokenId::as_str),
                operation = operation.as_str(),
                correlation_id,
                error = error.as_deref(),
                "token audit event",
            ),
        }

        let mut tail = self.tail.borrow_mut();
        tail.push(AuditLogEntry {
            audit_id,
            tenant_id,
            token_id,
            operation,
            status,
            error,
            correlation_id: correlation_id.to_string(),
            recorded_at,
        });
        let overflow = tail.len().saturating_sub(self.tail_capacity);
        if overflow > 0 {
            tail.drain(0..overflow);
        }
    }
}
