// capgate-broker/src/memory_stores.rs
// ============================================================================
// Module: In-Process Store Adapters
// Description: Mutex-backed implementations of capgate-core's store traits.
// Purpose: Let the HTTP transport run end to end before a durable
//          `capgate-store-sqlite`-backed implementation lands.
// Dependencies: std::sync::Mutex, capgate-core::domain
// ============================================================================

//! ## Overview
//! These adapters satisfy [`TokenStore`], [`RuleStore`], [`ViolationStore`],
//! [`UsageStore`], [`AuditSink`], and [`ReplayProtector`] with plain
//! `Mutex`-guarded vectors. They are deliberately process-local and
//! non-durable: a restart loses all tokens, rules, and history. Swapping in
//! `capgate-store-sqlite`-backed implementations of the same traits is the
//! tracked path to persistence (see `DESIGN.md`).

use std::sync::Mutex;

use capgate_core::core::identifiers::TenantId;
use capgate_core::domain::audit::AuditLogEntry;
use capgate_core::domain::audit::AuditOperation;
use capgate_core::domain::audit::AuditSink;
use capgate_core::domain::audit::AuditStatus;
use capgate_core::domain::capability::RuleStore;
use capgate_core::domain::capability::ToolAllowListRule;
use capgate_core::domain::ids::AuditId;
use capgate_core::domain::ids::Jti;
use capgate_core::domain::ids::TokenId;
use capgate_core::domain::replay::ReplayContext;
use capgate_core::domain::replay::ReplayOutcome;
use capgate_core::domain::replay::ReplayProtector;
use capgate_core::domain::token::CapabilityToken;
use capgate_core::domain::token::TokenStore;
use capgate_core::domain::usage::UsageRecord;
use capgate_core::domain::usage::UsageStore;
use capgate_core::domain::violation::CapabilityViolation;
use capgate_core::domain::violation::ViolationStore;

/// Token rows, guarded by a single mutex; fine at this scale, a real store
/// would shard or delegate to the database's own concurrency control.
#[derive(Default)]
pub struct MemoryTokenStore {
    rows: Mutex<Vec<CapabilityToken>>,
}

impl TokenStore for MemoryTokenStore {
    fn insert(&self, token: &CapabilityToken) -> Result<(), String> {
        self.rows.lock().map_err(|_| "token store poisoned".to_string())?.push(token.clone());
        Ok(())
    }

    fn find(&self, token_id: &TokenId) -> Result<Option<CapabilityToken>, String> {
        let rows = self.rows.lock().map_err(|_| "token store poisoned".to_string())?;
        Ok(rows.iter().find(|row| &row.token_id == token_id).cloned())
    }

    fn increment_usage(&self, token_id: &TokenId) -> Result<(), String> {
        let mut rows = self.rows.lock().map_err(|_| "token store poisoned".to_string())?;
        if let Some(row) = rows.iter_mut().find(|row| &row.token_id == token_id) {
            row.usage_count += 1;
        }
        Ok(())
    }

    fn revoke(&self, token_id: &TokenId, revoked_at: i64) -> Result<bool, String> {
        let mut rows = self.rows.lock().map_err(|_| "token store poisoned".to_string())?;
        let Some(row) = rows.iter_mut().find(|row| &row.token_id == token_id) else {
            return Ok(false);
        };
        if row.revoked_at.is_some() {
            return Ok(false);
        }
        row.revoked_at = Some(revoked_at);
        row.active = false;
        Ok(true)
    }

    fn delete_expired(&self, cutoff: i64, batch_size: u32, dry_run: bool) -> Result<u64, String> {
        let mut rows = self.rows.lock().map_err(|_| "token store poisoned".to_string())?;
        let limit = batch_size as usize;
        let matching: Vec<usize> =
            rows.iter().enumerate().filter(|(_, row)| row.expires_at < cutoff).map(|(index, _)| index).take(limit).collect();
        let count = matching.len() as u64;
        if !dry_run {
            for index in matching.into_iter().rev() {
                rows.remove(index);
            }
        }
        Ok(count)
    }
}

/// Tenant-scoped allow-list rules.
#[derive(Default)]
pub struct MemoryRuleStore {
    rows: Mutex<Vec<ToolAllowListRule>>,
}

impl RuleStore for MemoryRuleStore {
    fn active_rules(&self, tenant_id: &TenantId) -> Result<Vec<ToolAllowListRule>, String> {
        let rows = self.rows.lock().map_err(|_| "rule store poisoned".to_string())?;
        Ok(rows.iter().filter(|rule| &rule.tenant_id == tenant_id && rule.active).cloned().collect())
    }

    fn insert(&self, rule: &ToolAllowListRule) -> Result<(), String> {
        self.rows.lock().map_err(|_| "rule store poisoned".to_string())?.push(rule.clone());
        Ok(())
    }
}

/// Recorded capability violations.
#[derive(Default)]
pub struct MemoryViolationStore {
    rows: Mutex<Vec<CapabilityViolation>>,
}

impl ViolationStore for MemoryViolationStore {
    fn insert(&self, violation: &CapabilityViolation) -> Result<(), String> {
        self.rows.lock().map_err(|_| "violation store poisoned".to_string())?.push(violation.clone());
        Ok(())
    }

    fn in_range(&self, tenant_id: &TenantId, since: i64, until: i64) -> Result<Vec<CapabilityViolation>, String> {
        let rows = self.rows.lock().map_err(|_| "violation store poisoned".to_string())?;
        Ok(rows
            .iter()
            .filter(|row| &row.tenant_id == tenant_id && row.occurred_at >= since && row.occurred_at < until)
            .cloned()
            .collect())
    }
}

/// Recorded successful capability uses.
#[derive(Default)]
pub struct MemoryUsageStore {
    rows: Mutex<Vec<UsageRecord>>,
}

impl UsageStore for MemoryUsageStore {
    fn insert(&self, record: &UsageRecord) -> Result<(), String> {
        self.rows.lock().map_err(|_| "usage store poisoned".to_string())?.push(record.clone());
        Ok(())
    }

    fn in_range(&self, tenant_id: &TenantId, since: i64, until: i64) -> Result<Vec<UsageRecord>, String> {
        let rows = self.rows.lock().map_err(|_| "usage store poisoned".to_string())?;
        Ok(rows
            .iter()
            .filter(|row| &row.tenant_id == tenant_id && row.used_at >= since && row.used_at < until)
            .cloned()
            .collect())
    }
}

/// Append-only audit trail, kept in memory; failures never propagate, per
/// the trait's documented best-effort contract.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl AuditSink for MemoryAuditSink {
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
        let entry = AuditLogEntry {
            audit_id,
            tenant_id,
            token_id,
            operation,
            status,
            error,
            correlation_id: correlation_id.to_string(),
            recorded_at,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

struct ReplayEntry {
    expires_at: i64,
}

/// Thread-safe replay protector: records presented token hashes and reports
/// reuse within the token's own validity window (spec §4.2).
#[derive(Default)]
pub struct MemoryReplayProtector {
    seen: Mutex<std::collections::HashMap<String, ReplayEntry>>,
}

impl ReplayProtector for MemoryReplayProtector {
    fn check_and_record(
        &self,
        token_hash: &str,
        _jti: &Jti,
        expires_at: i64,
        now: i64,
        _context: &ReplayContext,
    ) -> ReplayOutcome {
        let Ok(mut seen) = self.seen.lock() else {
            return ReplayOutcome { is_replay: false };
        };
        seen.retain(|_, entry| entry.expires_at > now);
        let is_replay = seen.contains_key(token_hash);
        seen.insert(token_hash.to_string(), ReplayEntry { expires_at });
        ReplayOutcome { is_replay }
    }
}
