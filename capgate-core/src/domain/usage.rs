// capgate-core/src/domain/usage.rs
// ============================================================================
// Module: Usage Tracker (component D, part 2)
// Description: Per-token, per-capability usage records and aggregates.
// Purpose: Feed rate-based drift detection and tenant usage reporting.
// Dependencies: crate::core::identifiers, crate::domain::ids
// ============================================================================

//! ## Overview
//! Every successful capability check ([`crate::domain::capability::CheckResult::allowed`])
//! produces a [`UsageRecord`]. These records are the raw input to the Drift
//! Detector's rolling baseline (spec §4.6) and to per-tenant usage reports.

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::domain::ids::TokenId;
use crate::domain::ids::UsageId;

/// One recorded successful capability use (spec §3 `UsageRecord`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Row identifier.
    pub usage_id: UsageId,
    /// Tenant the use occurred in.
    pub tenant_id: TenantId,
    /// The token presented.
    pub token_id: TokenId,
    /// The capability that authorized the call.
    pub capability_name: String,
    /// The tool that was invoked.
    pub tool_name: String,
    /// Unix-seconds timestamp.
    pub used_at: i64,
}

/// Storage contract for usage rows.
pub trait UsageStore {
    /// Appends a usage row.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn insert(&self, record: &UsageRecord) -> Result<(), String>;

    /// Returns usage rows for a tenant within `[since, until)`, ordered by
    /// `used_at` ascending.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn in_range(&self, tenant_id: &TenantId, since: i64, until: i64) -> Result<Vec<UsageRecord>, String>;
}

/// Per-capability call counts over a time range (spec §4.4 stats
/// aggregation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Total calls in range.
    pub total_calls: u64,
    /// Calls per capability name, in first-seen order.
    pub by_capability: Vec<(String, u64)>,
}

/// Computes [`UsageStats`] for a tenant over `[since, until)`.
///
/// # Errors
/// Returns an error string on store failure.
pub fn usage_stats(
    store: &dyn UsageStore,
    tenant_id: &TenantId,
    since: i64,
    until: i64,
) -> Result<UsageStats, String> {
    let rows = store.in_range(tenant_id, since, until)?;
    let mut stats = UsageStats {
        total_calls: rows.len() as u64,
        by_capability: Vec::new(),
    };
    for row in rows {
        match stats
            .by_capability
            .iter_mut()
            .find(|(name, _)| name == &row.capability_name)
        {
            Some((_, count)) => *count += 1,
            None => stats.by_capability.push((row.capability_name.clone(), 1)),
        }
    }
    Ok(stats)
}
