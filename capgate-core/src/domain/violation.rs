// capgate-core/src/domain/violation.rs
// ============================================================================
// Module: Violation Logger (component D, part 1)
// Description: Structured records of denied capability checks.
// Purpose: Give the Violation Reporter and operators a durable, queryable
//          trail of every denial, per spec §3/§4.4.
// Dependencies: crate::core::identifiers, crate::domain::{ids, capability}
// ============================================================================

//! ## Overview
//! Every denied [`crate::domain::capability::CheckResult`] becomes a
//! [`CapabilityViolation`] row. Severity is derived from the kind
//! of denial: a caller using a tool entirely outside its granted
//! capabilities is more severe than one whose capability is valid but whose
//! specific tool call the tenant hasn't enabled.

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::domain::ids::ViolationId;

/// The kind of denial a violation records (spec §3 `ViolationType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// No granted capability covers the one required.
    MissingCapability,
    /// The capability was held but no active rule allowed the tool call.
    ToolNotAllowed,
    /// The presented token failed verification.
    TokenRejected,
}

/// How serious a violation is, used to drive alerting thresholds in the
/// Violation Reporter (spec component H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Worth recording, not worth paging on its own.
    Low,
    /// A pattern of these should be investigated.
    Medium,
    /// Should be surfaced promptly.
    High,
    /// Indicates likely malicious or severely misconfigured activity.
    Critical,
}

impl ViolationType {
    /// Returns the default severity for this violation type, absent any
    /// rate-based escalation performed by the Drift Detector.
    #[must_use]
    pub const fn default_severity(self) -> ViolationSeverity {
        match self {
            Self::MissingCapability => ViolationSeverity::Medium,
            Self::ToolNotAllowed => ViolationSeverity::Low,
            Self::TokenRejected => ViolationSeverity::High,
        }
    }
}

/// A recorded denial (spec §3 `CapabilityViolation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_field_names, reason = "field names mirror the stored row schema")]
pub struct CapabilityViolation {
    /// Row identifier.
    pub violation_id: ViolationId,
    /// Tenant the violation occurred in.
    pub tenant_id: TenantId,
    /// Subject that attempted the call, if known.
    pub subject: Option<String>,
    /// The kind of denial.
    pub violation_type: ViolationType,
    /// Severity of the violation.
    pub severity: ViolationSeverity,
    /// The capability that was required.
    pub required_capability: String,
    /// The tool name that was attempted, if applicable.
    pub tool_name: Option<String>,
    /// Caller-supplied correlation id.
    pub correlation_id: String,
    /// Unix-seconds timestamp.
    pub occurred_at: i64,
}

/// Storage contract for violation rows.
pub trait ViolationStore {
    /// Appends a violation row.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn insert(&self, violation: &CapabilityViolation) -> Result<(), String>;

    /// Returns violations for a tenant within `[since, until)`.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn in_range(&self, tenant_id: &TenantId, since: i64, until: i64) -> Result<Vec<CapabilityViolation>, String>;
}

/// Appends violations through a [`ViolationStore`].
pub struct ViolationLogger<'a> {
    store: &'a dyn ViolationStore,
}

impl<'a> ViolationLogger<'a> {
    /// Builds a logger over `store`.
    #[must_use]
    pub fn new(store: &'a dyn ViolationStore) -> Self {
        Self { store }
    }

    /// Records a violation, deriving its default severity from its type.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    pub fn record(
        &self,
        violation_id: ViolationId,
        tenant_id: TenantId,
        subject: Option<String>,
        violation_type: ViolationType,
        required_capability: String,
        tool_name: Option<String>,
        correlation_id: &str,
        occurred_at: i64,
    ) -> Result<CapabilityViolation, String> {
        let violation = CapabilityViolation {
            violation_id,
            tenant_id,
            subject,
            violation_type,
            severity: violation_type.default_severity(),
            required_capability,
            tool_name,
            correlation_id: correlation_id.to_string(),
            occurred_at,
        };
        self.store.insert(&violation)?;
        Ok(violation)
    }
}

/// Aggregate violation counts by type over a time range (spec §4.4 stats
/// aggregation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationStats {
    /// Total violations in range.
    pub total: u64,
    /// Count with [`ViolationType::MissingCapability`].
    pub missing_capability: u64,
    /// Count with [`ViolationType::ToolNotAllowed`].
    pub tool_not_allowed: u64,
    /// Count with [`ViolationType::TokenRejected`].
    pub token_rejected: u64,
}

/// Computes [`ViolationStats`] for a tenant over `[since, until)`.
///
/// # Errors
/// Returns an error string on store failure.
pub fn violation_stats(
    store: &dyn ViolationStore,
    tenant_id: &TenantId,
    since: i64,
    until: i64,
) -> Result<ViolationStats, String> {
    let rows = store.in_range(tenant_id, since, until)?;
    let mut stats = ViolationStats::default();
    for row in rows {
        stats.total += 1;
        match row.violation_type {
            ViolationType::MissingCapability => stats.missing_capability += 1,
            ViolationType::ToolNotAllowed => stats.tool_not_allowed += 1,
            ViolationType::TokenRejected => stats.token_rejected += 1,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct MemoryViolationStore {
        rows: RefCell<Vec<CapabilityViolation>>,
    }

    impl ViolationStore for MemoryViolationStore {
        fn insert(&self, violation: &CapabilityViolation) -> Result<(), String> {
            self.rows.borrow_mut().push(violation.clone());
            Ok(())
        }

        fn in_range(&self, tenant_id: &TenantId, since: i64, until: i64) -> Result<Vec<CapabilityViolation>, String> {
            Ok(self
                .rows
                .borrow()
                .iter()
                .filter(|row| &row.tenant_id == tenant_id && row.occurred_at >= since && row.occurred_at < until)
                .cloned()
                .collect())
        }
    }

    #[test]
    fn record_derives_severity_from_type() {
        let store = MemoryViolationStore::default();
        let logger = ViolationLogger::new(&store);
        let tenant = TenantId::new("tenant-a");
        let violation = logger
            .record(
                ViolationId::new("v1"),
                tenant,
                Some("svc-a".to_string()),
                ViolationType::TokenRejected,
                "plan_execution".to_string(),
                None,
                "c1",
                1_000,
            )
            .expect("record succeeds");
        assert_eq!(violation.severity, ViolationSeverity::High);
    }

    #[test]
    fn stats_aggregate_by_type_within_range() {
        let store = MemoryViolationStore::default();
        let logger = ViolationLogger::new(&store);
        let tenant = TenantId::new("tenant-a");
        logger
            .record(
                ViolationId::new("v1"),
                tenant.clone(),
                None,
                ViolationType::MissingCapability,
                "write".to_string(),
                None,
                "c1",
                1_000,
            )
            .expect("record succeeds");
        logger
            .record(
                ViolationId::new("v2"),
                tenant.clone(),
                None,
                ViolationType::ToolNotAllowed,
                "write".to_string(),
                Some("delete".to_string()),
                "c2",
                1_001,
            )
            .expect("record succeeds");

        let stats = violation_stats(&store, &tenant, 0, 2_000).expect("stats succeed");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.missing_capability, 1);
        assert_eq!(stats.tool_not_allowed, 1);
    }
}
