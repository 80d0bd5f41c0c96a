// capgate-core/src/domain/ids.rs
// ============================================================================
// Module: Capability Enforcement Identifiers
// Description: Strongly typed identifiers for the capability enforcement core.
// Purpose: Provide stable, serializable IDs matching crate::core::identifiers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! These identifiers extend `crate::core::identifiers` (which already supplies
//! `TenantId`, `PolicyId`, and `CorrelationId`) with the additional ID types
//! needed by the token service, capability checker, policy DSL, plan compiler,
//! and orchestrator.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(TokenId, "Capability token identifier (also used as the JWT `jti`).");
string_id!(Jti, "JWT `jti` claim, identical in domain to a `TokenId`.");
string_id!(RuleId, "Tool allow-list rule identifier.");
string_id!(ViolationId, "Capability violation identifier.");
string_id!(UsageId, "Usage record identifier.");
string_id!(AuditId, "Audit log entry identifier.");
string_id!(CleanupJobId, "Token cleanup job identifier.");
string_id!(PlanId, "Compiled plan identifier.");
string_id!(FlowId, "Execution flow identifier within a plan.");
string_id!(StepId, "Execution step identifier within a flow.");
string_id!(DriftAlertId, "Drift alert identifier.");
string_id!(AlertRuleId, "Violation-reporter alert rule identifier.");
string_id!(ReportId, "Violation report identifier.");
string_id!(EngineRunId, "Orchestrator executor run identifier.");
string_id!(ReceiptId, "Execution receipt identifier.");
string_id!(ApprovalId, "Approval request identifier.");
string_id!(CapsuleId, "Capsule source identifier compiled into a plan.");

impl From<TokenId> for Jti {
    fn from(value: TokenId) -> Self {
        Self::new(value.as_str().to_string())
    }
}
