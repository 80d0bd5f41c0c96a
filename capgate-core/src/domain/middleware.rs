// capgate-core/src/domain/middleware.rs
// ============================================================================
// Module: Enforcement Middleware (component E)
// Description: Composes token verification, capability checking, and
//              violation logging into a single per-request gate.
// Purpose: Give HTTP/MCP transports one call that either authorizes a tool
//          invocation or records why it didn't, per spec §4.4.
// Dependencies: crate::domain::{token, capability, violation, ids, errors}
// ============================================================================

//! ## Overview
//! [`EnforcementMiddleware::enforce`] is the single entry point transports
//! should call before dispatching a tool invocation: verify the presented
//! token, then check the verified capabilities against the tenant's rule
//! set, logging a [`CapabilityViolation`] for any denial along the way.

use crate::core::identifiers::TenantId;
use crate::domain::capability::CapabilityChecker;
use crate::domain::errors::ErrorCategory;
use crate::domain::ids::RuleId;
use crate::domain::ids::ViolationId;
use crate::domain::token::TokenService;
use crate::domain::violation::CapabilityViolation;
use crate::domain::violation::ViolationLogger;
use crate::domain::violation::ViolationType;

/// Generates identifiers for rows the middleware creates. Kept as a trait so
/// tests can supply deterministic ids without pulling in `uuid` at the call
/// site.
pub trait ViolationIdFactory {
    /// Returns a fresh [`ViolationId`].
    fn next(&self) -> ViolationId;
}

/// Generates ids via `uuid::Uuid::new_v4`.
#[derive(Default)]
pub struct UuidViolationIdFactory;

impl ViolationIdFactory for UuidViolationIdFactory {
    fn next(&self) -> ViolationId {
        ViolationId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Result of an [`EnforcementMiddleware::enforce`] call.
#[derive(Debug, Clone)]
pub enum EnforcementOutcome {
    /// The call is authorized.
    Allowed {
        /// Subject the presented token belonged to.
        subject: String,
        /// The rule that authorized the call.
        rule_id: RuleId,
    },
    /// The call was denied; a violation row was recorded.
    Denied {
        /// The category the denial maps to, for HTTP status selection.
        category: ErrorCategory,
        /// The violation row that was recorded.
        violation: CapabilityViolation,
    },
}

/// Composes a [`TokenService`], [`CapabilityChecker`], and [`ViolationLogger`]
/// into one enforcement call.
pub struct EnforcementMiddleware<'a> {
    tokens: &'a TokenService<'a>,
    capabilities: &'a CapabilityChecker<'a>,
    violations: &'a ViolationLogger<'a>,
    ids: &'a dyn ViolationIdFactory,
}

impl<'a> EnforcementMiddleware<'a> {
    /// Builds middleware over the given collaborators.
    #[must_use]
    pub fn new(
        tokens: &'a TokenService<'a>,
        capabilities: &'a CapabilityChecker<'a>,
        violations: &'a ViolationLogger<'a>,
        ids: &'a dyn ViolationIdFactory,
    ) -> Self {
        Self {
            tokens,
            capabilities,
            violations,
            ids,
        }
    }

    /// Verifies `token`, intersects its granted capabilities with
    /// `required_capabilities` (spec §4.4 step 3), then checks the
    /// intersection against `tool_name`/`action` for `tenant_id` (step 4),
    /// recording a violation for any denial.
    pub fn enforce(
        &self,
        token: &str,
        tenant_id: &TenantId,
        required_capabilities: &[String],
        tool_name: &str,
        action: Option<&str>,
        now: i64,
        correlation_id: &str,
    ) -> EnforcementOutcome {
        let label = required_capabilities.join(",");
        let verify_outcome = self.tokens.verify(token, tenant_id, now, correlation_id);
        let Some(payload) = verify_outcome.payload else {
            let violation = self.record(
                tenant_id,
                None,
                ViolationType::TokenRejected,
                &label,
                None,
                correlation_id,
                now,
            );
            return EnforcementOutcome::Denied {
                category: ErrorCategory::Authorization,
                violation,
            };
        };

        let granted: Vec<String> = payload
            .cap
            .iter()
            .filter(|granted| {
                required_capabilities
                    .iter()
                    .any(|required| crate::domain::capability::capability_covers(granted, required))
            })
            .cloned()
            .collect();
        if granted.is_empty() {
            let violation = self.record(
                tenant_id,
                Some(payload.sub),
                ViolationType::MissingCapability,
                &label,
                Some(tool_name.to_string()),
                correlation_id,
                now,
            );
            return EnforcementOutcome::Denied {
                category: ErrorCategory::Authorization,
                violation,
            };
        }

        let result = self.capabilities.check(tenant_id, &granted, tool_name, action, now);
        match result {
            Ok(result) if result.allowed => {
                let rule_id = result
                    .matched_rules
                    .first()
                    .cloned()
                    .unwrap_or_else(|| RuleId::new("unknown"));
                EnforcementOutcome::Allowed {
                    subject: payload.sub,
                    rule_id,
                }
            }
            _ => {
                let violation = self.record(
                    tenant_id,
                    Some(payload.sub),
                    ViolationType::ToolNotAllowed,
                    &label,
                    Some(tool_name.to_string()),
                    correlation_id,
                    now,
                );
                EnforcementOutcome::Denied {
                    category: ErrorCategory::Authorization,
                    violation,
                }
            }
        }
    }

    fn record(
        &self,
        tenant_id: &TenantId,
        subject: Option<String>,
        violation_type: ViolationType,
        required: &str,
        tool_name: Option<String>,
        correlation_id: &str,
        now: i64,
    ) -> CapabilityViolation {
        self.violations
            .record(
                self.ids.next(),
                tenant_id.clone(),
                subject,
                violation_type,
                required.to_string(),
                tool_name,
                correlation_id,
                now,
            )
            .unwrap_or_else(|_| CapabilityViolation {
                violation_id: self.ids.next(),
                tenant_id: tenant_id.clone(),
                subject: None,
                violation_type,
                severity: violation_type.default_severity(),
                required_capability: required.to_string(),
                tool_name: None,
                correlation_id: correlation_id.to_string(),
                occurred_at: now,
            })
    }
}
