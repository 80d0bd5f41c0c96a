// capgate-core/src/domain/plan/model.rs
// ============================================================================
// Module: Plan Compiler — data model (component I, part 1)
// Description: ExecutionStep/ExecutionFlow/ExecutablePlan and their satellite
//              metadata types.
// Purpose: Shared types referenced by compiler.rs, optimizer.rs, validator.rs,
//          dependency.rs, and cache.rs.
// Dependencies: serde, serde_jcs, sha2, crate::core::identifiers,
//               crate::domain::ids
// ============================================================================

//! ## Overview
//! An [`ExecutablePlan`] is the compiled, hash-addressed output of the Plan
//! Compiler (spec §4.7). Its canonical hash excludes `plan_id` and most of
//! `metadata` so that two compilations of the same capsule at the same
//! optimization level produce byte-identical hashes (spec §8 invariant 1).

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::TenantId;
use crate::domain::errors::PlanCompileError;
use crate::domain::ids::FlowId;
use crate::domain::ids::PlanId;
use crate::domain::ids::StepId;

/// A single unit of work within an [`ExecutionFlow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Identifier unique within its flow.
    pub step_id: StepId,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// One of `action`, `condition`, `loop`, `parallel`, `sequence`.
    pub step_type: String,
    /// Verb performed, when `step_type == "action"`.
    pub action: Option<String>,
    /// Tool invoked by this step, if any.
    pub tool: Option<String>,
    /// Free-form parameters passed to the tool/action.
    pub parameters: serde_json::Value,
    /// Named inputs; each value names the producing step's output key.
    pub inputs: HashMap<String, String>,
    /// Named outputs this step produces.
    pub outputs: HashMap<String, String>,
    /// Explicit step ids this step must run after.
    pub depends_on: Vec<String>,
    /// Free-form condition expressions gating this step.
    pub conditions: Vec<String>,
    /// Optional retry policy.
    pub retry_policy: Option<RetryPolicy>,
    /// Execution timeout in seconds.
    pub timeout: Option<u64>,
    /// Free-form metadata, mutated by the optimizer.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Free-form labels.
    pub tags: Vec<String>,
}

/// A step's retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts; must be positive.
    pub max_attempts: u32,
    /// Backoff strategy: `fixed`, `exponential`, or `linear`.
    pub backoff: String,
}

/// An ordered sequence of steps within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFlow {
    /// Identifier unique within the plan.
    pub flow_id: FlowId,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Steps in this flow.
    pub steps: Vec<ExecutionStep>,
    /// Whether independent steps in this flow may run concurrently.
    pub parallel_execution: bool,
    /// Upper bound on concurrently running steps, when parallel.
    pub max_concurrency: Option<usize>,
    /// Behavior on step failure: `stop` or `continue`.
    pub on_failure: String,
    /// Step ids to run, in order, if this flow fails.
    pub rollback_steps: Vec<String>,
    /// Free-form metadata, mutated by the optimizer.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Compute resources a plan is expected to consume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// CPU request, e.g. `"500m"`.
    pub cpu: Option<String>,
    /// Memory request, e.g. `"256Mi"`.
    pub memory: Option<String>,
    /// Storage request.
    pub storage: Option<String>,
    /// Whether the plan needs outbound network access.
    pub network_access: bool,
    /// Named external services this plan depends on.
    pub external_services: Vec<String>,
    /// Preferred execution runtime, if pinned.
    pub runtime: Option<String>,
    /// Capability names the resource layer should provision.
    pub capabilities: Vec<String>,
}

impl ResourceRequirement {
    fn defaulted() -> Self {
        Self {
            network_access: true,
            ..Self::default()
        }
    }
}

/// Security posture extracted from the source capsule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    /// Tools the plan is permitted to invoke; empty means unrestricted.
    pub allowed_tools: Vec<String>,
    /// Capabilities a caller must present to run this plan.
    pub required_capabilities: Vec<String>,
    /// Policy names referenced by this plan.
    pub policy_refs: Vec<String>,
    /// Whether a human approval gate is required before execution.
    pub requires_approval: bool,
    /// Rules describing who may approve.
    pub approval_rules: Vec<String>,
    /// Data sensitivity classification, if declared.
    pub data_classification: Option<String>,
    /// PII handling directive, if declared.
    pub pii_handling: Option<String>,
}

/// Provenance and compilation bookkeeping for a plan.
///
/// Only `source_capsule_checksum`, `resolved_dependencies`, and
/// `optimization_level` participate in [`ExecutablePlan::calculate_hash`];
/// every other field may change across re-compilations without affecting
/// the plan's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Name of the capsule this plan was compiled from.
    pub source_capsule_name: String,
    /// Version of the capsule this plan was compiled from.
    pub source_capsule_version: String,
    /// Checksum of the capsule's source definition.
    pub source_capsule_checksum: String,
    /// Unix-seconds compilation timestamp.
    pub compiled_at: i64,
    /// Compiler version string.
    pub compiler_version: String,
    /// Dependencies resolved during compilation.
    pub resolved_dependencies: Vec<ResolvedDependencyRecord>,
    /// Optimization level applied (`none`, `basic`, `standard`, `aggressive`).
    pub optimization_level: String,
    /// Free-form notes appended by the optimizer.
    pub optimization_notes: Vec<String>,
    /// Result of the final validation pass.
    pub validation_status: String,
    /// Non-fatal validation warnings.
    pub validation_warnings: Vec<String>,
    /// Estimated wall-clock duration in seconds.
    pub estimated_duration: Option<f64>,
    /// Estimated execution cost in dollars.
    pub estimated_cost: Option<f64>,
}

/// One resolved dependency, as recorded in [`PlanMetadata::resolved_dependencies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDependencyRecord {
    /// Dependency name.
    pub name: String,
    /// Resolved version.
    pub version: String,
    /// Whether the dependency was declared optional.
    pub optional: bool,
}

/// The compiled, cacheable, executable output of the Plan Compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutablePlan {
    /// Unique plan identifier; excluded from the canonical hash.
    pub plan_id: PlanId,
    /// SHA-256 hex digest of the plan's canonical content.
    pub plan_hash: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Plan name, taken from the source capsule.
    pub name: String,
    /// Plan version, taken from the source capsule.
    pub version: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Execution flows that make up this plan.
    pub flows: Vec<ExecutionFlow>,
    /// Flow id to run first / as the plan's entry point.
    pub main_flow: String,
    /// Aggregate resource requirements.
    pub resource_requirements: ResourceRequirement,
    /// Aggregate security posture.
    pub security_context: SecurityContext,
    /// Compilation provenance and bookkeeping.
    pub metadata: PlanMetadata,
    /// Free-form configuration passed through from the capsule.
    pub configuration: serde_json::Map<String, serde_json::Value>,
    /// Free-form variables passed through from the capsule.
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// The subset of an [`ExecutablePlan`] that participates in its content hash
/// (spec §6 canonical plan serialization).
#[derive(Serialize)]
struct HashableContent<'a> {
    tenant_id: &'a TenantId,
    name: &'a str,
    version: &'a str,
    description: &'a Option<String>,
    flows: &'a [ExecutionFlow],
    main_flow: &'a str,
    resource_requirements: &'a ResourceRequirement,
    security_context: &'a SecurityContext,
    source_capsule_checksum: &'a str,
    resolved_dependencies: &'a [ResolvedDependencyRecord],
    optimization_level: &'a str,
    configuration: &'a serde_json::Map<String, serde_json::Value>,
    variables: &'a serde_json::Map<String, serde_json::Value>,
}

/// Arguments accepted by [`ExecutablePlan::create`].
#[allow(missing_docs, reason = "fields are self-explanatory mirrors of ExecutablePlan")]
pub struct NewExecutablePlan {
    pub plan_id: PlanId,
    pub tenant_id: TenantId,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub flows: Vec<ExecutionFlow>,
    pub main_flow: String,
    pub resource_requirements: ResourceRequirement,
    pub security_context: SecurityContext,
    pub metadata: PlanMetadata,
    pub configuration: serde_json::Map<String, serde_json::Value>,
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl ExecutablePlan {
    /// Builds a plan and computes its canonical hash in one step, matching
    /// the Python original's `ExecutablePlan.create` classmethod.
    ///
    /// # Errors
    /// Returns [`PlanCompileError::Internal`] if canonicalization fails.
    pub fn create(args: NewExecutablePlan) -> Result<Self, PlanCompileError> {
        let mut plan = Self {
            plan_id: args.plan_id,
            plan_hash: String::new(),
            tenant_id: args.tenant_id,
            name: args.name,
            version: args.version,
            description: args.description,
            flows: args.flows,
            main_flow: args.main_flow,
            resource_requirements: args.resource_requirements,
            security_context: args.security_context,
            metadata: args.metadata,
            configuration: args.configuration,
            variables: args.variables,
        };
        plan.plan_hash = plan.calculate_hash()?;
        Ok(plan)
    }

    /// Recomputes this plan's canonical content hash without mutating it.
    ///
    /// # Errors
    /// Returns [`PlanCompileError::Internal`] if canonicalization fails.
    pub fn calculate_hash(&self) -> Result<String, PlanCompileError> {
        let hashable = HashableContent {
            tenant_id: &self.tenant_id,
            name: &self.name,
            version: &self.version,
            description: &self.description,
            flows: &self.flows,
            main_flow: &self.main_flow,
            resource_requirements: &self.resource_requirements,
            security_context: &self.security_context,
            source_capsule_checksum: &self.metadata.source_capsule_checksum,
            resolved_dependencies: &self.metadata.resolved_dependencies,
            optimization_level: &self.metadata.optimization_level,
            configuration: &self.configuration,
            variables: &self.variables,
        };
        let canonical =
            serde_jcs::to_string(&hashable).map_err(|err| PlanCompileError::Internal(err.to_string()))?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("{digest:x}"))
    }
}

/// A capsule definition supplied as input to the Plan Compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleDefinition {
    /// Capsule name.
    pub name: String,
    /// Capsule version.
    pub version: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Raw automation definition (`workflow`/`steps`/`pipelines`/free-form).
    pub automation: serde_json::Value,
    /// Tool names this capsule may invoke.
    pub tools: Vec<String>,
    /// Policy names this capsule references.
    pub policies: Vec<String>,
    /// Dependency specs, e.g. `"payment-processor@^1.2.0"`.
    pub dependencies: Vec<String>,
    /// Free-form metadata (`resources`, `required_capabilities`, etc).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for ResourceRequirement {
    fn default() -> Self {
        Self::defaulted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(flow_id: &str) -> ExecutionFlow {
        ExecutionFlow {
            flow_id: FlowId::new(flow_id),
            name: "main".to_string(),
            description: None,
            steps: Vec::new(),
            parallel_execution: false,
            max_concurrency: None,
            on_failure: "stop".to_string(),
            rollback_steps: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    fn metadata() -> PlanMetadata {
        PlanMetadata {
            source_capsule_name: "demo".to_string(),
            source_capsule_version: "1.0.0".to_string(),
            source_capsule_checksum: "abc123".to_string(),
            compiled_at: 1_000,
            compiler_version: "1.0.0".to_string(),
            resolved_dependencies: Vec::new(),
            optimization_level: "standard".to_string(),
            optimization_notes: Vec::new(),
            validation_status: "valid".to_string(),
            validation_warnings: Vec::new(),
            estimated_duration: None,
            estimated_cost: None,
        }
    }

    fn new_plan_args() -> NewExecutablePlan {
        NewExecutablePlan {
            plan_id: PlanId::new("plan-1"),
            tenant_id: TenantId::new("tenant-a"),
            name: "demo".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            flows: vec![flow("main")],
            main_flow: "main".to_string(),
            resource_requirements: ResourceRequirement::default(),
            security_context: SecurityContext::default(),
            metadata: metadata(),
            configuration: serde_json::Map::new(),
            variables: serde_json::Map::new(),
        }
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = ExecutablePlan::create(new_plan_args()).expect("compiles");
        let mut args = new_plan_args();
        args.plan_id = PlanId::new("plan-2");
        let b = ExecutablePlan::create(args).expect("compiles");
        assert_eq!(a.plan_hash, b.plan_hash);
        assert_ne!(a.plan_id, b.plan_id);
    }

    #[test]
    fn changing_hashed_metadata_changes_the_hash() {
        let a = ExecutablePlan::create(new_plan_args()).expect("compiles");
        let mut args = new_plan_args();
        args.metadata.source_capsule_checksum = "different".to_string();
        let b = ExecutablePlan::create(args).expect("compiles");
        assert_ne!(a.plan_hash, b.plan_hash);
    }

    #[test]
    fn changing_unhashed_metadata_leaves_the_hash_unchanged() {
        let a = ExecutablePlan::create(new_plan_args()).expect("compiles");
        let mut args = new_plan_args();
        args.metadata.compiled_at = 9_999;
        args.metadata.optimization_notes.push("noted".to_string());
        let b = ExecutablePlan::create(args).expect("compiles");
        assert_eq!(a.plan_hash, b.plan_hash);
    }

    #[test]
    fn default_resource_requirement_allows_network() {
        assert!(ResourceRequirement::default().network_access);
    }
}
