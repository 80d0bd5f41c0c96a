// capgate-core/src/domain/plan/compiler.rs
// ============================================================================
// Module: Plan Compiler (component I, part 3)
// Description: Capsule → flows → ExecutablePlan pipeline.
// Purpose: Implements spec §4.7 stages 1-8 over the model/dependency/
//          optimizer/validator submodules.
// Dependencies: uuid, sha2, time, crate::domain::{ids, errors, plan::*}
// ============================================================================

//! ## Overview
//! [`PlanCompiler::compile_capsule`] is the single entry point for turning a
//! [`CapsuleDefinition`] into an [`ExecutablePlan`]: resolve dependencies,
//! transform `automation` into flows, extract security/resource posture,
//! build metadata, construct and hash the plan, optimize, then validate.

use uuid::Uuid;

use crate::core::identifiers::TenantId;
use crate::domain::errors::PlanCompileError;
use crate::domain::ids::CapsuleId;
use crate::domain::ids::FlowId;
use crate::domain::ids::PlanId;
use crate::domain::ids::StepId;
use crate::domain::plan::dependency::DependencyRegistry;
use crate::domain::plan::dependency::resolve_dependencies;
use crate::domain::plan::model::CapsuleDefinition;
use crate::domain::plan::model::ExecutablePlan;
use crate::domain::plan::model::ExecutionFlow;
use crate::domain::plan::model::ExecutionStep;
use crate::domain::plan::model::NewExecutablePlan;
use crate::domain::plan::model::PlanMetadata;
use crate::domain::plan::model::ResolvedDependencyRecord;
use crate::domain::plan::model::ResourceRequirement;
use crate::domain::plan::model::SecurityContext;
use crate::domain::plan::optimizer::optimize_plan;
use crate::domain::plan::validator::PlanValidator;
use crate::domain::plan::validator::ValidationLevel;

/// Compiler version stamped onto every [`PlanMetadata`].
pub const COMPILER_VERSION: &str = "1.0.0";

/// Caller-tunable knobs for one compilation (spec §4.7 `CompilationRequest`).
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    /// One of `none`, `basic`, `standard`, `aggressive`.
    pub optimization_level: String,
    /// Whether an unresolved non-optional dependency fails compilation.
    pub validate_dependencies: bool,
    /// Validation strictness applied to the final plan.
    pub validation_level: ValidationLevel,
}

impl Default for CompilationRequest {
    fn default() -> Self {
        Self {
            optimization_level: "standard".to_string(),
            validate_dependencies: true,
            validation_level: ValidationLevel::Standard,
        }
    }
}

/// Outcome of [`PlanCompiler::compile_capsule`].
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// Whether the plan is valid and ready to execute.
    pub success: bool,
    /// The compiled plan, present even on validation failure so callers can
    /// inspect what would have run.
    pub plan: Option<ExecutablePlan>,
    /// Validation/compile errors.
    pub errors: Vec<String>,
    /// Non-fatal warnings from validation.
    pub warnings: Vec<String>,
    /// Dependency names that failed to resolve.
    pub unresolved_dependencies: Vec<String>,
    /// Dependency names that resolved to conflicting versions.
    pub dependency_conflicts: Vec<String>,
}

/// Compiles [`CapsuleDefinition`]s into [`ExecutablePlan`]s.
pub struct PlanCompiler<'a> {
    registry: &'a dyn DependencyRegistry,
}

impl<'a> PlanCompiler<'a> {
    /// Builds a compiler over a dependency registry.
    #[must_use]
    pub fn new(registry: &'a dyn DependencyRegistry) -> Self {
        Self { registry }
    }

    /// Runs the full compilation pipeline for one capsule.
    ///
    /// # Errors
    /// Returns [`PlanCompileError`] only for internal failures (hashing);
    /// resolution/validation problems are reported inside
    /// [`CompilationResult`] instead, matching the Python original's
    /// preference for a structured result over raised exceptions.
    pub fn compile_capsule(
        &self,
        capsule: &CapsuleDefinition,
        tenant_id: TenantId,
        request: &CompilationRequest,
        now: i64,
    ) -> Result<CompilationResult, PlanCompileError> {
        let resolution = resolve_dependencies(&capsule.dependencies, self.registry);

        if !resolution.success && request.validate_dependencies {
            return Ok(CompilationResult {
                success: false,
                plan: None,
                errors: vec!["dependency resolution failed".to_string()],
                warnings: Vec::new(),
                unresolved_dependencies: resolution.unresolved_dependencies,
                dependency_conflicts: resolution.conflicts,
            });
        }

        let flows = transform_automation_to_flows(&capsule.automation)?;
        let security_context = extract_security_context(capsule);
        let resource_requirements = extract_resource_requirements(capsule);
        let main_flow = flows.first().map_or_else(|| "main".to_string(), |f| f.flow_id.as_str().to_string());

        let resolved_dependencies: Vec<ResolvedDependencyRecord> = resolution
            .resolved
            .iter()
            .map(|dep| ResolvedDependencyRecord {
                name: dep.name.clone(),
                version: dep.version.clone(),
                optional: dep.optional,
            })
            .collect();

        let metadata = PlanMetadata {
            source_capsule_name: capsule.name.clone(),
            source_capsule_version: capsule.version.clone(),
            source_capsule_checksum: capsule_checksum(capsule),
            compiled_at: now,
            compiler_version: COMPILER_VERSION.to_string(),
            resolved_dependencies,
            optimization_level: request.optimization_level.clone(),
            optimization_notes: Vec::new(),
            validation_status: "valid".to_string(),
            validation_warnings: Vec::new(),
            estimated_duration: None,
            estimated_cost: None,
        };

        let plan = ExecutablePlan::create(NewExecutablePlan {
            plan_id: PlanId::new(Uuid::new_v4().to_string()),
            tenant_id,
            name: capsule.name.clone(),
            version: capsule.version.clone(),
            description: capsule.description.clone(),
            flows,
            main_flow,
            resource_requirements,
            security_context,
            metadata,
            configuration: serde_json::Map::new(),
            variables: serde_json::Map::new(),
        })?;

        let optimized = optimize_plan(plan, &request.optimization_level)?;

        let validator = PlanValidator::new();
        let validation = validator.validate_plan(&optimized, request.validation_level);

        Ok(CompilationResult {
            success: validation.valid,
            errors: validation.errors,
            warnings: validation.warnings,
            plan: Some(optimized),
            unresolved_dependencies: resolution.unresolved_dependencies,
            dependency_conflicts: resolution.conflicts,
        })
    }
}

/// A deterministic stand-in checksum for the capsule's source definition.
/// Production deployments would hash the capsule's signed source bytes;
/// here we hash its canonical JSON form so re-compiling the identical
/// capsule yields the identical checksum.
fn capsule_checksum(capsule: &CapsuleDefinition) -> String {
    use sha2::Digest;
    use sha2::Sha256;

    let canonical = serde_jcs::to_string(capsule).unwrap_or_default();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Dispatches on the shape of `automation` (spec §4.7 stage 2): a `workflow`
/// key becomes one flow, a `steps` array becomes one `main` flow, a
/// `pipelines` map becomes one flow per entry, and anything else becomes a
/// single default step carrying the raw automation as parameters.
fn transform_automation_to_flows(automation: &serde_json::Value) -> Result<Vec<ExecutionFlow>, PlanCompileError> {
    let Some(obj) = automation.as_object() else {
        return Ok(vec![default_flow(automation.clone())]);
    };

    if let Some(workflow) = obj.get("workflow") {
        return Ok(vec![transform_workflow_to_flow(workflow)]);
    }

    if let Some(steps) = obj.get("steps").and_then(serde_json::Value::as_array) {
        return Ok(vec![transform_steps_to_flow("main", steps)]);
    }

    if let Some(pipelines) = obj.get("pipelines").and_then(serde_json::Value::as_object) {
        return Ok(pipelines
            .iter()
            .map(|(name, stages)| transform_pipeline_to_flow(name, stages))
            .collect());
    }

    Ok(vec![default_flow(automation.clone())])
}

fn default_flow(automation: serde_json::Value) -> ExecutionFlow {
    ExecutionFlow {
        flow_id: FlowId::new("main"),
        name: "Default Flow".to_string(),
        description: None,
        steps: vec![ExecutionStep {
            step_id: StepId::new("default_step"),
            name: "Default Step".to_string(),
            description: None,
            step_type: "action".to_string(),
            action: Some("execute".to_string()),
            tool: None,
            parameters: automation,
            inputs: std::collections::HashMap::new(),
            outputs: std::collections::HashMap::new(),
            depends_on: Vec::new(),
            conditions: Vec::new(),
            retry_policy: None,
            timeout: None,
            metadata: serde_json::Map::new(),
            tags: Vec::new(),
        }],
        parallel_execution: false,
        max_concurrency: None,
        on_failure: "stop".to_string(),
        rollback_steps: Vec::new(),
        metadata: serde_json::Map::new(),
    }
}

fn transform_workflow_to_flow(workflow: &serde_json::Value) -> ExecutionFlow {
    let steps = workflow
        .get("steps")
        .and_then(serde_json::Value::as_array)
        .map(|steps| build_steps(steps, "step"))
        .unwrap_or_default();

    ExecutionFlow {
        flow_id: FlowId::new(str_field(workflow, "flow_id", "main")),
        name: str_field(workflow, "name", "Workflow"),
        description: workflow.get("description").and_then(serde_json::Value::as_str).map(str::to_string),
        steps,
        parallel_execution: bool_field(workflow, "parallel_execution"),
        max_concurrency: workflow.get("max_concurrency").and_then(serde_json::Value::as_u64).map(|v| v as usize),
        on_failure: str_field(workflow, "on_failure", "stop"),
        rollback_steps: string_array_field(workflow, "rollback_steps"),
        metadata: serde_json::Map::new(),
    }
}

fn transform_steps_to_flow(flow_id: &str, steps: &[serde_json::Value]) -> ExecutionFlow {
    ExecutionFlow {
        flow_id: FlowId::new(flow_id),
        name: "Main Flow".to_string(),
        description: None,
        steps: build_steps(steps, "step"),
        parallel_execution: false,
        max_concurrency: None,
        on_failure: "stop".to_string(),
        rollback_steps: Vec::new(),
        metadata: serde_json::Map::new(),
    }
}

fn transform_pipeline_to_flow(pipeline_name: &str, pipeline: &serde_json::Value) -> ExecutionFlow {
    let stages = pipeline.get("stages").and_then(serde_json::Value::as_array);
    let prefix = format!("{pipeline_name}_stage");
    let steps = stages.map(|stages| build_steps(stages, &prefix)).unwrap_or_default();

    ExecutionFlow {
        flow_id: FlowId::new(pipeline_name),
        name: format!("Pipeline: {pipeline_name}"),
        description: None,
        steps,
        parallel_execution: false,
        max_concurrency: None,
        on_failure: "stop".to_string(),
        rollback_steps: Vec::new(),
        metadata: serde_json::Map::new(),
    }
}

fn build_steps(raw_steps: &[serde_json::Value], id_prefix: &str) -> Vec<ExecutionStep> {
    raw_steps
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let default_id = format!("{id_prefix}_{i}");
            let default_name = if id_prefix == "step" { format!("Step {}", i + 1) } else { format!("Stage {}", i + 1) };

            ExecutionStep {
                step_id: StepId::new(str_field(raw, "step_id", &default_id)),
                name: str_field(raw, "name", &default_name),
                description: raw.get("description").and_then(serde_json::Value::as_str).map(str::to_string),
                step_type: str_field(raw, "step_type", "action"),
                action: raw.get("action").and_then(serde_json::Value::as_str).map(str::to_string),
                tool: raw.get("tool").and_then(serde_json::Value::as_str).map(str::to_string),
                parameters: raw.get("parameters").cloned().unwrap_or_else(|| serde_json::json!({})),
                inputs: string_map_field(raw, "inputs"),
                outputs: string_map_field(raw, "outputs"),
                depends_on: string_array_field(raw, "depends_on"),
                conditions: string_array_field(raw, "conditions"),
                retry_policy: None,
                timeout: raw.get("timeout").and_then(serde_json::Value::as_u64),
                metadata: serde_json::Map::new(),
                tags: string_array_field(raw, "tags"),
            }
        })
        .collect()
}

fn str_field(value: &serde_json::Value, key: &str, default: &str) -> String {
    value.get(key).and_then(serde_json::Value::as_str).unwrap_or(default).to_string()
}

fn bool_field(value: &serde_json::Value, key: &str) -> bool {
    value.get(key).and_then(serde_json::Value::as_bool).unwrap_or(false)
}

fn string_array_field(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn string_map_field(value: &serde_json::Value, key: &str) -> std::collections::HashMap<String, String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_object)
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

fn extract_security_context(capsule: &CapsuleDefinition) -> SecurityContext {
    SecurityContext {
        allowed_tools: capsule.tools.clone(),
        required_capabilities: string_array_field(&serde_json::Value::Object(capsule.metadata.clone()), "required_capabilities"),
        policy_refs: capsule.policies.clone(),
        requires_approval: bool_field(&serde_json::Value::Object(capsule.metadata.clone()), "requires_approval"),
        approval_rules: string_array_field(&serde_json::Value::Object(capsule.metadata.clone()), "approval_rules"),
        data_classification: capsule.metadata.get("data_classification").and_then(serde_json::Value::as_str).map(str::to_string),
        pii_handling: capsule.metadata.get("pii_handling").and_then(serde_json::Value::as_str).map(str::to_string),
    }
}

fn extract_resource_requirements(capsule: &CapsuleDefinition) -> ResourceRequirement {
    let Some(resources) = capsule.metadata.get("resources").and_then(serde_json::Value::as_object) else {
        return ResourceRequirement::default();
    };
    let resources = serde_json::Value::Object(resources.clone());
    ResourceRequirement {
        cpu: resources.get("cpu").and_then(serde_json::Value::as_str).map(str::to_string),
        memory: resources.get("memory").and_then(serde_json::Value::as_str).map(str::to_string),
        storage: resources.get("storage").and_then(serde_json::Value::as_str).map(str::to_string),
        network_access: resources.get("network_access").and_then(serde_json::Value::as_bool).unwrap_or(true),
        external_services: string_array_field(&resources, "external_services"),
        runtime: resources.get("runtime").and_then(serde_json::Value::as_str).map(str::to_string),
        capabilities: string_array_field(&resources, "capabilities"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyRegistry;
    impl DependencyRegistry for EmptyRegistry {
        fn available_versions(&self, _name: &str) -> Vec<String> {
            Vec::new()
        }

        fn capsule_info(&self, _name: &str, _version: &str) -> Option<(CapsuleId, Option<String>)> {
            None
        }
    }

    fn capsule(automation: serde_json::Value) -> CapsuleDefinition {
        CapsuleDefinition {
            name: "demo".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            automation,
            tools: vec!["http".to_string()],
            policies: Vec::new(),
            dependencies: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn steps_shape_compiles_into_one_main_flow() {
        let compiler = PlanCompiler::new(&EmptyRegistry);
        let automation = serde_json::json!({"steps": [{"tool": "http", "action": "get"}]});
        let result = compiler
            .compile_capsule(&capsule(automation), TenantId::new("tenant-a"), &CompilationRequest::default(), 1_000)
            .expect("compiles");
        assert!(result.success, "errors: {:?}", result.errors);
        let plan = result.plan.expect("plan present");
        assert_eq!(plan.flows.len(), 1);
        assert_eq!(plan.flows[0].flow_id.as_str(), "main");
        assert_eq!(plan.flows[0].steps[0].step_id.as_str(), "step_0");
    }

    #[test]
    fn unknown_automation_shape_falls_back_to_default_step() {
        let compiler = PlanCompiler::new(&EmptyRegistry);
        let automation = serde_json::json!({"custom_key": "value"});
        let result = compiler
            .compile_capsule(&capsule(automation), TenantId::new("tenant-a"), &CompilationRequest::default(), 1_000)
            .expect("compiles");
        let plan = result.plan.expect("plan present");
        assert_eq!(plan.flows[0].steps.len(), 1);
        assert_eq!(plan.flows[0].steps[0].step_id.as_str(), "default_step");
    }

    #[test]
    fn recompiling_identical_capsule_yields_identical_hash() {
        let compiler = PlanCompiler::new(&EmptyRegistry);
        let automation = serde_json::json!({"steps": [{"tool": "http", "action": "get"}]});
        let request = CompilationRequest { optimization_level: "none".to_string(), ..CompilationRequest::default() };
        let first = compiler
            .compile_capsule(&capsule(automation.clone()), TenantId::new("tenant-a"), &request, 1_000)
            .expect("compiles")
            .plan
            .expect("plan present");
        let second = compiler
            .compile_capsule(&capsule(automation), TenantId::new("tenant-a"), &request, 2_000)
            .expect("compiles")
            .plan
            .expect("plan present");
        assert_eq!(first.plan_hash, second.plan_hash);
    }

    #[test]
    fn pipelines_shape_produces_one_flow_per_pipeline() {
        let compiler = PlanCompiler::new(&EmptyRegistry);
        let automation = serde_json::json!({
            "pipelines": {
                "ingest": {"stages": [{"tool": "database"}]},
                "notify": {"stages": [{"tool": "email"}]}
            }
        });
        let result = compiler
            .compile_capsule(&capsule(automation), TenantId::new("tenant-a"), &CompilationRequest::default(), 1_000)
            .expect("compiles");
        let plan = result.plan.expect("plan present");
        assert_eq!(plan.flows.len(), 2);
    }
}
