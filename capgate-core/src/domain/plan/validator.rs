// capgate-core/src/domain/plan/validator.rs
// ============================================================================
// Module: Plan Compiler — validator (component I, part 5)
// Description: Structural, flow, step, security, resource, and dependency
//              validation plus lightweight performance analysis.
// Purpose: Implements spec §4.7 "Validation levels" and final compile stage.
// Dependencies: regex, crate::domain::plan::{model, dependency}
// ============================================================================

//! ## Overview
//! [`PlanValidator::validate_plan`] runs a fixed pipeline of checks over an
//! already-optimized [`ExecutablePlan`] and returns a [`PlanValidationResult`]
//! rather than raising: callers decide whether warnings are acceptable.
//! `strict` and `security-focused` tighten which findings become errors
//! rather than warnings (spec §4.7).

use std::collections::HashSet;

use regex::Regex;

use crate::domain::plan::dependency::analyze_flow;
use crate::domain::plan::model::ExecutablePlan;
use crate::domain::plan::model::ExecutionFlow;
use crate::domain::plan::model::ExecutionStep;

const ALLOWED_TOOLS: &[&str] = &[
    "http", "api", "database", "sql", "file", "compute", "transform", "notification", "email", "slack", "webhook",
    "schedule", "timer", "validator", "fraud_detector", "payment_gateway",
];

const SECURITY_SENSITIVE_TOOLS: &[&str] = &["database", "sql", "file", "http", "api"];

const MAX_RECOMMENDED_STEPS: usize = 50;
const MAX_RECOMMENDED_CHAIN_LENGTH: usize = 10;
const MAX_RECOMMENDED_SEQUENTIAL_STEPS: usize = 5;

/// How strictly [`PlanValidator::validate_plan`] should treat borderline
/// findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// Default checks; security posture is reported, not enforced.
    Standard,
    /// Security-sensitive tools require an explicit allowlist and approval
    /// gate, as a warning.
    Strict,
    /// Security-sensitive tools require an explicit allowlist, declared
    /// capabilities, and an approval gate, enforced as hard errors.
    SecurityFocused,
}

/// Outcome of [`PlanValidator::validate_plan`].
#[derive(Debug, Clone, Default)]
pub struct PlanValidationResult {
    /// Whether the plan has no errors (warnings do not affect this).
    pub valid: bool,
    /// Fatal findings.
    pub errors: Vec<String>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

/// Validates [`ExecutablePlan`]s against structural, security, and resource
/// rules.
#[derive(Debug, Default)]
pub struct PlanValidator;

impl PlanValidator {
    /// Builds a validator with the fixed allowlists above.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the full validation pipeline over `plan`.
    #[must_use]
    pub fn validate_plan(&self, plan: &ExecutablePlan, level: ValidationLevel) -> PlanValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.validate_structure(plan, &mut errors);

        for flow in &plan.flows {
            self.validate_flow(flow, &mut errors, &mut warnings);
        }

        self.validate_security(plan, level, &mut errors, &mut warnings);
        self.validate_resources(plan, level, &mut warnings);
        self.validate_dependencies(plan, &mut warnings);
        self.analyze_performance(plan, &mut warnings);

        PlanValidationResult { valid: errors.is_empty(), errors, warnings }
    }

    fn validate_structure(&self, plan: &ExecutablePlan, errors: &mut Vec<String>) {
        if plan.name.trim().is_empty() {
            errors.push("plan name is required".to_string());
        }
        let version_re = Regex::new(r"^\d+\.\d+\.\d+$").expect("static regex is valid");
        if !version_re.is_match(&plan.version) {
            errors.push(format!("plan version '{}' is not a valid semantic version", plan.version));
        }
        if plan.flows.is_empty() {
            errors.push("plan must have at least one flow".to_string());
        }
        if !plan.flows.iter().any(|flow| flow.flow_id.as_str() == plan.main_flow) {
            errors.push(format!("main_flow '{}' does not reference an existing flow", plan.main_flow));
        }
    }

    fn validate_flow(&self, flow: &ExecutionFlow, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if flow.name.trim().is_empty() {
            errors.push(format!("flow '{}' is missing a name", flow.flow_id));
        }
        if flow.steps.is_empty() {
            errors.push(format!("flow '{}' has no steps", flow.flow_id));
            return;
        }

        let mut seen_ids = HashSet::new();
        for step in &flow.steps {
            if !seen_ids.insert(step.step_id.as_str()) {
                errors.push(format!("flow '{}' has duplicate step id '{}'", flow.flow_id, step.step_id));
            }
            self.validate_step(step, errors, warnings);
        }

        let known: HashSet<&str> = flow.steps.iter().map(|s| s.step_id.as_str()).collect();
        for step in &flow.steps {
            for dep in &step.depends_on {
                if !known.contains(dep.as_str()) {
                    errors.push(format!("step '{}' depends on unknown step '{dep}'", step.step_id));
                }
            }
        }

        if has_circular_dependency(flow) {
            errors.push(format!("flow '{}' has a circular step dependency", flow.flow_id));
        }

        if let Some(concurrency) = flow.max_concurrency {
            if concurrency == 0 {
                errors.push(format!("flow '{}' max_concurrency must be positive", flow.flow_id));
            }
        }
    }

    fn validate_step(&self, step: &ExecutionStep, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        if step.name.trim().is_empty() {
            errors.push(format!("step '{}' is missing a name", step.step_id));
        }
        if !["action", "condition", "loop", "parallel", "sequence"].contains(&step.step_type.as_str()) {
            errors.push(format!("step '{}' has unknown step_type '{}'", step.step_id, step.step_type));
        }
        if let Some(tool) = &step.tool {
            if !ALLOWED_TOOLS.contains(&tool.as_str()) {
                errors.push(format!("step '{}' uses disallowed tool '{tool}'", step.step_id));
            }
            if SECURITY_SENSITIVE_TOOLS.contains(&tool.as_str()) {
                warnings.push(format!("step '{}' uses security-sensitive tool '{tool}'", step.step_id));
            }
        }
        if let Some(timeout) = step.timeout {
            if timeout == 0 {
                errors.push(format!("step '{}' timeout must be positive", step.step_id));
            }
        }
        if let Some(retry) = &step.retry_policy {
            if retry.max_attempts == 0 {
                errors.push(format!("step '{}' retry_policy.max_attempts must be positive", step.step_id));
            }
            if !["fixed", "exponential", "linear"].contains(&retry.backoff.as_str()) {
                errors.push(format!("step '{}' retry_policy.backoff '{}' is not recognized", step.step_id, retry.backoff));
            }
        }
    }

    fn validate_security(&self, plan: &ExecutablePlan, level: ValidationLevel, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        let used_tools: HashSet<&str> =
            plan.flows.iter().flat_map(|f| &f.steps).filter_map(|s| s.tool.as_deref()).collect();

        if !plan.security_context.allowed_tools.is_empty() {
            let allowed: HashSet<&str> = plan.security_context.allowed_tools.iter().map(String::as_str).collect();
            for tool in &used_tools {
                if !allowed.contains(tool) {
                    errors.push(format!("tool '{tool}' is used but not in security_context.allowed_tools"));
                }
            }
        }

        let uses_sensitive = used_tools.iter().any(|t| SECURITY_SENSITIVE_TOOLS.contains(t));
        let has_allowlist = !plan.security_context.allowed_tools.is_empty();

        match level {
            ValidationLevel::Standard => {}
            ValidationLevel::Strict => {
                if uses_sensitive && (!has_allowlist || !plan.security_context.requires_approval) {
                    warnings.push("security-sensitive tools require an explicit allowlist and approval gate under strict validation".to_string());
                }
            }
            ValidationLevel::SecurityFocused => {
                if uses_sensitive {
                    if !has_allowlist {
                        errors.push("security-sensitive tools require security_context.allowed_tools under security-focused validation".to_string());
                    }
                    if plan.security_context.required_capabilities.is_empty() {
                        errors.push("security-sensitive tools require security_context.required_capabilities under security-focused validation".to_string());
                    }
                    if !plan.security_context.requires_approval {
                        errors.push("security-sensitive tools require security_context.requires_approval under security-focused validation".to_string());
                    }
                }
            }
        }
    }

    fn validate_resources(&self, plan: &ExecutablePlan, level: ValidationLevel, warnings: &mut Vec<String>) {
        let cpu_re = Regex::new(r"^\d+m?$").expect("static regex is valid");
        let memory_re = Regex::new(r"^\d+(Mi|Gi|Ki)?$").expect("static regex is valid");

        let strict = matches!(level, ValidationLevel::Strict | ValidationLevel::SecurityFocused);
        let high_cpu_threshold = if strict { 1_000 } else { 2_000 };

        if strict && plan.resource_requirements.cpu.is_none() {
            warnings.push("cpu request should be explicit under strict validation".to_string());
        }
        if strict && plan.resource_requirements.memory.is_none() {
            warnings.push("memory request should be explicit under strict validation".to_string());
        }

        if let Some(cpu) = &plan.resource_requirements.cpu {
            if !cpu_re.is_match(cpu) {
                warnings.push(format!("cpu request '{cpu}' does not match the expected millicore format"));
            } else if let Some(millis) = cpu.strip_suffix('m').and_then(|n| n.parse::<u64>().ok()) {
                if millis > high_cpu_threshold {
                    warnings.push(format!("cpu request '{cpu}' is unusually high"));
                }
            }
        }
        if let Some(memory) = &plan.resource_requirements.memory {
            if !memory_re.is_match(memory) {
                warnings.push(format!("memory request '{memory}' does not match the expected Ki/Mi/Gi format"));
            } else if memory.ends_with("Gi") {
                if let Ok(gi) = memory.trim_end_matches("Gi").parse::<u64>() {
                    if gi > 4 {
                        warnings.push(format!("memory request '{memory}' is unusually high"));
                    }
                }
            }
        }
    }

    fn validate_dependencies(&self, plan: &ExecutablePlan, warnings: &mut Vec<String>) {
        let version_re = Regex::new(r"^\d+\.\d+\.\d+$").expect("static regex is valid");
        for dep in &plan.metadata.resolved_dependencies {
            if !version_re.is_match(&dep.version) {
                warnings.push(format!("resolved dependency '{}' has a non-semantic version '{}'", dep.name, dep.version));
            }
        }
    }

    fn analyze_performance(&self, plan: &ExecutablePlan, warnings: &mut Vec<String>) {
        let total_steps: usize = plan.flows.iter().map(|f| f.steps.len()).sum();
        if total_steps > MAX_RECOMMENDED_STEPS {
            warnings.push(format!("plan has {total_steps} steps; consider splitting it into smaller plans"));
        }

        for flow in &plan.flows {
            let analysis = analyze_flow(flow);
            if let Some(path) = analysis.critical_paths.first() {
                if path.steps.len() > MAX_RECOMMENDED_CHAIN_LENGTH {
                    warnings.push(format!(
                        "flow '{}' has a dependency chain of {} steps; consider parallelizing",
                        flow.flow_id,
                        path.steps.len()
                    ));
                }
            }
            if !flow.parallel_execution && flow.steps.len() > MAX_RECOMMENDED_SEQUENTIAL_STEPS {
                warnings.push(format!(
                    "flow '{}' runs {} steps sequentially; consider enabling parallel_execution",
                    flow.flow_id,
                    flow.steps.len()
                ));
            }
        }
    }
}

fn has_circular_dependency(flow: &ExecutionFlow) -> bool {
    let known: HashSet<&str> = flow.steps.iter().map(|s| s.step_id.as_str()).collect();
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        steps: &'a [ExecutionStep],
        known: &HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if visited.contains(id) {
            return false;
        }
        if !visiting.insert(id) {
            return true;
        }
        if let Some(step) = steps.iter().find(|s| s.step_id.as_str() == id) {
            for dep in &step.depends_on {
                if known.contains(dep.as_str()) && visit(dep.as_str(), steps, known, visiting, visited) {
                    return true;
                }
            }
        }
        visiting.remove(id);
        visited.insert(id);
        false
    }

    flow.steps
        .iter()
        .any(|step| visit(step.step_id.as_str(), &flow.steps, &known, &mut visiting, &mut visited))
}
