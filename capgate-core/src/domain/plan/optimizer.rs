// capgate-core/src/domain/plan/optimizer.rs
// ============================================================================
// Module: Plan Compiler — optimizer (component I, part 4)
// Description: none/basic/standard/aggressive optimization levels.
// Purpose: Implements spec §4.7 "Optimization levels".
// Dependencies: crate::domain::{errors, plan::{model, dependency}}
// ============================================================================

//! ## Overview
//! Each level builds on the last: `basic` dedupes and merges steps,
//! `standard` additionally runs dependency analysis to set parallelization
//! hints and annotate expensive steps with a retry policy, and `aggressive`
//! reorders steps onto the critical path and widens bottleneck timeouts.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::domain::errors::PlanCompileError;
use crate::domain::plan::dependency::ParallelizationOpportunity;
use crate::domain::plan::dependency::analyze_flow;
use crate::domain::plan::model::ExecutablePlan;
use crate::domain::plan::model::ExecutionFlow;
use crate::domain::plan::model::ExecutionStep;
use crate::domain::plan::model::RetryPolicy;

/// Cost threshold above which `standard` optimization adds a default retry
/// policy (spec §4.7).
const EXPENSIVE_STEP_COST: f64 = 0.10;
/// Minimum widened timeout applied to bottleneck steps under `aggressive`.
const BOTTLENECK_MIN_TIMEOUT_SECONDS: u64 = 300;
/// Cap on `max_concurrency` derived from parallelization opportunities.
const MAX_CONCURRENCY_CAP: usize = 10;

/// Applies `optimization_level` to `plan`, recomputing its hash afterward
/// (the optimized content differs from the pre-optimization content, so the
/// hash must be recomputed — matching the Python original's
/// `optimized_plan.plan_hash = optimized_plan.calculate_hash()`).
///
/// # Errors
/// Returns [`PlanCompileError::Internal`] if re-hashing fails.
pub fn optimize_plan(mut plan: ExecutablePlan, optimization_level: &str) -> Result<ExecutablePlan, PlanCompileError> {
    plan.flows = match optimization_level {
        "none" => plan.flows,
        "basic" => plan.flows.into_iter().map(optimize_flow_basic).collect(),
        "aggressive" => plan.flows.into_iter().map(optimize_flow_aggressive).collect(),
        // "standard" and any unrecognized level fall back to standard,
        // matching the Python original's `logger.warning` + fallback.
        _ => plan.flows.into_iter().map(optimize_flow_standard).collect(),
    };

    plan.metadata.optimization_notes.push(format!("Applied {optimization_level} optimization"));
    plan.plan_hash = plan.calculate_hash()?;
    Ok(plan)
}

fn step_signature(step: &ExecutionStep) -> String {
    format!("{}:{}:{}:{}", step.step_type, step.action.as_deref().unwrap_or(""), step.tool.as_deref().unwrap_or(""), step.parameters)
}

fn can_merge(a: &ExecutionStep, b: &ExecutionStep) -> bool {
    a.tool == b.tool
        && !b.depends_on.contains(&a.step_id.as_str().to_string())
        && a.retry_policy == b.retry_policy
        && a.step_type == "action"
        && b.step_type == "action"
}

fn merge_steps(a: ExecutionStep, b: ExecutionStep) -> ExecutionStep {
    use crate::domain::ids::StepId;

    let mut parameters = a.parameters.clone();
    if let (Some(target), Some(extra)) = (parameters.as_object_mut(), b.parameters.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }

    let mut inputs = a.inputs.clone();
    inputs.extend(b.inputs.clone());
    let mut outputs = a.outputs.clone();
    outputs.extend(b.outputs.clone());

    let mut depends_on: Vec<String> = a.depends_on.iter().chain(b.depends_on.iter()).cloned().collect();
    depends_on.sort_unstable();
    depends_on.dedup();

    let mut metadata = a.metadata.clone();
    for (k, v) in &b.metadata {
        metadata.insert(k.clone(), v.clone());
    }
    metadata.insert(
        "merged_from".to_string(),
        serde_json::json!([a.step_id.as_str(), b.step_id.as_str()]),
    );

    let mut tags: Vec<String> = a.tags.iter().chain(b.tags.iter()).cloned().collect();
    tags.sort_unstable();
    tags.dedup();

    ExecutionStep {
        step_id: StepId::new(format!("{}_merged_{}", a.step_id.as_str(), b.step_id.as_str())),
        name: format!("{} + {}", a.name, b.name),
        description: Some(format!(
            "Merged: {} and {}",
            a.description.clone().unwrap_or_else(|| a.name.clone()),
            b.description.clone().unwrap_or_else(|| b.name.clone())
        )),
        step_type: a.step_type.clone(),
        action: a.action.clone(),
        tool: a.tool.clone(),
        parameters,
        inputs,
        outputs,
        depends_on,
        conditions: a.conditions.iter().chain(b.conditions.iter()).cloned().collect(),
        retry_policy: a.retry_policy.clone(),
        timeout: match (a.timeout, b.timeout) {
            (Some(x), Some(y)) => Some(x.max(y)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        },
        metadata,
        tags,
    }
}

fn dedup_and_merge(steps: Vec<ExecutionStep>) -> Vec<ExecutionStep> {
    let mut seen = HashSet::new();
    let deduped: Vec<ExecutionStep> = steps
        .into_iter()
        .filter(|step| seen.insert(step_signature(step)))
        .collect();

    let mut merged: Vec<ExecutionStep> = Vec::new();
    for step in deduped {
        match merged.last() {
            Some(previous) if can_merge(previous, &step) => {
                let previous = merged.pop().expect("just matched Some");
                merged.push(merge_steps(previous, step));
            }
            _ => merged.push(step),
        }
    }
    merged
}

fn optimize_flow_basic(flow: ExecutionFlow) -> ExecutionFlow {
    ExecutionFlow { steps: dedup_and_merge(flow.steps), ..flow }
}

fn optimize_flow_standard(flow: ExecutionFlow) -> ExecutionFlow {
    let mut flow = optimize_flow_basic(flow);
    let analysis = analyze_flow(&flow);

    let max_concurrency = analysis
        .parallelization_opportunities
        .iter()
        .map(|opp| opp.parallel_steps.len())
        .max()
        .map(|n| n.min(MAX_CONCURRENCY_CAP));

    flow.parallel_execution = analysis.parallelization_opportunities.len() > 1;
    if let Some(concurrency) = max_concurrency {
        flow.max_concurrency = Some(concurrency);
    }
    flow.metadata.insert("parallel_groups".to_string(), serde_json::json!(analysis.parallelization_opportunities.len()));
    flow.metadata.insert("parallelization_optimized".to_string(), serde_json::json!(true));

    let costs: HashMap<String, f64> = flow
        .steps
        .iter()
        .map(|step| (step.step_id.as_str().to_string(), crate::domain::plan::dependency::estimate_step_cost(step)))
        .collect();

    flow.steps = flow
        .steps
        .into_iter()
        .map(|mut step| {
            let cost = costs.get(step.step_id.as_str()).copied().unwrap_or(0.0);
            if cost > EXPENSIVE_STEP_COST && step.retry_policy.is_none() {
                step.retry_policy = Some(RetryPolicy { max_attempts: 3, backoff: "exponential".to_string() });
            }
            step
        })
        .collect();

    flow
}

fn optimize_flow_aggressive(flow: ExecutionFlow) -> ExecutionFlow {
    let mut flow = optimize_flow_standard(flow);
    let analysis = analyze_flow(&flow);

    if let Some(path) = analysis.critical_paths.first() {
        let critical: HashSet<&str> = path.steps.iter().map(String::as_str).collect();
        let (mut first, mut rest): (Vec<_>, Vec<_>) =
            flow.steps.into_iter().partition(|step| critical.contains(step.step_id.as_str()));
        first.extend(rest.drain(..));
        flow.steps = first;

        let bottlenecks: HashSet<&str> = path.bottlenecks.iter().map(String::as_str).collect();
        flow.steps = flow
            .steps
            .into_iter()
            .map(|mut step| {
                if bottlenecks.contains(step.step_id.as_str()) {
                    step.timeout = Some(step.timeout.unwrap_or(0).max(BOTTLENECK_MIN_TIMEOUT_SECONDS));
                    step.tags.push("bottleneck".to_string());
                    step.metadata.insert("is_bottleneck".to_string(), serde_json::json!(true));
                }
                step
            })
            .collect();
    }

    mark_parallelizable(&mut flow, &analysis.parallelization_opportunities);
    flow.metadata.insert("graph_optimized".to_string(), serde_json::json!(true));
    flow
}

fn mark_parallelizable(flow: &mut ExecutionFlow, opportunities: &[ParallelizationOpportunity]) {
    let mut parallel_step_groups: HashMap<&str, usize> = HashMap::new();
    for (i, opportunity) in opportunities.iter().enumerate() {
        if opportunity.estimated_speedup > 1.5 && opportunity.constraints.is_empty() {
            for step_id in &opportunity.parallel_steps {
                parallel_step_groups.insert(step_id.as_str(), i);
            }
        }
    }

    for step in &mut flow.steps {
        if let Some(&group) = parallel_step_groups.get(step.step_id.as_str()) {
            step.metadata.insert("parallel_group".to_string(), serde_json::json!(format!("parallel_group_{group}")));
            step.metadata.insert("parallelizable".to_string(), serde_json::json!(true));
            step.tags.push("parallelizable".to_string());
        }
    }
}
