// capgate-core/src/domain/plan/dependency.rs
// ============================================================================
// Module: Plan Compiler — dependency resolution & graph analysis
//         (component I, part 2)
// Description: Parses `name@constraint[?optional]` dependency specs, resolves
//              them against an injected registry, and analyzes the resulting
//              plan's step graph for critical paths and parallelization.
// Purpose: Grounds spec §4.7 stages 1 and "Dependency analysis".
// Dependencies: semver, crate::domain::ids, crate::domain::plan::model
// ============================================================================

//! ## Overview
//! Dependency resolution and dependency-graph analysis are two distinct
//! concerns that happen to share a name in the source material: the former
//! picks concrete versions for a capsule's declared dependencies before
//! compilation; the latter studies the *step* graph of an already-compiled
//! plan to find critical paths and parallelization opportunities for the
//! optimizer. Both live here since both reason about dependency edges.

use std::collections::HashMap;
use std::collections::HashSet;

use semver::Version;
use semver::VersionReq;

use crate::domain::ids::CapsuleId;
use crate::domain::plan::model::ExecutionFlow;
use crate::domain::plan::model::ExecutionStep;

/// A parsed dependency spec, e.g. `payment-processor@^1.2.0?optional`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    /// Dependency name.
    pub name: String,
    /// Raw constraint string, e.g. `"^1.2.0"` or `"*"`.
    pub version_constraint: String,
    /// Whether resolution failure for this dependency is non-fatal.
    pub optional: bool,
}

impl DependencySpec {
    /// Parses a `name@constraint[?optional]` dependency string. A bare name
    /// with no `@constraint` suffix defaults to the `"*"` (any version)
    /// constraint, matching the Python original.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let (body, optional) = spec
            .strip_suffix("?optional")
            .map_or((spec, false), |stripped| (stripped, true));

        match body.split_once('@') {
            Some((name, constraint)) => Self {
                name: name.to_string(),
                version_constraint: constraint.to_string(),
                optional,
            },
            None => Self {
                name: body.to_string(),
                version_constraint: "*".to_string(),
                optional,
            },
        }
    }
}

/// A single resolved dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Dependency name.
    pub name: String,
    /// Chosen version.
    pub version: String,
    /// Identifier of the capsule providing that version.
    pub capsule_id: CapsuleId,
    /// Whether the dependency was declared optional.
    pub optional: bool,
    /// Content checksum of the resolved capsule, if known.
    pub checksum: Option<String>,
}

/// Outcome of [`resolve_dependencies`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyResolutionResult {
    /// Whether every non-optional dependency resolved without conflict.
    pub success: bool,
    /// Successfully resolved dependencies.
    pub resolved: Vec<ResolvedDependency>,
    /// Non-optional dependency names that had no matching version.
    pub unresolved_dependencies: Vec<String>,
    /// Dependency names for which two specs resolved to different versions.
    pub conflicts: Vec<String>,
}

/// Looks up every published version of a named dependency, plus the checksum
/// and capsule id for a specific version.
///
/// The reference implementation's registry lookup is itself a stand-in (the
/// Python original hardcodes a handful of demo packages); production
/// deployments inject a real registry client here.
pub trait DependencyRegistry {
    /// Returns every version published for `name`, in no particular order.
    fn available_versions(&self, name: &str) -> Vec<String>;

    /// Returns `(capsule_id, checksum)` for `name`@`version`, if it exists.
    fn capsule_info(&self, name: &str, version: &str) -> Option<(CapsuleId, Option<String>)>;
}

/// Resolves a capsule's declared `dependencies` list against `registry`.
#[must_use]
pub fn resolve_dependencies(dependencies: &[String], registry: &dyn DependencyRegistry) -> DependencyResolutionResult {
    let specs: Vec<DependencySpec> = dependencies.iter().map(|dep| DependencySpec::parse(dep)).collect();

    let mut resolved = Vec::new();
    let mut unresolved_dependencies = Vec::new();

    for spec in &specs {
        match resolve_single(spec, registry) {
            Some(dep) => resolved.push(dep),
            None if spec.optional => {}
            None => unresolved_dependencies.push(spec.name.clone()),
        }
    }

    let conflicts = detect_version_conflicts(&resolved);
    let success = unresolved_dependencies.is_empty() && conflicts.is_empty();

    DependencyResolutionResult {
        success,
        resolved,
        unresolved_dependencies,
        conflicts,
    }
}

fn resolve_single(spec: &DependencySpec, registry: &dyn DependencyRegistry) -> Option<ResolvedDependency> {
    let available = registry.available_versions(&spec.name);
    let version = find_best_matching_version(&spec.version_constraint, &available)?;
    let (capsule_id, checksum) = registry.capsule_info(&spec.name, &version)?;

    Some(ResolvedDependency {
        name: spec.name.clone(),
        version,
        capsule_id,
        optional: spec.optional,
        checksum,
    })
}

/// Picks the highest available version matching `constraint` (spec §4.7:
/// `= > >= < <= ~ ^ *`, semver-compared).
fn find_best_matching_version(constraint: &str, available: &[String]) -> Option<String> {
    if constraint == "*" {
        return available.iter().filter_map(|v| Version::parse(v).ok()).max().map(|v| v.to_string());
    }

    let req = parse_constraint(constraint)?;
    available
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| req.matches(v))
        .max()
        .map(|v| v.to_string())
}

/// Translates the spec's narrow comparator grammar into a [`VersionReq`].
/// `~1.2.3` and `^1.2.3` map directly onto Cargo's own tilde/caret
/// requirements; a bare version with no operator is treated as `=`.
fn parse_constraint(constraint: &str) -> Option<VersionReq> {
    let trimmed = constraint.trim();
    let has_operator = trimmed.starts_with(['=', '>', '<', '~', '^']);
    let normalized = if has_operator { trimmed.to_string() } else { format!("={trimmed}") };
    VersionReq::parse(&normalized).ok()
}

fn detect_version_conflicts(resolved: &[ResolvedDependency]) -> Vec<String> {
    let mut by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
    for dep in resolved {
        by_name.entry(dep.name.as_str()).or_default().insert(dep.version.as_str());
    }
    by_name
        .into_iter()
        .filter(|(_, versions)| versions.len() > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Dependency graph analysis (optimizer support)
// ---------------------------------------------------------------------------

/// Tools whose steps must serialize against each other within a flow (spec
/// §4.7 dependency analysis).
const EXCLUSIVE_TOOLS: [&str; 3] = ["database", "file_system", "network"];

/// One edge in a [`DependencyGraph`].
#[derive(Debug, Clone, PartialEq)]
struct Edge {
    target: String,
    weight: f64,
}

/// A directed acyclic graph over a flow's step ids, annotated with estimated
/// per-step duration and cost.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    durations: HashMap<String, f64>,
    costs: HashMap<String, f64>,
    edges: HashMap<String, Vec<Edge>>,
    reverse_edges: HashMap<String, Vec<String>>,
}

/// A longest (by estimated duration) path through the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriticalPath {
    /// Step ids along the path, in execution order.
    pub steps: Vec<String>,
    /// Summed estimated duration along the path.
    pub total_duration: f64,
    /// Summed estimated cost along the path.
    pub total_cost: f64,
    /// Steps whose own duration exceeds 20% of the path's total.
    pub bottlenecks: Vec<String>,
}

/// A topological generation with more than one member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParallelizationOpportunity {
    /// Step ids that may run concurrently.
    pub parallel_steps: Vec<String>,
    /// `sequential_duration / max_single_step_duration`.
    pub estimated_speedup: f64,
    /// Exclusive-tool conflicts that constrain this group, if any.
    pub constraints: Vec<String>,
}

/// Aggregate structural metrics over a [`DependencyGraph`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexityMetrics {
    /// Number of steps.
    pub node_count: usize,
    /// Number of dependency edges.
    pub edge_count: usize,
    /// `edges / (nodes * (nodes - 1))`, 0 when fewer than two nodes.
    pub density: f64,
    /// Mean in+out degree per node.
    pub average_degree: f64,
    /// Length of the longest path.
    pub max_depth: usize,
    /// Size of the largest topological generation.
    pub width: usize,
    /// Fraction of nodes that belong to a generation of size > 1.
    pub parallelization_ratio: f64,
}

/// Full result of [`analyze_flow`].
#[derive(Debug, Clone, Default)]
pub struct DependencyAnalysisResult {
    /// Every critical path found (one per source→sink pair with the
    /// longest overall path first).
    pub critical_paths: Vec<CriticalPath>,
    /// Parallelizable step groups.
    pub parallelization_opportunities: Vec<ParallelizationOpportunity>,
    /// Topological generations, in execution order.
    pub execution_levels: Vec<Vec<String>>,
    /// Total estimated duration across the longest critical path.
    pub total_estimated_duration: f64,
    /// Total estimated cost across the longest critical path.
    pub total_estimated_cost: f64,
    /// Structural complexity metrics.
    pub complexity_metrics: ComplexityMetrics,
}

/// Estimates a step's duration in seconds from its `step_type`/`tool` (spec
/// §4.7 base table).
#[must_use]
pub fn estimate_step_duration(step: &ExecutionStep) -> f64 {
    match step.step_type.as_str() {
        "action" => match step.tool.as_deref() {
            Some("database") => 2.5,
            Some("http") => 10.0,
            Some("compute") => 15.0,
            _ => 5.0,
        },
        "condition" => 1.0,
        "loop" => {
            let iterations = step
                .parameters
                .get("iterations")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(10.0);
            iterations * 5.0
        }
        "parallel" => 10.0,
        "transform" => 3.0,
        _ => 5.0,
    }
}

/// Estimates a step's cost in dollars from its `step_type`/`tool` (spec §4.7
/// base table).
#[must_use]
pub fn estimate_step_cost(step: &ExecutionStep) -> f64 {
    match step.step_type.as_str() {
        "action" => match step.tool.as_deref() {
            Some("database") => 0.02,
            Some("http") => 0.015,
            Some("compute") => 0.05,
            _ => 0.01,
        },
        "condition" => 0.001,
        "loop" => {
            let iterations = step
                .parameters
                .get("iterations")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(10.0);
            iterations * 0.01
        }
        "parallel" => 0.02,
        "transform" => 0.005,
        _ => 0.01,
    }
}

/// Builds a [`DependencyGraph`] for one flow: explicit `depends_on` edges,
/// data-flow edges (weight 0.5) between a step producing an output another
/// step consumes, and serialization edges (weight 0.3) between steps sharing
/// an exclusive tool, ordered by step id.
#[must_use]
pub fn build_dependency_graph(flow: &ExecutionFlow) -> DependencyGraph {
    let mut graph = DependencyGraph::default();

    for step in &flow.steps {
        graph.nodes.push(step.step_id.as_str().to_string());
        graph.durations.insert(step.step_id.as_str().to_string(), estimate_step_duration(step));
        graph.costs.insert(step.step_id.as_str().to_string(), estimate_step_cost(step));
    }

    let known: HashSet<&str> = flow.steps.iter().map(|s| s.step_id.as_str()).collect();

    for step in &flow.steps {
        for dep in &step.depends_on {
            if known.contains(dep.as_str()) {
                add_edge(&mut graph, dep, step.step_id.as_str(), 1.0);
            }
        }
    }

    let mut output_producers: HashMap<&str, &str> = HashMap::new();
    for step in &flow.steps {
        for output_key in step.outputs.keys() {
            output_producers.insert(output_key.as_str(), step.step_id.as_str());
        }
    }
    for step in &flow.steps {
        for input_source in step.inputs.values() {
            if let Some(&producer) = output_producers.get(input_source.as_str()) {
                if producer != step.step_id.as_str() {
                    add_edge(&mut graph, producer, step.step_id.as_str(), 0.5);
                }
            }
        }
    }

    let mut resource_groups: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &flow.steps {
        let tool = step.tool.as_deref().unwrap_or("default");
        resource_groups.entry(tool).or_default().push(step.step_id.as_str());
    }
    for (tool, mut step_ids) in resource_groups {
        if EXCLUSIVE_TOOLS.contains(&tool) && step_ids.len() > 1 {
            step_ids.sort_unstable();
            for pair in step_ids.windows(2) {
                add_edge(&mut graph, pair[0], pair[1], 0.3);
            }
        }
    }

    graph
}

fn add_edge(graph: &mut DependencyGraph, source: &str, target: &str, weight: f64) {
    let edges = graph.edges.entry(source.to_string()).or_default();
    if edges.iter().any(|e| e.target == target) {
        return;
    }
    edges.push(Edge { target: target.to_string(), weight });
    graph.reverse_edges.entry(target.to_string()).or_default().push(source.to_string());
}

/// Groups `graph`'s nodes into topological generations: generation 0 has no
/// unprocessed predecessors, generation 1 depends only on generation 0, etc.
/// Returns one generation per node (each its own singleton) if the graph
/// contains a cycle, matching the Python fallback.
#[must_use]
pub fn topological_generations(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut remaining_in_degree: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .map(|n| (n.as_str(), graph.reverse_edges.get(n).map_or(0, Vec::len)))
        .collect();

    let mut generations = Vec::new();
    let mut emitted = 0usize;

    loop {
        let current: Vec<String> = remaining_in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| (*n).to_string())
            .collect();
        if current.is_empty() {
            break;
        }
        let mut sorted = current.clone();
        sorted.sort_unstable();
        emitted += sorted.len();
        for node in &sorted {
            remaining_in_degree.remove(node.as_str());
            if let Some(edges) = graph.edges.get(node) {
                for edge in edges {
                    if let Some(deg) = remaining_in_degree.get_mut(edge.target.as_str()) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }
        }
        generations.push(sorted);
    }

    if emitted != graph.nodes.len() {
        let mut sorted_nodes = graph.nodes.clone();
        sorted_nodes.sort_unstable();
        return sorted_nodes.into_iter().map(|n| vec![n]).collect();
    }

    generations
}

fn longest_path(graph: &DependencyGraph) -> Vec<String> {
    if graph.nodes.is_empty() {
        return Vec::new();
    }
    let order = topological_generations(graph).into_iter().flatten().collect::<Vec<_>>();
    let mut best_duration: HashMap<&str, f64> = HashMap::new();
    let mut best_pred: HashMap<&str, Option<&str>> = HashMap::new();

    for node in &order {
        let own = graph.durations.get(node.as_str()).copied().unwrap_or(0.0);
        let mut best = (own, None);
        if let Some(preds) = graph.reverse_edges.get(node.as_str()) {
            for pred in preds {
                let pred_best = best_duration.get(pred.as_str()).copied().unwrap_or(0.0);
                let candidate = pred_best + own;
                if candidate > best.0 {
                    best = (candidate, Some(pred.as_str()));
                }
            }
        }
        best_duration.insert(node.as_str(), best.0);
        best_pred.insert(node.as_str(), best.1);
    }

    let Some(&end) = order.iter().collect::<Vec<_>>().iter().max_by(|a, b| {
        best_duration
            .get(a.as_str())
            .copied()
            .unwrap_or(0.0)
            .partial_cmp(&best_duration.get(b.as_str()).copied().unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return Vec::new();
    };

    let mut path = vec![end.to_string()];
    let mut cursor = end.as_str();
    while let Some(Some(pred)) = best_pred.get(cursor) {
        path.push((*pred).to_string());
        cursor = pred;
    }
    path.reverse();
    path
}

/// Runs dependency analysis over one flow, mirroring
/// `DependencyAnalyzer.analyze_plan_dependencies` scoped to a single flow.
#[must_use]
pub fn analyze_flow(flow: &ExecutionFlow) -> DependencyAnalysisResult {
    let graph = build_dependency_graph(flow);
    let generations = topological_generations(&graph);

    let path = longest_path(&graph);
    let critical_paths = if path.is_empty() {
        Vec::new()
    } else {
        let total_duration: f64 = path.iter().map(|s| graph.durations.get(s.as_str()).copied().unwrap_or(0.0)).sum();
        let total_cost: f64 = path.iter().map(|s| graph.costs.get(s.as_str()).copied().unwrap_or(0.0)).sum();
        let bottlenecks = path
            .iter()
            .filter(|s| graph.durations.get(s.as_str()).copied().unwrap_or(0.0) > total_duration * 0.2)
            .cloned()
            .collect();
        vec![CriticalPath { steps: path, total_duration, total_cost, bottlenecks }]
    };

    let mut opportunities = Vec::new();
    for generation in &generations {
        if generation.len() <= 1 {
            continue;
        }
        let sequential: f64 = generation.iter().map(|s| graph.durations.get(s.as_str()).copied().unwrap_or(0.0)).sum();
        let parallel = generation
            .iter()
            .map(|s| graph.durations.get(s.as_str()).copied().unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        let estimated_speedup = if parallel > 0.0 { sequential / parallel } else { 1.0 };

        let mut constraints = Vec::new();
        let mut seen_exclusive = HashSet::new();
        for step in &flow.steps {
            if !generation.contains(&step.step_id.as_str().to_string()) {
                continue;
            }
            if let Some(tool) = step.tool.as_deref() {
                if (tool == "database" || tool == "file_system") && !seen_exclusive.insert(tool) {
                    constraints.push(format!("Resource conflict: {tool}"));
                }
            }
        }

        opportunities.push(ParallelizationOpportunity {
            parallel_steps: generation.clone(),
            estimated_speedup,
            constraints,
        });
    }

    let node_count = graph.nodes.len();
    let edge_count: usize = graph.edges.values().map(Vec::len).sum();
    let density = if node_count > 1 {
        #[allow(clippy::cast_precision_loss, reason = "graph sizes are small, precision loss is immaterial")]
        let denom = (node_count * node_count.saturating_sub(1)) as f64;
        #[allow(clippy::cast_precision_loss, reason = "graph sizes are small, precision loss is immaterial")]
        {
            edge_count as f64 / denom
        }
    } else {
        0.0
    };
    #[allow(clippy::cast_precision_loss, reason = "graph sizes are small, precision loss is immaterial")]
    let average_degree = if node_count > 0 { (2 * edge_count) as f64 / node_count as f64 } else { 0.0 };
    let max_depth = critical_paths.first().map_or(0, |p| p.steps.len());
    let width = generations.iter().map(Vec::len).max().unwrap_or(0);
    let parallel_nodes: usize = generations.iter().filter(|g| g.len() > 1).map(Vec::len).sum();
    #[allow(clippy::cast_precision_loss, reason = "graph sizes are small, precision loss is immaterial")]
    let parallelization_ratio = if node_count > 0 { parallel_nodes as f64 / node_count as f64 } else { 0.0 };

    let (total_estimated_duration, total_estimated_cost) = critical_paths
        .iter()
        .map(|p| (p.total_duration, p.total_cost))
        .fold((0.0, 0.0), |acc, cur| if cur.0 > acc.0 { cur } else { acc });

    DependencyAnalysisResult {
        critical_paths,
        parallelization_opportunities: opportunities,
        execution_levels: generations,
        total_estimated_duration,
        total_estimated_cost,
        complexity_metrics: ComplexityMetrics {
            node_count,
            edge_count,
            density,
            average_degree,
            max_depth,
            width,
            parallelization_ratio,
        },
    }
}
