// examples/ci-gate/src/main.rs
// ============================================================================
// Module: CapGate CI Gate Example
// Description: Scenario gating based on CI status and review approvals.
// Purpose: Demonstrate evidence comparisons for CI/CD workflows.
// Dependencies: capgate-core, ret-logic
// ============================================================================

//! ## Overview
//! This example models a CI gate that requires both a passing CI status and a
//! minimum number of approvals before advancing the scenario.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use capgate_core::AdvanceTo;
use capgate_core::Comparator;
use capgate_core::DecisionOutcome;
use capgate_core::DispatchReceipt;
use capgate_core::DispatchTarget;
use capgate_core::Dispatcher;
use capgate_core::EvidenceContext;
use capgate_core::EvidenceError;
use capgate_core::EvidenceProvider;
use capgate_core::EvidenceQuery;
use capgate_core::EvidenceResult;
use capgate_core::EvidenceValue;
use capgate_core::GateId;
use capgate_core::GateSpec;
use capgate_core::NamespaceId;
use capgate_core::PacketPayload;
use capgate_core::PolicyDecider;
use capgate_core::PolicyDecision;
use capgate_core::PredicateSpec;
use capgate_core::ProviderId;
use capgate_core::RunConfig;
use capgate_core::ScenarioId;
use capgate_core::ScenarioSpec;
use capgate_core::SpecVersion;
use capgate_core::StageId;
use capgate_core::StageSpec;
use capgate_core::TenantId;
use capgate_core::Timestamp;
use capgate_core::TriggerId;
use capgate_core::TrustLane;
use capgate_core::hashing::DEFAULT_HASH_ALGORITHM;
use capgate_core::hashing::hash_bytes;
use capgate_core::runtime::ControlPlane;
use capgate_core::runtime::ControlPlaneConfig;
use capgate_core::runtime::InMemoryRunStateStore;
use capgate_core::runtime::NextRequest;
use serde_json::json;

/// Shared CI signal state updated by the example.
struct CiSignals {
    /// CI pass/fail flag.
    ci_passed: AtomicBool,
    /// Approval count for the change.
    approvals: AtomicUsize,
}

impl CiSignals {
    /// Creates a new signal set with default values.
    const fn new() -> Self {
        Self {
            ci_passed: AtomicBool::new(false),
            approvals: AtomicUsize::new(0),
        }
    }
}

/// Evidence provider backed by the shared CI signals.
struct CiEvidenceProvider {
    /// Shared signal state used to answer queries.
    signals: Arc<CiSignals>,
}

impl CiEvidenceProvider {
    /// Creates a new provider from the shared signals.
    const fn new(signals: Arc<CiSignals>) -> Self {
        Self {
            signals,
        }
    }
}

impl EvidenceProvider for CiEvidenceProvider {
    fn query(
        &self,
        query: &EvidenceQuery,
        _ctx: &EvidenceContext,
    ) -> Result<EvidenceResult, EvidenceError> {
        match query.predicate.as_str() {
            "ci_status" => {
                let status = if self.signals.ci_passed.load(Ordering::Relaxed) {
                    "passed"
                } else {
                    "failed"
                };
                Ok(EvidenceResult {
                    value: Some(EvidenceValue::Json(json!(status))),
                    lane: TrustLane::Verified,
                    error: None,
                    evidence_hash: None,
                    evidence_ref: None,
                    evidence_anchor: None,
                    signature: None,
                    content_type: Some("application/json".to_string()),
                })
            }
            "approvals" => {
                let approvals = i64::try_from(self.signals.approvals.load(Ordering::Relaxed))
                    .map_err(|_| EvidenceError::Provider("approval count overflow".to_string()))?;
                Ok(EvidenceResult {
                    value: Some(EvidenceValue::Json(json!(approvals))),
                    lane: TrustLane::Verified,
                    error: None,
                    evidence_hash: None,
                    evidence_ref: None,
                    evidence_anchor: None,
                    signature: None,
                    content_type: Some("application/json".to_string()),
                })
            }
            _ => Err(EvidenceError::Provider(format!("unknown predicate: {}", query.predicate))),
        }
    }

    fn validate_providers(
        &self,
        _spec: &ScenarioSpec,
    ) -> Result<(), capgate_core::ProviderMissingError> {
        Ok(())
    }
}

/// Dispatcher that returns a deterministic receipt without delivery.
struct ExampleDispatcher;

impl Dispatcher for ExampleDispatcher {
    fn dispatch(
        &self,
        target: &DispatchTarget,
        _envelope: &capgate_core::PacketEnvelope,
        _payload: &PacketPayload,
    ) -> Result<DispatchReceipt, capgate_core::DispatchError> {
        Ok(DispatchReceipt {
            dispatch_id: "dispatch-1".to_string(),
            target: target.clone(),
            receipt_hash: hash_bytes(DEFAULT_HASH_ALGORITHM, b"receipt"),
            dispatched_at: Timestamp::Logical(1),
            dispatcher: "ci-gate".to_string(),
        })
    }
}

/// Policy decider that permits all disclosures.
struct PermitAllPolicy;

impl PolicyDecider for PermitAllPolicy {
    fn authorize(
        &self,
        _target: &DispatchTarget,
        _envelope: &capgate_core::PacketEnvelope,
        _payload: &PacketPayload,
    ) -> Result<PolicyDecision, capgate_core::PolicyError> {
        Ok(PolicyDecision::Permit)
    }
}

/// Builds the CI gate scenario spec.
fn build_spec() -> ScenarioSpec {
    ScenarioSpec {
        scenario_id: ScenarioId::new("ci-gate"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        spec_version: SpecVersion::new("1"),
        stages: vec![StageSpec {
            stage_id: StageId::new("review"),
            entry_packets: Vec::new(),
            gates: vec![GateSpec {
                gate_id: GateId::new("ci-approved"),
                requirement: ret_logic::Requirement::and(vec![
                    ret_logic::Requirement::predicate("ci_status".into()),
                    ret_logic::Requirement::predicate("approvals".into()),
                ]),
                trust: None,
            }],
            advance_to: AdvanceTo::Terminal,
            timeout: None,
            on_timeout: capgate_core::TimeoutPolicy::Fail,
        }],
        predicates: vec![
            PredicateSpec {
                predicate: "ci_status".into(),
                query: EvidenceQuery {
                    provider_id: ProviderId::new("ci"),
                    predicate: "ci_status".to_string(),
                    params: Some(json!({})),
                },
                comparator: Comparator::Equals,
                expected: Some(json!("passed")),
                policy_tags: Vec::new(),
                trust: None,
            },
            PredicateSpec {
                predicate: "approvals".into(),
                query: EvidenceQuery {
                    provider_id: ProviderId::new("ci"),
                    predicate: "approvals".to_string(),
                    params: Some(json!({})),
                },
                comparator: Comparator::GreaterThanOrEqual,
                expected: Some(json!(2)),
                policy_tags: Vec::new(),
                trust: None,
            },
        ],
        policies: Vec::new(),
        schemas: Vec::new(),
        default_tenant_id: None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let signals = Arc::new(CiSignals::new());
    let provider = CiEvidenceProvider::new(signals.clone());
    let store = InMemoryRunStateStore::new();
    let engine = ControlPlane::new(
        build_spec(),
        provider,
        ExampleDispatcher,
        store,
        Some(PermitAllPolicy),
        ControlPlaneConfig::default(),
    )?;

    let run_config = RunConfig {
        tenant_id: TenantId::from_raw(1).expect("nonzero tenantid"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        run_id: capgate_core::RunId::new("run-1"),
        scenario_id: ScenarioId::new("ci-gate"),
        dispatch_targets: vec![DispatchTarget::Agent {
            agent_id: "ci-bot".to_string(),
        }],
        policy_tags: Vec::new(),
    };

    engine.start_run(run_config, Timestamp::Logical(0), false)?;

    let first = NextRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::from_raw(1).expect("nonzero tenantid"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        trigger_id: TriggerId::new("trigger-1"),
        agent_id: "ci-bot".to_string(),
        time: Timestamp::Logical(1),
        correlation_id: None,
    };
    let first_result = engine.scenario_next(&first)?;
    let first_outcome = outcome_summary(&first_result.decision.outcome);
    write_line("First decision", &first_outcome)?;

    signals.ci_passed.store(true, Ordering::Relaxed);
    signals.approvals.store(2, Ordering::Relaxed);

    let second = NextRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::from_raw(1).expect("nonzero tenantid"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        trigger_id: TriggerId::new("trigger-2"),
        agent_id: "ci-bot".to_string(),
        time: Timestamp::Logical(2),
        correlation_id: None,
    };
    let second_result = engine.scenario_next(&second)?;
    let second_outcome = outcome_summary(&second_result.decision.outcome);
    write_line("Second decision", &second_outcome)?;

    Ok(())
}

/// Formats a short summary for the decision outcome.
fn outcome_summary(outcome: &DecisionOutcome) -> String {
    match outcome {
        DecisionOutcome::Start {
            stage_id,
        } => format!("start:{stage_id}"),
        DecisionOutcome::Complete {
            stage_id,
        } => format!("complete:{stage_id}"),
        DecisionOutcome::Advance {
            from_stage,
            to_stage,
            timeout,
        } => {
            let reason = if *timeout { "timeout" } else { "gate" };
            format!("advance:{from_stage}->{to_stage} ({reason})")
        }
        DecisionOutcome::Hold {
            summary,
        } => format!("hold:{}", summary.status),
        DecisionOutcome::Fail {
            reason,
        } => format!("fail:{reason}"),
    }
}

/// Writes a labeled line to stdout.
fn write_line(label: &str, value: &str) -> Result<(), std::io::Error> {
    let mut out = std::io::stdout();
    writeln!(out, "{label}: {value}")?;
    Ok(())
}
