// examples/minimal/src/main.rs
// ============================================================================
// Module: CapGate Minimal Example
// Description: Minimal end-to-end CapGate run using in-memory adapters.
// Purpose: Demonstrate scenario.next/status and runpack generation.
// Dependencies: capgate-core, ret-logic
// ============================================================================

//! ## Overview
//! Runs a minimal CapGate scenario using in-memory evidence and dispatch adapters.
//! This example is backend-agnostic and suitable for quick verification.

use std::io::Write;

use capgate_core::AdvanceTo;
use capgate_core::Comparator;
use capgate_core::DecisionOutcome;
use capgate_core::DispatchReceipt;
use capgate_core::DispatchTarget;
use capgate_core::Dispatcher;
use capgate_core::EvidenceContext;
use capgate_core::EvidenceProvider;
use capgate_core::EvidenceQuery;
use capgate_core::EvidenceResult;
use capgate_core::EvidenceValue;
use capgate_core::GateId;
use capgate_core::GateSpec;
use capgate_core::NamespaceId;
use capgate_core::PacketPayload;
use capgate_core::PacketSpec;
use capgate_core::PolicyDecider;
use capgate_core::PolicyDecision;
use capgate_core::PredicateSpec;
use capgate_core::ProviderId;
use capgate_core::RunConfig;
use capgate_core::RunStatus;
use capgate_core::ScenarioId;
use capgate_core::ScenarioSpec;
use capgate_core::SchemaId;
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
use capgate_core::runtime::StatusRequest;
use serde_json::json;

/// Evidence provider that always returns `true`.
struct ExampleEvidenceProvider;

impl EvidenceProvider for ExampleEvidenceProvider {
    fn query(
        &self,
        _query: &EvidenceQuery,
        _ctx: &EvidenceContext,
    ) -> Result<EvidenceResult, capgate_core::EvidenceError> {
        Ok(EvidenceResult {
            value: Some(EvidenceValue::Json(json!(true))),
            lane: TrustLane::Verified,
            evidence_hash: None,
            evidence_ref: None,
            evidence_anchor: None,
            signature: None,
            content_type: Some("application/json".to_string()),
        })
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
            dispatcher: "example".to_string(),
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

/// Builds the minimal scenario spec used by the example.
fn build_spec() -> ScenarioSpec {
    ScenarioSpec {
        scenario_id: ScenarioId::new("example"),
        namespace_id: NamespaceId::new("default"),
        spec_version: SpecVersion::new("1"),
        stages: vec![
            StageSpec {
                stage_id: StageId::new("stage-1"),
                entry_packets: Vec::new(),
                gates: vec![GateSpec {
                    gate_id: GateId::new("gate-ready"),
                    requirement: ret_logic::Requirement::predicate("ready".into()),
                    trust: None,
                }],
                advance_to: AdvanceTo::Linear,
                timeout: None,
                on_timeout: capgate_core::TimeoutPolicy::Fail,
            },
            StageSpec {
                stage_id: StageId::new("stage-2"),
                entry_packets: vec![PacketSpec {
                    packet_id: capgate_core::PacketId::new("packet-1"),
                    schema_id: SchemaId::new("schema-1"),
                    content_type: "application/json".to_string(),
                    visibility_labels: vec!["public".to_string()],
                    policy_tags: Vec::new(),
                    expiry: None,
                    payload: PacketPayload::Json {
                        value: json!({"hello": "world"}),
                    },
                }],
                gates: Vec::new(),
                advance_to: AdvanceTo::Terminal,
                timeout: None,
                on_timeout: capgate_core::TimeoutPolicy::Fail,
            },
        ],
        predicates: vec![PredicateSpec {
            predicate: "ready".into(),
            query: EvidenceQuery {
                provider_id: ProviderId::new("example"),
                predicate: "ready".to_string(),
                params: Some(json!({})),
            },
            comparator: Comparator::Equals,
            expected: Some(json!(true)),
            policy_tags: Vec::new(),
            trust: None,
        }],
        policies: Vec::new(),
        schemas: Vec::new(),
        default_tenant_id: None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = InMemoryRunStateStore::new();
    let engine = ControlPlane::new(
        build_spec(),
        ExampleEvidenceProvider,
        ExampleDispatcher,
        store,
        Some(PermitAllPolicy),
        ControlPlaneConfig::default(),
    )?;

    let run_config = RunConfig {
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        run_id: capgate_core::RunId::new("run-1"),
        scenario_id: ScenarioId::new("example"),
        dispatch_targets: vec![DispatchTarget::Agent {
            agent_id: "agent-1".to_string(),
        }],
        policy_tags: Vec::new(),
    };

    engine.start_run(run_config, Timestamp::Logical(0), false)?;

    let request = NextRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        trigger_id: TriggerId::new("trigger-1"),
        agent_id: "agent-1".to_string(),
        time: Timestamp::Logical(1),
        correlation_id: None,
    };
    let result = engine.scenario_next(&request)?;
    let outcome = outcome_summary(&result.decision.outcome);
    write_line("Decision", &outcome)?;

    let status_request = StatusRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        requested_at: Timestamp::Logical(2),
        correlation_id: None,
    };
    let status = engine.scenario_status(&status_request)?;
    write_line("Status", run_status_label(status.status))?;

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

/// Returns a stable label for the run status.
const fn run_status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Active => "active",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

/// Writes a labeled line to stdout.
fn write_line(label: &str, value: &str) -> Result<(), std::io::Error> {
    let mut out = std::io::stdout();
    writeln!(out, "{label}: {value}")?;
    Ok(())
}
