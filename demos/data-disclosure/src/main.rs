// examples/data-disclosure/src/main.rs
// ============================================================================
// Module: CapGate Data Disclosure Example
// Description: Scenario gating that issues disclosure packets on approval.
// Purpose: Demonstrate stage advancement with packet dispatch.
// Dependencies: capgate-core, ret-logic
// ============================================================================

//! ## Overview
//! This example models a data disclosure workflow where a policy approval gate
//! unlocks a disclosure stage that emits a packet payload.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
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
use capgate_core::PacketId;
use capgate_core::PacketPayload;
use capgate_core::PacketSpec;
use capgate_core::PolicyDecider;
use capgate_core::PolicyDecision;
use capgate_core::PredicateSpec;
use capgate_core::ProviderId;
use capgate_core::RunConfig;
use capgate_core::ScenarioId;
use capgate_core::ScenarioSpec;
use capgate_core::SchemaId;
use capgate_core::SchemaRef;
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

/// Shared disclosure signals updated by the example.
struct DisclosureSignals {
    /// Policy approval flag.
    policy_approved: AtomicBool,
}

impl DisclosureSignals {
    /// Creates a new signal set with default values.
    const fn new() -> Self {
        Self {
            policy_approved: AtomicBool::new(false),
        }
    }
}

/// Evidence provider backed by the disclosure signals.
struct DisclosureEvidenceProvider {
    /// Shared signal state used to answer queries.
    signals: Arc<DisclosureSignals>,
}

impl DisclosureEvidenceProvider {
    /// Creates a new provider from the shared signals.
    const fn new(signals: Arc<DisclosureSignals>) -> Self {
        Self {
            signals,
        }
    }
}

impl EvidenceProvider for DisclosureEvidenceProvider {
    fn query(
        &self,
        query: &EvidenceQuery,
        _ctx: &EvidenceContext,
    ) -> Result<EvidenceResult, EvidenceError> {
        if query.predicate.as_str() != "policy_approved" {
            return Err(EvidenceError::Provider(format!("unknown predicate: {}", query.predicate)));
        }
        let approved = self.signals.policy_approved.load(Ordering::Relaxed);
        Ok(EvidenceResult {
            value: Some(EvidenceValue::Json(json!(approved))),
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
            dispatcher: "data-disclosure".to_string(),
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

/// Builds the disclosure scenario spec.
fn build_spec() -> ScenarioSpec {
    ScenarioSpec {
        scenario_id: ScenarioId::new("data-disclosure"),
        namespace_id: NamespaceId::new("default"),
        spec_version: SpecVersion::new("1"),
        stages: vec![
            StageSpec {
                stage_id: StageId::new("review"),
                entry_packets: Vec::new(),
                gates: vec![GateSpec {
                    gate_id: GateId::new("policy-approved"),
                    requirement: ret_logic::Requirement::predicate("policy_approved".into()),
                    trust: None,
                }],
                advance_to: AdvanceTo::Fixed {
                    stage_id: StageId::new("disclosure"),
                },
                timeout: None,
                on_timeout: capgate_core::TimeoutPolicy::Fail,
            },
            StageSpec {
                stage_id: StageId::new("disclosure"),
                entry_packets: vec![PacketSpec {
                    packet_id: PacketId::new("disclosure-packet"),
                    schema_id: SchemaId::new("document"),
                    content_type: "application/json".to_string(),
                    visibility_labels: vec!["restricted".to_string()],
                    policy_tags: vec!["disclosure".to_string()],
                    expiry: None,
                    payload: PacketPayload::Json {
                        value: json!({
                            "document_id": "doc-42",
                            "classification": "confidential"
                        }),
                    },
                }],
                gates: Vec::new(),
                advance_to: AdvanceTo::Terminal,
                timeout: None,
                on_timeout: capgate_core::TimeoutPolicy::Fail,
            },
        ],
        predicates: vec![PredicateSpec {
            predicate: "policy_approved".into(),
            query: EvidenceQuery {
                provider_id: ProviderId::new("policy"),
                predicate: "policy_approved".to_string(),
                params: Some(json!({})),
            },
            comparator: Comparator::Equals,
            expected: Some(json!(true)),
            policy_tags: Vec::new(),
            trust: None,
        }],
        policies: Vec::new(),
        schemas: vec![SchemaRef {
            schema_id: SchemaId::new("document"),
            version: Some("1".to_string()),
            uri: None,
        }],
        default_tenant_id: None,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let signals = Arc::new(DisclosureSignals::new());
    let provider = DisclosureEvidenceProvider::new(signals.clone());
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
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        run_id: capgate_core::RunId::new("run-1"),
        scenario_id: ScenarioId::new("data-disclosure"),
        dispatch_targets: vec![DispatchTarget::Agent {
            agent_id: "agent-1".to_string(),
        }],
        policy_tags: Vec::new(),
    };

    engine.start_run(run_config, Timestamp::Logical(0), false)?;

    let first = NextRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        trigger_id: TriggerId::new("trigger-1"),
        agent_id: "agent-1".to_string(),
        time: Timestamp::Logical(1),
        correlation_id: None,
    };
    let first_result = engine.scenario_next(&first)?;
    let first_outcome = outcome_summary(&first_result.decision.outcome);
    write_line("First decision", &first_outcome)?;

    signals.policy_approved.store(true, Ordering::Relaxed);

    let second = NextRequest {
        run_id: capgate_core::RunId::new("run-1"),
        tenant_id: TenantId::new("tenant"),
        namespace_id: NamespaceId::new("default"),
        trigger_id: TriggerId::new("trigger-2"),
        agent_id: "agent-1".to_string(),
        time: Timestamp::Logical(2),
        correlation_id: None,
    };
    let second_result = engine.scenario_next(&second)?;
    let second_outcome = outcome_summary(&second_result.decision.outcome);
    write_line("Second decision", &second_outcome)?;
    write_line("Packets dispatched", &second_result.packets.len().to_string())?;

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
