// capgate-core/src/domain/orchestrator.rs
// ============================================================================
// Module: Orchestrator Core (component K)
// Description: Drives plan execution against an external executor, bridges
//              executor clarifications to an approvals workflow, and writes
//              a receipt for every terminal run.
// Purpose: Implements spec §4.9.
// Dependencies: crate::core::identifiers, crate::domain::{errors, plan::*}
// ============================================================================

//! ## Overview
//! [`OrchestratorCore::execute`] runs the pipeline from spec §4.9: verify an
//! optional capability token, then either dispatch a recognized MCP payment
//! engine directly or compile the capsule into a plan and drive it through
//! an [`ExecutorClient`]. Pending clarifications are bridged to an
//! [`ApprovalsClient`]; on the run's terminal status a receipt is written via
//! [`ReceiptsClient`]. All five collaborators are injected as trait objects
//! so the pipeline is unit-testable without a real executor, approvals
//! service, or receipts store.

use crate::core::identifiers::TenantId;
use crate::domain::errors::OrchestratorError;
use crate::domain::plan::compiler::CompilationRequest;
use crate::domain::plan::compiler::PlanCompiler;
use crate::domain::plan::dependency::DependencyRegistry;
use crate::domain::plan::model::CapsuleDefinition;
use crate::domain::plan::model::ExecutablePlan;

/// Default poll interval, in seconds, between `get_run` calls (spec §4.9).
pub const DEFAULT_POLL_SECONDS: u64 = 3;
/// Default timeout, in seconds, for a single clarification's approval wait.
pub const DEFAULT_APPROVAL_TIMEOUT_SECONDS: u64 = 300;
/// Upper bound on `get_run` polls per execution, guarding against a run that
/// never reaches a terminal status.
const MAX_RUN_POLLS: usize = 200;

/// Current lifecycle state of an executor-tracked run (spec §4.9 state
/// machine: `PENDING → RUNNING → (PAUSED ↔ RUNNING)* → COMPLETED | FAILED | CANCELLED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Accepted by the executor, not yet started.
    Pending,
    /// Actively executing steps.
    Running,
    /// Suspended, e.g. waiting on a clarification.
    Paused,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl RunStatus {
    /// Whether this status ends the polling loop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A snapshot of a run's progress, as returned by [`ExecutorClient::get_run`].
#[derive(Debug, Clone)]
pub struct RunStatusSnapshot {
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Fraction complete, in `[0.0, 1.0]`.
    pub progress: f64,
    /// Name of the step currently executing, if any.
    pub current_step: Option<String>,
    /// Free-form result payload, populated once terminal.
    pub results: serde_json::Value,
    /// Error message, present iff `status == Failed`.
    pub error_message: Option<String>,
}

/// A clarification raised by the executor mid-run (spec §6 `list_clarifications`).
#[derive(Debug, Clone)]
pub struct ClarificationInfo {
    /// Executor-assigned clarification id.
    pub id: String,
    /// Executor-reported status string, e.g. `"pending"`.
    pub status: String,
    /// Human-readable prompt shown to the approver.
    pub message: String,
}

/// The external plan executor ("Portia" in the reference implementation).
pub trait ExecutorClient {
    /// Registers a compiled plan with the executor, returning its executor-side id.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn create_plan(&self, plan: &ExecutablePlan) -> Result<String, OrchestratorError>;

    /// Starts a run of a previously created plan, returning the run id.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn start_run(&self, plan_id: &str) -> Result<String, OrchestratorError>;

    /// Fetches the current status of a run.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn get_run(&self, run_id: &str) -> Result<RunStatusSnapshot, OrchestratorError>;

    /// Lists clarifications currently pending on a run.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn list_clarifications(&self, run_id: &str) -> Result<Vec<ClarificationInfo>, OrchestratorError>;

    /// Responds to a clarification with an approval decision.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn respond_clarification(&self, run_id: &str, clarification_id: &str, approved: bool) -> Result<(), OrchestratorError>;

    /// Cancels an in-flight run; returns whether cancellation took effect.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn cancel_run(&self, run_id: &str) -> Result<bool, OrchestratorError>;
}

/// Outcome of waiting on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The approver accepted the request.
    Approved,
    /// The approver rejected the request.
    Rejected,
    /// No decision arrived before the deadline.
    TimedOut,
}

/// Bridges an executor clarification to a human approval workflow.
pub trait ApprovalsClient {
    /// Opens an approval request for `clarification`, returning its id.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn open(&self, clarification: &ClarificationInfo, tenant_id: &TenantId, actor: &str) -> Result<String, OrchestratorError>;

    /// Waits up to `timeout_seconds` (polling every `poll_seconds`) for a
    /// decision on `approval_id`.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] if the approvals service
    /// itself fails; a timeout is reported via [`ApprovalOutcome::TimedOut`]
    /// rather than as an error.
    fn wait(&self, approval_id: &str, timeout_seconds: u64, poll_seconds: u64) -> Result<ApprovalOutcome, OrchestratorError>;
}

/// One approval decision recorded against a run, as carried on its receipt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApprovalRecord {
    /// Id assigned by the approvals service.
    pub approval_id: String,
    /// `"approved"`, `"rejected"`, or `"timeout"`.
    pub status: String,
}

/// A receipt payload for one completed (or rejected) orchestration (spec §4.9).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReceiptPayload {
    /// Hash of the compiled plan, if one was compiled.
    pub plan_hash: Option<String>,
    /// Executor-side plan id, if one was created.
    pub plan_id: Option<String>,
    /// Executor-side run id, if one was started.
    pub plan_run_id: Option<String>,
    /// Final orchestration status string.
    pub status: String,
    /// Every approval decision made during this run.
    pub approvals: Vec<ApprovalRecord>,
    /// The user or service that triggered execution.
    pub actor: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Unix-seconds start time.
    pub started_at: i64,
    /// Unix-seconds completion time.
    pub completed_at: i64,
    /// `completed_at - started_at`.
    pub duration_seconds: f64,
    /// MCP engine name, if this was an engine-direct execution.
    pub engine: Option<String>,
    /// Engine result payload, if this was an engine-direct execution.
    pub engine_result: Option<serde_json::Value>,
}

/// Persists a [`ReceiptPayload`] and returns its assigned id.
pub trait ReceiptsClient {
    /// Writes a receipt, returning its assigned id.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn write(&self, payload: &ReceiptPayload) -> Result<String, OrchestratorError>;
}

/// Verifies a capability token against a required capability (an adapter
/// over the Token Service; kept as its own trait so the orchestrator can be
/// tested without constructing a full [`crate::domain::token::TokenService`]).
pub trait CapabilityVerifier {
    /// Verifies `token` grants `required_capability` for `tenant_id`.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::TokenRejected`] if verification fails.
    fn verify(&self, token: &str, tenant_id: &TenantId, required_capability: &str, now: i64) -> Result<(), OrchestratorError>;
}

/// Executes a recognized MCP engine directly, bypassing plan compilation.
pub trait EngineAdapter {
    /// Runs `engine` with `params`, returning its free-form result payload.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::External`] or [`OrchestratorError::Timeout`].
    fn execute(
        &self,
        engine: &str,
        params: &serde_json::Value,
        tenant_id: &TenantId,
        actor: &str,
        require_approval: bool,
    ) -> Result<serde_json::Value, OrchestratorError>;
}

/// Final status of one [`OrchestratorCore::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationStatus {
    /// The run completed successfully (or the engine call succeeded).
    Succeeded,
    /// The run failed, or an approval timed out.
    Failed,
    /// An approval was explicitly rejected.
    Rejected,
}

impl OrchestrationStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// One full execution request (spec §4.9 input tuple).
pub struct OrchestrationRequest<'a> {
    /// Capsule to compile, required unless `engine` is set.
    pub capsule: Option<&'a CapsuleDefinition>,
    /// Whether the run requires human approval before starting.
    pub require_approval: bool,
    /// Presented capability token, if any.
    pub capability_token: Option<String>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The user or service triggering execution.
    pub actor: String,
    /// Recognized MCP engine name, if this is an engine-direct execution.
    pub engine: Option<String>,
    /// Engine parameters, only consulted when `engine` is set.
    pub engine_params: serde_json::Value,
}

/// Outcome of [`OrchestratorCore::execute`] (spec §4.9 step 6).
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    /// Executor-side run id, if a plan run was started.
    pub plan_run_id: Option<String>,
    /// Final status.
    pub status: OrchestrationStatus,
    /// Id of the written receipt.
    pub receipt_id: Option<String>,
    /// Number of approval requests opened during this run.
    pub approvals_count: usize,
    /// Wall-clock duration of the whole call, in seconds.
    pub duration_seconds: f64,
    /// Engine result payload, if this was an engine-direct execution.
    pub engine_result: Option<serde_json::Value>,
}

/// Drives one capsule or MCP engine call through to a receipt.
pub struct OrchestratorCore<'a> {
    compiler: PlanCompiler<'a>,
    executor: &'a dyn ExecutorClient,
    approvals: &'a dyn ApprovalsClient,
    receipts: &'a dyn ReceiptsClient,
    verifier: &'a dyn CapabilityVerifier,
    engines: &'a dyn EngineAdapter,
}

impl<'a> OrchestratorCore<'a> {
    /// Builds an orchestrator over its five external collaborators and a
    /// dependency registry for plan compilation.
    #[must_use]
    pub fn new(
        registry: &'a dyn DependencyRegistry,
        executor: &'a dyn ExecutorClient,
        approvals: &'a dyn ApprovalsClient,
        receipts: &'a dyn ReceiptsClient,
        verifier: &'a dyn CapabilityVerifier,
        engines: &'a dyn EngineAdapter,
    ) -> Self {
        Self { compiler: PlanCompiler::new(registry), executor, approvals, receipts, verifier, engines }
    }

    /// Runs the full pipeline for one request.
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] for capability rejection, invalid
    /// engine parameters, compile failure, or an external client failure.
    /// Approval rejection and run failure are reported as
    /// [`OrchestrationStatus::Rejected`]/[`OrchestrationStatus::Failed`]
    /// rather than as an `Err`, matching the Python original's preference
    /// for a structured terminal result.
    pub fn execute(&self, request: OrchestrationRequest<'_>, now: i64) -> Result<OrchestrationResult, OrchestratorError> {
        if let Some(token) = &request.capability_token {
            let required = if request.engine.is_some() { "payments.execute" } else { "plan_execution" };
            self.verifier.verify(token, &request.tenant_id, required, now)?;
        }

        if let Some(engine) = &request.engine {
            return self.execute_engine(engine, &request, now);
        }

        self.execute_capsule(&request, now)
    }

    fn execute_engine(&self, engine: &str, request: &OrchestrationRequest<'_>, now: i64) -> Result<OrchestrationResult, OrchestratorError> {
        validate_engine_params(engine, &request.engine_params)?;

        let outcome = self.engines.execute(engine, &request.engine_params, &request.tenant_id, &request.actor, request.require_approval);

        let (status, engine_result) = match outcome {
            Ok(result) => (OrchestrationStatus::Succeeded, Some(result)),
            Err(_) => (OrchestrationStatus::Failed, None),
        };

        let receipt = ReceiptPayload {
            plan_hash: None,
            plan_id: None,
            plan_run_id: None,
            status: status.as_str().to_string(),
            approvals: Vec::new(),
            actor: request.actor.clone(),
            tenant_id: request.tenant_id.clone(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            engine: Some(engine.to_string()),
            engine_result: engine_result.clone(),
        };
        let receipt_id = self.receipts.write(&receipt).ok();

        Ok(OrchestrationResult {
            plan_run_id: None,
            status,
            receipt_id,
            approvals_count: 0,
            duration_seconds: 0.0,
            engine_result,
        })
    }

    fn execute_capsule(&self, request: &OrchestrationRequest<'_>, now: i64) -> Result<OrchestrationResult, OrchestratorError> {
        let capsule = request.capsule.ok_or_else(|| OrchestratorError::External("compiler".to_string(), "capsule is required".to_string()))?;

        let compilation = self.compiler.compile_capsule(capsule, request.tenant_id.clone(), &CompilationRequest::default(), now)?;
        let Some(plan) = compilation.plan.filter(|_| compilation.success) else {
            return self.finish(request, now, now, None, None, None, OrchestrationStatus::Failed, Vec::new());
        };

        let plan_id = self.executor.create_plan(&plan)?;
        let run_id = self.executor.start_run(&plan_id)?;

        let mut approvals = Vec::new();

        for _poll in 0..MAX_RUN_POLLS {
            let snapshot = self.executor.get_run(&run_id)?;

            if !request.require_approval {
                if snapshot.status.is_terminal() {
                    let status = terminal_status(snapshot.status);
                    return self.finish(request, now, now, Some(plan.plan_hash.clone()), Some(plan_id), Some(run_id), status, approvals);
                }
                continue;
            }

            let pending = self.executor.list_clarifications(&run_id)?;
            for clarification in pending.iter().filter(|c| c.status == "pending") {
                let approval_id = self.approvals.open(clarification, &request.tenant_id, &request.actor)?;
                let outcome = self.approvals.wait(&approval_id, DEFAULT_APPROVAL_TIMEOUT_SECONDS, DEFAULT_POLL_SECONDS)?;
                let approved = matches!(outcome, ApprovalOutcome::Approved);
                approvals.push(ApprovalRecord { approval_id, status: approval_status_str(outcome).to_string() });
                self.executor.respond_clarification(&run_id, &clarification.id, approved)?;

                if !approved {
                    let _ = self.executor.cancel_run(&run_id);
                    return self.finish(
                        request,
                        now,
                        now,
                        Some(plan.plan_hash.clone()),
                        Some(plan_id.clone()),
                        Some(run_id.clone()),
                        OrchestrationStatus::Rejected,
                        approvals,
                    );
                }
            }

            if snapshot.status.is_terminal() {
                let status = terminal_status(snapshot.status);
                return self.finish(request, now, now, Some(plan.plan_hash.clone()), Some(plan_id), Some(run_id), status, approvals);
            }
        }

        // Exhausted MAX_RUN_POLLS without reaching a terminal status.
        self.finish(request, now, now, Some(plan.plan_hash.clone()), Some(plan_id), Some(run_id), OrchestrationStatus::Failed, approvals)
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the receipt payload this assembles")]
    fn finish(
        &self,
        request: &OrchestrationRequest<'_>,
        started_at: i64,
        completed_at: i64,
        plan_hash: Option<String>,
        plan_id: Option<String>,
        plan_run_id: Option<String>,
        status: OrchestrationStatus,
        approvals: Vec<ApprovalRecord>,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let approvals_count = approvals.len();
        let receipt = ReceiptPayload {
            plan_hash,
            plan_id,
            plan_run_id: plan_run_id.clone(),
            status: status.as_str().to_string(),
            approvals,
            actor: request.actor.clone(),
            tenant_id: request.tenant_id.clone(),
            started_at,
            completed_at,
            #[allow(clippy::cast_precision_loss, reason = "durations are small nonnegative integers")]
            duration_seconds: (completed_at - started_at) as f64,
            engine: None,
            engine_result: None,
        };
        let receipt_id = self.receipts.write(&receipt).ok();

        Ok(OrchestrationResult {
            plan_run_id,
            status,
            receipt_id,
            approvals_count,
            #[allow(clippy::cast_precision_loss, reason = "durations are small nonnegative integers")]
            duration_seconds: (completed_at - started_at) as f64,
            engine_result: None,
        })
    }
}

fn terminal_status(status: RunStatus) -> OrchestrationStatus {
    match status {
        RunStatus::Completed => OrchestrationStatus::Succeeded,
        _ => OrchestrationStatus::Failed,
    }
}

fn approval_status_str(outcome: ApprovalOutcome) -> &'static str {
    match outcome {
        ApprovalOutcome::Approved => "approved",
        ApprovalOutcome::Rejected => "rejected",
        ApprovalOutcome::TimedOut => "timeout",
    }
}

const PAYMENT_LINK_CURRENCIES: &[&str] = &["INR", "USD", "EUR"];

/// Validates engine parameters for a recognized MCP engine (spec §4.9 step 2).
///
/// # Errors
/// Returns [`OrchestratorError::InvalidEngineParams`] for an unrecognized
/// engine or malformed parameters.
pub fn validate_engine_params(engine: &str, params: &serde_json::Value) -> Result<(), OrchestratorError> {
    match engine {
        "razorpay_mcp_payment_link" => {
            let amount = params.get("amount").and_then(serde_json::Value::as_i64);
            if !matches!(amount, Some(value) if value > 0) {
                return Err(OrchestratorError::InvalidEngineParams("amount must be a positive integer".to_string()));
            }
            let currency = params.get("currency").and_then(serde_json::Value::as_str).unwrap_or("INR");
            if !PAYMENT_LINK_CURRENCIES.contains(&currency) {
                return Err(OrchestratorError::InvalidEngineParams(format!("currency '{currency}' is not supported")));
            }
            Ok(())
        }
        "razorpay_mcp_refund" => {
            let payment_id = params.get("payment_id").and_then(serde_json::Value::as_str).unwrap_or("");
            if !payment_id.starts_with("pay_") {
                return Err(OrchestratorError::InvalidEngineParams("payment_id must start with 'pay_'".to_string()));
            }
            if let Some(amount) = params.get("amount").and_then(serde_json::Value::as_i64) {
                if amount <= 0 {
                    return Err(OrchestratorError::InvalidEngineParams("amount must be a positive integer".to_string()));
                }
            }
            Ok(())
        }
        other => Err(OrchestratorError::InvalidEngineParams(format!("unrecognized engine '{other}'"))),
    }
}
