// capgate-core/src/domain/errors.rs
// ============================================================================
// Module: Capability Enforcement Error Taxonomy
// Description: Shared error classification plus per-component error enums.
// Purpose: Let transport layers map any domain error to HTTP status and
//          retry policy via one shared `ErrorCategory`, matching the
//          teacher's small-per-module-enum-plus-shared-classification style.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every fallible operation in the capability enforcement core returns a
//! component-local error enum. Each such enum implements [`CategorizedError`]
//! so callers one layer up (middleware, HTTP broker) can decide status codes
//! and retry behavior without matching on every variant by hand.

use thiserror::Error;

/// Coarse error category used for HTTP status mapping and retry policy.
///
/// See spec §7 for the propagation rule attached to each category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, unknown enum value, bad semver. Never retried.
    Validation,
    /// Invalid/expired token, insufficient capability, tool blocked.
    Authorization,
    /// Missing plan/rule/token.
    NotFound,
    /// Duplicate rule name, replay detected.
    Conflict,
    /// Datastore/executor/approvals timeout. Retryable with backoff.
    Transient,
    /// Programmer error or serialization failure. Never leaked verbatim.
    Internal,
    /// Unknown identifier/function or regex failure during evaluation.
    PolicyEvaluation,
}

impl ErrorCategory {
    /// Returns whether the core should attempt an internal retry before
    /// surfacing this category to the caller.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Implemented by every component error enum to expose its [`ErrorCategory`].
pub trait CategorizedError {
    /// Returns the coarse category this error belongs to.
    fn category(&self) -> ErrorCategory;
}

/// Errors raised by the Token Service (§4.1).
#[derive(Debug, Error)]
pub enum TokenServiceError {
    /// Caller supplied zero capabilities, an out-of-range TTL, or an empty subject.
    #[error("invalid token request: {0}")]
    InvalidRequest(String),
    /// Signature verification failed or the token is structurally malformed.
    #[error("token signature invalid")]
    BadSignature,
    /// The token's `exp` claim is not in the future.
    #[error("token expired")]
    Expired,
    /// The token's `tenant` claim does not match the caller's tenant.
    #[error("token tenant mismatch")]
    TenantMismatch,
    /// No active, non-revoked row exists for this token.
    #[error("token not active")]
    NotActive,
    /// No token row exists for the given identifier.
    #[error("token not found: {0}")]
    NotFound(String),
    /// The underlying store failed.
    #[error("token store error: {0}")]
    Store(String),
    /// An unexpected internal failure occurred.
    #[error("internal token service error: {0}")]
    Internal(String),
}

impl CategorizedError for TokenServiceError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest(_) => ErrorCategory::Validation,
            Self::BadSignature | Self::Expired | Self::TenantMismatch | Self::NotActive => {
                ErrorCategory::Authorization
            }
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Store(_) => ErrorCategory::Transient,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// Errors raised by the Capability Checker (§4.3).
#[derive(Debug, Error)]
pub enum CapabilityCheckError {
    /// A rule's regex pattern failed to compile.
    #[error("invalid rule pattern: {0}")]
    BadPattern(String),
    /// The underlying rule store failed.
    #[error("rule store error: {0}")]
    Store(String),
}

impl CategorizedError for CapabilityCheckError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::BadPattern(_) => ErrorCategory::Validation,
            Self::Store(_) => ErrorCategory::Transient,
        }
    }
}

/// Errors raised while creating or updating a [`crate::domain::capability::ToolAllowListRule`].
#[derive(Debug, Error)]
pub enum RuleError {
    /// Another active rule already claims `(tenant_id, capability_name, tool_pattern)`.
    #[error("duplicate rule for tenant/capability/tool")]
    Duplicate,
    /// The rule's fields failed validation.
    #[error("invalid rule: {0}")]
    Invalid(String),
}

impl CategorizedError for RuleError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Duplicate => ErrorCategory::Conflict,
            Self::Invalid(_) => ErrorCategory::Validation,
        }
    }
}

/// Errors raised by the Policy DSL pipeline (§4.5).
///
/// Named `PolicyDslError` (not `PolicyError`) to avoid colliding with the
/// existing `crate::interfaces::PolicyError` trait-associated error type.
#[derive(Debug, Error)]
pub enum PolicyDslError {
    /// The lexer encountered an unrecognized character.
    #[error("lexer error at {line}:{column}: {message}")]
    Lex {
        /// Human-readable description of the lexical error.
        message: String,
        /// One-based source line.
        line: usize,
        /// One-based source column.
        column: usize,
    },
    /// The parser could not produce a well-formed AST.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        /// Human-readable description of the parse error.
        message: String,
        /// One-based source line.
        line: usize,
        /// One-based source column.
        column: usize,
    },
    /// Evaluation failed on an unknown identifier, unknown function, or
    /// a regex that failed to compile at evaluation time.
    #[error("evaluation error: {0}")]
    Evaluation(String),
    /// Static validation rejected the policy (see [`crate::domain::policy::validator`]).
    #[error("policy failed validation with {0} error(s)")]
    Invalid(usize),
}

impl CategorizedError for PolicyDslError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Lex { .. } | Self::Parse { .. } | Self::Invalid(_) => ErrorCategory::Validation,
            Self::Evaluation(_) => ErrorCategory::PolicyEvaluation,
        }
    }
}

/// Errors raised by the Plan Compiler (§4.7).
#[derive(Debug, Error)]
pub enum PlanCompileError {
    /// A non-optional dependency had no resolvable version.
    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(String),
    /// Two dependency specs resolved the same name to different versions.
    #[error("dependency conflict on {0}")]
    DependencyConflict(String),
    /// The capsule's automation shape could not be transformed into flows.
    #[error("flow transformation failed: {0}")]
    FlowTransform(String),
    /// The compiled plan failed structural validation.
    #[error("plan validation failed: {0} error(s)")]
    Invalid(usize),
    /// An internal failure occurred while compiling (e.g. hashing).
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CategorizedError for PlanCompileError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::UnresolvedDependency(_) | Self::DependencyConflict(_) | Self::FlowTransform(_) | Self::Invalid(_) => {
                ErrorCategory::Validation
            }
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// Errors raised by the Plan Cache (§4.8).
#[derive(Debug, Error)]
pub enum PlanCacheError {
    /// The entry was not found, was tenant-mismatched, or had expired.
    #[error("plan cache miss")]
    Miss,
    /// The plan exceeds the cache's configured size limit on its own.
    #[error("plan exceeds cache size limit")]
    TooLarge,
}

impl CategorizedError for PlanCacheError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Miss => ErrorCategory::NotFound,
            Self::TooLarge => ErrorCategory::Validation,
        }
    }
}

/// Errors raised by the Orchestrator Core (§4.9).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The supplied capability token failed verification.
    #[error("capability token rejected: {0}")]
    TokenRejected(String),
    /// Engine parameters failed validation (e.g. bad payment amount/currency).
    #[error("invalid engine parameters: {0}")]
    InvalidEngineParams(String),
    /// The plan compiler failed to produce a plan.
    #[error(transparent)]
    Compile(#[from] PlanCompileError),
    /// An approval was rejected by the approver.
    #[error("run rejected during approval")]
    Rejected,
    /// An external client call exceeded its deadline.
    #[error("external call to {0} timed out")]
    Timeout(String),
    /// An external client call failed for a reason other than timeout.
    #[error("external call to {0} failed: {1}")]
    External(String, String),
}

impl CategorizedError for OrchestratorError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::TokenRejected(_) => ErrorCategory::Authorization,
            Self::InvalidEngineParams(_) => ErrorCategory::Validation,
            Self::Compile(inner) => inner.category(),
            Self::Rejected => ErrorCategory::Authorization,
            Self::Timeout(_) | Self::External(_, _) => ErrorCategory::Transient,
        }
    }
}
