// capgate-core/src/domain/policy/mod.rs
// ============================================================================
// Module: Policy DSL (component F)
// Description: Lex, parse, validate, and evaluate the capability policy
//              language.
// Purpose: Let tenants author data-driven allow/deny/redact rules beyond
//          what static tool allow-lists express, per spec §4.5.
// Dependencies: see submodules
// ============================================================================

//! ## Overview
//! The pipeline is lex → parse → validate → evaluate, each its own
//! submodule. [`PolicyEngine`] wraps the pipeline so callers only need to
//! compile a policy once and can then evaluate it repeatedly.

pub mod ast;
pub mod builtins;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod validator;

use std::collections::HashMap;

use serde_json::Value;

use crate::domain::errors::PolicyDslError;
use crate::domain::policy::ast::Policy;
use crate::domain::policy::evaluator::EvaluationResult;
use crate::domain::policy::validator::ValidationResult;

/// A parsed and statically validated policy, ready to evaluate repeatedly.
pub struct CompiledPolicy {
    policy: Policy,
}

impl CompiledPolicy {
    /// Parses and validates `source`, rejecting it if validation finds any
    /// error-level issue.
    ///
    /// # Errors
    /// Returns [`PolicyDslError::Lex`]/[`PolicyDslError::Parse`] on a
    /// malformed document, or [`PolicyDslError::Invalid`] carrying the error
    /// count if validation fails.
    pub fn compile(source: &str) -> Result<Self, PolicyDslError> {
        let policy = parser::parse_policy(source)?;
        let result = validator::validate(&policy);
        if !result.is_valid {
            return Err(PolicyDslError::Invalid(result.errors().len()));
        }
        Ok(Self { policy })
    }

    /// Returns the validation findings for this policy (including warnings,
    /// which do not block compilation).
    #[must_use]
    pub fn validation(&self) -> ValidationResult {
        validator::validate(&self.policy)
    }

    /// Evaluates this policy against `data`.
    ///
    /// # Errors
    /// Returns [`PolicyDslError::Evaluation`] on an unknown identifier or
    /// function encountered during evaluation.
    pub fn evaluate(&self, data: &HashMap<String, Value>) -> Result<EvaluationResult, PolicyDslError> {
        evaluator::evaluate_policy(&self.policy, data)
    }

    /// Returns the underlying parsed policy.
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
