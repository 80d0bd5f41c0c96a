// capgate-core/src/domain/policy/validator.rs
// ============================================================================
// Module: Policy DSL Validator
// Description: Static checks run on a parsed Policy before it is activated.
// Purpose: Fourth stage of the policy compilation pipeline (spec §4.5);
//          catches duplicate rule names and unknown function calls before
//          they fail at evaluation time.
// Dependencies: crate::domain::policy::ast
// ============================================================================

//! ## Overview
//! Validation never evaluates expressions against data — it only inspects
//! the AST's static shape: rule name uniqueness, non-empty policy/rule
//! names, and that every called function name is in the built-in table.

use std::collections::HashSet;

use crate::domain::policy::ast::Expr;
use crate::domain::policy::ast::Policy;

const KNOWN_FUNCTIONS: &[&str] = &[
    "len",
    "lower",
    "upper",
    "strip",
    "type",
    "str",
    "is_email",
    "is_phone",
    "is_ssn",
    "is_credit_card",
    "contains_pii",
];

/// Severity of a [`ValidationIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// The policy must not be activated.
    Error,
    /// Worth surfacing, does not block activation.
    Warning,
}

/// One finding from [`validate`].
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// How serious the finding is.
    pub level: ValidationLevel,
    /// Human-readable description.
    pub message: String,
    /// The rule the finding concerns, if any.
    pub rule_name: Option<String>,
}

/// Outcome of validating a [`Policy`].
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// `true` iff no issue has [`ValidationLevel::Error`].
    pub is_valid: bool,
    /// Every issue found, in discovery order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns only the error-level issues.
    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|issue| issue.level == ValidationLevel::Error).collect()
    }
}

/// Statically validates `policy`.
#[must_use]
pub fn validate(policy: &Policy) -> ValidationResult {
    let mut issues = Vec::new();

    if policy.name.trim().is_empty() {
        issues.push(ValidationIssue {
            level: ValidationLevel::Error,
            message: "policy must have a non-empty name".to_string(),
            rule_name: None,
        });
    }

    let mut seen_names = HashSet::new();
    for rule in &policy.rules {
        if !seen_names.insert(rule.name.clone()) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                message: format!("duplicate rule name: '{}'", rule.name),
                rule_name: Some(rule.name.clone()),
            });
        }
        check_functions(&rule.condition, &rule.name, &mut issues);
        if !rule.enabled {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                message: "rule is disabled and will never be evaluated".to_string(),
                rule_name: Some(rule.name.clone()),
            });
        }
    }

    let has_errors = issues.iter().any(|issue| issue.level == ValidationLevel::Error);
    ValidationResult {
        is_valid: !has_errors,
        issues,
    }
}

fn check_functions(expr: &Expr, rule_name: &str, issues: &mut Vec<ValidationIssue>) {
    match expr {
        Expr::FunctionCall { name, arguments } => {
            if !KNOWN_FUNCTIONS.contains(&name.as_str()) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    message: format!("unknown function: '{name}'"),
                    rule_name: Some(rule_name.to_string()),
                });
            }
            for argument in arguments {
                check_functions(argument, rule_name, issues);
            }
        }
        Expr::Binary { left, right, .. } => {
            check_functions(left, rule_name, issues);
            check_functions(right, rule_name, issues);
        }
        Expr::Unary { operand, .. } => check_functions(operand, rule_name, issues),
        Expr::List(elements) => {
            for element in elements {
                check_functions(element, rule_name, issues);
            }
        }
        Expr::Dict(pairs) => {
            for (key, value) in pairs {
                check_functions(key, rule_name, issues);
                check_functions(value, rule_name, issues);
            }
        }
        Expr::Literal(_) | Expr::Identifier { .. } => {}
    }
}
