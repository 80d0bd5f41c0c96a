// capgate-core/src/domain/policy/evaluator.rs
// ============================================================================
// Module: Policy DSL Evaluator
// Description: Evaluates a parsed Policy against a data context.
// Purpose: Third stage of the policy compilation pipeline (spec §4.5).
// Dependencies: regex, serde_json, crate::domain::{errors, policy::ast}
// ============================================================================

//! ## Overview
//! Evaluation walks the [`Expr`] tree directly against a `HashMap<String,
//! Value>` data context plus a fixed table of built-in functions. Logical
//! operators short-circuit. Every other operator evaluates both sides first.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::domain::errors::PolicyDslError;
use crate::domain::policy::ast::Action;
use crate::domain::policy::ast::ActionType;
use crate::domain::policy::ast::Expr;
use crate::domain::policy::ast::Operator;
use crate::domain::policy::ast::Policy;
use crate::domain::policy::ast::Rule;

/// One matched action, ready for a transport or enforcement layer to apply.
#[derive(Debug, Clone)]
pub struct AppliedAction {
    /// The effect to apply.
    pub action_type: ActionType,
    /// The action's `key=value` parameters.
    pub parameters: HashMap<String, Value>,
    /// The rule that produced this action.
    pub rule_name: String,
}

/// Result of evaluating a [`Policy`] against a data context (spec §4.5
/// `EvaluationResult`).
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// The policy's name.
    pub policy_name: String,
    /// Names of rules whose condition matched, evaluation (priority) order.
    pub matched_rules: Vec<String>,
    /// Every action from every matched, enabled rule.
    pub actions: Vec<AppliedAction>,
    /// `false` iff any matched rule's actions included [`ActionType::Deny`].
    pub allowed: bool,
}

/// Evaluates `policy` against `data`, highest-priority rule first.
///
/// # Errors
/// Returns [`PolicyDslError::Evaluation`] on an unknown identifier, unknown
/// function, or a `matches` call whose pattern fails to compile.
pub fn evaluate_policy(policy: &Policy, data: &HashMap<String, Value>) -> Result<EvaluationResult, PolicyDslError> {
    let mut matched_rules = Vec::new();
    let mut actions = Vec::new();
    let mut allowed = true;

    let mut rules: Vec<&Rule> = policy.rules.iter().filter(|rule| rule.enabled).collect();
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));

    for rule in rules {
        if evaluate_condition(&rule.condition, data)? {
            matched_rules.push(rule.name.clone());
            for action in &rule.actions {
                if action.action_type == ActionType::Deny {
                    allowed = false;
                }
                actions.push(applied(action, &rule.name));
            }
        }
    }

    Ok(EvaluationResult {
        policy_name: policy.name.clone(),
        matched_rules,
        actions,
        allowed,
    })
}

fn applied(action: &Action, rule_name: &str) -> AppliedAction {
    AppliedAction {
        action_type: action.action_type,
        parameters: action.parameters.clone(),
        rule_name: rule_name.to_string(),
    }
}

fn evaluate_condition(expr: &Expr, data: &HashMap<String, Value>) -> Result<bool, PolicyDslError> {
    Ok(to_boolean(&evaluate_expr(expr, data)?))
}

fn evaluate_expr(expr: &Expr, data: &HashMap<String, Value>) -> Result<Value, PolicyDslError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Identifier { name, path } => resolve_identifier(name, path, data),
        Expr::Binary { left, operator, right } => evaluate_binary(left, *operator, right, data),
        Expr::Unary { operator, operand } => evaluate_unary(*operator, operand, data),
        Expr::FunctionCall { name, arguments } => evaluate_function_call(name, arguments, data),
        Expr::List(elements) => {
            let values = elements
                .iter()
                .map(|element| evaluate_expr(element, data))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
        Expr::Dict(pairs) => {
            let mut map = serde_json::Map::new();
            for (key_expr, value_expr) in pairs {
                let key = evaluate_expr(key_expr, data)?;
                let value = evaluate_expr(value_expr, data)?;
                let key = key.as_str().map_or_else(|| key.to_string(), ToString::to_string);
                map.insert(key, value);
            }
            Ok(Value::Object(map))
        }
    }
}

fn resolve_identifier(name: &str, path: &[String], data: &HashMap<String, Value>) -> Result<Value, PolicyDslError> {
    let mut value = data
        .get(name)
        .cloned()
        .ok_or_else(|| PolicyDslError::Evaluation(format!("identifier '{name}' not found in context")))?;
    for field in path {
        value = match value {
            Value::Object(mut map) => map
                .remove(field)
                .ok_or_else(|| PolicyDslError::Evaluation(format!("field '{field}' not found in '{name}'")))?,
            _ => return Err(PolicyDslError::Evaluation(format!("field '{field}' not found in '{name}'"))),
        };
    }
    Ok(value)
}

fn evaluate_binary(left: &Expr, operator: Operator, right: &Expr, data: &HashMap<String, Value>) -> Result<Value, PolicyDslError> {
    if operator == Operator::And {
        let left_value = evaluate_expr(left, data)?;
        if !to_boolean(&left_value) {
            return Ok(Value::Bool(false));
        }
        let right_value = evaluate_expr(right, data)?;
        return Ok(Value::Bool(to_boolean(&right_value)));
    }
    if operator == Operator::Or {
        let left_value = evaluate_expr(left, data)?;
        if to_boolean(&left_value) {
            return Ok(Value::Bool(true));
        }
        let right_value = evaluate_expr(right, data)?;
        return Ok(Value::Bool(to_boolean(&right_value)));
    }

    let left_value = evaluate_expr(left, data)?;
    let right_value = evaluate_expr(right, data)?;

    let result = match operator {
        Operator::Eq => left_value == right_value,
        Operator::Ne => left_value != right_value,
        Operator::Gt => compare_numbers(&left_value, &right_value, |a, b| a > b)?,
        Operator::Lt => compare_numbers(&left_value, &right_value, |a, b| a < b)?,
        Operator::Ge => compare_numbers(&left_value, &right_value, |a, b| a >= b)?,
        Operator::Le => compare_numbers(&left_value, &right_value, |a, b| a <= b)?,
        Operator::Contains => string_contains(&left_value, &right_value),
        Operator::Matches => string_matches(&left_value, &right_value)?,
        Operator::StartsWith => string_starts_with(&left_value, &right_value),
        Operator::EndsWith => string_ends_with(&left_value, &right_value),
        Operator::In => value_in(&left_value, &right_value),
        Operator::NotIn => !value_in(&left_value, &right_value),
        Operator::And | Operator::Or | Operator::Not => unreachable!("handled above"),
    };
    Ok(Value::Bool(result))
}

fn evaluate_unary(operator: Operator, operand: &Expr, data: &HashMap<String, Value>) -> Result<Value, PolicyDslError> {
    let value = evaluate_expr(operand, data)?;
    match operator {
        Operator::Not => Ok(Value::Bool(!to_boolean(&value))),
        other => Err(PolicyDslError::Evaluation(format!("unknown unary operator: {other:?}"))),
    }
}

fn evaluate_function_call(name: &str, arguments: &[Expr], data: &HashMap<String, Value>) -> Result<Value, PolicyDslError> {
    let args = arguments
        .iter()
        .map(|arg| evaluate_expr(arg, data))
        .collect::<Result<Vec<_>, _>>()?;
    crate::domain::policy::builtins::call(name, &args)
}

fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare_numbers(left: &Value, right: &Value, op: impl Fn(f64, f64) -> bool) -> Result<bool, PolicyDslError> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(op(a, b)),
        _ => match (left.as_str(), right.as_str()) {
            (Some(a), Some(b)) => Ok(op(f64::from(a.cmp(b) as i32), 0.0)),
            _ => Err(PolicyDslError::Evaluation("comparison requires two numbers or two strings".to_string())),
        },
    }
}

fn string_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack.as_str(), needle.as_str()) {
        (Some(h), Some(n)) => h.contains(n),
        _ => false,
    }
}

fn string_matches(text: &Value, pattern: &Value) -> Result<bool, PolicyDslError> {
    match (text.as_str(), pattern.as_str()) {
        (Some(text), Some(pattern)) => {
            let regex = Regex::new(pattern).map_err(|_| PolicyDslError::Evaluation(format!("invalid regex pattern: {pattern}")))?;
            Ok(regex.is_match(text))
        }
        _ => Ok(false),
    }
}

fn string_starts_with(text: &Value, prefix: &Value) -> bool {
    match (text.as_str(), prefix.as_str()) {
        (Some(text), Some(prefix)) => text.starts_with(prefix),
        _ => false,
    }
}

fn string_ends_with(text: &Value, suffix: &Value) -> bool {
    match (text.as_str(), suffix.as_str()) {
        (Some(text), Some(suffix)) => text.ends_with(suffix),
        _ => false,
    }
}

fn value_in(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Object(map) => needle.as_str().is_some_and(|n| map.contains_key(n)),
        _ => false,
    }
}
