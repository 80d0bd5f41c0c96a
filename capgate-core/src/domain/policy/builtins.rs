// capgate-core/src/domain/policy/builtins.rs
// ============================================================================
// Module: Policy DSL Built-in Functions
// Description: The fixed function table callable from policy expressions.
// Purpose: Implement the PII-detection and utility functions spec §4.5
//          requires policies to be able to call.
// Dependencies: regex, serde_json, crate::domain::errors
// ============================================================================

//! ## Overview
//! Every function here takes already-evaluated [`Value`] arguments and
//! returns a [`Value`] or a [`PolicyDslError::Evaluation`]. PII detectors use
//! the same regex families as the capability checker's pattern matching.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::domain::errors::PolicyDslError;

/// Dispatches a built-in function call by name.
///
/// # Errors
/// Returns [`PolicyDslError::Evaluation`] for an unknown function name.
pub fn call(name: &str, args: &[Value]) -> Result<Value, PolicyDslError> {
    match name {
        "len" => Ok(Value::from(len_of(args.first())? as u64)),
        "lower" => Ok(string_map(args.first(), str::to_lowercase)),
        "upper" => Ok(string_map(args.first(), str::to_uppercase)),
        "strip" => Ok(string_map(args.first(), |s| s.trim().to_string())),
        "type" => Ok(Value::String(type_name(args.first()).to_string())),
        "str" => Ok(Value::String(display_value(args.first()))),
        "is_email" => Ok(Value::Bool(is_email(as_text(args.first())))),
        "is_phone" => Ok(Value::Bool(is_phone(as_text(args.first())))),
        "is_ssn" => Ok(Value::Bool(is_ssn(as_text(args.first())))),
        "is_credit_card" => Ok(Value::Bool(is_credit_card(as_text(args.first())))),
        "contains_pii" => Ok(Value::Bool(contains_pii(as_text(args.first())))),
        _ => Err(PolicyDslError::Evaluation(format!("unknown function: {name}"))),
    }
}

fn as_text(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or_default()
}

fn string_map(value: Option<&Value>, transform: impl Fn(&str) -> String) -> Value {
    value
        .and_then(Value::as_str)
        .map_or_else(|| value.cloned().unwrap_or(Value::Null), |s| Value::String(transform(s)))
}

fn len_of(value: Option<&Value>) -> Result<usize, PolicyDslError> {
    match value {
        Some(Value::String(s)) => Ok(s.chars().count()),
        Some(Value::Array(a)) => Ok(a.len()),
        Some(Value::Object(o)) => Ok(o.len()),
        _ => Err(PolicyDslError::Evaluation("len() requires a string, list, or dict".to_string())),
    }
}

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        Some(Value::String(_)) => "str",
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => "int",
        Some(Value::Number(_)) => "float",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Array(_)) => "list",
        Some(Value::Object(_)) => "dict",
        _ => "NoneType",
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used, reason = "pattern is a fixed, test-covered literal")]
    PATTERN.get_or_init(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap())
}

fn phone_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    #[allow(clippy::unwrap_used, reason = "patterns are fixed, test-covered literals")]
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\b\d{3}-\d{3}-\d{4}\b").unwrap(),
            Regex::new(r"\(\d{3}\)\s*\d{3}-\d{4}").unwrap(),
            Regex::new(r"\b\d{10}\b").unwrap(),
            Regex::new(r"\+1\s*\d{3}\s*\d{3}\s*\d{4}").unwrap(),
        ]
    })
}

fn ssn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used, reason = "pattern is a fixed, test-covered literal")]
    PATTERN.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap())
}

fn credit_card_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used, reason = "pattern is a fixed, test-covered literal")]
    PATTERN.get_or_init(|| Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").unwrap())
}

fn is_email(text: &str) -> bool {
    email_pattern().is_match(text)
}

fn is_phone(text: &str) -> bool {
    phone_patterns().iter().any(|pattern| pattern.is_match(text))
}

fn is_ssn(text: &str) -> bool {
    ssn_pattern().is_match(text)
}

fn is_credit_card(text: &str) -> bool {
    credit_card_pattern().is_match(text)
}

/// Returns whether `text` contains an email, phone number, SSN, or credit
/// card number (spec §4.5 `contains_pii`).
#[must_use]
pub fn contains_pii(text: &str) -> bool {
    is_email(text) || is_phone(text) || is_ssn(text) || is_credit_card(text)
}
