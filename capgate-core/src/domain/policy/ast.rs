// capgate-core/src/domain/policy/ast.rs
// ============================================================================
// Module: Policy DSL AST
// Description: Tagged-union expression tree plus policy/rule/action nodes.
// Purpose: Represent a parsed policy for evaluation and validation.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`Expr`] is one enum covering every expression form the grammar
//! produces, with `Box` children and no parent pointers: a tree, not a
//! graph, and no visitor trait — callers match on it directly.

use std::collections::HashMap;

use serde_json::Value;

/// Operators recognized by the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not` (unary)
    Not,
    /// `contains`
    Contains,
    /// `matches`
    Matches,
    /// `starts_with`
    StartsWith,
    /// `ends_with`
    EndsWith,
    /// `in`
    In,
    /// `not_in`
    NotIn,
}

/// A parsed expression. Evaluated directly against a data context; never
/// walked by a visitor.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal string, number, boolean, or null.
    Literal(Value),
    /// An identifier, optionally followed by a dotted field path.
    Identifier {
        /// The root name.
        name: String,
        /// Dotted path segments after the root, e.g. `["email"]` for `user.email`.
        path: Vec<String>,
    },
    /// `left operator right`.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// The operator.
        operator: Operator,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `operator operand`.
    Unary {
        /// The operator (always [`Operator::Not`] in this grammar).
        operator: Operator,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A call to a built-in function.
    FunctionCall {
        /// Function name.
        name: String,
        /// Evaluated argument expressions, in call order.
        arguments: Vec<Expr>,
    },
    /// A list literal.
    List(Vec<Expr>),
    /// A dict literal, preserving insertion order.
    Dict(Vec<(Expr, Expr)>),
}

/// The effect a matched rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Explicitly allow the call.
    Allow,
    /// Deny the call; overrides any `allow`.
    Deny,
    /// Redact part of the response before it leaves the core.
    Redact,
    /// Emit a structured log entry.
    Log,
    /// Raise a violation-reporter alert.
    Alert,
    /// Require an out-of-band approval before proceeding.
    RequireApproval,
}

/// A single action attached to a matched rule.
#[derive(Debug, Clone)]
pub struct Action {
    /// The effect to apply.
    pub action_type: ActionType,
    /// `key=value` parameters parsed from the action's parenthesized argument list.
    pub parameters: HashMap<String, Value>,
}

/// One `rule "name" { when ... then ... }` block.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule name, used for match reporting and duplicate-name validation.
    pub name: String,
    /// The `when` condition.
    pub condition: Expr,
    /// The `then` actions, in source order.
    pub actions: Vec<Action>,
    /// Evaluation priority; higher runs first.
    pub priority: i32,
    /// Whether the rule is evaluated at all.
    pub enabled: bool,
}

/// A complete `policy "name" { ... }` document.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Policy name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// The policy's rules, in source order.
    pub rules: Vec<Rule>,
    /// Arbitrary `key: value` metadata declared at the policy level.
    pub metadata: HashMap<String, Value>,
}
