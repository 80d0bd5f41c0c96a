// capgate-core/src/domain/policy/parser.rs
// ============================================================================
// Module: Policy DSL Parser
// Description: Recursive-descent parser producing a Policy AST.
// Purpose: Second stage of the policy compilation pipeline (spec §4.5).
// Dependencies: serde_json, crate::domain::{errors, policy::{lexer, ast}}
// ============================================================================

//! ## Overview
//! Operator precedence, loosest to tightest: `or`, `and`, equality
//! (`==`/`!=`), comparison (`<`/`>`/`<=`/`>=`), string operators
//! (`contains`/`matches`/`starts_with`/`ends_with`), membership
//! (`in`/`not_in`), unary `not`, then primaries (literals, identifiers,
//! function calls, lists, dicts, parenthesized expressions).

use std::collections::HashMap;

use serde_json::Value;

use crate::domain::errors::PolicyDslError;
use crate::domain::policy::ast::Action;
use crate::domain::policy::ast::ActionType;
use crate::domain::policy::ast::Expr;
use crate::domain::policy::ast::Operator;
use crate::domain::policy::ast::Policy;
use crate::domain::policy::ast::Rule;
use crate::domain::policy::lexer::Lexer;
use crate::domain::policy::lexer::Token;
use crate::domain::policy::lexer::TokenType;

/// Parses `source` end to end into a [`Policy`].
///
/// # Errors
/// Returns [`PolicyDslError::Lex`] or [`PolicyDslError::Parse`].
pub fn parse_policy(source: &str) -> Result<Policy, PolicyDslError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_policy()
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, position: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn is_at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.is_at_end() && self.current().token_type == token_type
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.check(TokenType::Keyword) && self.current().value.eq_ignore_ascii_case(keyword)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.is_at_end() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, token_type: TokenType) -> Result<Token, PolicyDslError> {
        if self.check(token_type) {
            return Ok(self.advance());
        }
        let current = self.current().clone();
        Err(PolicyDslError::Parse {
            message: format!("expected {token_type:?}, got {:?} ('{}')", current.token_type, current.value),
            line: current.line,
            column: current.column,
        })
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Token, PolicyDslError> {
        if self.check_keyword(keyword) {
            return Ok(self.advance());
        }
        let current = self.current().clone();
        Err(PolicyDslError::Parse {
            message: format!("expected keyword '{keyword}', got '{}'", current.value),
            line: current.line,
            column: current.column,
        })
    }

    fn error(&self, message: impl Into<String>) -> PolicyDslError {
        let current = self.current();
        PolicyDslError::Parse {
            message: message.into(),
            line: current.line,
            column: current.column,
        }
    }

    fn parse_policy(&mut self) -> Result<Policy, PolicyDslError> {
        self.expect_keyword("policy")?;
        let name = self.expect(TokenType::String)?.value;
        self.expect(TokenType::LBrace)?;

        let mut description = None;
        let mut rules = Vec::new();
        let mut metadata = HashMap::new();

        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check_keyword("description") {
                self.advance();
                self.expect(TokenType::Colon)?;
                description = Some(self.expect(TokenType::String)?.value);
            } else if self.check_keyword("rule") {
                rules.push(self.parse_rule()?);
            } else if self.check(TokenType::Identifier) {
                let key = self.expect(TokenType::Identifier)?.value;
                self.expect(TokenType::Colon)?;
                let value = self.parse_literal_value()?;
                metadata.insert(key, value);
            } else {
                self.advance();
            }
        }
        self.expect(TokenType::RBrace)?;

        Ok(Policy {
            name,
            description,
            rules,
            metadata,
        })
    }

    fn parse_rule(&mut self) -> Result<Rule, PolicyDslError> {
        self.expect_keyword("rule")?;
        let name = self.expect(TokenType::String)?.value;
        self.expect(TokenType::LBrace)?;

        let mut condition = None;
        let mut actions = Vec::new();
        let mut priority = 0;
        let mut enabled = true;

        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check_keyword("when") {
                self.advance();
                condition = Some(self.parse_expression()?);
            } else if self.check_keyword("then") {
                self.advance();
                actions.extend(self.parse_actions()?);
            } else if self.check_keyword("priority") {
                self.advance();
                self.expect(TokenType::Colon)?;
                let token = self.expect(TokenType::Number)?;
                priority = token
                    .value
                    .parse::<i32>()
                    .map_err(|_| self.error(format!("invalid priority: {}", token.value)))?;
            } else if self.check_keyword("enabled") {
                self.advance();
                self.expect(TokenType::Colon)?;
                let token = self.expect(TokenType::Boolean)?;
                enabled = token.value.eq_ignore_ascii_case("true");
            } else {
                self.advance();
            }
        }
        self.expect(TokenType::RBrace)?;

        let Some(condition) = condition else {
            return Err(self.error("rule must have a 'when' condition"));
        };
        if actions.is_empty() {
            return Err(self.error("rule must have at least one 'then' action"));
        }

        Ok(Rule {
            name,
            condition,
            actions,
            priority,
            enabled,
        })
    }

    fn parse_actions(&mut self) -> Result<Vec<Action>, PolicyDslError> {
        let mut actions = Vec::new();
        if self.check(TokenType::LBrace) {
            self.advance();
            while !self.check(TokenType::RBrace) && !self.is_at_end() {
                if is_action_keyword(self.current()) {
                    actions.push(self.parse_action()?);
                } else {
                    self.advance();
                }
            }
            self.expect(TokenType::RBrace)?;
        } else {
            actions.push(self.parse_action()?);
        }
        Ok(actions)
    }

    fn parse_action(&mut self) -> Result<Action, PolicyDslError> {
        let token = self.current().clone();
        let action_type = if self.check_keyword("allow") {
            ActionType::Allow
        } else if self.check_keyword("deny") {
            ActionType::Deny
        } else if self.check_keyword("redact") {
            ActionType::Redact
        } else if self.check_keyword("log") {
            ActionType::Log
        } else if self.check_keyword("alert") {
            ActionType::Alert
        } else if self.check_keyword("require_approval") {
            ActionType::RequireApproval
        } else {
            return Err(self.error(format!("expected action type, got '{}'", token.value)));
        };
        self.advance();

        let mut parameters = HashMap::new();
        if self.check(TokenType::LParen) {
            self.advance();
            while !self.check(TokenType::RParen) && !self.is_at_end() {
                let key = self.expect(TokenType::Identifier)?.value;
                self.expect(TokenType::Assign)?;
                let value = self.parse_literal_value()?;
                parameters.insert(key, value);
                if self.check(TokenType::Comma) {
                    self.advance();
                }
            }
            self.expect(TokenType::RParen)?;
        }

        Ok(Action { action_type, parameters })
    }

    fn parse_expression(&mut self) -> Result<Expr, PolicyDslError> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_and_expression()?;
        while self.check(TokenType::Or) {
            self.advance();
            let right = self.parse_and_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator: Operator::Or,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_equality_expression()?;
        while self.check(TokenType::And) {
            self.advance();
            let right = self.parse_equality_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator: Operator::And,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_equality_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_comparison_expression()?;
        loop {
            let operator = if self.check(TokenType::Equals) {
                Operator::Eq
            } else if self.check(TokenType::NotEquals) {
                Operator::Ne
            } else {
                break;
            };
            self.advance();
            let right = self.parse_comparison_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_comparison_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_string_expression()?;
        loop {
            let operator = if self.check(TokenType::GreaterThan) {
                Operator::Gt
            } else if self.check(TokenType::LessThan) {
                Operator::Lt
            } else if self.check(TokenType::GreaterEqual) {
                Operator::Ge
            } else if self.check(TokenType::LessEqual) {
                Operator::Le
            } else {
                break;
            };
            self.advance();
            let right = self.parse_string_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_string_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_membership_expression()?;
        loop {
            let operator = if self.check(TokenType::Contains) {
                Operator::Contains
            } else if self.check(TokenType::Matches) {
                Operator::Matches
            } else if self.check(TokenType::StartsWith) {
                Operator::StartsWith
            } else if self.check(TokenType::EndsWith) {
                Operator::EndsWith
            } else {
                break;
            };
            self.advance();
            let right = self.parse_membership_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_membership_expression(&mut self) -> Result<Expr, PolicyDslError> {
        let mut expr = self.parse_unary_expression()?;
        loop {
            let operator = if self.check(TokenType::In) {
                Operator::In
            } else if self.check(TokenType::NotIn) {
                Operator::NotIn
            } else {
                break;
            };
            self.advance();
            let right = self.parse_unary_expression()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary_expression(&mut self) -> Result<Expr, PolicyDslError> {
        if self.check(TokenType::Not) {
            self.advance();
            let operand = self.parse_unary_expression()?;
            return Ok(Expr::Unary {
                operator: Operator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_primary_expression()
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, PolicyDslError> {
        if matches!(
            self.current().token_type,
            TokenType::String | TokenType::Number | TokenType::Boolean | TokenType::Null
        ) {
            return Ok(Expr::Literal(self.parse_literal_value()?));
        }
        if self.check(TokenType::Identifier) {
            return self.parse_identifier_or_function_call();
        }
        if self.check(TokenType::LBracket) {
            return self.parse_list();
        }
        if self.check(TokenType::LBrace) {
            return self.parse_dict();
        }
        if self.check(TokenType::LParen) {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(TokenType::RParen)?;
            return Ok(expr);
        }
        let current = self.current().value.clone();
        Err(self.error(format!("unexpected token: {current}")))
    }

    fn parse_identifier_or_function_call(&mut self) -> Result<Expr, PolicyDslError> {
        let name_token = self.expect(TokenType::Identifier)?;
        if self.check(TokenType::LParen) {
            self.advance();
            let mut arguments = Vec::new();
            while !self.check(TokenType::RParen) && !self.is_at_end() {
                arguments.push(self.parse_expression()?);
                if self.check(TokenType::Comma) {
                    self.advance();
                }
            }
            self.expect(TokenType::RParen)?;
            return Ok(Expr::FunctionCall {
                name: name_token.value,
                arguments,
            });
        }

        let mut path = Vec::new();
        while self.check(TokenType::Dot) {
            self.advance();
            path.push(self.expect(TokenType::Identifier)?.value);
        }
        Ok(Expr::Identifier {
            name: name_token.value,
            path,
        })
    }

    fn parse_list(&mut self) -> Result<Expr, PolicyDslError> {
        self.expect(TokenType::LBracket)?;
        let mut elements = Vec::new();
        while !self.check(TokenType::RBracket) && !self.is_at_end() {
            elements.push(self.parse_expression()?);
            if self.check(TokenType::Comma) {
                self.advance();
            }
        }
        self.expect(TokenType::RBracket)?;
        Ok(Expr::List(elements))
    }

    fn parse_dict(&mut self) -> Result<Expr, PolicyDslError> {
        self.expect(TokenType::LBrace)?;
        let mut pairs = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            let key = self.parse_expression()?;
            self.expect(TokenType::Colon)?;
            let value = self.parse_expression()?;
            pairs.push((key, value));
            if self.check(TokenType::Comma) {
                self.advance();
            }
        }
        self.expect(TokenType::RBrace)?;
        Ok(Expr::Dict(pairs))
    }

    fn parse_literal_value(&mut self) -> Result<Value, PolicyDslError> {
        if self.check(TokenType::String) {
            return Ok(Value::String(self.advance().value));
        }
        if self.check(TokenType::Number) {
            let token = self.advance();
            return Ok(parse_number(&token.value));
        }
        if self.check(TokenType::Boolean) {
            let token = self.advance();
            return Ok(Value::Bool(token.value.eq_ignore_ascii_case("true")));
        }
        if self.check(TokenType::Null) {
            self.advance();
            return Ok(Value::Null);
        }
        if self.check(TokenType::LBracket) {
            self.advance();
            let mut elements = Vec::new();
            while !self.check(TokenType::RBracket) && !self.is_at_end() {
                elements.push(self.parse_literal_value()?);
                if self.check(TokenType::Comma) {
                    self.advance();
                }
            }
            self.expect(TokenType::RBracket)?;
            return Ok(Value::Array(elements));
        }
        let current = self.current().value.clone();
        Err(self.error(format!("expected literal value, got '{current}'")))
    }
}

fn parse_number(text: &str) -> Value {
    if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number)
    } else {
        text.parse::<i64>().map_or(Value::Null, |n| Value::Number(n.into()))
    }
}

fn is_action_keyword(token: &Token) -> bool {
    token.token_type == TokenType::Keyword
        && matches!(
            token.value.to_ascii_lowercase().as_str(),
            "allow" | "deny" | "redact" | "log" | "alert" | "require_approval"
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_policy_with_one_rule() {
        let policy = parse_policy(
            r#"
            policy "pii-guard" {
                description: "blocks PII leaks"
                rule "deny-ssn" {
                    when contains_pii(response.body) == true
                    then deny
                    priority: 10
                }
            }
            "#,
        )
        .expect("parse succeeds");

        assert_eq!(policy.name, "pii-guard");
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].priority, 10);
        assert_eq!(policy.rules[0].actions[0].action_type, ActionType::Deny);
    }

    #[test]
    fn parses_dotted_identifier_path() {
        let policy = parse_policy(
            r#"
            policy "p" {
                rule "r" {
                    when user.email == "a@example.com"
                    then allow
                }
            }
            "#,
        )
        .expect("parse succeeds");
        match &policy.rules[0].condition {
            Expr::Binary { left, .. } => match left.as_ref() {
                Expr::Identifier { name, path } => {
                    assert_eq!(name, "user");
                    assert_eq!(path, &vec!["email".to_string()]);
                }
                other => panic!("expected identifier, got {other:?}"),
            },
            other => panic!("expected binary expression, got {other:?}"),
        }
    }

    #[test]
    fn rule_without_when_is_a_parse_error() {
        let err = parse_policy(
            r#"
            policy "p" {
                rule "r" {
                    then allow
                }
            }
            "#,
        )
        .expect_err("must fail");
        assert!(matches!(err, PolicyDslError::Parse { .. }));
    }

    #[test]
    fn parses_action_parameters() {
        let policy = parse_policy(
            r#"
            policy "p" {
                rule "r" {
                    when true
                    then redact(field="ssn", reason="pii")
                }
            }
            "#,
        )
        .expect("parse succeeds");
        let action = &policy.rules[0].actions[0];
        assert_eq!(action.parameters.get("field"), Some(&Value::String("ssn".to_string())));
    }
}
