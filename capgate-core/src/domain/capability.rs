// capgate-core/src/domain/capability.rs
// ============================================================================
// Module: Capability Checker (component C)
// Description: Hierarchical capability matching and tool allow-list rules.
// Purpose: Decide whether a set of granted capabilities authorizes a tool
//          call, per spec §4.3.
// Dependencies: regex, crate::core::identifiers, crate::domain::{ids, errors}
// ============================================================================

//! ## Overview
//! A [`ToolAllowListRule`] binds a capability name to a tool-name pattern (and
//! optionally an action pattern) for a tenant, with an `allow`/`deny`
//! [`RuleType`]. [`CapabilityChecker::check`] loads a tenant's active rules,
//! walks them in ascending priority order, and lets the first matching rule
//! decide the outcome — unless a later matching rule is `deny`, which
//! overrides the decision.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TenantId;
use crate::domain::errors::CapabilityCheckError;
use crate::domain::ids::RuleId;

/// How a rule's `tool_pattern` (and `action_pattern`) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// The value must equal the pattern exactly.
    Exact,
    /// `*` expands to `.*` and `?` to `.`; the whole value must match.
    Glob,
    /// The pattern is a regular expression matched against the whole value.
    Regex,
}

/// Whether a matching rule authorizes or blocks the call (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// A matching rule authorizes the call.
    Allow,
    /// A matching rule blocks the call, overriding any earlier `allow`.
    Deny,
}

/// A tenant-scoped rule permitting or blocking tools matching `tool_pattern`
/// when the caller holds `capability_name` (spec §3 `ToolAllowListRule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAllowListRule {
    /// Rule identifier.
    pub rule_id: RuleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Capability name this rule is gated behind.
    pub capability_name: String,
    /// Tool name pattern, interpreted per `pattern_type`.
    pub tool_pattern: String,
    /// Optional action pattern, interpreted per `pattern_type`; when absent
    /// the rule matches any (or no) action.
    pub action_pattern: Option<String>,
    /// How `tool_pattern`/`action_pattern` are interpreted.
    pub pattern_type: PatternType,
    /// Whether a match authorizes (`Allow`) or blocks (`Deny`) the call.
    pub rule_type: RuleType,
    /// Rules are evaluated in ascending priority order (lower = higher
    /// precedence); ties break in insertion order.
    pub priority: i32,
    /// Whether this rule currently applies.
    pub active: bool,
}

/// Storage contract for [`ToolAllowListRule`] rows.
pub trait RuleStore {
    /// Returns every active rule for a tenant, in arbitrary order.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn active_rules(&self, tenant_id: &TenantId) -> Result<Vec<ToolAllowListRule>, String>;

    /// Inserts a new rule.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn insert(&self, rule: &ToolAllowListRule) -> Result<(), String>;
}

/// Outcome of a [`CapabilityChecker::check`] call (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the call is authorized.
    pub allowed: bool,
    /// Every rule whose capability, tool, and action matched, in evaluation
    /// order.
    pub matched_rules: Vec<RuleId>,
    /// Human-readable reason for a denial; `None` when `allowed`.
    pub violation_reason: Option<String>,
    /// The capability names of active `allow` rules for the tenant, reported
    /// only on denial so callers can explain what would have been required.
    pub required_capabilities: Vec<String>,
}

struct CacheEntry {
    rules: Vec<ToolAllowListRule>,
    cached_at: i64,
}

/// Checks capability tokens' granted capabilities against tenant rule sets,
/// with a short-lived per-tenant rule cache (spec §4.3: 5 minute TTL).
pub struct CapabilityChecker<'a> {
    store: &'a dyn RuleStore,
    cache_ttl: Duration,
    cache: RefCell<HashMap<String, CacheEntry>>,
}

const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
const ADMIN_CAPABILITY: &str = "admin";
const ADMIN_NAMESPACE_PREFIX: &str = "admin.";

impl<'a> CapabilityChecker<'a> {
    /// Builds a checker over `store` using the default 5-minute rule cache TTL.
    #[must_use]
    pub fn new(store: &'a dyn RuleStore) -> Self {
        Self {
            store,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Builds a checker with an explicit cache TTL, for tests.
    #[must_use]
    pub fn with_cache_ttl(store: &'a dyn RuleStore, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache_ttl,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Drops any cached rule set for `tenant_id`, forcing the next check to
    /// re-read from the store.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.borrow_mut().remove(tenant_id.as_str());
    }

    fn rules_for(&self, tenant_id: &TenantId, now: i64) -> Result<Vec<ToolAllowListRule>, CapabilityCheckError> {
        {
            let cache = self.cache.borrow();
            if let Some(entry) = cache.get(tenant_id.as_str()) {
                let age = now.saturating_sub(entry.cached_at);
                if age >= 0 && (age as u64) < self.cache_ttl.as_secs() {
                    return Ok(entry.rules.clone());
                }
            }
        }
        let rules = self
            .store
            .active_rules(tenant_id)
            .map_err(CapabilityCheckError::Store)?;
        self.cache.borrow_mut().insert(
            tenant_id.as_str().to_string(),
            CacheEntry {
                rules: rules.clone(),
                cached_at: now,
            },
        );
        Ok(rules)
    }

    /// Decides whether `capabilities` authorizes `tool` (and, if provided,
    /// `action`) for `tenant_id`, per spec §4.3: active rules are sorted
    /// ascending by priority and walked in order; the first matching rule
    /// sets the decision, and any later matching `deny` rule overrides it.
    ///
    /// # Errors
    /// Returns [`CapabilityCheckError`] on store failure or a malformed
    /// regex/glob pattern in an active rule.
    pub fn check(
        &self,
        tenant_id: &TenantId,
        capabilities: &[String],
        tool: &str,
        action: Option<&str>,
        now: i64,
    ) -> Result<CheckResult, CapabilityCheckError> {
        let mut rules = self.rules_for(tenant_id, now)?;
        rules.retain(|rule| rule.active);
        rules.sort_by(|a, b| a.priority.cmp(&b.priority));

        let mut matched_rules: Vec<RuleId> = Vec::new();
        let mut allowed: Option<bool> = None;
        let mut denial_rule: Option<RuleId> = None;

        for rule in &rules {
            let capability_matches = capabilities
                .iter()
                .any(|granted| capability_covers(granted, &rule.capability_name));
            if !capability_matches {
                continue;
            }
            if !pattern_matches(&rule.pattern_type, &rule.tool_pattern, tool)? {
                continue;
            }
            if !action_matches(rule, action)? {
                continue;
            }

            matched_rules.push(rule.rule_id.clone());
            match allowed {
                None => {
                    allowed = Some(rule.rule_type == RuleType::Allow);
                    if rule.rule_type == RuleType::Deny {
                        denial_rule = Some(rule.rule_id.clone());
                    }
                }
                Some(_) if rule.rule_type == RuleType::Deny => {
                    allowed = Some(false);
                    denial_rule = Some(rule.rule_id.clone());
                    break;
                }
                Some(_) => {}
            }
        }

        let allowed = allowed.unwrap_or(false);
        if allowed {
            return Ok(CheckResult {
                allowed: true,
                matched_rules,
                violation_reason: None,
                required_capabilities: Vec::new(),
            });
        }

        let violation_reason = match denial_rule {
            Some(rule_id) => format!("Denied by rule {}", rule_id.as_str()),
            None => "No matching rule".to_string(),
        };
        let required_capabilities = rules
            .iter()
            .filter(|rule| rule.rule_type == RuleType::Allow)
            .map(|rule| rule.capability_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(CheckResult {
            allowed: false,
            matched_rules,
            violation_reason: Some(violation_reason),
            required_capabilities,
        })
    }
}

/// Seeds the five default rules a tenant gets on initialization (spec §4.3):
/// `admin` over every tool, `read`/`write` over the matching glob namespace,
/// `database.read` over `postgres.*`, and `execute` over `orchestrator.*`.
///
/// # Errors
/// Returns a `String` if any insert fails; already-inserted rules are not
/// rolled back.
pub fn add_default_rules(tenant_id: &TenantId, store: &dyn RuleStore) -> Result<(), String> {
    let defaults = [
        ("admin", "*", 1),
        ("read", "*.read", 10),
        ("write", "*.write", 10),
        ("database.read", "postgres.*", 20),
        ("execute", "orchestrator.*", 15),
    ];
    for (capability_name, tool_pattern, priority) in defaults {
        let rule = ToolAllowListRule {
            rule_id: RuleId::new(format!("default-{}-{capability_name}", tenant_id.as_str())),
            tenant_id: tenant_id.clone(),
            capability_name: capability_name.to_string(),
            tool_pattern: tool_pattern.to_string(),
            action_pattern: None,
            pattern_type: PatternType::Glob,
            rule_type: RuleType::Allow,
            priority,
            active: true,
        };
        store.insert(&rule)?;
    }
    Ok(())
}

/// Returns whether `granted` hierarchically covers `required` (spec §4.3):
/// exact match, dot-segment wildcard match, or the `admin` global shortcut
/// (which covers everything except other `admin.*` capabilities).
#[must_use]
pub fn capability_covers(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    if granted == ADMIN_CAPABILITY && !required.starts_with(ADMIN_NAMESPACE_PREFIX) {
        return true;
    }
    let granted_segments: Vec<&str> = granted.split('.').collect();
    let required_segments: Vec<&str> = required.split('.').collect();
    if granted_segments.len() != required_segments.len() {
        return false;
    }
    granted_segments
        .iter()
        .zip(required_segments.iter())
        .all(|(g, r)| *g == "*" || g == r)
}

fn action_matches(rule: &ToolAllowListRule, action: Option<&str>) -> Result<bool, CapabilityCheckError> {
    match (&rule.action_pattern, action) {
        (Some(pattern), Some(action_value)) => pattern_matches(&rule.pattern_type, pattern, action_value),
        _ => Ok(true),
    }
}

fn pattern_matches(pattern_type: &PatternType, pattern: &str, value: &str) -> Result<bool, CapabilityCheckError> {
    match pattern_type {
        PatternType::Exact => Ok(pattern == value),
        PatternType::Glob => glob_matches(pattern, value),
        PatternType::Regex => {
            let regex = Regex::new(pattern).map_err(|err| CapabilityCheckError::BadPattern(err.to_string()))?;
            Ok(regex.is_match(value))
        }
    }
}

/// Translates `*` to `.*` and `?` to `.`, escaping every other character,
/// then matches the whole `candidate` against the resulting regex (spec
/// §4.3: "translating `*`→`.*` and `?`→`.` then full-string match").
fn glob_matches(pattern: &str, candidate: &str) -> Result<bool, CapabilityCheckError> {
    let mut regex_source = String::with_capacity(pattern.len() + 2);
    regex_source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex_source.push_str(".*"),
            '?' => regex_source.push('.'),
            other => regex_source.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_source.push('$');
    let regex = Regex::new(&regex_source).map_err(|err| CapabilityCheckError::BadPattern(err.to_string()))?;
    Ok(regex.is_match(candidate))
}
