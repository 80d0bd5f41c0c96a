// capgate-broker/src/http.rs
// ============================================================================
// Module: HTTP Transport
// Description: axum router and handlers implementing the capability
//              enforcement core's REST surface.
// Purpose: Expose token issuance/verification/refresh, rule management,
//          violation/usage reporting, the capability checker, and a health
//          probe over HTTP, backed by `capgate_core::domain`.
// Dependencies: axum, capgate-core::domain, crate::{config, error, state}
// ============================================================================

//! ## Overview
//! Every route extracts the tenant from the `X-Tenant-Id` header, builds the
//! relevant `domain::` service over [`AppState`]'s collaborators, and renders
//! the result as JSON. Handler bodies stay thin: validation and business
//! logic live in `capgate_core::domain`, not here.

use std::collections::HashMap;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::routing::post;
use capgate_core::core::identifiers::TenantId;
use capgate_core::domain::capability::CapabilityChecker;
use capgate_core::domain::capability::CheckResult;
use capgate_core::domain::capability::PatternType;
use capgate_core::domain::capability::RuleType;
use capgate_core::domain::capability::ToolAllowListRule;
use capgate_core::domain::capability::add_default_rules;
use capgate_core::domain::ids::RuleId;
use capgate_core::domain::token::TokenService;
use capgate_core::domain::violation::ViolationStats;
use capgate_core::domain::violation::violation_stats;
use capgate_core::domain::usage::UsageStats;
use capgate_core::domain::usage::usage_stats;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

const TENANT_HEADER: &str = "X-Tenant-Id";
const DEFAULT_STATS_WINDOW_HOURS: i64 = 24;

/// Builds the router for every spec HTTP route, bound to `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/captokens", post(issue_token))
        .route("/v1/captokens/verify", post(verify_token))
        .route("/v1/captokens/refresh", post(refresh_token))
        .route("/v1/capabilities/rules", post(create_rule).get(list_rules))
        .route("/v1/capabilities/violations", get(list_violations))
        .route("/v1/capabilities/violations/stats", get(violations_stats))
        .route("/v1/capabilities/usage/stats", get(usage_stats_handler))
        .route("/v1/capabilities/check", post(check_capability))
        .route("/v1/capabilities/initialize", post(initialize_tenant))
        .route("/health", get(health))
        .with_state(state)
}

fn tenant_from_headers(headers: &HeaderMap) -> Result<TenantId, ApiError> {
    let value = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| ApiError::validation(format!("missing {TENANT_HEADER} header")))?;
    let text = value
        .to_str()
        .map_err(|_| ApiError::validation(format!("{TENANT_HEADER} must be valid UTF-8")))?;
    if text.is_empty() {
        return Err(ApiError::validation(format!("{TENANT_HEADER} must not be empty")));
    }
    Ok(TenantId::new(text))
}

fn hours_param(params: &HashMap<String, String>) -> Result<i64, ApiError> {
    match params.get("hours") {
        None => Ok(DEFAULT_STATS_WINDOW_HOURS),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|hours| *hours > 0)
            .ok_or_else(|| ApiError::validation("hours must be a positive integer")),
    }
}

// --------------------------------------------------------------------------
// SECTION: Token endpoints
// --------------------------------------------------------------------------

/// Request body for `POST /v1/captokens`.
#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    subject: String,
    capabilities: Vec<String>,
    ttl_seconds: i64,
}

async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<capgate_core::domain::token::IssuedToken>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let now = state.now();
    let service = TokenService::new(&state.signer, &state.tokens, &state.replay, &state.audit);
    let issued = service
        .issue(
            &request.subject,
            request.capabilities,
            request.ttl_seconds,
            &tenant_id,
            now,
            &state.correlation_id(),
        )
        .map_err(ApiError::from_categorized)?;
    Ok(Json(issued))
}

/// Request body for `POST /v1/captokens/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyTokenRequest {
    token: String,
}

async fn verify_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<VerifyTokenRequest>,
) -> Result<Json<capgate_core::domain::token::VerifyOutcome>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let now = state.now();
    let service = TokenService::new(&state.signer, &state.tokens, &state.replay, &state.audit);
    let outcome = service.verify(&request.token, &tenant_id, now, &state.correlation_id());
    Ok(Json(outcome))
}

/// Request body for `POST /v1/captokens/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    token: String,
    extend_ttl: i64,
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<capgate_core::domain::token::RefreshedToken>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let now = state.now();
    let service = TokenService::new(&state.signer, &state.tokens, &state.replay, &state.audit);
    let refreshed = service
        .refresh(&request.token, request.extend_ttl, &tenant_id, now, &state.correlation_id())
        .map_err(ApiError::from_categorized)?;
    Ok(Json(refreshed))
}

// --------------------------------------------------------------------------
// SECTION: Rule endpoints
// --------------------------------------------------------------------------

/// Request body for `POST /v1/capabilities/rules`.
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    capability_name: String,
    tool_pattern: String,
    action_pattern: Option<String>,
    pattern_type: PatternType,
    rule_type: RuleType,
    priority: i32,
}

async fn create_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRuleRequest>,
) -> Result<Json<ToolAllowListRule>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let rule = ToolAllowListRule {
        rule_id: RuleId::new(uuid::Uuid::new_v4().to_string()),
        tenant_id,
        capability_name: request.capability_name,
        tool_pattern: request.tool_pattern,
        action_pattern: request.action_pattern,
        pattern_type: request.pattern_type,
        rule_type: request.rule_type,
        priority: request.priority,
        active: true,
    };
    state.rules.insert(&rule).map_err(ApiError::store)?;
    Ok(Json(rule))
}

async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ToolAllowListRule>>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let rules = state.rules.active_rules(&tenant_id).map_err(ApiError::store)?;
    Ok(Json(rules))
}

// --------------------------------------------------------------------------
// SECTION: Violation and usage reporting
// --------------------------------------------------------------------------

async fn list_violations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<capgate_core::domain::violation::CapabilityViolation>>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let now = state.now();
    let since = now - DEFAULT_STATS_WINDOW_HOURS * 3_600;
    let violations = state.violations.in_range(&tenant_id, since, now + 1).map_err(ApiError::store)?;
    Ok(Json(violations))
}

async fn violations_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ViolationStats>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let hours = hours_param(&params)?;
    let now = state.now();
    let stats = violation_stats(&state.violations, &tenant_id, now - hours * 3_600, now + 1).map_err(ApiError::store)?;
    Ok(Json(stats))
}

async fn usage_stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<UsageStats>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let hours = hours_param(&params)?;
    let now = state.now();
    // `token_id` is accepted for forward compatibility with a per-token
    // breakdown; the in-memory `UsageStore` only aggregates per tenant today.
    let _token_id = params.get("token_id");
    let stats = usage_stats(&state.usage, &tenant_id, now - hours * 3_600, now + 1).map_err(ApiError::store)?;
    Ok(Json(stats))
}

// --------------------------------------------------------------------------
// SECTION: Capability check
// --------------------------------------------------------------------------

/// Request body for `POST /v1/capabilities/check`.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    capabilities: Vec<String>,
    tool: String,
    action: Option<String>,
}

async fn check_capability(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResult>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    let now = state.now();
    let checker = CapabilityChecker::new(&state.rules);
    let result = checker
        .check(&tenant_id, &request.capabilities, &request.tool, request.action.as_deref(), now)
        .map_err(ApiError::from_categorized)?;
    Ok(Json(result))
}

// --------------------------------------------------------------------------
// SECTION: Tenant initialization and health
// --------------------------------------------------------------------------

/// Response body for `POST /v1/capabilities/initialize`.
#[derive(Debug, Serialize)]
pub struct InitializeResponse {
    message: String,
}

async fn initialize_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InitializeResponse>, ApiError> {
    let tenant_id = tenant_from_headers(&headers)?;
    add_default_rules(&tenant_id, &state.rules).map_err(ApiError::store)?;
    Ok(Json(InitializeResponse {
        message: format!("default capability rules seeded for tenant {}", tenant_id.as_str()),
    }))
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: i64,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.now().saturating_sub(state.started_at),
        database: "in-memory",
    })
}
