// capgate-config/src/capgate_env.rs
// ============================================================================
// Module: CapGate Environment Configuration
// Description: Loads and validates the Orchestrator/Token Service process
//              environment described in spec §6.
// Purpose: Fail-fast startup configuration for capgate-core's runtime
//          collaborators (database, executor, approvals, receipts, registry).
// Dependencies: std::env, thiserror
// ============================================================================

//! ## Overview
//! [`CapGateEnvConfig::from_env`] reads the process environment once at
//! startup and produces a validated, typed configuration. Required variables
//! missing from the environment fail loading outright rather than falling
//! back to a silent default, matching the "fail-fast startup" requirement.
//! The lookup itself is abstracted behind [`CapGateEnvConfig::from_lookup`]
//! so tests can supply an in-memory environment instead of mutating the real
//! process environment.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

/// Deployment environment, one of the closed set recognized by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Local development.
    Dev,
    /// Shared staging environment.
    Stage,
    /// Production.
    Prod,
    /// Automated test runs.
    Test,
}

impl RuntimeEnvironment {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "dev" => Some(Self::Dev),
            "stage" => Some(Self::Stage),
            "prod" => Some(Self::Prod),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

/// Transport mode for the Razorpay MCP integration, when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RazorpayMcpMode {
    /// Connect to a remote MCP endpoint over the network.
    Remote,
    /// Launch and speak to a local MCP process over stdio.
    Stdio,
}

impl RazorpayMcpMode {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "remote" => Some(Self::Remote),
            "stdio" => Some(Self::Stdio),
            _ => None,
        }
    }
}

/// Typed view over the environment variables recognized by the core (spec §6).
#[derive(Debug, Clone)]
pub struct CapGateEnvConfig {
    /// Primary transactional datastore connection string.
    pub database_url: String,
    /// Optional fast-path cache/replay-protection backend.
    pub redis_url: Option<String>,
    /// Deployment environment.
    pub environment: RuntimeEnvironment,
    /// API key for the Portia executor.
    pub portia_api_key: String,
    /// Base URL of the Token Service, if deployed as a separate process.
    pub captokens_base_url: Option<String>,
    /// Base URL of the Approvals service.
    pub approvals_base_url: Option<String>,
    /// Base URL of the Receipts service.
    pub receipts_base_url: Option<String>,
    /// Base URL of the capsule/dependency registry.
    pub registry_base_url: Option<String>,
    /// Whether the Razorpay MCP engines are enabled for this deployment.
    pub enable_razorpay_mcp: bool,
    /// Transport mode for the Razorpay MCP integration, when enabled.
    pub razorpay_mcp_mode: Option<RazorpayMcpMode>,
    /// CORS-allowed origins.
    pub allowed_origins: Vec<String>,
    /// Hosts this process will answer requests for.
    pub allowed_hosts: Vec<String>,
}

/// Errors loading or validating [`CapGateEnvConfig`].
#[derive(Debug, Error)]
pub enum EnvConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    MissingRequired(String),
    /// A variable was set but its value is outside its closed set.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// Name of the offending environment variable.
        field: String,
        /// The value that failed validation.
        value: String,
    },
    /// `strict`/`security-focused` validation found environment variables
    /// this process does not recognize.
    #[error("unrecognized environment variable(s) under strict validation: {0:?}")]
    UnrecognizedVariables(Vec<String>),
}

const RECOGNIZED_VARS: &[&str] = &[
    "DATABASE_URL",
    "REDIS_URL",
    "ANUMATE_ENV",
    "PORTIA_API_KEY",
    "CAPTOKENS_BASE_URL",
    "APPROVALS_BASE_URL",
    "RECEIPTS_BASE_URL",
    "REGISTRY_BASE_URL",
    "ENABLE_RAZORPAY_MCP",
    "RAZORPAY_MCP_MODE",
    "ALLOWED_ORIGINS",
    "ALLOWED_HOSTS",
];

/// `CAPGATE_`-prefixed variables are this process's own namespace; anything
/// outside [`RECOGNIZED_VARS`] under that prefix is flagged by strict
/// validation. Everything else in the environment is ambient and ignored.
const CAPGATE_NAMESPACE_PREFIX: &str = "CAPGATE_";

/// Strictness applied when loading the environment (spec §9 "Dynamic
/// configuration": unrecognized options are a startup error under
/// `Strict`/`SecurityFocused`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvValidationLevel {
    /// Unrecognized `CAPGATE_*`-prefixed variables are ignored.
    Standard,
    /// Unrecognized `CAPGATE_*`-prefixed variables fail loading.
    Strict,
    /// Same as `Strict`, reserved for a future stricter posture.
    SecurityFocused,
}

/// Looks up a named environment variable; implemented for the real process
/// environment and for an in-memory map used in tests.
pub trait EnvLookup {
    /// Returns the value of `key`, if present.
    fn get(&self, key: &str) -> Option<String>;
    /// Returns every variable name currently set, for strict-mode scanning.
    fn keys(&self) -> Vec<String>;
}

/// Reads from the real process environment via [`std::env`].
struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn keys(&self) -> Vec<String> {
        env::vars().map(|(key, _)| key).collect()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl CapGateEnvConfig {
    /// Loads configuration from the real process environment.
    ///
    /// # Errors
    /// See [`Self::from_lookup`].
    pub fn from_env(level: EnvValidationLevel) -> Result<Self, EnvConfigError> {
        Self::from_lookup(&ProcessEnv, level)
    }

    /// Loads configuration from any [`EnvLookup`] source.
    ///
    /// # Errors
    /// Returns [`EnvConfigError::MissingRequired`] if `PORTIA_API_KEY` is
    /// absent, [`EnvConfigError::InvalidValue`] if `ANUMATE_ENV` or
    /// `RAZORPAY_MCP_MODE` hold a value outside their closed set, or
    /// [`EnvConfigError::UnrecognizedVariables`] under strict validation.
    pub fn from_lookup(source: &dyn EnvLookup, level: EnvValidationLevel) -> Result<Self, EnvConfigError> {
        let database_url = source.get("DATABASE_URL").unwrap_or_else(|| "sqlite://capgate.db".to_string());
        let redis_url = source.get("REDIS_URL");

        let environment = match source.get("ANUMATE_ENV") {
            Some(value) => RuntimeEnvironment::parse(&value)
                .ok_or_else(|| EnvConfigError::InvalidValue { field: "ANUMATE_ENV".to_string(), value })?,
            None => RuntimeEnvironment::Dev,
        };

        let portia_api_key = source.get("PORTIA_API_KEY").ok_or_else(|| EnvConfigError::MissingRequired("PORTIA_API_KEY".to_string()))?;

        let captokens_base_url = source.get("CAPTOKENS_BASE_URL");
        let approvals_base_url = source.get("APPROVALS_BASE_URL");
        let receipts_base_url = source.get("RECEIPTS_BASE_URL");
        let registry_base_url = source.get("REGISTRY_BASE_URL");

        let enable_razorpay_mcp = source.get("ENABLE_RAZORPAY_MCP").is_some_and(|value| value == "true" || value == "1");

        let razorpay_mcp_mode = match source.get("RAZORPAY_MCP_MODE") {
            Some(value) => Some(
                RazorpayMcpMode::parse(&value)
                    .ok_or_else(|| EnvConfigError::InvalidValue { field: "RAZORPAY_MCP_MODE".to_string(), value })?,
            ),
            None => None,
        };

        let allowed_origins = parse_csv(source.get("ALLOWED_ORIGINS"));
        let allowed_hosts = parse_csv(source.get("ALLOWED_HOSTS"));

        if matches!(level, EnvValidationLevel::Strict | EnvValidationLevel::SecurityFocused) {
            let unrecognized: Vec<String> = source
                .keys()
                .into_iter()
                .filter(|key| key.starts_with(CAPGATE_NAMESPACE_PREFIX) && !RECOGNIZED_VARS.contains(&key.as_str()))
                .collect();
            if !unrecognized.is_empty() {
                return Err(EnvConfigError::UnrecognizedVariables(unrecognized));
            }
        }

        Ok(Self {
            database_url,
            redis_url,
            environment,
            portia_api_key,
            captokens_base_url,
            approvals_base_url,
            receipts_base_url,
            registry_base_url,
            enable_razorpay_mcp,
            razorpay_mcp_mode,
            allowed_origins,
            allowed_hosts,
        })
    }
}

fn parse_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| raw.split(',').map(str::trim).filter(|part| !part.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}
