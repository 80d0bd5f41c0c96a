// capgate-broker/src/config.rs
// ============================================================================
// Module: Serve Configuration
// Description: Bind address, signing key, and exposure policy for the HTTP
//              transport.
// Purpose: Load the small config surface the broker needs from environment
//          variables, fail-closed on anything malformed.
// Dependencies: std::env
// ============================================================================

//! ## Overview
//! The broker's configuration surface is intentionally small: where to bind,
//! the Ed25519 seed to sign capability tokens with, and whether binding to a
//! non-loopback address has been explicitly allowed. Unlike the decision-gate
//! MCP server this crate used to carry, there is no transport/TLS/namespace
//! matrix here — the spec's HTTP surface is a single set of REST routes.

use std::env;
use std::net::SocketAddr;

/// Environment variable carrying the bind address (`host:port`).
pub const BIND_ENV: &str = "CAPGATE_BIND";
/// Environment variable carrying the 64-character hex Ed25519 signing seed.
pub const SIGNING_SEED_ENV: &str = "CAPGATE_SIGNING_SEED";
/// Environment variable enabling non-loopback binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "CAPGATE_ALLOW_NON_LOOPBACK";

/// Default bind address when [`BIND_ENV`] is unset.
const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Errors loading [`ServeConfig`] from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The bind address failed to parse as `host:port`.
    #[error("invalid {BIND_ENV} value {value:?}: {error}")]
    InvalidBind {
        /// Raw environment value.
        value: String,
        /// Parse error message.
        error: String,
    },
    /// The signing seed was missing, not hex, or not 32 bytes.
    #[error("{SIGNING_SEED_ENV} must be 64 hex characters (32 bytes)")]
    InvalidSigningSeed,
    /// The allow-non-loopback flag was set to an unrecognized value.
    #[error("invalid {ALLOW_NON_LOOPBACK_ENV} value {0:?}")]
    InvalidAllowNonLoopback(String),
}

/// Resolved broker configuration.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Address to bind the HTTP listener to.
    pub bind: SocketAddr,
    /// Ed25519 signing seed for capability tokens.
    pub signing_seed: [u8; 32],
    /// Whether binding to a non-loopback address was explicitly allowed.
    pub allow_non_loopback: bool,
}

impl ServeConfig {
    /// Loads configuration from environment variables, generating a random
    /// signing seed only when one is not supplied (fine for local/dev use;
    /// production deployments should always pin [`SIGNING_SEED_ENV`] so
    /// restarts don't invalidate outstanding tokens).
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `CAPGATE_BIND` or `CAPGATE_SIGNING_SEED`
    /// are present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_raw = env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|err: std::net::AddrParseError| ConfigError::InvalidBind {
            value: bind_raw.clone(),
            error: err.to_string(),
        })?;

        let signing_seed = match env::var(SIGNING_SEED_ENV) {
            Ok(hex_seed) => parse_hex_seed(&hex_seed).ok_or(ConfigError::InvalidSigningSeed)?,
            Err(_) => random_seed(),
        };

        let allow_non_loopback = match env::var(ALLOW_NON_LOOPBACK_ENV) {
            Ok(value) => parse_boolish(&value).ok_or(ConfigError::InvalidAllowNonLoopback(value))?,
            Err(_) => false,
        };

        Ok(Self {
            bind,
            signing_seed,
            allow_non_loopback,
        })
    }
}

fn parse_hex_seed(value: &str) -> Option<[u8; 32]> {
    if value.len() != 64 {
        return None;
    }
    let mut seed = [0_u8; 32];
    for (index, chunk) in value.as_bytes().chunks(2).enumerate() {
        let byte_str = std::str::from_utf8(chunk).ok()?;
        seed[index] = u8::from_str_radix(byte_str, 16).ok()?;
    }
    Some(seed)
}

fn random_seed() -> [u8; 32] {
    let mut seed = [0_u8; 32];
    let unique = uuid::Uuid::new_v4();
    let bytes = unique.as_bytes();
    for (index, byte) in seed.iter_mut().enumerate() {
        *byte = bytes[index % bytes.len()];
    }
    seed
}

fn parse_boolish(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Bind-safety policy: fail closed unless a non-loopback bind was explicitly
/// allowed. Mirrors the CLI's historical MCP bind-safety check, generalized
/// to this crate's single HTTP transport.
///
/// # Errors
/// Returns a human-readable message describing why the bind is rejected.
pub fn enforce_bind_policy(config: &ServeConfig) -> Result<(), String> {
    if config.bind.ip().is_loopback() || config.allow_non_loopback {
        return Ok(());
    }
    Err(format!(
        "refusing to bind {} to a non-loopback address without {ALLOW_NON_LOOPBACK_ENV}=true",
        config.bind
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_bind_is_always_allowed() {
        let config = ServeConfig {
            bind: "127.0.0.1:9000".parse().expect("valid addr"),
            signing_seed: [0; 32],
            allow_non_loopback: false,
        };
        assert!(enforce_bind_policy(&config).is_ok());
    }

    #[test]
    fn non_loopback_bind_requires_opt_in() {
        let config = ServeConfig {
            bind: "0.0.0.0:9000".parse().expect("valid addr"),
            signing_seed: [0; 32],
            allow_non_loopback: false,
        };
        assert!(enforce_bind_policy(&config).is_err());

        let allowed = ServeConfig {
            allow_non_loopback: true,
            ..config
        };
        assert!(enforce_bind_policy(&allowed).is_ok());
    }

    #[test]
    fn hex_seed_round_trips_through_env_parsing() {
        let seed = "00".repeat(32);
        assert_eq!(parse_hex_seed(&seed), Some([0; 32]));
        assert_eq!(parse_hex_seed("zz"), None);
    }
}
