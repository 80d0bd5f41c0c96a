// capgate-config/src/lib.rs
// ============================================================================
// Module: CapGate Config Library
// Description: Canonical config model, validation, and artifact generation.
// Purpose: Single source of truth for capgate.toml semantics.
// Dependencies: capgate-core, serde, toml
// ============================================================================

//! ## Overview
//! `capgate-config` defines the canonical configuration model for
//! CapGate. It provides strict, fail-closed validation and deterministic
//! generators for config schema, examples, and docs.
//!
//! Security posture: config inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capgate_env;
pub mod config;
pub mod docs;
pub mod examples;
pub mod policy;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use capgate_env::CapGateEnvConfig;
pub use capgate_env::EnvConfigError;
pub use capgate_env::EnvValidationLevel;
pub use config::*;
pub use docs::config_docs_markdown;
pub use docs::verify_config_docs;
pub use docs::write_config_docs;
pub use examples::config_toml_example;
pub use policy::*;
pub use schema::config_schema;
