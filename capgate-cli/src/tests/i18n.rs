// capgate-cli/src/tests/i18n.rs
// ============================================================================
// Module: CLI i18n Tests
// Description: Unit tests for message translation and placeholder substitution.
// Purpose: Ensure CLI localization helpers behave predictably.
// Dependencies: capgate-cli i18n module
// ============================================================================

//! ## Overview
//! Verifies the CLI message catalog substitutes placeholders correctly and
//! falls back to the raw key for unknown entries.

use crate::i18n::MessageArg;
use crate::i18n::translate;

#[test]
fn translate_substitutes_placeholders() {
    let output = translate(
        "serve.bind.non_loopback_opt_in",
        vec![MessageArg::new("bind", "0.0.0.0:8080"), MessageArg::new("env", "ENV_FLAG")],
    );
    assert!(output.contains("0.0.0.0:8080"));
    assert!(output.contains("ENV_FLAG"));
}

#[test]
fn translate_missing_placeholder_leaves_token() {
    let output = translate(
        "serve.bind.non_loopback_opt_in",
        vec![MessageArg::new("bind", "0.0.0.0:8080")],
    );
    assert!(output.contains("0.0.0.0:8080"));
    assert!(output.contains("{env}"));
}

#[test]
fn translate_extra_placeholder_ignored() {
    let output = translate("config.validate.ok", vec![MessageArg::new("extra", "value")]);
    assert_eq!(output, "Config valid.");
}

#[test]
fn translate_falls_back_to_key_for_unknown_entries() {
    let output = translate("nonexistent.key.does.not.exist", vec![]);
    assert_eq!(output, "nonexistent.key.does.not.exist");
}
