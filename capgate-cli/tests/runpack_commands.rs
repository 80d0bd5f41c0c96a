// capgate-cli/tests/runpack_commands.rs
// ============================================================================
// Module: CLI Runpack Command Tests
// Description: Integration tests for CLI runpack export and verify workflows.
// Purpose: Validate CLI command wiring and offline verification outputs.
// Dependencies: capgate-cli binary, capgate-core, serde_json
// ============================================================================
//! ## Overview
//! Runs the CLI binary for runpack export and verification using temporary
//! artifacts. These tests ensure the CLI executes deterministic workflows and
//! emits expected status text.
//!
//! Security posture: CLI inputs are untrusted and must fail closed.
//! Threat model: TM-CLI-001 - Unsafe runpack output or verification bypass.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use capgate_core::AdvanceTo;
use capgate_core::NamespaceId;
use capgate_core::RunId;
use capgate_core::RunState;
use capgate_core::RunStatus;
use capgate_core::RunpackManifest;
use capgate_core::ScenarioId;
use capgate_core::ScenarioSpec;
use capgate_core::SpecVersion;
use capgate_core::StageId;
use capgate_core::StageSpec;
use capgate_core::TenantId;
use capgate_core::Timestamp;
use capgate_core::hashing::DEFAULT_HASH_ALGORITHM;
use capgate_core::hashing::hash_bytes;
use capgate_core::hashing::hash_canonical_json;
use capgate_core::runtime::VerificationReport;
use capgate_core::runtime::VerificationStatus;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn capgate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_capgate"))
}

fn temp_root(label: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock drift").as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("capgate-cli-{label}-{nanos}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_dir_all(path);
}

fn write_json(path: &Path, value: &impl serde::Serialize) {
    let bytes = serde_json::to_vec(value).expect("serialize");
    fs::write(path, bytes).expect("write json");
}

fn minimal_spec() -> ScenarioSpec {
    ScenarioSpec {
        scenario_id: ScenarioId::new("scenario"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        spec_version: SpecVersion::new("1"),
        stages: vec![StageSpec {
            stage_id: StageId::new("stage-1"),
            entry_packets: Vec::new(),
            gates: Vec::new(),
            advance_to: AdvanceTo::Terminal,
            timeout: None,
            on_timeout: capgate_core::TimeoutPolicy::Fail,
        }],
        conditions: Vec::new(),
        policies: Vec::new(),
        schemas: Vec::new(),
        default_tenant_id: None,
    }
}

fn minimal_state(spec: &ScenarioSpec) -> RunState {
    let spec_hash = spec.canonical_hash_with(DEFAULT_HASH_ALGORITHM).expect("spec hash");
    RunState {
        tenant_id: TenantId::from_raw(1).expect("nonzero tenantid"),
        namespace_id: NamespaceId::from_raw(1).expect("nonzero namespaceid"),
        run_id: RunId::new("run-1"),
        scenario_id: ScenarioId::new("scenario"),
        spec_hash,
        current_stage_id: StageId::new("stage-1"),
        stage_entered_at: Timestamp::Logical(0),
        status: RunStatus::Active,
        dispatch_targets: Vec::new(),
        triggers: Vec::new(),
        gate_evals: Vec::new(),
        decisions: Vec::new(),
        packets: Vec::new(),
        submissions: Vec::new(),
        tool_calls: Vec::new(),
    }
}

fn export_runpack(root: &Path) -> PathBuf {
    let spec = minimal_spec();
    let state = minimal_state(&spec);
    let spec_path = root.join("spec.json");
    let state_path = root.join("state.json");
    write_json(&spec_path, &spec);
    write_json(&state_path, &state);

    let manifest_path = root.join("runpack.json");
    let output = Command::new(capgate_bin())
        .args([
            "runpack",
            "export",
            "--spec",
            spec_path.to_string_lossy().as_ref(),
            "--state",
            state_path.to_string_lossy().as_ref(),
            "--output-dir",
            root.to_string_lossy().as_ref(),
            "--manifest-name",
            "runpack.json",
            "--generated-at-unix-ms",
            "1700000000000",
        ])
        .output()
        .expect("runpack export");

    assert!(output.status.success(), "export failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("Runpack manifest written"),
        "unexpected stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    assert!(manifest_path.exists(), "manifest not written");
    manifest_path
}

#[allow(dead_code, reason = "kept for manifest-integrity assertions added by future tests")]
fn read_manifest(path: &Path) -> RunpackManifest {
    let bytes = fs::read(path).expect("read manifest");
    serde_json::from_slice(&bytes).expect("parse manifest")
}

#[allow(dead_code, reason = "kept for manifest-integrity assertions added by future tests")]
fn assert_manifest_integrity(manifest: &RunpackManifest, output_dir: &Path) {
    for entry in &manifest.integrity.file_hashes {
        let bytes = fs::read(output_dir.join(&entry.path)).expect("read artifact");
        let actual = hash_bytes(manifest.hash_algorithm, &bytes);
        assert_eq!(actual, entry.hash, "hash mismatch for {}", entry.path);
    }
    let root_hash = hash_canonical_json(manifest.hash_algorithm, &manifest.integrity.file_hashes)
        .expect("root hash");
    assert_eq!(root_hash, manifest.integrity.root_hash);
}

// ============================================================================
// SECTION: Version Tests
// ============================================================================

/// Verifies the version flag prints a version string.
#[test]
fn cli_version_flag_prints_version() {
    let output = Command::new(capgate_bin())
        .arg("--version")
        .output()
        .expect("run capgate --version");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("capgate"));
}

// ============================================================================
// SECTION: Runpack Export Tests
// ============================================================================

/// Verifies runpack export writes a manifest to disk.
#[test]
fn cli_runpack_export_writes_manifest() {
    let root = temp_root("export");
    let manifest_path = export_runpack(&root);
    assert!(manifest_path.exists());
    let manifest = read_manifest(&manifest_path);
    assert_manifest_integrity(&manifest, &root);
    cleanup(&root);
}

/// Verifies runpack export rejects manifest path traversal.
#[test]
fn cli_runpack_export_rejects_manifest_traversal() {
    let root = temp_root("export-manifest-traversal");
    let spec = minimal_spec();
    let state = minimal_state(&spec);
    let spec_path = root.join("spec.json");
    let state_path = root.join("state.json");
    write_json(&spec_path, &spec);
    write_json(&state_path, &state);

    let output = Command::new(capgate_bin())
        .args([
            "runpack",
            "export",
            "--spec",
            spec_path.to_string_lossy().as_ref(),
            "--state",
            state_path.to_string_lossy().as_ref(),
            "--output-dir",
            root.to_string_lossy().as_ref(),
            "--manifest-name",
            "../runpack.json",
            "--generated-at-unix-ms",
            "1700000000000",
        ])
        .output()
        .expect("runpack export traversal");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("runpack sink"), "unexpected stderr: {stderr}");

    cleanup(&root);
}

// ============================================================================
// SECTION: Runpack Verify Tests
// ============================================================================

/// Verifies runpack verification succeeds with JSON output.
#[test]
fn cli_runpack_verify_outputs_json_report() {
    let root = temp_root("verify-json");
    let manifest = export_runpack(&root);

    let output = Command::new(capgate_bin())
        .args([
            "runpack",
            "verify",
            "--manifest",
            manifest.to_string_lossy().as_ref(),
            "--format",
            "json",
        ])
        .output()
        .expect("runpack verify");

    assert!(output.status.success());
    let report: VerificationReport = serde_json::from_slice(&output.stdout).expect("parse report");
    assert_eq!(report.status, VerificationStatus::Pass);

    cleanup(&root);
}

/// Verifies runpack verification renders markdown summaries.
#[test]
fn cli_runpack_verify_outputs_markdown_report() {
    let root = temp_root("verify-markdown");
    let manifest = export_runpack(&root);

    let output = Command::new(capgate_bin())
        .args([
            "runpack",
            "verify",
            "--manifest",
            manifest.to_string_lossy().as_ref(),
            "--format",
            "markdown",
        ])
        .output()
        .expect("runpack verify markdown");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CapGate Runpack Verification"));
    assert!(stdout.contains("Status: pass"));

    cleanup(&root);
}
