// capgate-core/src/domain/drift.rs
// ============================================================================
// Module: Drift Detector (component G)
// Description: Maintains rolling baselines of policy behavior and raises
//              alerts when recent evaluations deviate from them.
// Purpose: Proactive compliance monitoring over the Policy DSL evaluator's
//          output, per spec §4.6.
// Dependencies: crate::domain::policy::evaluator, uuid
// ============================================================================

//! ## Overview
//! [`DriftDetector`] observes every policy evaluation and violation via
//! [`DriftDetector::record_evaluation`]/[`DriftDetector::record_violation`],
//! which append to bounded rolling windows keyed by policy name. Baselines
//! are recomputed periodically from the `baseline_window`; each new
//! evaluation is then checked against the active baseline over the shorter
//! `detection_window`. Alerts for the same `(policy, drift_type, metric)`
//! triplet are coalesced rather than duplicated.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::SystemTime;

use uuid::Uuid;

use crate::domain::ids::DriftAlertId;
use crate::domain::policy::evaluator::EvaluationResult;

const MAX_SAMPLES: usize = 1000;
const MIN_BASELINE_SAMPLES: usize = 10;
const MIN_DETECTION_SAMPLES: usize = 5;
const POLICY_BYPASS_VIOLATION_THRESHOLD: u32 = 5;

/// Kind of deviation a [`DriftAlert`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriftType {
    /// The evaluator's allow rate fell or rose outside its baseline.
    ComplianceDegradation,
    /// A single subject accumulated an unusual number of violations.
    PolicyBypass,
    /// A rule's firing frequency changed sharply without stopping entirely.
    UnexpectedBehavior,
    /// Evaluation latency drifted from its baseline.
    PerformanceDrift,
    /// A rule that used to fire in the baseline window stopped firing.
    CoverageGap,
}

/// Severity bucket derived from a drift percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DriftSeverity {
    /// Drift below 15%.
    Low,
    /// Drift in [15%, 25%).
    Medium,
    /// Drift in [25%, 50%).
    High,
    /// Drift at or above 50%.
    Critical,
}

impl DriftSeverity {
    fn from_percentage(drift_percentage: f64) -> Self {
        if drift_percentage >= 50.0 {
            Self::Critical
        } else if drift_percentage >= 25.0 {
            Self::High
        } else if drift_percentage >= 15.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// An observed deviation from a policy's baseline behavior (spec §4.6).
#[derive(Debug, Clone)]
pub struct DriftAlert {
    /// Unique identifier for this alert.
    pub alert_id: DriftAlertId,
    /// The kind of drift detected.
    pub drift_type: DriftType,
    /// Severity bucket derived from `drift_percentage`.
    pub severity: DriftSeverity,
    /// The policy this alert concerns.
    pub policy_name: String,
    /// The metric that drifted (e.g. `"success_rate"`, `"rule:approve_small"`).
    pub metric_name: String,
    /// Human-readable description of the deviation.
    pub description: String,
    /// The current observed value.
    pub current_value: f64,
    /// The expected (baseline) value.
    pub expected_value: f64,
    /// Relative deviation, as a percentage.
    pub drift_percentage: f64,
    /// When this alert was first raised or last updated.
    pub detection_time: SystemTime,
    /// Suggested remediation steps for this drift type.
    pub remediation_suggestions: Vec<String>,
}

/// One recorded evaluation outcome, kept only long enough to feed baselines
/// and detection windows.
#[derive(Debug, Clone)]
struct EvaluationSample {
    timestamp: SystemTime,
    allowed: bool,
    matched_rules: Vec<String>,
    evaluation_time: Duration,
}

/// One recorded policy violation, used for policy-bypass detection.
#[derive(Debug, Clone)]
struct ViolationSample {
    timestamp: SystemTime,
    subject: String,
}

/// A policy's baseline compliance metrics, computed from `baseline_window`
/// of recent evaluations.
#[derive(Debug, Clone)]
pub struct DriftBaseline {
    /// The policy this baseline describes.
    pub policy_name: String,
    /// Fraction of evaluations in the baseline window that were allowed.
    pub success_rate: f64,
    /// Average evaluation latency in the baseline window.
    pub average_evaluation_time: Duration,
    /// Per-rule firing counts in the baseline window.
    pub rule_coverage: HashMap<String, u32>,
    /// Violations per evaluation in the baseline window.
    pub violation_rate: f64,
    /// When this baseline was computed.
    pub last_updated: SystemTime,
    /// Number of evaluations the baseline was computed from.
    pub sample_count: usize,
}

/// Tenant-and-policy-scoped rolling window state.
struct PolicyWindows {
    evaluations: VecDeque<EvaluationSample>,
    violations: VecDeque<ViolationSample>,
}

impl PolicyWindows {
    fn new() -> Self {
        Self {
            evaluations: VecDeque::new(),
            violations: VecDeque::new(),
        }
    }

    fn push_evaluation(&mut self, sample: EvaluationSample) {
        self.evaluations.push_back(sample);
        while self.evaluations.len() > MAX_SAMPLES {
            self.evaluations.pop_front();
        }
    }

    fn push_violation(&mut self, sample: ViolationSample) {
        self.violations.push_back(sample);
        while self.violations.len() > MAX_SAMPLES {
            self.violations.pop_front();
        }
    }

    fn evaluations_since(&self, cutoff: SystemTime) -> Vec<&EvaluationSample> {
        self.evaluations.iter().filter(|sample| sample.timestamp >= cutoff).collect()
    }

    fn violations_since(&self, cutoff: SystemTime) -> Vec<&ViolationSample> {
        self.violations.iter().filter(|sample| sample.timestamp >= cutoff).collect()
    }
}

/// Detects drift in policy compliance and behavior by comparing a rolling
/// detection window against a periodically recomputed baseline.
pub struct DriftDetector {
    baseline_window: Duration,
    detection_window: Duration,
    baselines: HashMap<String, DriftBaseline>,
    windows: HashMap<String, PolicyWindows>,
    active_alerts: HashMap<(String, DriftType, String), DriftAlert>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), Duration::from_secs(300))
    }
}

impl DriftDetector {
    /// Creates a detector with explicit baseline and detection window
    /// durations (spec §4.6 defaults: 1 hour baseline, 5 minute detection).
    #[must_use]
    pub fn new(baseline_window: Duration, detection_window: Duration) -> Self {
        Self {
            baseline_window,
            detection_window,
            baselines: HashMap::new(),
            windows: HashMap::new(),
            active_alerts: HashMap::new(),
        }
    }

    /// Records one policy evaluation, updates the detection window, and
    /// checks for drift against the current baseline (if any).
    pub fn record_evaluation(&mut self, result: &EvaluationResult, evaluation_time: Duration, now: SystemTime) {
        let window = self.windows.entry(result.policy_name.clone()).or_insert_with(PolicyWindows::new);
        window.push_evaluation(EvaluationSample {
            timestamp: now,
            allowed: result.allowed,
            matched_rules: result.matched_rules.clone(),
            evaluation_time,
        });
        self.check_drift(&result.policy_name, now);
    }

    /// Records a policy violation, attributing it to `subject` for
    /// policy-bypass detection.
    pub fn record_violation(&mut self, policy_name: &str, subject: &str, now: SystemTime) {
        let window = self.windows.entry(policy_name.to_string()).or_insert_with(PolicyWindows::new);
        window.push_violation(ViolationSample {
            timestamp: now,
            subject: subject.to_string(),
        });
        self.check_violation_drift(policy_name, now);
    }

    /// Recomputes the baseline for every policy with at least
    /// [`MIN_BASELINE_SAMPLES`] evaluations in the last `baseline_window`.
    pub fn update_baselines(&mut self, now: SystemTime) {
        let cutoff = now.checked_sub(self.baseline_window).unwrap_or(SystemTime::UNIX_EPOCH);
        for (policy_name, window) in &self.windows {
            let recent = window.evaluations_since(cutoff);
            if recent.len() < MIN_BASELINE_SAMPLES {
                continue;
            }
            let success_count = recent.iter().filter(|sample| sample.allowed).count();
            #[allow(clippy::cast_precision_loss, reason = "sample counts are small, bounded by MAX_SAMPLES")]
            let success_rate = success_count as f64 / recent.len() as f64;
            let total_eval_time: Duration = recent.iter().map(|sample| sample.evaluation_time).sum();
            #[allow(clippy::cast_possible_truncation, reason = "recent.len() is bounded by MAX_SAMPLES")]
            let average_evaluation_time = total_eval_time / recent.len() as u32;

            let mut rule_coverage: HashMap<String, u32> = HashMap::new();
            for sample in &recent {
                for rule in &sample.matched_rules {
                    *rule_coverage.entry(rule.clone()).or_insert(0) += 1;
                }
            }

            let recent_violations = window.violations_since(cutoff);
            #[allow(clippy::cast_precision_loss, reason = "sample counts are small, bounded by MAX_SAMPLES")]
            let violation_rate = recent_violations.len() as f64 / recent.len() as f64;

            self.baselines.insert(
                policy_name.clone(),
                DriftBaseline {
                    policy_name: policy_name.clone(),
                    success_rate,
                    average_evaluation_time,
                    rule_coverage,
                    violation_rate,
                    last_updated: now,
                    sample_count: recent.len(),
                },
            );
        }
    }

    fn check_drift(&mut self, policy_name: &str, now: SystemTime) {
        let Some(baseline) = self.baselines.get(policy_name).cloned() else {
            return;
        };
        let cutoff = now.checked_sub(self.detection_window).unwrap_or(SystemTime::UNIX_EPOCH);
        let Some(window) = self.windows.get(policy_name) else {
            return;
        };
        let recent = window.evaluations_since(cutoff);
        if recent.len() < MIN_DETECTION_SAMPLES {
            return;
        }

        #[allow(clippy::cast_precision_loss, reason = "sample counts are small, bounded by MAX_SAMPLES")]
        let current_success_rate = recent.iter().filter(|sample| sample.allowed).count() as f64 / recent.len() as f64;
        if baseline.success_rate > 0.0 {
            let compliance_drift = (current_success_rate - baseline.success_rate).abs() / baseline.success_rate;
            if compliance_drift > 0.10 {
                self.raise_or_update_alert(
                    DriftType::ComplianceDegradation,
                    policy_name,
                    "success_rate",
                    current_success_rate,
                    baseline.success_rate,
                    compliance_drift * 100.0,
                    format!(
                        "policy compliance rate drifted from {:.2}% to {:.2}%",
                        baseline.success_rate * 100.0,
                        current_success_rate * 100.0
                    ),
                    now,
                );
            }
        }

        let total_eval_time: Duration = recent.iter().map(|sample| sample.evaluation_time).sum();
        #[allow(clippy::cast_possible_truncation, reason = "recent.len() is bounded by MAX_SAMPLES")]
        let current_avg_time = total_eval_time / recent.len() as u32;
        let baseline_secs = baseline.average_evaluation_time.as_secs_f64();
        if baseline_secs > 0.0 {
            let performance_drift = (current_avg_time.as_secs_f64() - baseline_secs).abs() / baseline_secs;
            if performance_drift > 0.25 {
                self.raise_or_update_alert(
                    DriftType::PerformanceDrift,
                    policy_name,
                    "evaluation_time",
                    current_avg_time.as_secs_f64(),
                    baseline_secs,
                    performance_drift * 100.0,
                    format!(
                        "policy evaluation time drifted from {baseline_secs:.3}s to {:.3}s",
                        current_avg_time.as_secs_f64()
                    ),
                    now,
                );
            }
        }

        let mut current_rule_coverage: HashMap<String, u32> = HashMap::new();
        for sample in &recent {
            for rule in &sample.matched_rules {
                *current_rule_coverage.entry(rule.clone()).or_insert(0) += 1;
            }
        }
        self.check_coverage_drift(policy_name, &baseline.rule_coverage, &current_rule_coverage, now);
    }

    fn check_coverage_drift(
        &mut self,
        policy_name: &str,
        baseline_coverage: &HashMap<String, u32>,
        current_coverage: &HashMap<String, u32>,
        now: SystemTime,
    ) {
        let mut all_rules: Vec<&String> = baseline_coverage.keys().chain(current_coverage.keys()).collect();
        all_rules.sort_unstable();
        all_rules.dedup();

        for rule in all_rules {
            let baseline_count = *baseline_coverage.get(rule).unwrap_or(&0);
            let current_count = *current_coverage.get(rule).unwrap_or(&0);
            if baseline_count == 0 {
                continue;
            }

            if current_count == 0 {
                self.raise_or_update_alert(
                    DriftType::CoverageGap,
                    policy_name,
                    &format!("rule:{rule}"),
                    0.0,
                    f64::from(baseline_count),
                    100.0,
                    format!("rule '{rule}' stopped firing (was {baseline_count} times in baseline)"),
                    now,
                );
                continue;
            }

            let coverage_drift = f64::from(current_count.abs_diff(baseline_count)) / f64::from(baseline_count);
            if coverage_drift > 0.20 {
                self.raise_or_update_alert(
                    DriftType::UnexpectedBehavior,
                    policy_name,
                    &format!("rule:{rule}"),
                    f64::from(current_count),
                    f64::from(baseline_count),
                    coverage_drift * 100.0,
                    format!("rule '{rule}' frequency changed from {baseline_count} to {current_count}"),
                    now,
                );
            }
        }
    }

    fn check_violation_drift(&mut self, policy_name: &str, now: SystemTime) {
        let cutoff = now.checked_sub(self.detection_window).unwrap_or(SystemTime::UNIX_EPOCH);
        let Some(window) = self.windows.get(policy_name) else {
            return;
        };
        let recent = window.violations_since(cutoff);
        if recent.is_empty() {
            return;
        }

        let mut by_subject: HashMap<String, u32> = HashMap::new();
        for violation in &recent {
            *by_subject.entry(violation.subject.clone()).or_insert(0) += 1;
        }

        for (subject, count) in by_subject {
            if count >= POLICY_BYPASS_VIOLATION_THRESHOLD {
                self.raise_or_update_alert(
                    DriftType::PolicyBypass,
                    policy_name,
                    "user_violations",
                    f64::from(count),
                    1.0,
                    f64::from(count - 1) * 100.0,
                    format!("subject '{subject}' has {count} violations in the detection window"),
                    now,
                );
            }
        }
    }

    fn raise_or_update_alert(
        &mut self,
        drift_type: DriftType,
        policy_name: &str,
        metric_name: &str,
        current_value: f64,
        expected_value: f64,
        drift_percentage: f64,
        description: String,
        now: SystemTime,
    ) {
        let key = (policy_name.to_string(), drift_type, metric_name.to_string());
        if let Some(existing) = self.active_alerts.get_mut(&key) {
            if drift_percentage > existing.drift_percentage {
                existing.drift_percentage = drift_percentage;
                existing.current_value = current_value;
                existing.detection_time = now;
                existing.severity = DriftSeverity::from_percentage(drift_percentage);
            }
            return;
        }

        let alert = DriftAlert {
            alert_id: DriftAlertId::new(Uuid::new_v4().to_string()),
            drift_type,
            severity: DriftSeverity::from_percentage(drift_percentage),
            policy_name: policy_name.to_string(),
            metric_name: metric_name.to_string(),
            description,
            current_value,
            expected_value,
            drift_percentage,
            detection_time: now,
            remediation_suggestions: remediation_suggestions(drift_type),
        };
        tracing::warn!(
            alert_id = %alert.alert_id,
            policy_name,
            metric_name,
            drift_percentage,
            severity = ?alert.severity,
            "policy drift detected"
        );
        self.active_alerts.insert(key, alert);
    }

    /// Returns active alerts, most recently detected first, optionally
    /// filtered by policy and/or severity.
    #[must_use]
    pub fn active_alerts(&self, policy_name: Option<&str>, severity: Option<DriftSeverity>) -> Vec<DriftAlert> {
        let mut alerts: Vec<DriftAlert> = self
            .active_alerts
            .values()
            .filter(|alert| policy_name.is_none_or(|name| alert.policy_name == name))
            .filter(|alert| severity.is_none_or(|s| alert.severity == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detection_time.cmp(&a.detection_time));
        alerts
    }

    /// Removes an active alert by id. Returns `true` if an alert was removed.
    pub fn acknowledge_alert(&mut self, alert_id: &DriftAlertId) -> bool {
        let key = self
            .active_alerts
            .iter()
            .find(|(_, alert)| &alert.alert_id == alert_id)
            .map(|(key, _)| key.clone());
        match key {
            Some(key) => {
                self.active_alerts.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Returns the current baseline for a policy, if one has been computed.
    #[must_use]
    pub fn baseline(&self, policy_name: &str) -> Option<&DriftBaseline> {
        self.baselines.get(policy_name)
    }

    /// Drops samples older than `retention` to bound memory use.
    pub fn clear_old_data(&mut self, retention: Duration, now: SystemTime) {
        let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);
        for window in self.windows.values_mut() {
            window.evaluations.retain(|sample| sample.timestamp >= cutoff);
            window.violations.retain(|sample| sample.timestamp >= cutoff);
        }
    }
}

fn remediation_suggestions(drift_type: DriftType) -> Vec<String> {
    let suggestions: &[&str] = match drift_type {
        DriftType::ComplianceDegradation => &[
            "Review recent policy changes for unintended effects",
            "Check for changes in input data patterns",
            "Verify policy rules are still appropriate for current use cases",
        ],
        DriftType::PolicyBypass => &[
            "Investigate subject behavior patterns for potential abuse",
            "Review access controls and permissions",
            "Audit recent system changes that might enable bypasses",
        ],
        DriftType::UnexpectedBehavior => &[
            "Analyze recent changes to system inputs or configuration",
            "Review policy logic for edge cases or unintended interactions",
        ],
        DriftType::PerformanceDrift => &[
            "Review system resource utilization and capacity",
            "Check for inefficient policy rules or complex evaluations",
            "Consider optimizing policy compilation or caching",
        ],
        DriftType::CoverageGap => &[
            "Review policy completeness for current use cases",
            "Verify policy deployment and activation status",
        ],
    };
    suggestions.iter().map(|s| (*s).to_string()).collect()
}
