// capgate-core/src/domain/reporter.rs
// ============================================================================
// Module: Violation Reporter (component H)
// Description: Rule-driven alert dispatch and time-range violation reports
//              over the rows the Violation Logger (component D) records.
// Purpose: Give operators real-time notification and compliance reporting
//          on top of the capability violation trail, per spec §4.4/§10.6.
// Dependencies: crate::domain::{ids, violation}
// ============================================================================

//! ## Overview
//! [`ViolationReporter`] keeps a bounded in-memory tail of recent
//! [`CapabilityViolation`] rows (the same type the Violation Logger writes)
//! plus a set of [`AlertRule`]s. Every recorded violation is matched against
//! enabled rules; a match that clears rate limiting and quiet hours is
//! dispatched to the rule's configured [`AlertChannel`]s via a
//! [`NotificationHandler`], escalating when the same subject has repeated the
//! same violation type within the rule's escalation window.
//! [`ViolationReporter::generate_report`] produces [`ViolationReport`]
//! summaries (breakdowns, hourly/daily trends, top-N, recommendations) over
//! an arbitrary time range.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use uuid::Uuid;

use crate::domain::ids::AlertRuleId;
use crate::domain::ids::ReportId;
use crate::domain::violation::CapabilityViolation;
use crate::domain::violation::ViolationSeverity;
use crate::domain::violation::ViolationType;

const MAX_RECENT_VIOLATIONS: usize = 10_000;
const MAX_ALERT_HISTORY: usize = 1_000;
const MAX_RATE_LIMIT_SAMPLES: usize = 100;
const TOP_N: usize = 10;

/// Delivery channel for a dispatched alert (spec §10.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertChannel {
    /// Electronic mail.
    Email,
    /// Slack message.
    Slack,
    /// Generic HTTP webhook.
    Webhook,
    /// SMS text message.
    Sms,
    /// PagerDuty incident.
    PagerDuty,
    /// Structured log line only.
    Log,
}

/// Quiet hours during which a rule's alerts are suppressed, in local
/// wall-clock hours `[0, 24)`. Supports overnight ranges where `end_hour <
/// start_hour`.
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    /// Hour quiet hours begin, inclusive.
    pub start_hour: u8,
    /// Hour quiet hours end, exclusive.
    pub end_hour: u8,
}

impl QuietHours {
    fn contains(self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Matching criteria, thresholds, and delivery configuration for violation
/// alerting (spec §10.6, Python `AlertRule`).
#[derive(Debug, Clone)]
pub struct AlertRule {
    /// Rule identifier.
    pub rule_id: AlertRuleId,
    /// Human-readable rule name.
    pub name: String,
    /// Whether this rule is currently evaluated.
    pub enabled: bool,
    /// Required-capability prefixes this rule matches; empty matches any.
    pub capability_patterns: Vec<String>,
    /// Violation types this rule matches; empty matches any.
    pub violation_types: Vec<ViolationType>,
    /// Minimum severity this rule matches.
    pub min_severity: ViolationSeverity,
    /// Maximum alerts this rule may send per hour; `None` disables the limit.
    pub rate_limit_per_hour: Option<u32>,
    /// Number of matching violations from the same subject within
    /// `escalation_window` that trigger an escalated alert.
    pub escalation_threshold: u32,
    /// Window used to count violations toward `escalation_threshold`.
    pub escalation_window: Duration,
    /// Hours during which this rule's alerts are suppressed.
    pub quiet_hours: Option<QuietHours>,
    /// Channels an alert is dispatched through.
    pub channels: Vec<AlertChannel>,
    /// Channel-specific recipients (addresses, webhook URLs, etc.).
    pub recipients: Vec<String>,
}

/// One dispatched alert, standard or escalated.
#[derive(Debug, Clone)]
pub struct DispatchedAlert {
    /// The violation that triggered this alert.
    pub violation: CapabilityViolation,
    /// The rule that matched.
    pub rule_name: String,
    /// `true` if this was sent as an escalation.
    pub escalated: bool,
    /// When the alert was dispatched.
    pub dispatched_at: SystemTime,
    /// The channels it was sent through.
    pub channels: Vec<AlertChannel>,
}

/// Delivers a dispatched alert through one channel.
pub trait NotificationHandler {
    /// Sends `alert` to `recipients`. Failures are logged by the caller and
    /// never fail the violation recording they stem from.
    ///
    /// # Errors
    /// Returns an error string on delivery failure.
    fn send(&self, alert: &DispatchedAlert, recipients: &[String]) -> Result<(), String>;
}

/// A comprehensive report over violations in `[period_start, period_end)`
/// (spec §10.6, Python `ViolationReport`).
#[derive(Debug, Clone)]
pub struct ViolationReport {
    /// Report identifier.
    pub report_id: ReportId,
    /// Report title.
    pub title: String,
    /// When the report was generated.
    pub generated_at: SystemTime,
    /// Inclusive start of the reporting period.
    pub period_start: SystemTime,
    /// Exclusive end of the reporting period.
    pub period_end: SystemTime,
    /// Total violations in the period.
    pub total_violations: usize,
    /// Count by required capability.
    pub by_capability: Vec<(String, u64)>,
    /// Count by violation type.
    pub by_type: Vec<(ViolationType, u64)>,
    /// Count by severity.
    pub by_severity: Vec<(ViolationSeverity, u64)>,
    /// Count by subject, for subjects present on the violation.
    pub by_subject: Vec<(String, u64)>,
    /// Violation counts bucketed to the start of each hour in range.
    pub hourly_trend: Vec<(i64, u64)>,
    /// Top capabilities by violation count, descending.
    pub top_capabilities: Vec<(String, u64)>,
    /// Top subjects by violation count, descending.
    pub top_subjects: Vec<(String, u64)>,
    /// Human-readable recommendations derived from the observed patterns.
    pub recommendations: Vec<String>,
}

/// Records violations, dispatches rule-matched alerts, and generates
/// time-range reports.
pub struct ViolationReporter {
    recent_violations: VecDeque<CapabilityViolation>,
    alert_rules: HashMap<AlertRuleId, AlertRule>,
    alert_history: VecDeque<DispatchedAlert>,
    rate_limits: HashMap<AlertRuleId, VecDeque<SystemTime>>,
    notification_handlers: HashMap<AlertChannel, Box<dyn NotificationHandler>>,
}

impl Default for ViolationReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationReporter {
    /// Creates an empty reporter with no rules or handlers registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recent_violations: VecDeque::new(),
            alert_rules: HashMap::new(),
            alert_history: VecDeque::new(),
            rate_limits: HashMap::new(),
            notification_handlers: HashMap::new(),
        }
    }

    /// Registers an alert rule, replacing any existing rule with the same id.
    pub fn add_alert_rule(&mut self, rule: AlertRule) {
        self.alert_rules.insert(rule.rule_id.clone(), rule);
    }

    /// Removes an alert rule. Returns `true` if a rule was removed.
    pub fn remove_alert_rule(&mut self, rule_id: &AlertRuleId) -> bool {
        self.alert_rules.remove(rule_id).is_some()
    }

    /// Registers the handler used to deliver alerts on `channel`.
    pub fn add_notification_handler(&mut self, channel: AlertChannel, handler: Box<dyn NotificationHandler>) {
        self.notification_handlers.insert(channel, handler);
    }

    /// Records `violation`, then matches and dispatches alerts against every
    /// enabled rule. Delivery failures are swallowed; recording a violation
    /// never fails because alerting failed.
    pub fn record_violation(&mut self, violation: CapabilityViolation, now: SystemTime) {
        self.recent_violations.push_back(violation.clone());
        while self.recent_violations.len() > MAX_RECENT_VIOLATIONS {
            self.recent_violations.pop_front();
        }

        let rule_ids: Vec<AlertRuleId> = self.alert_rules.keys().cloned().collect();
        for rule_id in rule_ids {
            let Some(rule) = self.alert_rules.get(&rule_id).cloned() else {
                continue;
            };
            if !rule.enabled || !violation_matches_rule(&violation, &rule) {
                continue;
            }
            if self.is_rate_limited(&rule_id, &rule, now) {
                continue;
            }
            if rule.quiet_hours.is_some_and(|quiet| quiet.contains(hour_of(now))) {
                continue;
            }
            let escalated = self.should_escalate(&violation, &rule, now);
            self.dispatch(&violation, &rule, escalated, now);
        }
    }

    fn is_rate_limited(&mut self, rule_id: &AlertRuleId, rule: &AlertRule, now: SystemTime) -> bool {
        let Some(limit) = rule.rate_limit_per_hour else {
            return false;
        };
        let hour_ago = now.checked_sub(Duration::from_secs(3600)).unwrap_or(UNIX_EPOCH);
        let samples = self.rate_limits.entry(rule_id.clone()).or_default();
        samples.retain(|sent_at| *sent_at >= hour_ago);
        u32::try_from(samples.len()).unwrap_or(u32::MAX) >= limit
    }

    fn should_escalate(&self, violation: &CapabilityViolation, rule: &AlertRule, now: SystemTime) -> bool {
        if rule.escalation_threshold == 0 {
            return false;
        }
        let cutoff = now.checked_sub(rule.escalation_window).unwrap_or(UNIX_EPOCH);
        let cutoff_secs = cutoff.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        let count = self
            .recent_violations
            .iter()
            .filter(|row| {
                row.occurred_at >= cutoff_secs
                    && row.subject == violation.subject
                    && row.violation_type == violation.violation_type
            })
            .count();
        u32::try_from(count).unwrap_or(u32::MAX) >= rule.escalation_threshold
    }

    fn dispatch(&mut self, violation: &CapabilityViolation, rule: &AlertRule, escalated: bool, now: SystemTime) {
        let alert = DispatchedAlert {
            violation: violation.clone(),
            rule_name: rule.name.clone(),
            escalated,
            dispatched_at: now,
            channels: rule.channels.clone(),
        };

        for channel in &rule.channels {
            if let Some(handler) = self.notification_handlers.get(channel) {
                if let Err(error) = handler.send(&alert, &rule.recipients) {
                    tracing::error!(channel = ?channel, %error, "failed to dispatch violation alert");
                }
            } else {
                tracing::warn!(channel = ?channel, "no notification handler configured for channel");
            }
        }

        self.rate_limits.entry(rule.rule_id.clone()).or_default().push_back(now);
        self.alert_history.push_back(alert);
        while self.alert_history.len() > MAX_ALERT_HISTORY {
            self.alert_history.pop_front();
        }
    }

    /// Generates a [`ViolationReport`] over `[period_start, period_end)`.
    #[must_use]
    pub fn generate_report(&self, period_start: SystemTime, period_end: SystemTime, title: &str, now: SystemTime) -> ViolationReport {
        let start_secs = to_unix_secs(period_start);
        let end_secs = to_unix_secs(period_end);
        let violations: Vec<&CapabilityViolation> = self
            .recent_violations
            .iter()
            .filter(|row| row.occurred_at >= start_secs && row.occurred_at < end_secs)
            .collect();

        let mut by_capability: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<ViolationType, u64> = HashMap::new();
        let mut by_severity: HashMap<ViolationSeverity, u64> = HashMap::new();
        let mut by_subject: HashMap<String, u64> = HashMap::new();
        let mut hourly: HashMap<i64, u64> = HashMap::new();

        for violation in &violations {
            *by_capability.entry(violation.required_capability.clone()).or_insert(0) += 1;
            *by_type.entry(violation.violation_type).or_insert(0) += 1;
            *by_severity.entry(violation.severity).or_insert(0) += 1;
            if let Some(subject) = &violation.subject {
                *by_subject.entry(subject.clone()).or_insert(0) += 1;
            }
            let hour_bucket = (violation.occurred_at / 3600) * 3600;
            *hourly.entry(hour_bucket).or_insert(0) += 1;
        }

        let mut top_capabilities: Vec<(String, u64)> = by_capability.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_capabilities.sort_by(|a, b| b.1.cmp(&a.1));
        top_capabilities.truncate(TOP_N);

        let mut top_subjects: Vec<(String, u64)> = by_subject.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_subjects.sort_by(|a, b| b.1.cmp(&a.1));
        top_subjects.truncate(TOP_N);

        let mut hourly_trend: Vec<(i64, u64)> = hourly.into_iter().collect();
        hourly_trend.sort_by_key(|(hour, _)| *hour);

        let recommendations = build_recommendations(&violations, &by_capability, &by_subject);

        ViolationReport {
            report_id: ReportId::new(Uuid::new_v4().to_string()),
            title: title.to_string(),
            generated_at: now,
            period_start,
            period_end,
            total_violations: violations.len(),
            by_capability: by_capability.into_iter().collect(),
            by_type: by_type.into_iter().collect(),
            by_severity: by_severity.into_iter().collect(),
            by_subject: by_subject.into_iter().collect(),
            hourly_trend,
            top_capabilities,
            top_subjects,
            recommendations,
        }
    }

    /// Drops violations and alert history older than `retention`.
    pub fn clear_old_data(&mut self, retention: Duration, now: SystemTime) {
        let cutoff = to_unix_secs(now.checked_sub(retention).unwrap_or(UNIX_EPOCH));
        self.recent_violations.retain(|row| row.occurred_at >= cutoff);
        let cutoff_time = now.checked_sub(retention).unwrap_or(UNIX_EPOCH);
        self.alert_history.retain(|alert| alert.dispatched_at >= cutoff_time);
    }
}

fn violation_matches_rule(violation: &CapabilityViolation, rule: &AlertRule) -> bool {
    if !rule.capability_patterns.is_empty()
        && !rule
            .capability_patterns
            .iter()
            .any(|pattern| violation.required_capability.starts_with(pattern.trim_end_matches('*')))
    {
        return false;
    }
    if !rule.violation_types.is_empty() && !rule.violation_types.contains(&violation.violation_type) {
        return false;
    }
    violation.severity >= rule.min_severity
}

fn hour_of(now: SystemTime) -> u8 {
    let secs = to_unix_secs(now);
    let hour_of_day = (secs / 3600).rem_euclid(24);
    #[allow(clippy::cast_possible_truncation, reason = "hour_of_day is in [0, 24)")]
    {
        hour_of_day as u8
    }
}

fn to_unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => {
            #[allow(clippy::cast_possible_wrap, reason = "timestamps fit well within i64 range")]
            {
                duration.as_secs() as i64
            }
        }
        Err(_) => 0,
    }
}

fn build_recommendations(
    violations: &[&CapabilityViolation],
    by_capability: &HashMap<String, u64>,
    by_subject: &HashMap<String, u64>,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if violations.is_empty() {
        return recommendations;
    }

    #[allow(clippy::cast_precision_loss, reason = "violation counts are small")]
    let total = violations.len() as f64;

    if let Some((capability, count)) = by_capability.iter().max_by_key(|(_, count)| **count) {
        #[allow(clippy::cast_precision_loss, reason = "violation counts are small")]
        let share = f64::from(u32::try_from(*count).unwrap_or(u32::MAX)) / total;
        if share > 0.30 {
            recommendations.push(format!(
                "capability '{capability}' accounts for {count} violations ({:.1}%); review its rules or access scope",
                share * 100.0
            ));
        }
    }

    let repeat_violators = by_subject.values().filter(|count| **count >= 5).count();
    if repeat_violators > 0 {
        recommendations.push(format!("{repeat_violators} subject(s) have 5+ violations; consider access review"));
    }

    let critical_count = violations.iter().filter(|row| row.severity == ViolationSeverity::Critical).count();
    if critical_count > 0 {
        recommendations.push(format!("{critical_count} critical violation(s) detected; immediate investigation recommended"));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::core::identifiers::TenantId;
    use crate::domain::ids::ViolationId;

    fn violation(subject: &str, required_capability: &str, violation_type: ViolationType, severity: ViolationSeverity, occurred_at: i64) -> CapabilityViolation {
        CapabilityViolation {
            violation_id: ViolationId::new("v1"),
            tenant_id: TenantId::new("tenant-a"),
            subject: Some(subject.to_string()),
            violation_type,
            severity,
            required_capability: required_capability.to_string(),
            tool_name: None,
            correlation_id: "c1".to_string(),
            occurred_at,
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        sent: RefCell<u32>,
    }

    impl NotificationHandler for RecordingHandler {
        fn send(&self, _alert: &DispatchedAlert, _recipients: &[String]) -> Result<(), String> {
            *self.sent.borrow_mut() += 1;
            Ok(())
        }
    }

    fn base_rule() -> AlertRule {
        AlertRule {
            rule_id: AlertRuleId::new("r1"),
            name: "critical".to_string(),
            enabled: true,
            capability_patterns: Vec::new(),
            violation_types: Vec::new(),
            min_severity: ViolationSeverity::Low,
            rate_limit_per_hour: None,
            escalation_threshold: 0,
            escalation_window: Duration::from_secs(3600),
            quiet_hours: None,
            channels: vec![AlertChannel::Log],
            recipients: Vec::new(),
        }
    }

    #[test]
    fn matching_rule_dispatches_to_its_handler() {
        let mut reporter = ViolationReporter::new();
        reporter.add_notification_handler(AlertChannel::Log, Box::new(RecordingHandler::default()));
        reporter.add_alert_rule(base_rule());
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        reporter.record_violation(violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1_000_000), now);
        assert_eq!(reporter.alert_history.len(), 1);
    }

    #[test]
    fn min_severity_filters_out_low_severity_violations() {
        let mut reporter = ViolationReporter::new();
        let mut rule = base_rule();
        rule.min_severity = ViolationSeverity::High;
        reporter.add_alert_rule(rule);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        reporter.record_violation(violation("u1", "write", ViolationType::ToolNotAllowed, ViolationSeverity::Low, 1_000_000), now);
        assert!(reporter.alert_history.is_empty());
    }

    #[test]
    fn escalation_threshold_marks_repeated_violations_as_escalated() {
        let mut reporter = ViolationReporter::new();
        let mut rule = base_rule();
        rule.escalation_threshold = 3;
        reporter.add_alert_rule(rule);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        for i in 0..3i64 {
            reporter.record_violation(
                violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1_000_000 + i),
                now,
            );
        }
        assert!(reporter.alert_history.back().expect("has an alert").escalated);
    }

    #[test]
    fn rate_limit_suppresses_alerts_beyond_the_hourly_cap() {
        let mut reporter = ViolationReporter::new();
        let mut rule = base_rule();
        rule.rate_limit_per_hour = Some(1);
        reporter.add_alert_rule(rule);
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        reporter.record_violation(violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1_000_000), now);
        reporter.record_violation(violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1_000_001), now);
        assert_eq!(reporter.alert_history.len(), 1);
    }

    #[test]
    fn generate_report_aggregates_by_capability_and_severity() {
        let mut reporter = ViolationReporter::new();
        let now = UNIX_EPOCH + Duration::from_secs(1_000_000);
        reporter.record_violation(violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1_000_000), now);
        reporter.record_violation(violation("u2", "write", ViolationType::ToolNotAllowed, ViolationSeverity::Low, 1_000_100), now);

        let report = reporter.generate_report(UNIX_EPOCH, UNIX_EPOCH + Duration::from_secs(2_000_000), "test report", now);
        assert_eq!(report.total_violations, 2);
        assert_eq!(report.by_capability, vec![("write".to_string(), 2)]);
    }

    #[test]
    fn clear_old_data_drops_violations_before_the_retention_cutoff() {
        let mut reporter = ViolationReporter::new();
        let now = UNIX_EPOCH + Duration::from_secs(100_000);
        reporter.record_violation(violation("u1", "write", ViolationType::MissingCapability, ViolationSeverity::Medium, 1), now);
        reporter.clear_old_data(Duration::from_secs(10), now);
        assert!(reporter.recent_violations.is_empty());
    }
}
