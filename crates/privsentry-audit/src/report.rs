//! Compliance report: a read-time aggregate over the audit history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;
use privsentry_core::PiiTypeSet;

/// Window of ingestion timestamps a report covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    #[default]
    #[serde(alias = "all_time")]
    All,
    #[serde(alias = "daily", alias = "24h")]
    Day,
    #[serde(alias = "weekly", alias = "7d")]
    Week,
    #[serde(alias = "monthly", alias = "30d")]
    Month,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Earliest timestamp included, or `None` for no bound.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::All => None,
            Self::Day => Some(now - Duration::days(1)),
            Self::Week => Some(now - Duration::weeks(1)),
            Self::Month => Some(now - Duration::days(30)),
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" | "all_time" => Ok(Self::All),
            "day" | "daily" | "24h" => Ok(Self::Day),
            "week" | "weekly" | "7d" => Ok(Self::Week),
            "month" | "monthly" | "30d" => Ok(Self::Month),
            other => Err(format!("unknown report period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, alias = "report_period")]
    pub period: ReportPeriod,
}

impl ReportFilter {
    fn matches(&self, entry: &AuditEntry, since: Option<DateTime<Utc>>) -> bool {
        let user_ok = self
            .user_id
            .as_deref()
            .map_or(true, |u| entry.user_id == u);
        let time_ok = since.map_or(true, |t| entry.timestamp >= t);
        user_ok && time_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files_processed: usize,
    pub compliant_files: usize,
    pub non_compliant_files: usize,
    /// Percentage, two decimals; 0 when there are no entries.
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiStatistics {
    pub total_pii_types_detected: usize,
    pub total_pii_types_redacted: usize,
    pub pii_types_detected: PiiTypeSet,
    pub pii_types_redacted: PiiTypeSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Compliant,
    RequiresAttention,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_generated_at: DateTime<Utc>,
    pub report_period: ReportPeriod,
    pub user_id_filter: Option<String>,
    pub summary: ReportSummary,
    pub pii_statistics: PiiStatistics,
    pub recent_processing_events: Vec<AuditEntry>,
    pub compliance_status: OverallStatus,
}

impl ComplianceReport {
    /// Aggregate `history` (ordered oldest first) under `filter`.
    pub fn build(
        history: &[AuditEntry],
        filter: &ReportFilter,
        now: DateTime<Utc>,
        recent: usize,
    ) -> Self {
        let since = filter.period.since(now);
        let selected: Vec<&AuditEntry> =
            history.iter().filter(|e| filter.matches(e, since)).collect();

        let total = selected.len();
        let compliant = selected.iter().filter(|e| e.is_compliant()).count();
        let non_compliant = total - compliant;
        let compliance_rate = if total == 0 {
            0.0
        } else {
            let pct = compliant as f64 / total as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        let detected: PiiTypeSet = selected
            .iter()
            .flat_map(|e| e.pii_types_detected.iter().copied())
            .collect();
        let redacted: PiiTypeSet = selected
            .iter()
            .flat_map(|e| e.redacted_pii_types.iter().copied())
            .collect();

        let skip = total.saturating_sub(recent);
        let recent_processing_events = selected[skip..].iter().map(|e| (*e).clone()).collect();

        Self {
            report_generated_at: now,
            report_period: filter.period,
            user_id_filter: filter.user_id.clone(),
            summary: ReportSummary {
                total_files_processed: total,
                compliant_files: compliant,
                non_compliant_files: non_compliant,
                compliance_rate,
            },
            pii_statistics: PiiStatistics {
                total_pii_types_detected: detected.len(),
                total_pii_types_redacted: redacted.len(),
                pii_types_detected: detected,
                pii_types_redacted: redacted,
            },
            recent_processing_events,
            compliance_status: if non_compliant == 0 {
                OverallStatus::Compliant
            } else {
                OverallStatus::RequiresAttention
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privsentry_core::{IngestionEvent, PiiType, PipelineEvent, ProcessingStatus, RedactionOutcome};

    fn entry(user: &str, ok: bool, age: Duration, detected: &[PiiType]) -> AuditEntry {
        let at = Utc::now() - age;
        let mut ev: PipelineEvent = IngestionEvent::at("intake/f.txt", user, at).into();
        ev.record_detection(detected.iter().copied().collect()).unwrap();
        ev.record_consent(Default::default()).unwrap();
        let outcome = if ok {
            RedactionOutcome {
                redacted_file_path: Some("intake/f_redacted.txt".into()),
                redacted_pii_types: detected.to_vec(),
                unredacted_pii_types: Vec::new(),
                status: ProcessingStatus::Success,
                tier: None,
                message: None,
                error: None,
            }
        } else {
            RedactionOutcome::failed("write failed")
        };
        ev.record_redaction(outcome).unwrap();
        AuditEntry::from_event(&ev, at)
    }

    #[test]
    fn test_empty_history_rate_is_zero() {
        let report = ComplianceReport::build(&[], &ReportFilter::default(), Utc::now(), 10);
        assert_eq!(report.summary.total_files_processed, 0);
        assert_eq!(report.summary.compliance_rate, 0.0);
        assert_eq!(report.compliance_status, OverallStatus::Compliant);
        assert!(report.recent_processing_events.is_empty());
    }

    #[test]
    fn test_counts_and_rate_rounding() {
        let history = vec![
            entry("u1", true, Duration::hours(1), &[PiiType::EmailAddress]),
            entry("u1", true, Duration::hours(1), &[PiiType::PhoneNumber]),
            entry("u2", false, Duration::hours(1), &[PiiType::UsSsn]),
        ];
        let report = ComplianceReport::build(&history, &ReportFilter::default(), Utc::now(), 10);
        assert_eq!(report.summary.total_files_processed, 3);
        assert_eq!(report.summary.compliant_files, 2);
        assert_eq!(report.summary.non_compliant_files, 1);
        assert_eq!(report.summary.compliance_rate, 66.67);
        assert_eq!(report.pii_statistics.total_pii_types_detected, 3);
        // Failed run redacted nothing
        assert_eq!(report.pii_statistics.total_pii_types_redacted, 2);
        assert_eq!(report.compliance_status, OverallStatus::RequiresAttention);
    }

    #[test]
    fn test_user_and_period_filters() {
        let history = vec![
            entry("u1", true, Duration::days(10), &[]),
            entry("u1", false, Duration::hours(2), &[]),
            entry("u2", true, Duration::hours(2), &[]),
        ];
        let filter = ReportFilter {
            user_id: Some("u1".into()),
            period: ReportPeriod::Day,
        };
        let report = ComplianceReport::build(&history, &filter, Utc::now(), 10);
        assert_eq!(report.summary.total_files_processed, 1);
        assert_eq!(report.summary.compliance_rate, 0.0);
        assert_eq!(report.user_id_filter.as_deref(), Some("u1"));

        let week = ReportFilter {
            user_id: None,
            period: ReportPeriod::Week,
        };
        let report = ComplianceReport::build(&history, &week, Utc::now(), 10);
        assert_eq!(report.summary.total_files_processed, 2);
    }

    #[test]
    fn test_recent_entries_are_the_latest() {
        let history: Vec<AuditEntry> = (0..15)
            .map(|i| entry(&format!("u{}", i), true, Duration::minutes(60 - i), &[]))
            .collect();
        let report = ComplianceReport::build(&history, &ReportFilter::default(), Utc::now(), 10);
        assert_eq!(report.recent_processing_events.len(), 10);
        assert_eq!(report.recent_processing_events[0].user_id, "u5");
        assert_eq!(report.recent_processing_events[9].user_id, "u14");
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("weekly".parse::<ReportPeriod>().unwrap(), ReportPeriod::Week);
        assert_eq!("".parse::<ReportPeriod>().unwrap(), ReportPeriod::All);
        assert!("fortnight".parse::<ReportPeriod>().is_err());
        let filter: ReportFilter = serde_json::from_str(r#"{"report_period":"daily"}"#).unwrap();
        assert_eq!(filter.period, ReportPeriod::Day);
    }
}
