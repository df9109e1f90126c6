//! Outcome records for a dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::SummaryKind;

/// What started a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// The daily trigger matched on a worker tick.
    Scheduled,
    /// An operator asked for an immediate run.
    Manual,
}

/// Outcome of one backend endpoint call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointResult {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub success: bool,
    pub message: String,
    pub emails_sent: u32,
}

impl EndpointResult {
    pub fn succeeded(kind: SummaryKind, message: impl Into<String>, emails_sent: u32) -> Self {
        Self {
            kind,
            success: true,
            message: message.into(),
            emails_sent,
        }
    }

    pub fn failed(kind: SummaryKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            success: false,
            message: message.into(),
            emails_sent: 0,
        }
    }
}

/// Result of one full dispatch, broadcast to every bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub run_id: Uuid,
    /// Completion instant.
    pub timestamp: DateTime<Utc>,
    pub trigger: TriggerSource,
    /// One entry per endpoint, in call order.
    pub results: Vec<EndpointResult>,
    pub total_emails: u32,
}

impl ExecutionResult {
    pub fn new(trigger: TriggerSource, results: Vec<EndpointResult>) -> Self {
        let total_emails = results.iter().map(|r| r.emails_sent).sum();
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            trigger,
            results,
            total_emails,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// One-line human summary, used for notifications and CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{} email(s) sent, {}/{} summaries succeeded",
            self.total_emails,
            self.succeeded_count(),
            self.results.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_emails_sums_entries() {
        let result = ExecutionResult::new(
            TriggerSource::Scheduled,
            vec![
                EndpointResult::succeeded(SummaryKind::Rfp, "ok", 3),
                EndpointResult::succeeded(SummaryKind::Prospect, "ok", 5),
                EndpointResult::succeeded(SummaryKind::ClientNeed, "ok", 2),
            ],
        );
        assert_eq!(result.total_emails, 10);
        assert!(result.all_succeeded());
        assert_eq!(result.summary(), "10 email(s) sent, 3/3 summaries succeeded");
    }

    #[test]
    fn test_failed_entry_counts_no_emails() {
        let result = ExecutionResult::new(
            TriggerSource::Scheduled,
            vec![
                EndpointResult::succeeded(SummaryKind::Rfp, "ok", 4),
                EndpointResult::failed(SummaryKind::Prospect, "backend unreachable"),
            ],
        );
        assert_eq!(result.total_emails, 4);
        assert_eq!(result.succeeded_count(), 1);
        assert!(!result.all_succeeded());
    }

    #[test]
    fn test_wire_shape() {
        let result = ExecutionResult::new(
            TriggerSource::Manual,
            vec![EndpointResult::succeeded(SummaryKind::ClientNeed, "sent", 2)],
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["trigger"], "manual");
        assert_eq!(json["totalEmails"], 2);
        assert_eq!(json["results"][0]["type"], "client_need");
        assert_eq!(json["results"][0]["emailsSent"], 2);
        assert!(json["runId"].is_string());
        assert!(json["timestamp"].is_string());
    }
}
