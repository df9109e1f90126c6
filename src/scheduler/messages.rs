//! Control-plane and broadcast messages exchanged between bridges and the worker.

use serde::{Deserialize, Serialize};

use super::history::ExecutionResult;

/// Requests a bridge sends to the worker. Each expects exactly one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    CheckCronStatus,
    ToggleCron { enabled: bool },
    RunNow,
}

/// The worker's reply to a [`ControlMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    CronStatus(CronStatus),
    CronToggled { enabled: bool },
    RunStarted { started: bool },
}

/// Worker-side view of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronStatus {
    pub enabled: bool,
    pub service_worker_active: bool,
    /// Local wall-clock time of the next fire, `YYYY-MM-DDTHH:MM:SS`.
    pub next_execution_time: Option<String>,
    pub working_days: Vec<String>,
    /// ISO date of the last scheduled run.
    pub last_execution: Option<String>,
    /// Whether a dispatch is in flight.
    #[serde(default)]
    pub dispatching: bool,
}

impl CronStatus {
    /// What a bridge reports when the worker is absent or silent.
    pub fn inactive() -> Self {
        Self {
            enabled: false,
            service_worker_active: false,
            next_execution_time: None,
            working_days: Vec::new(),
            last_execution: None,
            dispatching: false,
        }
    }
}

/// Unsolicited messages the worker sends to every bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    DailyEmailExecution(ExecutionResult),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_message_wire_names() {
        assert_eq!(
            serde_json::to_value(ControlMessage::CheckCronStatus).unwrap(),
            json!({ "type": "CHECK_CRON_STATUS" })
        );
        let toggle: ControlMessage =
            serde_json::from_value(json!({ "type": "TOGGLE_CRON", "enabled": false })).unwrap();
        assert_eq!(toggle, ControlMessage::ToggleCron { enabled: false });
    }

    #[test]
    fn test_status_reply_shape() {
        let reply = ControlReply::CronStatus(CronStatus {
            enabled: true,
            service_worker_active: true,
            next_execution_time: Some("2024-06-11T09:00:00".to_string()),
            working_days: vec!["Mon".to_string()],
            last_execution: Some("2024-06-10".to_string()),
            dispatching: false,
        });
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["type"], "CRON_STATUS");
        assert_eq!(value["nextExecutionTime"], "2024-06-11T09:00:00");
        assert_eq!(value["workingDays"][0], "Mon");
        assert_eq!(value["lastExecution"], "2024-06-10");
        assert_eq!(value["serviceWorkerActive"], true);
    }

    #[test]
    fn test_broadcast_is_flat() {
        let result = ExecutionResult::new(super::super::TriggerSource::Scheduled, Vec::new());
        let value = serde_json::to_value(WorkerEvent::DailyEmailExecution(result)).unwrap();
        assert_eq!(value["type"], "DAILY_EMAIL_EXECUTION");
        assert_eq!(value["totalEmails"], 0);
        assert!(value["results"].as_array().unwrap().is_empty());
    }
}
