//! The scheduled task definition.

use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::Serialize;
use thiserror::Error;

use crate::config::ScheduleConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),
}

/// A daily task that fires at one local wall-clock minute on selected weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledTask {
    pub name: String,
    #[serde(serialize_with = "serialize_hhmm")]
    pub scheduled_time: NaiveTime,
    /// Weekdays in Monday-first order, without duplicates.
    pub active_weekdays: Vec<Weekday>,
    pub enabled: bool,
}

impl ScheduledTask {
    /// The built-in daily summary task: 09:00, Monday to Friday, enabled.
    pub fn daily_email_summary() -> Self {
        Self {
            name: "daily-email-summary".to_string(),
            scheduled_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            active_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            enabled: true,
        }
    }

    /// Build the task from configuration. The task always starts enabled.
    pub fn from_config(cfg: &ScheduleConfig) -> Result<Self, ScheduleError> {
        let scheduled_time = parse_hhmm(&cfg.time)?;

        let mut active_weekdays = Vec::with_capacity(cfg.working_days.len());
        for raw in &cfg.working_days {
            let day = Weekday::from_str(raw.trim())
                .map_err(|_| ScheduleError::UnknownWeekday(raw.clone()))?;
            if !active_weekdays.contains(&day) {
                active_weekdays.push(day);
            }
        }
        active_weekdays.sort_by_key(|d| d.num_days_from_monday());

        Ok(Self {
            name: cfg.task_name.clone(),
            scheduled_time,
            active_weekdays,
            enabled: true,
        })
    }

    pub fn is_active_on(&self, day: Weekday) -> bool {
        self.active_weekdays.contains(&day)
    }

    /// `HH:MM` label of the trigger minute.
    pub fn time_label(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.scheduled_time.hour(),
            self.scheduled_time.minute()
        )
    }

    /// Weekday names, e.g. `["Mon", "Tue"]`.
    pub fn working_day_labels(&self) -> Vec<String> {
        self.active_weekdays.iter().map(|d| d.to_string()).collect()
    }
}

/// Parse a strict `HH:MM` time of day.
pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let raw = raw.trim();
    if raw.len() != 5 {
        return Err(ScheduleError::InvalidTime(raw.to_string()));
    }
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| ScheduleError::InvalidTime(raw.to_string()))
}

fn serialize_hhmm<S: serde::Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:02}:{:02}", time.hour(), time.minute()))
}
