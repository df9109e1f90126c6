//! Trigger decision and next-run preview.
//!
//! The decision is a pure function of the wall clock, the ledger's last
//! recorded date and the task. Previews go through the `cron` crate by
//! expressing the task as a six-field expression.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use cron::Schedule as CronSchedule;

use super::task::ScheduledTask;

/// Whether the task should fire at `now`.
///
/// Matches on the exact `HH:MM` minute only. A minute in which no tick
/// happened is not caught up later.
pub fn should_run(now: NaiveDateTime, last_execution: Option<NaiveDate>, task: &ScheduledTask) -> bool {
    if !task.enabled {
        return false;
    }
    if !task.is_active_on(now.weekday()) {
        return false;
    }
    if now.hour() != task.scheduled_time.hour() || now.minute() != task.scheduled_time.minute() {
        return false;
    }
    last_execution != Some(now.date())
}

/// Six-field cron expression equivalent to the task's trigger, e.g.
/// `0 0 9 * * Mon,Tue,Wed,Thu,Fri`. `None` when no weekday is active.
pub fn cron_expression(task: &ScheduledTask) -> Option<String> {
    if task.active_weekdays.is_empty() {
        return None;
    }
    Some(format!(
        "0 {} {} * * {}",
        task.scheduled_time.minute(),
        task.scheduled_time.hour(),
        task.working_day_labels().join(",")
    ))
}

/// Up to `limit` fire times strictly after `after` and no later than `until`.
///
/// Wall-clock values are mapped onto UTC for the cron walk so that local
/// times come back unchanged; the schedule is defined in local time.
pub fn upcoming(
    task: &ScheduledTask,
    after: NaiveDateTime,
    until: Option<NaiveDateTime>,
    limit: usize,
) -> Vec<NaiveDateTime> {
    let Some(expr) = cron_expression(task) else {
        return Vec::new();
    };
    let schedule = match CronSchedule::from_str(&expr) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(%expr, error = %e, "task does not map to a cron expression");
            return Vec::new();
        }
    };

    let start = Utc.from_utc_datetime(&after);
    schedule
        .after(&start)
        .map(|dt| dt.naive_utc())
        .take_while(|t| until.map_or(true, |end| *t <= end))
        .take(limit)
        .collect()
}

/// The next moment the worker would fire, given what the ledger records.
///
/// A disabled task has no next execution. If today's slot is still ahead but
/// today is already recorded, the next slot after today is reported.
pub fn next_execution(
    task: &ScheduledTask,
    now: NaiveDateTime,
    last_execution: Option<NaiveDate>,
) -> Option<NaiveDateTime> {
    if !task.enabled {
        return None;
    }
    // The current minute still qualifies when it has not been served yet.
    let from = now.with_second(0)?.with_nanosecond(0)? - chrono::Duration::seconds(1);
    upcoming(task, from, None, 2)
        .into_iter()
        .find(|t| last_execution != Some(t.date()))
}
