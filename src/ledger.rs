//! Persistent execution ledger.
//!
//! A synchronous, last-write-wins key/value store shared by the worker and
//! every bridge. Each key has exactly one writer: the worker owns
//! [`LAST_EXECUTION_KEY`], bridges own [`LAST_RESULT_KEY`].

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use tracing::warn;

use crate::scheduler::ExecutionResult;
use crate::storage::Pool;

/// ISO date (`YYYY-MM-DD`) of the most recent scheduled run.
pub const LAST_EXECUTION_KEY: &str = "lastDailyEmailExecution";
/// JSON of the most recent [`ExecutionResult`], overwritten each run.
pub const LAST_RESULT_KEY: &str = "lastDailyEmailResults";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Ledger: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Date of the last scheduled run.
///
/// An entry that does not parse as an ISO date is reported and treated as
/// absent, so a hand-edited ledger cannot wedge the schedule.
pub fn last_execution_date(ledger: &dyn Ledger) -> Result<Option<NaiveDate>> {
    let Some(raw) = ledger.read(LAST_EXECUTION_KEY)? else {
        return Ok(None);
    };
    match NaiveDate::parse_from_str(&raw, DATE_FORMAT) {
        Ok(date) => Ok(Some(date)),
        Err(e) => {
            warn!(key = LAST_EXECUTION_KEY, value = %raw, error = %e, "ignoring unparseable ledger date");
            Ok(None)
        }
    }
}

pub fn record_execution_date(ledger: &dyn Ledger, date: NaiveDate) -> Result<()> {
    ledger.write(LAST_EXECUTION_KEY, &date.format(DATE_FORMAT).to_string())
}

/// The cached result of the most recent dispatch.
pub fn cached_result(ledger: &dyn Ledger) -> Result<Option<ExecutionResult>> {
    match ledger.read(LAST_RESULT_KEY)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("corrupt {LAST_RESULT_KEY} entry")),
        None => Ok(None),
    }
}

pub fn cache_result(ledger: &dyn Ledger, result: &ExecutionResult) -> Result<()> {
    let json = serde_json::to_string(result)?;
    ledger.write(LAST_RESULT_KEY, &json)
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Ledger stored in the `ledger` table of the daemon database.
#[derive(Clone)]
pub struct SqliteLedger {
    pool: Pool,
}

impl SqliteLedger {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl Ledger for SqliteLedger {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM ledger WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read ledger key {key}"))?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO ledger (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, value],
        )
        .with_context(|| format!("failed to write ledger key {key}"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local ledger, used by tests and `serve --ephemeral`.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory ledger lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory ledger lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{EndpointResult, SummaryKind, TriggerSource};
    use crate::storage;

    fn sample_result() -> ExecutionResult {
        ExecutionResult::new(
            TriggerSource::Scheduled,
            vec![
                EndpointResult::succeeded(SummaryKind::Rfp, "ok", 3),
                EndpointResult::failed(SummaryKind::Prospect, "HTTP 500"),
            ],
        )
    }

    #[test]
    fn test_sqlite_read_missing_key_is_none() {
        let ledger = SqliteLedger::new(storage::open_memory_pool().unwrap());
        assert_eq!(ledger.read("absent").unwrap(), None);
    }

    #[test]
    fn test_sqlite_last_write_wins() {
        let ledger = SqliteLedger::new(storage::open_memory_pool().unwrap());
        ledger.write("k", "first").unwrap();
        ledger.write("k", "second").unwrap();
        assert_eq!(ledger.read("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_sqlite_ledger_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gojo.db");

        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        {
            let ledger = SqliteLedger::new(storage::open_pool(&path).unwrap());
            record_execution_date(&ledger, date).unwrap();
        }

        let reopened = SqliteLedger::new(storage::open_pool(&path).unwrap());
        assert_eq!(last_execution_date(&reopened).unwrap(), Some(date));
        assert_eq!(
            reopened.read(LAST_EXECUTION_KEY).unwrap().as_deref(),
            Some("2024-06-10")
        );
    }

    #[test]
    fn test_unparseable_date_reads_as_absent() {
        let ledger = MemoryLedger::new();
        ledger.write(LAST_EXECUTION_KEY, "Mon Jun 10 2024").unwrap();
        assert_eq!(last_execution_date(&ledger).unwrap(), None);
    }

    #[test]
    fn test_cached_result_is_overwritten() {
        let ledger = MemoryLedger::new();
        assert!(cached_result(&ledger).unwrap().is_none());

        let first = sample_result();
        cache_result(&ledger, &first).unwrap();

        let second = ExecutionResult::new(
            TriggerSource::Manual,
            vec![EndpointResult::succeeded(SummaryKind::ClientNeed, "ok", 7)],
        );
        cache_result(&ledger, &second).unwrap();

        let cached = cached_result(&ledger).unwrap().unwrap();
        assert_eq!(cached.run_id, second.run_id);
        assert_eq!(cached.total_emails, 7);
        assert_eq!(cached.trigger, TriggerSource::Manual);
    }
}
