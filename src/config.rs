//! TOML configuration for the GOJO scheduler daemon.
//!
//! Layered model: an explicit `--config` path, then the `GOJO_CONFIG`
//! environment variable, then `/etc/gojo/gojo.toml`, then compiled-in
//! defaults. Every section is optional and falls back to its defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bridge::NotificationPermission;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the daemon and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GojoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GojoConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded gojo configuration");
        Ok(config)
    }

    /// Resolve the configuration.
    ///
    /// An explicit path must load; the environment and system locations fall
    /// through to the next candidate with a warning. `GOJO_BACKEND_KEY`
    /// replaces `backend.api_key` whichever source won.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };

        if let Ok(key) = std::env::var("GOJO_BACKEND_KEY") {
            if !key.is_empty() {
                config.backend.api_key = key;
            }
        }

        Ok(config)
    }

    /// Try, in order: `$GOJO_CONFIG`, `/etc/gojo/gojo.toml`, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("GOJO_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "GOJO_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/gojo/gojo.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the axum listener binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the execution ledger.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/gojo.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Where the summary email functions live and how to authenticate to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the hosted platform, without a trailing slash.
    pub base_url: String,
    /// Path prefix under which serverless functions are mounted.
    pub functions_path: String,
    /// Static bearer credential sent with every call.
    pub api_key: String,
    /// Per-request timeout (seconds).
    pub request_timeout_sec: u64,
    pub rfp_function: String,
    pub prospect_function: String,
    pub client_need_function: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            functions_path: "/functions/v1".to_string(),
            api_key: String::new(),
            request_timeout_sec: 30,
            rfp_function: "send-daily-rfp-summary".to_string(),
            prospect_function: "send-daily-prospect-summary".to_string(),
            client_need_function: "send-daily-client-need-summary".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Definition of the daily summary task and the worker's timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub task_name: String,
    /// Local wall-clock time of day, `HH:MM`.
    pub time: String,
    /// Three-letter weekday names on which the task may fire.
    pub working_days: Vec<String>,
    /// How often the worker re-evaluates the trigger (seconds).
    pub tick_interval_sec: u64,
    /// Delay inserted between consecutive endpoint calls (milliseconds).
    pub pacing_delay_ms: u64,
    /// How long a bridge waits for a worker reply (milliseconds).
    pub reply_timeout_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            task_name: "daily-email-summary".to_string(),
            time: "09:00".to_string(),
            working_days: ["Mon", "Tue", "Wed", "Thu", "Fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            tick_interval_sec: 60,
            pacing_delay_ms: 2000,
            reply_timeout_ms: 3000,
        }
    }
}

impl ScheduleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_sec.max(1))
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Whether completion notifications may be raised.
    pub permission: NotificationPermission,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = GojoConfig::default();

        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/gojo.db"));
        assert_eq!(cfg.backend.functions_path, "/functions/v1");
        assert!(cfg.backend.api_key.is_empty());
        assert_eq!(cfg.backend.rfp_function, "send-daily-rfp-summary");

        assert_eq!(cfg.schedule.time, "09:00");
        assert_eq!(cfg.schedule.working_days.len(), 5);
        assert_eq!(cfg.schedule.tick_interval(), Duration::from_secs(60));
        assert_eq!(cfg.schedule.pacing_delay(), Duration::from_secs(2));
        assert_eq!(cfg.schedule.reply_timeout(), Duration::from_secs(3));

        assert_eq!(cfg.notifications.permission, NotificationPermission::Default);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[server]
bind = "0.0.0.0:9000"

[storage]
db_path = "/var/lib/gojo/ledger.db"

[backend]
base_url = "https://project.supabase.co"
api_key = "service-role"
request_timeout_sec = 10

[schedule]
time = "07:30"
working_days = ["Mon", "Wed"]
pacing_delay_ms = 500

[notifications]
permission = "granted"

[logging]
level = "debug"
json = true
"#;

        let cfg: GojoConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.storage.db_path, PathBuf::from("/var/lib/gojo/ledger.db"));
        assert_eq!(cfg.backend.base_url, "https://project.supabase.co");
        assert_eq!(cfg.backend.api_key, "service-role");
        assert_eq!(cfg.backend.request_timeout(), Duration::from_secs(10));
        // Unset keys inside a present section keep their defaults.
        assert_eq!(cfg.backend.functions_path, "/functions/v1");
        assert_eq!(cfg.schedule.time, "07:30");
        assert_eq!(cfg.schedule.working_days, vec!["Mon", "Wed"]);
        assert_eq!(cfg.schedule.pacing_delay(), Duration::from_millis(500));
        assert_eq!(cfg.schedule.reply_timeout_ms, 3000);
        assert_eq!(cfg.notifications.permission, NotificationPermission::Granted);
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: GojoConfig = toml::from_str("").unwrap();
        let defaults = GojoConfig::default();

        assert_eq!(cfg.server.bind, defaults.server.bind);
        assert_eq!(cfg.schedule.time, defaults.schedule.time);
        assert_eq!(cfg.backend.base_url, defaults.backend.base_url);
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let cfg: GojoConfig = toml::from_str("[schedule]\ntick_interval_sec = 0\n").unwrap();
        assert_eq!(cfg.schedule.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gojo.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:9999\"\n").unwrap();

        let cfg = GojoConfig::load(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9999");
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let result = GojoConfig::resolve(Some(Path::new("/nonexistent/path/gojo.toml")));
        assert!(result.is_err());
    }
}
