//! Foreground bridge between user-facing surfaces and the scheduler worker.
//!
//! A [`WorkerRegistry`] holds at most one running worker per process. Any
//! number of [`Bridge`] clones (one per open surface) share it: they register
//! the worker, query and toggle it over request/reply messages bounded by a
//! timeout, and each receives every result the worker broadcasts.

mod notify;

pub use self::notify::{LogNotifier, NotificationPermission, Notifier};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ledger::{self, Ledger};
use crate::scheduler::{
    spawn_worker, ControlMessage, ControlReply, CronStatus, ExecutionResult, RegistrationError,
    WorkerClient, WorkerEvent, WorkerHandle, WorkerSpec,
};

/// Default bound on how long a bridge waits for a worker reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// Await `request`, giving up after `timeout`.
///
/// Both a timeout and a `None` outcome yield `default`. The request is only
/// abandoned, not cancelled on the other side.
pub async fn request_with_timeout<T, F>(request: F, timeout: Duration, default: T) -> T
where
    F: Future<Output = Option<T>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(_) => {
            debug!(timeout_ms = timeout.as_millis() as u64, "worker reply timed out");
            default
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Singleton slot for the process's scheduler worker.
pub struct WorkerRegistry {
    spec: WorkerSpec,
    slot: Mutex<Option<WorkerHandle>>,
}

impl WorkerRegistry {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the worker unless one is already active.
    ///
    /// A fresh worker starts from the static task definition, so the schedule
    /// is enabled again after re-registration.
    pub fn register(&self) -> Result<WorkerClient, RegistrationError> {
        let mut slot = self.slot();
        if let Some(handle) = slot.as_ref().filter(|h| h.is_active()) {
            return Ok(handle.client());
        }

        let handle = spawn_worker(self.spec.clone())?;
        let client = handle.client();
        *slot = Some(handle);
        info!(task = %self.spec.task.name, "scheduler worker registered");
        Ok(client)
    }

    /// Client for the active worker, if there is one.
    pub fn active_client(&self) -> Option<WorkerClient> {
        self.slot()
            .as_ref()
            .filter(|h| h.is_active())
            .map(WorkerHandle::client)
    }

    pub fn is_registered(&self) -> bool {
        self.active_client().is_some()
    }

    #[cfg(test)]
    fn install(&self, handle: WorkerHandle) {
        *self.slot() = Some(handle);
    }

    /// Stop and forget the worker. Returns whether one was registered.
    pub fn unregister(&self) -> bool {
        match self.slot().take() {
            Some(handle) => {
                handle.abort();
                info!("scheduler worker unregistered");
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Bridge {
    registry: Arc<WorkerRegistry>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    reply_timeout: Duration,
}

impl Bridge {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            ledger,
            notifier,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Register the worker if needed. Safe to call repeatedly.
    pub fn initialize(&self) -> bool {
        match self.registry.register() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "scheduler worker registration failed");
                false
            }
        }
    }

    /// Ask the worker for its status, falling back to [`CronStatus::inactive`].
    pub async fn check_status(&self) -> CronStatus {
        let Some(client) = self.registry.active_client() else {
            return CronStatus::inactive();
        };

        let reply = async move {
            match client.request(ControlMessage::CheckCronStatus).await? {
                ControlReply::CronStatus(status) => Some(status),
                other => {
                    warn!(?other, "unexpected reply to status request");
                    None
                }
            }
        };
        request_with_timeout(reply, self.reply_timeout, CronStatus::inactive()).await
    }

    /// Enable or disable the schedule. Returns whether the worker acknowledged
    /// the requested state.
    pub async fn toggle(&self, enabled: bool) -> bool {
        let Some(client) = self.registry.active_client() else {
            return false;
        };

        let ack = async move {
            match client.request(ControlMessage::ToggleCron { enabled }).await? {
                ControlReply::CronToggled { enabled } => Some(Some(enabled)),
                _ => None,
            }
        };
        request_with_timeout(ack, self.reply_timeout, None).await == Some(enabled)
    }

    /// Ask the worker to start a manual dispatch. Results arrive as a broadcast.
    pub async fn run_now(&self) -> bool {
        let Some(client) = self.registry.active_client() else {
            return false;
        };

        let ack = async move {
            match client.request(ControlMessage::RunNow).await? {
                ControlReply::RunStarted { started } => Some(started),
                _ => None,
            }
        };
        request_with_timeout(ack, self.reply_timeout, false).await
    }

    /// Subscribe to execution results.
    ///
    /// Each delivered result is cached in the ledger and, with permission,
    /// raised as a notification before `callback` sees it. Returns `None`
    /// when no worker is registered or no runtime can host the listener.
    pub fn on_result_broadcast<F>(&self, callback: F) -> Option<JoinHandle<()>>
    where
        F: Fn(&ExecutionResult) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let mut events = self.registry.active_client()?.subscribe();
        let bridge = self.clone();

        Some(runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(WorkerEvent::DailyEmailExecution(result)) => {
                        bridge.deliver(&result);
                        callback(&result);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bridge fell behind on execution results");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("result subscription closed");
        }))
    }

    /// Most recent cached result, if any.
    pub fn last_result(&self) -> Option<ExecutionResult> {
        ledger::cached_result(self.ledger.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "cannot read cached execution result");
            None
        })
    }

    fn deliver(&self, result: &ExecutionResult) {
        if let Err(e) = ledger::cache_result(self.ledger.as_ref(), result) {
            warn!(run_id = %result.run_id, error = %e, "failed to cache execution result");
        }

        if self.notifier.permission() == NotificationPermission::Granted {
            let title = if result.all_succeeded() {
                "Daily summary emails sent"
            } else {
                "Daily summary emails finished with errors"
            };
            self.notifier.notify(title, &result.summary());
        }
    }
}
