//! The background scheduler worker.
//!
//! One worker task owns the task definition and is the only writer of the
//! last-execution date. Bridges talk to it through [`WorkerClient`]: a request
//! channel with one-shot replies, and a broadcast channel for results.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::cron;
use super::dispatch;
use super::history::{ExecutionResult, TriggerSource};
use super::messages::{ControlMessage, ControlReply, CronStatus, WorkerEvent};
use super::task::ScheduledTask;
use crate::backend::SummaryBackend;
use crate::ledger::{self, Ledger};

const REQUEST_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 16;

/// Everything needed to start a worker. Cloning shares the collaborators.
#[derive(Clone)]
pub struct WorkerSpec {
    pub task: ScheduledTask,
    pub ledger: Arc<dyn Ledger>,
    pub backend: Arc<dyn SummaryBackend>,
    pub clock: Arc<dyn Clock>,
    pub tick_interval: Duration,
    pub pacing: Duration,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("no async runtime available to host the scheduler worker")]
    NoRuntime,
}

/// A control-plane request and the channel its single reply goes to.
pub struct WorkerRequest {
    pub message: ControlMessage,
    pub reply: oneshot::Sender<ControlReply>,
}

/// Cheap handle for talking to a running worker.
#[derive(Clone)]
pub struct WorkerClient {
    requests: mpsc::Sender<WorkerRequest>,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerClient {
    /// Send `message` and wait for the reply. `None` if the worker is gone
    /// or dropped the request.
    pub async fn request(&self, message: ControlMessage) -> Option<ControlReply> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(WorkerRequest { message, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// Whether both clients talk to the same worker instance.
    pub fn same_worker(&self, other: &WorkerClient) -> bool {
        self.requests.same_channel(&other.requests)
    }
}

/// Owner's handle on a spawned worker.
pub struct WorkerHandle {
    client: WorkerClient,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn client(&self) -> WorkerClient {
        self.client.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.join.is_finished() && !self.client.is_closed()
    }

    /// Stop the worker immediately. An in-flight dispatch is not recorded.
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Spawn a worker on the current tokio runtime.
pub fn spawn_worker(spec: WorkerSpec) -> Result<WorkerHandle, RegistrationError> {
    let runtime =
        tokio::runtime::Handle::try_current().map_err(|_| RegistrationError::NoRuntime)?;

    let (request_tx, request_rx) = mpsc::channel(REQUEST_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let worker = Worker::new(spec, request_rx, event_tx.clone());
    let join = runtime.spawn(worker.run());

    Ok(WorkerHandle {
        client: WorkerClient {
            requests: request_tx,
            events: event_tx,
        },
        join,
    })
}

/// A registered worker that accepts requests and never answers them.
#[cfg(test)]
pub(crate) fn silent_worker() -> WorkerHandle {
    let (request_tx, request_rx) = mpsc::channel::<WorkerRequest>(REQUEST_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let join = tokio::spawn(async move {
        let _held = request_rx;
        std::future::pending::<()>().await
    });
    WorkerHandle {
        client: WorkerClient {
            requests: request_tx,
            events: event_tx,
        },
        join,
    }
}

struct InFlight {
    trigger: TriggerSource,
    date: NaiveDate,
    handle: JoinHandle<ExecutionResult>,
}

pub struct Worker {
    task: ScheduledTask,
    ledger: Arc<dyn Ledger>,
    backend: Arc<dyn SummaryBackend>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    pacing: Duration,
    requests: mpsc::Receiver<WorkerRequest>,
    events: broadcast::Sender<WorkerEvent>,
}

impl Worker {
    pub fn new(
        spec: WorkerSpec,
        requests: mpsc::Receiver<WorkerRequest>,
        events: broadcast::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            task: spec.task,
            ledger: spec.ledger,
            backend: spec.backend,
            clock: spec.clock,
            tick_interval: spec.tick_interval,
            pacing: spec.pacing,
            requests,
            events,
        }
    }

    /// Run until every request sender is gone.
    pub async fn run(mut self) {
        info!(
            task = %self.task.name,
            time = %self.task.time_label(),
            days = ?self.task.working_day_labels(),
            "scheduler worker started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<InFlight> = None;
        // A scheduled run that came due while a manual run was in flight.
        let mut pending_scheduled: Option<NaiveDate> = None;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(date) = self.due_date() {
                        match in_flight.as_ref().map(|f| f.trigger) {
                            None => in_flight = Some(self.start(TriggerSource::Scheduled, date)),
                            Some(TriggerSource::Manual) => {
                                if pending_scheduled != Some(date) {
                                    info!(%date, "scheduled run deferred until the manual run completes");
                                }
                                pending_scheduled = Some(date);
                            }
                            Some(TriggerSource::Scheduled) => {}
                        }
                    }
                }
                request = self.requests.recv() => match request {
                    Some(request) => {
                        let reply = self.handle(request.message, &mut in_flight);
                        // The bridge may have timed out and gone away.
                        let _ = request.reply.send(reply);
                    }
                    None => break,
                },
                joined = join_in_flight(&mut in_flight) => {
                    if let Some(flight) = in_flight.take() {
                        self.finish(flight, joined);
                    }
                    if let Some(date) = pending_scheduled.take() {
                        if self.task.enabled {
                            in_flight = Some(self.start(TriggerSource::Scheduled, date));
                        } else {
                            info!(%date, "deferred scheduled run dropped, schedule disabled");
                        }
                    }
                }
            }
        }

        if let Some(mut flight) = in_flight.take() {
            let joined = (&mut flight.handle).await;
            self.finish(flight, joined);
        }
        info!("scheduler worker stopped");
    }

    /// Today's date if the task should fire now.
    fn due_date(&self) -> Option<NaiveDate> {
        let now = self.clock.now();
        if !self.task.enabled {
            return None;
        }
        let last = match ledger::last_execution_date(self.ledger.as_ref()) {
            Ok(last) => last,
            Err(e) => {
                error!(error = %e, "cannot read execution ledger, skipping evaluation");
                return None;
            }
        };
        cron::should_run(now, last, &self.task).then(|| now.date())
    }

    fn handle(&mut self, message: ControlMessage, in_flight: &mut Option<InFlight>) -> ControlReply {
        match message {
            ControlMessage::CheckCronStatus => {
                ControlReply::CronStatus(self.status(in_flight.is_some()))
            }
            ControlMessage::ToggleCron { enabled } => {
                if self.task.enabled != enabled {
                    info!(task = %self.task.name, enabled, "schedule toggled");
                }
                self.task.enabled = enabled;
                ControlReply::CronToggled {
                    enabled: self.task.enabled,
                }
            }
            ControlMessage::RunNow => {
                if in_flight.is_some() {
                    warn!("manual run refused, a dispatch is already in flight");
                    return ControlReply::RunStarted { started: false };
                }
                let date = self.clock.now().date();
                *in_flight = Some(self.start(TriggerSource::Manual, date));
                ControlReply::RunStarted { started: true }
            }
        }
    }

    fn status(&self, dispatching: bool) -> CronStatus {
        let now = self.clock.now();
        let last = ledger::last_execution_date(self.ledger.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "cannot read execution ledger for status");
            None
        });

        CronStatus {
            enabled: self.task.enabled,
            service_worker_active: true,
            next_execution_time: cron::next_execution(&self.task, now, last)
                .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()),
            working_days: self.task.working_day_labels(),
            last_execution: last.map(|d| d.format("%Y-%m-%d").to_string()),
            dispatching,
        }
    }

    fn start(&self, trigger: TriggerSource, date: NaiveDate) -> InFlight {
        info!(task = %self.task.name, ?trigger, %date, "dispatching daily summaries");
        let backend = Arc::clone(&self.backend);
        let pacing = self.pacing;
        let handle =
            tokio::spawn(async move { dispatch::dispatch(backend.as_ref(), trigger, pacing).await });
        InFlight {
            trigger,
            date,
            handle,
        }
    }

    /// Record the run in the ledger (scheduled runs only), then broadcast it.
    fn finish(&self, flight: InFlight, joined: Result<ExecutionResult, JoinError>) {
        if flight.trigger == TriggerSource::Scheduled {
            // Recorded even when the dispatch task died, so the day is not retried.
            if let Err(e) = ledger::record_execution_date(self.ledger.as_ref(), flight.date) {
                error!(date = %flight.date, error = %e, "failed to record execution date");
            }
        }

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(date = %flight.date, error = %e, "dispatch task did not complete");
                return;
            }
        };

        info!(
            run_id = %result.run_id,
            trigger = ?result.trigger,
            total_emails = result.total_emails,
            succeeded = result.succeeded_count(),
            "dispatch complete"
        );

        if self
            .events
            .send(WorkerEvent::DailyEmailExecution(result))
            .is_err()
        {
            debug!("no bridge subscribed to execution results");
        }
    }
}

async fn join_in_flight(slot: &mut Option<InFlight>) -> Result<ExecutionResult, JoinError> {
    match slot {
        Some(flight) => (&mut flight.handle).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DispatchError, SummaryKind, SummaryResponse, TriggerRequest};
    use crate::ledger::{MemoryLedger, LAST_EXECUTION_KEY};
    use crate::scheduler::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::Mutex;

    struct CountingBackend {
        calls: Mutex<Vec<SummaryKind>>,
    }

    #[async_trait]
    impl SummaryBackend for CountingBackend {
        async fn trigger(
            &self,
            kind: SummaryKind,
            _request: TriggerRequest,
        ) -> Result<SummaryResponse, DispatchError> {
            self.calls.lock().unwrap().push(kind);
            Ok(SummaryResponse {
                success: true,
                message: None,
                emails_sent: Some(1),
            })
        }
    }

    fn at(d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    fn spec(now: NaiveDateTime) -> (WorkerSpec, Arc<MemoryLedger>, Arc<CountingBackend>) {
        let ledger = Arc::new(MemoryLedger::new());
        let backend = Arc::new(CountingBackend {
            calls: Mutex::new(Vec::new()),
        });
        let spec = WorkerSpec {
            task: ScheduledTask::daily_email_summary(),
            ledger: ledger.clone(),
            backend: backend.clone(),
            clock: Arc::new(ManualClock::new(now)),
            tick_interval: Duration::from_secs(60),
            pacing: Duration::from_secs(2),
        };
        (spec, ledger, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_run_records_and_broadcasts() {
        let (spec, ledger, backend) = spec(at(10, 9, 0));
        let handle = spawn_worker(spec).unwrap();
        let mut events = handle.client().subscribe();

        let WorkerEvent::DailyEmailExecution(result) = events.recv().await.unwrap();
        assert_eq!(result.trigger, TriggerSource::Scheduled);
        assert_eq!(result.total_emails, 3);
        assert_eq!(backend.calls.lock().unwrap().len(), 3);
        assert_eq!(
            ledger.read(LAST_EXECUTION_KEY).unwrap().as_deref(),
            Some("2024-06-10")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_run_does_not_record_date() {
        // Saturday: the schedule itself never fires.
        let (spec, ledger, backend) = spec(at(15, 9, 0));
        let handle = spawn_worker(spec).unwrap();
        let client = handle.client();
        let mut events = client.subscribe();

        let reply = client.request(ControlMessage::RunNow).await;
        assert_eq!(reply, Some(ControlReply::RunStarted { started: true }));

        let WorkerEvent::DailyEmailExecution(result) = events.recv().await.unwrap();
        assert_eq!(result.trigger, TriggerSource::Manual);
        assert_eq!(backend.calls.lock().unwrap().len(), 3);
        assert_eq!(ledger.read(LAST_EXECUTION_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_run_refused_while_dispatching() {
        let (spec, _ledger, _backend) = spec(at(15, 9, 0));
        let handle = spawn_worker(spec).unwrap();
        let client = handle.client();

        assert_eq!(
            client.request(ControlMessage::RunNow).await,
            Some(ControlReply::RunStarted { started: true })
        );
        // The first run is still pacing between calls.
        assert_eq!(
            client.request(ControlMessage::RunNow).await,
            Some(ControlReply::RunStarted { started: false })
        );
        match client.request(ControlMessage::CheckCronStatus).await {
            Some(ControlReply::CronStatus(status)) => assert!(status.dispatching),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_when_senders_dropped() {
        let (spec, _ledger, _backend) = spec(at(15, 9, 0));
        let handle = spawn_worker(spec).unwrap();
        let WorkerHandle { client, join } = handle;
        drop(client);
        tokio::time::timeout(Duration::from_secs(5), join)
            .await
            .expect("worker should exit")
            .unwrap();
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let (spec, _ledger, _backend) = spec(at(10, 9, 0));
        assert!(matches!(
            spawn_worker(spec),
            Err(RegistrationError::NoRuntime)
        ));
    }
}
