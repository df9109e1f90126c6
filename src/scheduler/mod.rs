//! Daily summary scheduling: task definition, trigger decision, dispatch and
//! the background worker that ties them together.

pub mod clock;
pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod messages;
pub mod task;

// Re-export common types
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::engine::{spawn_worker, RegistrationError, WorkerClient, WorkerHandle, WorkerSpec};
pub use self::history::{EndpointResult, ExecutionResult, TriggerSource};
pub use self::messages::{ControlMessage, ControlReply, CronStatus, WorkerEvent};
pub use self::task::{ScheduleError, ScheduledTask};
pub use crate::backend::SummaryKind;
